//! Sanity checks for hpkg package definitions and solver configuration.
//!
//! Each check has a name and belongs to a group. [`run`] accepts either
//! kind of tag and returns every [`Finding`]; findings are advisory and
//! never block concretization.
//!
//! Groups:
//! - **packages**: variant declarations, dependency rules, `when`
//!   conditions and version declarations
//! - **externals**: externals listed in the solver configuration

pub mod error;
mod externals;
mod packages;
pub mod report;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use hpkg_repo::PackageDefinition;
use hpkg_solver::SolveContext;
use log::debug;

pub use error::{AuditError, Result};
pub use report::format_report;

/// One problem reported by a check.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Finding {
    /// Name of the check that reported it.
    pub check: &'static str,
    pub summary: String,
    pub details: Vec<String>,
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.summary)?;
        for detail in &self.details {
            write!(f, "\n    {detail}")?;
        }
        Ok(())
    }
}

/// What a check function reports before it is attributed to its check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Issue {
    pub summary: String,
    pub details: Vec<String>,
}

impl Issue {
    pub(crate) fn new(summary: impl Into<String>) -> Self {
        Issue {
            summary: summary.into(),
            details: Vec::new(),
        }
    }

    pub(crate) fn detail(mut self, line: impl Into<String>) -> Self {
        self.details.push(line.into());
        self
    }
}

/// A registered check.
pub struct Check {
    pub name: &'static str,
    pub group: &'static str,
    pub description: &'static str,
    run: fn(&Audit<'_, '_>) -> Result<Vec<Issue>>,
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("name", &self.name)
            .field("group", &self.group)
            .finish()
    }
}

pub const PACKAGES_GROUP: &str = "packages";
pub const EXTERNALS_GROUP: &str = "externals";

/// Every check, in the order they run.
pub const CHECKS: &[Check] = &[
    Check {
        name: "variant-descriptions",
        group: PACKAGES_GROUP,
        description: "every variant has a description",
        run: packages::variant_descriptions,
    },
    Check {
        name: "variant-defaults",
        group: PACKAGES_GROUP,
        description: "variant defaults are legal values of their variant",
        run: packages::variant_defaults,
    },
    Check {
        name: "dependency-names",
        group: PACKAGES_GROUP,
        description: "dependencies name known packages with valid variants and declared versions",
        run: packages::dependency_names,
    },
    Check {
        name: "when-conditions",
        group: PACKAGES_GROUP,
        description: "conditions use declared variants and match some declared version",
        run: packages::when_conditions,
    },
    Check {
        name: "version-declarations",
        group: PACKAGES_GROUP,
        description: "versions are declared once and not all deprecated",
        run: packages::version_declarations,
    },
    Check {
        name: "duplicate-externals",
        group: EXTERNALS_GROUP,
        description: "no two externals share a spec",
        run: externals::duplicate_externals,
    },
    Check {
        name: "external-versions",
        group: EXTERNALS_GROUP,
        description: "externals use versions their package declares",
        run: externals::external_versions,
    },
];

/// Look up a check by name.
pub fn check(name: &str) -> Option<&'static Check> {
    CHECKS.iter().find(|c| c.name == name)
}

/// Group names, in check order.
pub fn groups() -> Vec<&'static str> {
    let mut groups: Vec<&'static str> = Vec::new();
    for check in CHECKS {
        if !groups.contains(&check.group) {
            groups.push(check.group);
        }
    }
    groups
}

/// What the checks look at: the selected packages and the context they
/// were loaded from.
pub struct Audit<'c, 'a> {
    pub ctx: &'c SolveContext<'a>,
    pub packages: Vec<Arc<PackageDefinition>>,
    /// `None` when every package is selected.
    selection: Option<BTreeSet<String>>,
}

impl<'c, 'a> Audit<'c, 'a> {
    /// Load `packages`, or every package when the list is empty.
    pub fn new(ctx: &'c SolveContext<'a>, packages: &[String]) -> Result<Self> {
        let (names, selection) = if packages.is_empty() {
            (ctx.repo.package_names()?, None)
        } else {
            (packages.to_vec(), Some(packages.iter().cloned().collect()))
        };
        let packages = names
            .iter()
            .map(|name| ctx.repo.package(name))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Audit {
            ctx,
            packages,
            selection,
        })
    }

    /// Whether configuration entries for `name` are in scope.
    pub fn selects(&self, name: &str) -> bool {
        self.selection.as_ref().map_or(true, |s| s.contains(name))
    }
}

/// Resolve tags (check names or group names) to checks. No tags means
/// every check.
pub fn select_checks(tags: &[String]) -> Result<Vec<&'static Check>> {
    if tags.is_empty() {
        return Ok(CHECKS.iter().collect());
    }
    let mut selected: Vec<&'static Check> = Vec::new();
    for tag in tags {
        let matching: Vec<&'static Check> = CHECKS
            .iter()
            .filter(|c| c.name == tag.as_str() || c.group == tag.as_str())
            .collect();
        if matching.is_empty() {
            return Err(AuditError::UnknownCheck { tag: tag.clone() });
        }
        for check in matching {
            if !selected.iter().any(|c| c.name == check.name) {
                selected.push(check);
            }
        }
    }
    Ok(selected)
}

/// Run the checks named by `tags` over `packages` (every package when
/// empty). Duplicate findings are reported once.
pub fn run(tags: &[String], packages: &[String], ctx: &SolveContext<'_>) -> Result<Vec<Finding>> {
    let checks = select_checks(tags)?;
    let audit = Audit::new(ctx, packages)?;
    let mut findings: Vec<Finding> = Vec::new();
    for check in checks {
        let issues = (check.run)(&audit)?;
        debug!("audit check {}: {} finding(s)", check.name, issues.len());
        for issue in issues {
            let finding = Finding {
                check: check.name,
                summary: issue.summary,
                details: issue.details,
            };
            if !findings.contains(&finding) {
                findings.push(finding);
            }
        }
    }
    Ok(findings)
}
