//! Checks over externals in the solver configuration.

use std::collections::{BTreeMap, BTreeSet};

use hpkg_solver::{External, ALL_PACKAGES};

use crate::error::Result;
use crate::{Audit, Issue};

/// Configured externals for selected packages, in configuration order.
fn selected_externals<'x>(audit: &'x Audit<'_, '_>) -> Vec<(&'x str, &'x External)> {
    let mut selected = Vec::new();
    for (name, prefs) in &audit.ctx.config.packages {
        if name.as_str() == ALL_PACKAGES || !audit.selects(name) {
            continue;
        }
        selected.extend(prefs.externals.iter().map(|e| (name.as_str(), e)));
    }
    selected
}

fn prefix_of(external: &External) -> String {
    external
        .prefix()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "<no prefix>".to_string())
}

pub(crate) fn duplicate_externals(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut by_spec: BTreeMap<String, Vec<&External>> = BTreeMap::new();
    for (_, external) in selected_externals(audit) {
        by_spec.entry(external.spec.to_string()).or_default().push(external);
    }

    let mut issues = Vec::new();
    for (spec, entries) in by_spec.into_iter().filter(|(_, e)| e.len() > 1) {
        let mut issue = Issue::new(format!("Multiple externals share the same spec: {spec}"))
            .detail("Please remove all but one of the following entries:");
        for external in entries {
            issue = issue.detail(format!("  {spec} prefix={}", prefix_of(external)));
        }
        issues.push(issue.detail("as they might result in non-deterministic hashes"));
    }
    Ok(issues)
}

pub(crate) fn external_versions(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    let mut seen = BTreeSet::new();
    for (name, external) in selected_externals(audit) {
        if !seen.insert(external.spec.to_string()) {
            continue;
        }
        let Some(package) = audit.ctx.package(name)? else {
            issues.push(Issue::new(format!(
                "External {} at {} is for unknown package '{name}'",
                external.spec,
                prefix_of(external)
            )));
            continue;
        };
        let Some(version) = external.spec.version() else {
            continue;
        };
        if package.declaration(version).is_none() {
            let known: Vec<String> = package
                .sorted_versions()
                .iter()
                .map(|d| d.version.to_string())
                .collect();
            issues.push(
                Issue::new(format!("External {} uses a version {name} does not declare", external.spec))
                    .detail(format!("known versions of {name} are {}", known.join(", "))),
            );
        }
    }
    Ok(issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpkg_repo::{InMemoryRepository, PackageDefinition};
    use hpkg_solver::{SolveContext, SolverConfig};

    const CONFIG: &str = r#"
[[packages.zlib.externals]]
spec = "zlib@1.2.11"
prefix = "/usr"

[[packages.zlib.externals]]
spec = "zlib@1.2.11"
prefix = "/opt/zlib"

[[packages.zlib.externals]]
spec = "zlib@1.3"
prefix = "/opt/zlib-1.3"

[[packages.libfoo.externals]]
spec = "libfoo@2.0"
prefix = "/opt/libfoo"
"#;

    fn issues(check: fn(&Audit<'_, '_>) -> Result<Vec<Issue>>, packages: &[&str]) -> Vec<Issue> {
        let repo = InMemoryRepository::new([PackageDefinition::builder("zlib")
            .version("1.2.13")
            .version("1.3")
            .build()
            .unwrap()]);
        let config = SolverConfig::from_toml_str(CONFIG).unwrap();
        let ctx = SolveContext::new(&repo, &config);
        let packages: Vec<String> = packages.iter().map(|p| p.to_string()).collect();
        let audit = Audit::new(&ctx, &packages).unwrap();
        check(&audit).unwrap()
    }

    #[test]
    fn duplicate_specs_are_reported_once() {
        let found = issues(duplicate_externals, &[]);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].summary, "Multiple externals share the same spec: zlib@=1.2.11");
        assert!(found[0].details[1].ends_with("prefix=/usr"));
        assert!(found[0].details[2].ends_with("prefix=/opt/zlib"));
        assert_eq!(found[0].details.len(), 4);
    }

    #[test]
    fn undeclared_versions_and_unknown_packages() {
        let found = issues(external_versions, &[]);
        let summaries: Vec<&str> = found.iter().map(|i| i.summary.as_str()).collect();
        assert_eq!(
            summaries,
            [
                "External libfoo@=2.0 at /opt/libfoo is for unknown package 'libfoo'",
                "External zlib@=1.2.11 uses a version zlib does not declare",
            ]
        );
        assert_eq!(found[1].details, ["known versions of zlib are 1.2.13, 1.3"]);
    }

    #[test]
    fn package_selection_limits_externals() {
        let found = issues(external_versions, &["zlib"]);
        assert_eq!(found.len(), 1, "{found:?}");
    }
}
