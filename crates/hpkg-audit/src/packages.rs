//! Checks over package definitions.

use std::collections::BTreeMap;

use hpkg_repo::PackageDefinition;
use hpkg_spec::{format_assignment, SpecNode};
use hpkg_version::{Version, VersionList};

use crate::error::Result;
use crate::{Audit, Issue};

pub(crate) fn variant_descriptions(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for package in &audit.packages {
        for rule in &package.variants {
            if rule.def.description.trim().is_empty() {
                issues.push(Issue::new(format!(
                    "Variant '{}' in package '{}' is missing a description",
                    rule.def.name, package.name
                )));
            }
        }
    }
    Ok(issues)
}

pub(crate) fn variant_defaults(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for package in &audit.packages {
        for rule in &package.variants {
            if let Err(e) = rule.def.coerce(&rule.def.default) {
                issues.push(
                    Issue::new(format!(
                        "The default value of the variant '{}' in package '{}' failed validation",
                        rule.def.name, package.name
                    ))
                    .detail(e.to_string())
                    .detail("Is it among the allowed values?"),
                );
            }
        }
    }
    Ok(issues)
}

/// Dependencies must name a package or a virtual. Variants and versions
/// required of a real package must exist in its definition.
pub(crate) fn dependency_names(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for package in &audit.packages {
        for rule in &package.dependencies {
            let name = rule.name();
            let dependency = match audit.ctx.package(name)? {
                Some(dependency) => dependency,
                None => {
                    if !audit.ctx.is_virtual(name)? {
                        issues.push(Issue::new(format!(
                            "{}: unknown package '{name}' in 'depends_on' rule",
                            package.name
                        )));
                    }
                    continue;
                }
            };
            let wanted = rule.spec.root_node();

            let wrong = wrong_variants(&dependency, wanted);
            if !wrong.is_empty() {
                let mut issue = Issue::new(format!(
                    "{}: wrong variant used for a dependency in a 'depends_on' rule",
                    package.name
                ));
                for (assignment, reason) in wrong {
                    issue = issue.detail(format!("{assignment} in package '{name}': {reason}"));
                }
                issues.push(issue);
            }

            if !matches_declared(&dependency, &wanted.versions) {
                issues.push(
                    Issue::new(format!(
                        "{}: dependency on {} cannot be satisfied by known versions of {name}",
                        package.name, rule.spec
                    ))
                    .detail(format!("known versions of {name} are {}", declared(&dependency))),
                );
            }
        }
    }
    Ok(issues)
}

/// Conditions on a package's own directives must use variants it declares
/// and version ranges that match at least one declared version.
pub(crate) fn when_conditions(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for package in &audit.packages {
        let mut conditions: Vec<(&str, &SpecNode)> = Vec::new();
        conditions.extend(package.variants.iter().map(|r| ("variant", r.when.root_node())));
        conditions.extend(package.dependencies.iter().map(|r| ("depends_on", r.when.root_node())));
        conditions.extend(package.provides.iter().map(|r| ("provides", r.when.root_node())));
        for rule in &package.conflicts {
            conditions.push(("conflicts", rule.when.root_node()));
            let target = rule.spec.root_node();
            if target.is_anonymous() || target.name == package.name {
                conditions.push(("conflicts", target));
            }
        }

        for (directive, node) in conditions {
            let wrong = wrong_variants(package, node);
            if !wrong.is_empty() {
                let mut issue = Issue::new(format!("{}: wrong variant in '{directive}' rule", package.name));
                for (assignment, reason) in wrong {
                    issue = issue.detail(format!("{assignment}: {reason}"));
                }
                issues.push(issue);
            }
            if !matches_declared(package, &node.versions) {
                issues.push(
                    Issue::new(format!(
                        "{}: condition @{} in '{directive}' rule matches no declared version",
                        package.name, node.versions
                    ))
                    .detail(format!("known versions of {} are {}", package.name, declared(package))),
                );
            }
        }
    }
    Ok(issues)
}

pub(crate) fn version_declarations(audit: &Audit<'_, '_>) -> Result<Vec<Issue>> {
    let mut issues = Vec::new();
    for package in &audit.packages {
        if package.versions.is_empty() {
            issues.push(Issue::new(format!("{}: no versions declared", package.name)));
            continue;
        }

        let mut counts: BTreeMap<&Version, usize> = BTreeMap::new();
        for decl in &package.versions {
            *counts.entry(&decl.version).or_default() += 1;
        }
        for (version, count) in counts.into_iter().filter(|(_, n)| *n > 1) {
            issues.push(Issue::new(format!(
                "{}: version {version} is declared {count} times",
                package.name
            )));
        }

        if package.versions.iter().all(|d| d.deprecated) {
            issues.push(
                Issue::new(format!("{}: every declared version is deprecated", package.name))
                    .detail("the package will only be chosen as a last resort"),
            );
        }

        let preferred: Vec<String> = package
            .versions
            .iter()
            .filter(|d| d.preferred)
            .map(|d| d.version.to_string())
            .collect();
        if preferred.len() > 1 {
            issues.push(
                Issue::new(format!("{}: more than one preferred version", package.name))
                    .detail(format!("preferred: {}", preferred.join(", "))),
            );
        }
    }
    Ok(issues)
}

/// Variant assignments on `node` that `package` does not accept, with the
/// reason for each.
fn wrong_variants(package: &PackageDefinition, node: &SpecNode) -> Vec<(String, String)> {
    let mut wrong = Vec::new();
    for (name, value) in &node.variants {
        let assignment = format_assignment(name, value);
        if !package.has_variant(name) {
            wrong.push((assignment, format!("no variant named '{name}'")));
            continue;
        }
        let errors: Vec<String> = package
            .variant_rules(name)
            .filter_map(|rule| rule.def.coerce(value).err())
            .map(|e| e.to_string())
            .collect();
        if errors.len() == package.variant_rules(name).count() {
            wrong.push((assignment, errors.join("; ")));
        }
    }
    wrong
}

/// Whether some declared version lies in `versions`. Packages without
/// declarations are reported by `version-declarations` instead.
fn matches_declared(package: &PackageDefinition, versions: &VersionList) -> bool {
    versions.is_any()
        || package.versions.is_empty()
        || package.versions.iter().any(|d| versions.contains(&d.version))
}

fn declared(package: &PackageDefinition) -> String {
    let versions: Vec<String> = package
        .sorted_versions()
        .iter()
        .map(|d| d.version.to_string())
        .collect();
    versions.join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use hpkg_repo::InMemoryRepository;
    use hpkg_solver::{SolveContext, SolverConfig};
    use hpkg_spec::VariantDef;

    fn findings(packages: Vec<PackageDefinition>, check: fn(&Audit<'_, '_>) -> Result<Vec<Issue>>) -> Vec<Issue> {
        let repo = InMemoryRepository::new(packages);
        let config = SolverConfig::default();
        let ctx = SolveContext::new(&repo, &config);
        let audit = Audit::new(&ctx, &[]).unwrap();
        check(&audit).unwrap()
    }

    fn zlib() -> PackageDefinition {
        PackageDefinition::builder("zlib")
            .version("1.2.13")
            .version("1.3")
            .variant(VariantDef::boolean("shared", true, "Build shared libraries"))
            .build()
            .unwrap()
    }

    #[test]
    fn missing_description() {
        let pkg = PackageDefinition::builder("app")
            .version("1.0")
            .variant(VariantDef::boolean("docs", false, ""))
            .build()
            .unwrap();
        let issues = findings(vec![pkg], variant_descriptions);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].summary, "Variant 'docs' in package 'app' is missing a description");
    }

    #[test]
    fn default_outside_allowed_values() {
        let pkg = PackageDefinition::builder("app")
            .version("1.0")
            .variant(VariantDef::single("build_type", "Fast", &["Debug", "Release"], "Build type"))
            .variant(VariantDef::multi("backends", &["cuda"], &["cuda", "rocm"], "GPU backends"))
            .build()
            .unwrap();
        let issues = findings(vec![pkg], variant_defaults);
        assert_eq!(issues.len(), 1);
        assert!(issues[0].summary.contains("'build_type'"));
        assert_eq!(issues[0].details[1], "Is it among the allowed values?");
    }

    #[test]
    fn dependency_on_unknown_package() {
        let app = PackageDefinition::builder("app")
            .version("1.0")
            .depends_on("zlib")
            .depends_on("libfoo")
            .depends_on("mpi")
            .build()
            .unwrap();
        let openmpi = PackageDefinition::builder("openmpi")
            .version("4.1.5")
            .provides("mpi")
            .build()
            .unwrap();
        let issues = findings(vec![app, openmpi, zlib()], dependency_names);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].summary, "app: unknown package 'libfoo' in 'depends_on' rule");
    }

    #[test]
    fn dependency_with_wrong_variant_or_version() {
        let app = PackageDefinition::builder("app")
            .version("1.0")
            .depends_on("zlib+pic")
            .depends_on_when("zlib@2:", "@1.0")
            .build()
            .unwrap();
        let issues = findings(vec![app, zlib()], dependency_names);
        assert_eq!(issues.len(), 2, "{issues:?}");
        assert_eq!(issues[0].summary, "app: wrong variant used for a dependency in a 'depends_on' rule");
        assert!(issues[0].details[0].contains("+pic in package 'zlib'"));
        assert!(issues[1].summary.contains("cannot be satisfied by known versions of zlib"));
        assert_eq!(issues[1].details, ["known versions of zlib are 1.2.13, 1.3"]);
    }

    #[test]
    fn conditions_use_declared_variants_and_versions() {
        let app = PackageDefinition::builder("app")
            .version("1.0")
            .version("1.1")
            .variant(VariantDef::boolean("mpi", false, "MPI support"))
            .depends_on_when("zlib", "+mpi")
            .depends_on_when("zlib", "+fortran")
            .conflicts("+mpi", "@3:")
            .build()
            .unwrap();
        let issues = findings(vec![app, zlib()], when_conditions);
        assert_eq!(issues.len(), 2, "{issues:?}");
        assert_eq!(issues[0].summary, "app: wrong variant in 'depends_on' rule");
        assert!(issues[0].details[0].starts_with("+fortran"));
        assert!(issues[1].summary.contains("'conflicts'"));
        assert!(issues[1].summary.contains("matches no declared version"));
    }

    #[test]
    fn conflicts_on_other_packages_are_not_checked_here() {
        let app = PackageDefinition::builder("app")
            .version("1.0")
            .conflicts("zlib+pic", "")
            .build()
            .unwrap();
        assert!(findings(vec![app, zlib()], when_conditions).is_empty());
    }

    #[test]
    fn version_declaration_problems() {
        let empty = PackageDefinition::builder("empty").build().unwrap();
        let old = PackageDefinition::builder("old")
            .deprecated_version("0.9")
            .deprecated_version("0.9")
            .build()
            .unwrap();
        let picky = PackageDefinition::builder("picky")
            .preferred_version("1.0")
            .preferred_version("2.0")
            .build()
            .unwrap();
        let summaries: Vec<String> = findings(vec![empty, old, picky, zlib()], version_declarations)
            .into_iter()
            .map(|i| i.summary)
            .collect();
        assert_eq!(
            summaries,
            [
                "empty: no versions declared",
                "old: version 0.9 is declared 2 times",
                "old: every declared version is deprecated",
                "picky: more than one preferred version",
            ]
        );
    }
}
