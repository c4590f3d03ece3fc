//! Package definitions: the read-only records the resolver consumes.

use std::fmt::Write as _;

use hpkg_spec::{parse_spec, DepTypes, Spec, VariantDef};
use hpkg_version::Version;

use crate::build_system::BuildSystem;
use crate::error::{RepoError, Result};

/// A declared version of a package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDecl {
    pub version: Version,
    /// Chosen over higher versions when nothing else decides.
    pub preferred: bool,
    /// Only chosen when no other version fits.
    pub deprecated: bool,
}

/// A variant the package declares while `when` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantRule {
    pub def: VariantDef,
    pub when: Spec,
}

/// `spec` is a dependency while `when` holds. Constraints on `spec`
/// (versions, variants) are required of the dependency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyRule {
    pub spec: Spec,
    pub types: DepTypes,
    pub when: Spec,
}

impl DependencyRule {
    pub fn name(&self) -> &str {
        self.spec.name()
    }
}

/// A node matching both `spec` and `when` is invalid.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictRule {
    pub spec: Spec,
    pub when: Spec,
    pub message: Option<String>,
}

/// The package provides the virtual `spec` while `when` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvidesRule {
    pub spec: Spec,
    pub when: Spec,
}

impl ProvidesRule {
    pub fn virtual_name(&self) -> &str {
        self.spec.name()
    }
}

/// Everything known about one package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageDefinition {
    pub name: String,
    pub description: String,
    pub build_system: BuildSystem,
    /// Repository URL used to place git versions in the release order.
    pub git: Option<String>,
    pub versions: Vec<VersionDecl>,
    pub variants: Vec<VariantRule>,
    pub dependencies: Vec<DependencyRule>,
    pub conflicts: Vec<ConflictRule>,
    pub provides: Vec<ProvidesRule>,
}

impl PackageDefinition {
    pub fn builder(name: &str) -> PackageBuilder {
        PackageBuilder::new(name)
    }

    /// Declared versions, lowest first.
    pub fn sorted_versions(&self) -> Vec<&VersionDecl> {
        let mut versions: Vec<&VersionDecl> = self.versions.iter().collect();
        versions.sort_by(|a, b| a.version.cmp(&b.version));
        versions
    }

    pub fn declaration(&self, version: &Version) -> Option<&VersionDecl> {
        self.versions.iter().find(|d| &d.version == version)
    }

    pub fn variant_rules<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a VariantRule> {
        self.variants.iter().filter(move |r| r.def.name == name)
    }

    pub fn has_variant(&self, name: &str) -> bool {
        self.variant_rules(name).next().is_some()
    }

    /// Whether any rule provides `virtual_name`.
    pub fn may_provide(&self, virtual_name: &str) -> bool {
        self.provides.iter().any(|p| p.virtual_name() == virtual_name)
    }

    /// Add the rules the build system implies. Implicit dependencies are
    /// only added when `known` accepts the dependency name.
    pub fn with_implicit_rules(mut self, known: impl Fn(&str) -> bool) -> Self {
        for def in self.build_system.implicit_variants() {
            if !self.has_variant(&def.name) {
                self.variants.push(VariantRule { def, when: Spec::new(Default::default()) });
            }
        }
        for (name, types) in self.build_system.implicit_dependencies() {
            if known(name) && !self.dependencies.iter().any(|d| d.name() == name) {
                self.dependencies.push(DependencyRule {
                    spec: Spec::named(name),
                    types,
                    when: Spec::new(Default::default()),
                });
            }
        }
        self
    }

    /// Stable text covering every field, for repository fingerprints.
    pub fn canonical_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "package {} {} {:?}", self.name, self.build_system, self.git);
        for v in &self.versions {
            let _ = writeln!(out, "version {} {} {}", v.version, v.preferred, v.deprecated);
        }
        for r in &self.variants {
            let d = &r.def;
            let _ = writeln!(
                out,
                "variant {} {} {:?} {} when {}",
                d.name, d.default, d.domain, d.sticky, r.when
            );
        }
        for r in &self.dependencies {
            let _ = writeln!(out, "depends {} {} when {}", r.spec, r.types, r.when);
        }
        for r in &self.conflicts {
            let _ = writeln!(out, "conflicts {} when {}", r.spec, r.when);
        }
        for r in &self.provides {
            let _ = writeln!(out, "provides {} when {}", r.spec, r.when);
        }
        out
    }
}

/// Collects a package definition from spec strings. Parse errors surface
/// from [`PackageBuilder::build`].
#[derive(Debug, Clone, Default)]
pub struct PackageBuilder {
    name: String,
    description: String,
    build_system: BuildSystem,
    git: Option<String>,
    versions: Vec<(String, bool, bool)>,
    variants: Vec<(VariantDef, String)>,
    dependencies: Vec<(String, Option<String>, String)>,
    conflicts: Vec<(String, String, Option<String>)>,
    provides: Vec<(String, String)>,
}

impl PackageBuilder {
    pub fn new(name: &str) -> Self {
        PackageBuilder {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = text.to_string();
        self
    }

    pub fn build_system(mut self, build_system: BuildSystem) -> Self {
        self.build_system = build_system;
        self
    }

    pub fn git(mut self, url: &str) -> Self {
        self.git = Some(url.to_string());
        self
    }

    pub fn version(self, version: &str) -> Self {
        self.version_with(version, false, false)
    }

    pub fn preferred_version(self, version: &str) -> Self {
        self.version_with(version, true, false)
    }

    pub fn deprecated_version(self, version: &str) -> Self {
        self.version_with(version, false, true)
    }

    pub fn version_with(mut self, version: &str, preferred: bool, deprecated: bool) -> Self {
        self.versions.push((version.to_string(), preferred, deprecated));
        self
    }

    pub fn variant(self, def: VariantDef) -> Self {
        self.variant_when(def, "")
    }

    pub fn variant_when(mut self, def: VariantDef, when: &str) -> Self {
        self.variants.push((def, when.to_string()));
        self
    }

    pub fn depends_on(self, spec: &str) -> Self {
        self.depends_on_with(spec, None, "")
    }

    pub fn depends_on_when(self, spec: &str, when: &str) -> Self {
        self.depends_on_with(spec, None, when)
    }

    /// `types` is a list such as `build,run`; `None` means build and link.
    pub fn depends_on_with(mut self, spec: &str, types: Option<&str>, when: &str) -> Self {
        self.dependencies
            .push((spec.to_string(), types.map(str::to_string), when.to_string()));
        self
    }

    pub fn conflicts(self, spec: &str, when: &str) -> Self {
        self.conflicts_with_message(spec, when, None)
    }

    pub fn conflicts_with_message(mut self, spec: &str, when: &str, message: Option<&str>) -> Self {
        self.conflicts
            .push((spec.to_string(), when.to_string(), message.map(str::to_string)));
        self
    }

    pub fn provides(self, spec: &str) -> Self {
        self.provides_when(spec, "")
    }

    pub fn provides_when(mut self, spec: &str, when: &str) -> Self {
        self.provides.push((spec.to_string(), when.to_string()));
        self
    }

    pub fn build(self) -> Result<PackageDefinition> {
        let name = self.name;
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')) {
            return Err(RepoError::invalid(&name, "invalid package name"));
        }
        let guard = |text: &str| -> Result<Spec> {
            let spec = if text.trim().is_empty() {
                Spec::new(Default::default())
            } else {
                parse_spec(text)?
            };
            if !spec.root_node().is_anonymous() && spec.name() != name {
                return Err(RepoError::invalid(
                    &name,
                    format!("condition '{text}' names another package"),
                ));
            }
            Ok(spec)
        };
        let named = |text: &str, what: &str| -> Result<Spec> {
            let spec = parse_spec(text)?;
            if spec.root_node().is_anonymous() {
                return Err(RepoError::invalid(&name, format!("{what} '{text}' needs a package name")));
            }
            Ok(spec)
        };

        let mut versions = Vec::new();
        for (text, preferred, deprecated) in &self.versions {
            versions.push(VersionDecl {
                version: Version::parse(text)?,
                preferred: *preferred,
                deprecated: *deprecated,
            });
        }

        let mut variants = Vec::new();
        for (def, when) in self.variants {
            variants.push(VariantRule { def, when: guard(&when)? });
        }

        let mut dependencies = Vec::new();
        for (spec, types, when) in &self.dependencies {
            let spec = named(spec, "dependency")?;
            if spec.name() == name {
                return Err(RepoError::invalid(&name, "a package cannot depend on itself"));
            }
            let types = match types {
                Some(text) => DepTypes::parse(text)?,
                None => DepTypes::DEFAULT,
            };
            dependencies.push(DependencyRule {
                spec,
                types,
                when: guard(when)?,
            });
        }

        let mut conflicts = Vec::new();
        for (spec, when, message) in &self.conflicts {
            conflicts.push(ConflictRule {
                spec: parse_spec(spec)?,
                when: guard(when)?,
                message: message.clone(),
            });
        }

        let mut provides = Vec::new();
        for (spec, when) in &self.provides {
            provides.push(ProvidesRule {
                spec: named(spec, "provided virtual")?,
                when: guard(when)?,
            });
        }

        Ok(PackageDefinition {
            name,
            description: self.description,
            build_system: self.build_system,
            git: self.git,
            versions,
            variants,
            dependencies,
            conflicts,
            provides,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_parses_rules() {
        let pkg = PackageDefinition::builder("hdf5")
            .description("HDF5 data model")
            .version("1.12.2")
            .preferred_version("1.10.9")
            .deprecated_version("1.8.0")
            .variant(VariantDef::boolean("mpi", true, "Enable MPI"))
            .variant_when(VariantDef::boolean("szip", false, "Enable szip"), "@1.10:")
            .depends_on_when("mpi", "+mpi")
            .depends_on_with("cmake@3.18:", Some("build"), "")
            .conflicts_with_message("%intel", "@:1.8", Some("old releases fail with intel"))
            .build()
            .unwrap();
        assert_eq!(pkg.versions.len(), 3);
        assert_eq!(
            pkg.sorted_versions().iter().map(|d| d.version.to_string()).collect::<Vec<_>>(),
            ["1.8.0", "1.10.9", "1.12.2"]
        );
        assert!(pkg.has_variant("szip"));
        assert_eq!(pkg.dependencies[1].types, DepTypes::BUILD);
        assert_eq!(pkg.dependencies[0].when.to_string(), "+mpi");
        assert_eq!(pkg.conflicts[0].message.as_deref(), Some("old releases fail with intel"));
    }

    #[test]
    fn builder_rejects_bad_rules() {
        assert!(PackageDefinition::builder("a").version("1.$").build().is_err());
        assert!(PackageDefinition::builder("a").depends_on("+shared").build().is_err());
        assert!(PackageDefinition::builder("a").depends_on("a").build().is_err());
        assert!(PackageDefinition::builder("a").depends_on_when("b", "c+x").build().is_err());
        assert!(PackageDefinition::builder("a").depends_on_with("b", Some("install"), "").build().is_err());
        assert!(PackageDefinition::builder("").build().is_err());
    }

    #[test]
    fn implicit_rules_follow_build_system() {
        let pkg = PackageDefinition::builder("fmt")
            .build_system(BuildSystem::CMake)
            .version("10.1.1")
            .build()
            .unwrap();
        let with_cmake = pkg.clone().with_implicit_rules(|name| name == "cmake");
        assert!(with_cmake.has_variant("build_type"));
        assert_eq!(with_cmake.dependencies.len(), 1);
        assert_eq!(with_cmake.dependencies[0].name(), "cmake");
        assert_eq!(with_cmake.dependencies[0].types, DepTypes::BUILD);

        let without = pkg.with_implicit_rules(|_| false);
        assert!(without.has_variant("build_type"));
        assert!(without.dependencies.is_empty());
    }

    #[test]
    fn canonical_text_changes_with_rules() {
        let a = PackageDefinition::builder("a").version("1.0").build().unwrap();
        let b = PackageDefinition::builder("a").version("1.0").depends_on("b").build().unwrap();
        assert_ne!(a.canonical_text(), b.canonical_text());
        assert_eq!(a.canonical_text(), a.clone().canonical_text());
    }
}
