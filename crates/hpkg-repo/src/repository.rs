//! The package metadata interface and an in-memory implementation.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use hpkg_spec::SpecHash;
use hpkg_version::Version;

use crate::error::{RepoError, Result};
use crate::package::{ConflictRule, DependencyRule, PackageDefinition, VariantRule};

/// Read-only source of package definitions.
///
/// Implementations must be safe to share between threads; the resolver
/// never mutates what it reads.
pub trait PackageRepository: Send + Sync {
    /// The definition of a real (non-virtual) package.
    fn package(&self, name: &str) -> Result<Arc<PackageDefinition>>;

    /// Every real package name, sorted.
    fn package_names(&self) -> Result<Vec<String>>;

    fn contains(&self, name: &str) -> bool {
        self.package(name).is_ok()
    }

    /// Packages with a `provides` rule for `virtual_name`, sorted by name.
    fn providers_for(&self, virtual_name: &str) -> Result<Vec<String>> {
        let mut providers = Vec::new();
        for name in self.package_names()? {
            if self.package(&name)?.may_provide(virtual_name) {
                providers.push(name);
            }
        }
        Ok(providers)
    }

    /// A name is virtual when no package has it but some package provides it.
    fn is_virtual(&self, name: &str) -> Result<bool> {
        Ok(!self.contains(name) && !self.providers_for(name)?.is_empty())
    }

    /// Every virtual name some package provides, sorted.
    fn virtual_names(&self) -> Result<Vec<String>> {
        let mut names = BTreeSet::new();
        for name in self.package_names()? {
            for rule in &self.package(&name)?.provides {
                names.insert(rule.virtual_name().to_string());
            }
        }
        Ok(names.into_iter().collect())
    }

    /// Declared versions, lowest first.
    fn get_versions(&self, name: &str) -> Result<Vec<Version>> {
        Ok(self
            .package(name)?
            .sorted_versions()
            .into_iter()
            .map(|d| d.version.clone())
            .collect())
    }

    fn get_variants(&self, name: &str) -> Result<Vec<VariantRule>> {
        Ok(self.package(name)?.variants.clone())
    }

    fn get_dependencies(&self, name: &str) -> Result<Vec<DependencyRule>> {
        Ok(self.package(name)?.dependencies.clone())
    }

    fn get_conflicts(&self, name: &str) -> Result<Vec<ConflictRule>> {
        Ok(self.package(name)?.conflicts.clone())
    }

    /// Hash over every definition. Changes whenever any package changes.
    fn fingerprint(&self) -> Result<SpecHash> {
        let mut text = String::new();
        for name in self.package_names()? {
            text.push_str(&self.package(&name)?.canonical_text());
        }
        Ok(SpecHash::compute(text.as_bytes()))
    }
}

/// A fixed set of package definitions held in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRepository {
    packages: BTreeMap<String, Arc<PackageDefinition>>,
    providers: BTreeMap<String, Vec<String>>,
}

impl InMemoryRepository {
    /// Build a repository. Build-system rules are applied against the full
    /// set of names, so the order of `packages` does not matter.
    pub fn new(packages: impl IntoIterator<Item = PackageDefinition>) -> Self {
        let raw: BTreeMap<String, PackageDefinition> =
            packages.into_iter().map(|p| (p.name.clone(), p)).collect();
        let names: BTreeSet<String> = raw.keys().cloned().collect();

        let mut providers: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut packages = BTreeMap::new();
        for (name, package) in raw {
            let package = package.with_implicit_rules(|dep| names.contains(dep));
            for rule in &package.provides {
                let list = providers.entry(rule.virtual_name().to_string()).or_default();
                if !list.contains(&name) {
                    list.push(name.clone());
                }
            }
            packages.insert(name, Arc::new(package));
        }
        InMemoryRepository { packages, providers }
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }
}

impl PackageRepository for InMemoryRepository {
    fn package(&self, name: &str) -> Result<Arc<PackageDefinition>> {
        self.packages.get(name).cloned().ok_or_else(|| RepoError::unknown(name))
    }

    fn package_names(&self) -> Result<Vec<String>> {
        Ok(self.packages.keys().cloned().collect())
    }

    fn contains(&self, name: &str) -> bool {
        self.packages.contains_key(name)
    }

    fn providers_for(&self, virtual_name: &str) -> Result<Vec<String>> {
        Ok(self.providers.get(virtual_name).cloned().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build_system::BuildSystem;

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new([
            PackageDefinition::builder("openmpi")
                .version("4.1.5")
                .provides("mpi@:3.1")
                .build()
                .unwrap(),
            PackageDefinition::builder("mpich")
                .version("4.1")
                .version("3.4")
                .provides_when("mpi@:4", "@4:")
                .build()
                .unwrap(),
            PackageDefinition::builder("fmt")
                .build_system(BuildSystem::CMake)
                .version("10.1.1")
                .build()
                .unwrap(),
            PackageDefinition::builder("cmake").version("3.27.7").build().unwrap(),
        ])
    }

    #[test]
    fn lookups() {
        let repo = repo();
        assert_eq!(repo.package_names().unwrap(), ["cmake", "fmt", "mpich", "openmpi"]);
        assert!(matches!(repo.package("hdf5"), Err(RepoError::UnknownPackage { .. })));
        assert_eq!(
            repo.get_versions("mpich").unwrap(),
            vec![Version::parse("3.4").unwrap(), Version::parse("4.1").unwrap()]
        );
    }

    #[test]
    fn virtuals_and_providers() {
        let repo = repo();
        assert_eq!(repo.providers_for("mpi").unwrap(), ["mpich", "openmpi"]);
        assert!(repo.is_virtual("mpi").unwrap());
        assert!(!repo.is_virtual("openmpi").unwrap());
        assert!(!repo.is_virtual("blas").unwrap());
        assert_eq!(repo.virtual_names().unwrap(), ["mpi"]);
    }

    #[test]
    fn implicit_rules_applied_against_known_names() {
        let repo = repo();
        let deps = repo.get_dependencies("fmt").unwrap();
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].name(), "cmake");
        assert!(repo.get_variants("fmt").unwrap().iter().any(|r| r.def.name == "build_type"));
    }

    #[test]
    fn fingerprint_tracks_definitions() {
        let a = repo();
        let b = repo();
        assert_eq!(a.fingerprint().unwrap(), b.fingerprint().unwrap());
        let c = InMemoryRepository::new([PackageDefinition::builder("cmake").version("3.28").build().unwrap()]);
        assert_ne!(a.fingerprint().unwrap(), c.fingerprint().unwrap());
    }
}
