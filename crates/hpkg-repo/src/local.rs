//! A package repository on the local filesystem.
//!
//! Layout:
//! ```text
//! <root>/
//!   packages/
//!     <package-name>/
//!       package.toml
//! ```

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use log::debug;

use crate::error::{RepoError, Result};
use crate::manifest::parse_package;
use crate::package::PackageDefinition;
use crate::repository::PackageRepository;

const PACKAGE_FILE: &str = "package.toml";

/// Package definitions read lazily from a directory tree. Each file is
/// parsed at most once per repository instance.
#[derive(Debug)]
pub struct LocalRepository {
    root: PathBuf,
    names: OnceLock<BTreeSet<String>>,
    loaded: Mutex<HashMap<String, Arc<PackageDefinition>>>,
}

impl LocalRepository {
    /// Open a repository rooted at `root`. The `packages` directory must
    /// exist.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let packages = root.join("packages");
        if !packages.is_dir() {
            return Err(RepoError::Io {
                path: packages,
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no packages directory"),
            });
        }
        Ok(LocalRepository {
            root,
            names: OnceLock::new(),
            loaded: Mutex::new(HashMap::new()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn package_file(&self, name: &str) -> PathBuf {
        self.root.join("packages").join(name).join(PACKAGE_FILE)
    }

    fn names(&self) -> Result<&BTreeSet<String>> {
        if let Some(names) = self.names.get() {
            return Ok(names);
        }
        let dir = self.root.join("packages");
        let io = |source: std::io::Error| RepoError::Io {
            path: dir.clone(),
            source,
        };
        let mut names = BTreeSet::new();
        for entry in std::fs::read_dir(&dir).map_err(io)? {
            let entry = entry.map_err(io)?;
            if entry.path().join(PACKAGE_FILE).is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.insert(name.to_string());
                }
            }
        }
        debug!("found {} packages under {}", names.len(), dir.display());
        Ok(self.names.get_or_init(|| names))
    }

    fn load(&self, name: &str) -> Result<PackageDefinition> {
        let path = self.package_file(name);
        let text = std::fs::read_to_string(&path).map_err(|source| RepoError::Io {
            path: path.clone(),
            source,
        })?;
        let package = parse_package(&text, &path)?;
        if package.name != name {
            return Err(RepoError::invalid(
                name,
                format!("{} declares package '{}'", path.display(), package.name),
            ));
        }
        let names = self.names()?;
        Ok(package.with_implicit_rules(|dep| names.contains(dep)))
    }
}

impl PackageRepository for LocalRepository {
    fn package(&self, name: &str) -> Result<Arc<PackageDefinition>> {
        if !self.names()?.contains(name) {
            return Err(RepoError::unknown(name));
        }
        if let Some(found) = self.loaded.lock().ok().and_then(|map| map.get(name).cloned()) {
            return Ok(found);
        }
        let package = Arc::new(self.load(name)?);
        debug!("loaded package '{name}'");
        if let Ok(mut map) = self.loaded.lock() {
            map.insert(name.to_string(), Arc::clone(&package));
        }
        Ok(package)
    }

    fn package_names(&self) -> Result<Vec<String>> {
        Ok(self.names()?.iter().cloned().collect())
    }

    fn contains(&self, name: &str) -> bool {
        self.names().is_ok_and(|names| names.contains(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_package(root: &Path, name: &str, body: &str) {
        let dir = root.join("packages").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(PACKAGE_FILE), body).unwrap();
    }

    fn sample() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        write_package(
            dir.path(),
            "zlib",
            "[package]\nname = \"zlib\"\nbuild-system = \"cmake\"\n\n[[version]]\nversion = \"1.3\"\n",
        );
        write_package(dir.path(), "cmake", "[package]\nname = \"cmake\"\n\n[[version]]\nversion = \"3.27.7\"\n");
        write_package(
            dir.path(),
            "openmpi",
            "[package]\nname = \"openmpi\"\n\n[[version]]\nversion = \"4.1.5\"\n\n[[provides]]\nspec = \"mpi\"\n",
        );
        dir
    }

    #[test]
    fn reads_packages_from_disk() {
        let dir = sample();
        let repo = LocalRepository::open(dir.path()).unwrap();
        assert_eq!(repo.package_names().unwrap(), ["cmake", "openmpi", "zlib"]);
        let zlib = repo.package("zlib").unwrap();
        assert_eq!(zlib.dependencies[0].name(), "cmake");
        assert_eq!(repo.providers_for("mpi").unwrap(), ["openmpi"]);
        assert!(repo.is_virtual("mpi").unwrap());
    }

    #[test]
    fn memoizes_loaded_definitions() {
        let dir = sample();
        let repo = LocalRepository::open(dir.path()).unwrap();
        let first = repo.package("zlib").unwrap();
        fs::remove_file(repo.package_file("zlib")).unwrap();
        let second = repo.package("zlib").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn unknown_and_mismatched_packages() {
        let dir = sample();
        write_package(dir.path(), "bzip2", "[package]\nname = \"bz2\"\n");
        let repo = LocalRepository::open(dir.path()).unwrap();
        assert!(matches!(repo.package("hdf5"), Err(RepoError::UnknownPackage { .. })));
        assert!(matches!(repo.package("bzip2"), Err(RepoError::InvalidDefinition { .. })));
    }

    #[test]
    fn missing_packages_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(LocalRepository::open(dir.path()).is_err());
    }
}
