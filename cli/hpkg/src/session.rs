//! Repository, configuration and cache shared by every command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use hpkg_repo::LocalRepository;
use hpkg_solver::{SolveContext, SolverConfig, SpecStore};
use hpkg_spec::Spec;
use hpkg_version::{CachedLookup, GitCliLookup};
use log::debug;

/// Configuration file looked up in the repository root when `--config`
/// is not given.
pub const CONFIG_FILE: &str = "hpkg.toml";

pub struct Session {
    pub repo: LocalRepository,
    pub config: SolverConfig,
    lookup: CachedLookup<GitCliLookup>,
    cache: Option<PathBuf>,
}

impl Session {
    pub fn open(repo: &Path, config: Option<&Path>, cache: Option<&Path>) -> Result<Self> {
        let repository =
            LocalRepository::open(repo).with_context(|| format!("opening package repository {}", repo.display()))?;

        let config_path = match config {
            Some(path) => Some(path.to_path_buf()),
            None => Some(repo.join(CONFIG_FILE)).filter(|p| p.is_file()),
        };
        let config = match &config_path {
            Some(path) => {
                debug!("loading solver configuration from {}", path.display());
                SolverConfig::load(path).with_context(|| format!("loading {}", path.display()))?
            }
            None => SolverConfig::default(),
        };

        let clone_dir = match cache {
            Some(dir) => dir.join("git"),
            None => std::env::temp_dir().join("hpkg-git"),
        };

        Ok(Session {
            repo: repository,
            config,
            lookup: CachedLookup::new(GitCliLookup::new(clone_dir)),
            cache: cache.map(Path::to_path_buf),
        })
    }

    pub fn context(&self) -> SolveContext<'_> {
        SolveContext::new(&self.repo, &self.config).with_lookup(&self.lookup)
    }

    /// The result store under `--cache`, if one was given.
    pub fn store(&self) -> Result<Option<SpecStore>> {
        let Some(dir) = &self.cache else {
            return Ok(None);
        };
        let store = SpecStore::open(dir.join("store")).with_context(|| format!("opening result store in {}", dir.display()))?;
        Ok(Some(store))
    }
}

/// Parse command-line spec arguments.
pub fn parse_specs(args: &[String]) -> Result<Vec<Spec>> {
    args.iter()
        .map(|text| Spec::parse(text).with_context(|| format!("invalid spec '{text}'")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn repository() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let zlib = dir.path().join("packages").join("zlib");
        fs::create_dir_all(&zlib).unwrap();
        fs::write(
            zlib.join("package.toml"),
            "[package]\nname = \"zlib\"\n\n[[version]]\nversion = \"1.3\"\n",
        )
        .unwrap();
        dir
    }

    #[test]
    fn picks_up_config_from_repository() {
        let dir = repository();
        fs::write(
            dir.path().join(CONFIG_FILE),
            "[arch]\nplatform = \"linux\"\nos = \"debian12\"\ntarget = \"x86_64\"\n",
        )
        .unwrap();
        let session = Session::open(dir.path(), None, None).unwrap();
        assert_eq!(session.config.arch.os.as_deref(), Some("debian12"));
        assert!(session.store().unwrap().is_none());
    }

    #[test]
    fn explicit_config_must_exist() {
        let dir = repository();
        let missing = dir.path().join("missing.toml");
        assert!(Session::open(dir.path(), Some(&missing), None).is_err());
    }

    #[test]
    fn missing_repository_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Session::open(dir.path(), None, None).err().unwrap();
        assert!(format!("{err:#}").contains("opening package repository"));
    }

    #[test]
    fn cache_enables_the_store() {
        let dir = repository();
        let cache = tempfile::tempdir().unwrap();
        let session = Session::open(dir.path(), None, Some(cache.path())).unwrap();
        assert!(session.store().unwrap().is_some());
        assert!(cache.path().join("store").join("specs").is_dir());
    }

    #[test]
    fn bad_spec_arguments_are_reported() {
        let err = parse_specs(&["app ^+shared".to_string()]).err().unwrap();
        assert!(err.to_string().contains("invalid spec 'app ^+shared'"));
    }
}
