//! Content-addressed store of concrete specs.
//!
//! Layout:
//! ```text
//! <root>/
//!   specs/
//!     <dag-hash>.json    serialized concrete spec
//!   requests/
//!     <request-key>      one dag hash per line, in request order
//! ```
//!
//! A request key digests the repository fingerprint, the configuration
//! fingerprint and the requested specs, so a stored answer is only reused
//! for an identical question.

use std::io::Write;
use std::path::{Path, PathBuf};

use hpkg_spec::{from_json, to_json, Spec, SpecError, SpecHash};
use log::{debug, info, warn};

use crate::concretizer::concretize;
use crate::context::SolveContext;
use crate::error::{Result, SolveError};

const SPECS_DIR: &str = "specs";
const REQUESTS_DIR: &str = "requests";

/// A directory of concrete specs addressed by their dag hash.
#[derive(Debug, Clone)]
pub struct SpecStore {
    root: PathBuf,
}

impl SpecStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        for dir in [SPECS_DIR, REQUESTS_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path).map_err(|e| SolveError::store(&path, e))?;
        }
        Ok(SpecStore { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn spec_path(&self, hash: &SpecHash) -> PathBuf {
        self.root.join(SPECS_DIR).join(format!("{}.json", hash.as_str()))
    }

    fn request_path(&self, key: &SpecHash) -> PathBuf {
        self.root.join(REQUESTS_DIR).join(key.as_str())
    }

    pub fn contains(&self, hash: &SpecHash) -> bool {
        self.spec_path(hash).is_file()
    }

    /// Store a concrete spec and return its hash. Storing the same spec
    /// twice is a no-op.
    pub fn put(&self, spec: &Spec) -> Result<SpecHash> {
        if !spec.is_concrete() {
            return Err(SpecError::NotConcrete {
                name: spec.name().to_string(),
                detail: "only concrete specs can be stored".to_string(),
            }
            .into());
        }
        let hash = spec.dag_hash()?;
        let path = self.spec_path(&hash);
        if path.is_file() {
            debug!("spec {} already stored", hash.short());
            return Ok(hash);
        }
        write_atomic(&path, to_json(spec)?.as_bytes())?;
        debug!("stored {} as {}", spec.name(), hash.short());
        Ok(hash)
    }

    /// Load the spec stored under `hash`. Every node hash is recomputed;
    /// a tampered file is an integrity error.
    pub fn get(&self, hash: &SpecHash) -> Result<Option<Spec>> {
        let path = self.spec_path(hash);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| SolveError::store(&path, e))?;
        let spec = from_json(&text)?;
        let actual = spec.dag_hash()?;
        if actual != *hash {
            return Err(SpecError::IntegrityFailed {
                name: spec.name().to_string(),
                expected: hash.to_string(),
                actual: actual.to_string(),
            }
            .into());
        }
        Ok(Some(spec))
    }

    /// Remember which specs answered the request `key`.
    pub fn record_request(&self, key: &SpecHash, hashes: &[SpecHash]) -> Result<()> {
        let mut text = String::new();
        for hash in hashes {
            text.push_str(hash.as_str());
            text.push('\n');
        }
        write_atomic(&self.request_path(key), text.as_bytes())
    }

    /// The hashes recorded for `key`, if the request was seen before.
    pub fn lookup_request(&self, key: &SpecHash) -> Result<Option<Vec<SpecHash>>> {
        let path = self.request_path(key);
        if !path.is_file() {
            return Ok(None);
        }
        let text = std::fs::read_to_string(&path).map_err(|e| SolveError::store(&path, e))?;
        let hashes = text
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| SpecHash::from_hex(line.trim()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(Some(hashes))
    }

    /// Hashes of every stored spec, sorted.
    pub fn list(&self) -> Result<Vec<SpecHash>> {
        let dir = self.root.join(SPECS_DIR);
        let mut hashes = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| SolveError::store(&dir, e))? {
            let entry = entry.map_err(|e| SolveError::store(&dir, e))?;
            let name = entry.file_name();
            let Some(stem) = name.to_str().and_then(|n| n.strip_suffix(".json")) else {
                continue;
            };
            match SpecHash::from_hex(stem) {
                Ok(hash) => hashes.push(hash),
                Err(_) => debug!("skipping stray file {}", entry.path().display()),
            }
        }
        hashes.sort();
        Ok(hashes)
    }
}

/// Write through a temporary file in the target directory, then rename.
fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut file = tempfile::NamedTempFile::new_in(dir).map_err(|e| SolveError::store(dir, e))?;
    file.write_all(data).map_err(|e| SolveError::store(path, e))?;
    file.persist(path).map_err(|e| SolveError::store(path, e.error))?;
    Ok(())
}

/// Key identifying a request against one repository and configuration.
pub fn request_key(ctx: &SolveContext<'_>, roots: &[Spec]) -> Result<SpecHash> {
    let mut text = String::new();
    text.push_str(ctx.repo.fingerprint()?.as_str());
    text.push('\n');
    text.push_str(ctx.config.fingerprint().as_str());
    text.push('\n');
    for root in roots {
        text.push_str(&root.to_string());
        text.push('\n');
    }
    Ok(SpecHash::compute(text.as_bytes()))
}

/// [`concretize`], answering from `store` when the same request was solved
/// before against the same repository and configuration.
pub fn concretize_cached(ctx: &SolveContext<'_>, store: &SpecStore, roots: &[Spec]) -> Result<Vec<Spec>> {
    let key = request_key(ctx, roots)?;
    if let Some(hashes) = store.lookup_request(&key)? {
        match load_all(store, &hashes) {
            Ok(Some(specs)) if specs.len() == roots.len() => {
                info!("reusing stored result for request {}", key.short());
                return Ok(specs);
            }
            Ok(_) => debug!("stored result for request {} is incomplete", key.short()),
            Err(e) => warn!("ignoring stored result for request {}: {e}", key.short()),
        }
    }

    let specs = concretize(ctx, roots)?;
    let hashes = specs.iter().map(|spec| store.put(spec)).collect::<Result<Vec<_>>>()?;
    store.record_request(&key, &hashes)?;
    Ok(specs)
}

fn load_all(store: &SpecStore, hashes: &[SpecHash]) -> Result<Option<Vec<Spec>>> {
    let mut specs = Vec::with_capacity(hashes.len());
    for hash in hashes {
        match store.get(hash)? {
            Some(spec) => specs.push(spec),
            None => return Ok(None),
        }
    }
    Ok(Some(specs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use hpkg_repo::{InMemoryRepository, PackageDefinition};

    fn repo() -> InMemoryRepository {
        InMemoryRepository::new([
            PackageDefinition::builder("app").version("1.0").depends_on("zlib").build().unwrap(),
            PackageDefinition::builder("zlib").version("1.3").build().unwrap(),
        ])
    }

    fn config() -> SolverConfig {
        SolverConfig::from_toml_str("[arch]\nplatform = \"linux\"\nos = \"debian12\"\ntarget = \"x86_64\"\n").unwrap()
    }

    fn solved(repo: &InMemoryRepository, config: &SolverConfig) -> Spec {
        let ctx = SolveContext::new(repo, config);
        concretize(&ctx, &[Spec::parse("app").unwrap()]).unwrap().remove(0)
    }

    #[test]
    fn put_and_get() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::open(dir.path()).unwrap();
        let (repo, config) = (repo(), config());
        let spec = solved(&repo, &config);

        let hash = store.put(&spec).unwrap();
        assert!(store.contains(&hash));
        assert_eq!(store.get(&hash).unwrap().unwrap(), spec);
        assert_eq!(store.put(&spec).unwrap(), hash);
        assert_eq!(store.list().unwrap(), vec![hash]);
    }

    #[test]
    fn abstract_specs_are_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::open(dir.path()).unwrap();
        assert!(store.put(&Spec::parse("app@1:").unwrap()).is_err());
    }

    #[test]
    fn tampered_entry_fails_integrity() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::open(dir.path()).unwrap();
        let (repo, config) = (repo(), config());
        let hash = store.put(&solved(&repo, &config)).unwrap();

        let path = dir.path().join("specs").join(format!("{}.json", hash.as_str()));
        let original = std::fs::read_to_string(&path).unwrap();
        let text = original.replace("\"=1.3\"", "\"=1.2\"");
        assert_ne!(text, original);
        std::fs::write(&path, text).unwrap();

        assert!(store.get(&hash).is_err());
    }

    #[test]
    fn missing_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::open(dir.path()).unwrap();
        let hash = SpecHash::compute(b"nothing");
        assert!(!store.contains(&hash));
        assert!(store.get(&hash).unwrap().is_none());
        assert!(store.lookup_request(&hash).unwrap().is_none());
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn cached_solve_reuses_the_recorded_answer() {
        let dir = tempfile::tempdir().unwrap();
        let store = SpecStore::open(dir.path()).unwrap();
        let (repo, config) = (repo(), config());
        let ctx = SolveContext::new(&repo, &config);
        let roots = [Spec::parse("app").unwrap()];

        let first = concretize_cached(&ctx, &store, &roots).unwrap();
        let key = request_key(&ctx, &roots).unwrap();
        let recorded = store.lookup_request(&key).unwrap().unwrap();
        assert_eq!(recorded, vec![first[0].dag_hash().unwrap()]);

        let second = concretize_cached(&ctx, &store, &roots).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn request_key_tracks_configuration() {
        let repo = repo();
        let a = config();
        let b = SolverConfig::from_toml_str("[arch]\nplatform = \"linux\"\nos = \"rhel8\"\ntarget = \"x86_64\"\n").unwrap();
        let roots = [Spec::parse("app").unwrap()];
        let key_a = request_key(&SolveContext::new(&repo, &a), &roots).unwrap();
        let key_b = request_key(&SolveContext::new(&repo, &b), &roots).unwrap();
        assert_ne!(key_a, key_b);
        assert_eq!(key_a, request_key(&SolveContext::new(&repo, &a), &roots).unwrap());
    }
}
