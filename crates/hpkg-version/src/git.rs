//! Git-ref versions and their resolution against repository history.
//!
//! A git version names a branch, tag or commit instead of a release. It
//! cannot be ordered against releases until it is resolved: the nearest
//! ancestor tag that corresponds to a known release becomes its anchor, and
//! the commit distance from that tag is folded into the anchor as a
//! `-git.<distance>` suffix. A ref written as `<ref>=<version>` carries its
//! anchor explicitly and needs no lookup.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Mutex;

use log::debug;
use sha2::{Digest, Sha256};

use crate::error::{Result, VersionError};
use crate::standard::StandardVersion;

/// A version identified by a git reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GitVersion {
    reference: String,
    has_git_prefix: bool,
    anchor: Option<StandardVersion>,
}

/// Whether a string uses git version syntax.
pub fn is_git_version(input: &str) -> bool {
    input.starts_with("git.") || input.contains('=') || is_commit_sha(input)
}

fn is_commit_sha(input: &str) -> bool {
    input.len() == 40 && input.chars().all(|c| c.is_ascii_hexdigit())
}

impl GitVersion {
    /// Parse `git.<ref>`, `<ref>=<version>`, `git.<ref>=<version>` or a
    /// 40-character commit hash.
    pub fn parse(input: &str) -> Result<Self> {
        let (head, anchor) = match input.split_once('=') {
            Some((head, anchor)) => (head, Some(StandardVersion::parse(anchor)?)),
            None => (input, None),
        };
        let (reference, has_git_prefix) = match head.strip_prefix("git.") {
            Some(rest) => (rest, true),
            None => (head, false),
        };
        if reference.is_empty() {
            return Err(VersionError::format(input, "empty git reference"));
        }
        if let Some(bad) = reference
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | '/')))
        {
            return Err(VersionError::format(input, format!("illegal character '{bad}' in git reference")));
        }
        if !has_git_prefix && anchor.is_none() && !is_commit_sha(reference) {
            return Err(VersionError::format(input, "not a git version"));
        }
        Ok(GitVersion {
            reference: reference.to_string(),
            has_git_prefix,
            anchor,
        })
    }

    /// The branch, tag or commit this version names.
    pub fn reference(&self) -> &str {
        &self.reference
    }

    pub fn is_commit(&self) -> bool {
        is_commit_sha(&self.reference)
    }

    /// The release this ref is ordered against, once resolved.
    pub fn anchor(&self) -> Option<&StandardVersion> {
        self.anchor.as_ref()
    }

    pub fn is_resolved(&self) -> bool {
        self.anchor.is_some()
    }

    /// Resolve the anchor through `lookup`. Already-resolved versions are
    /// left untouched.
    pub fn resolve(&mut self, lookup: &dyn RefLookup, repo: &str, known: &[StandardVersion]) -> Result<()> {
        if self.anchor.is_some() {
            return Ok(());
        }
        let found = lookup.resolve_ref(repo, &self.reference, known)?;
        let base = found.anchor.map(|v| v.to_string()).unwrap_or_else(|| "0".to_string());
        let text = if found.distance > 0 {
            format!("{base}-git.{}", found.distance)
        } else {
            base
        };
        debug!("resolved git ref {} in {repo} to {text}", self.reference);
        self.anchor = Some(StandardVersion::parse(&text)?);
        Ok(())
    }
}

impl fmt::Display for GitVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_git_prefix {
            write!(f, "git.")?;
        }
        write!(f, "{}", self.reference)?;
        if let Some(anchor) = &self.anchor {
            write!(f, "={anchor}")?;
        }
        Ok(())
    }
}

/// Outcome of resolving a ref: the nearest ancestor release, if any, and
/// the number of commits between it and the ref.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefResolution {
    pub anchor: Option<StandardVersion>,
    pub distance: u64,
}

/// Resolves git refs against repository history.
pub trait RefLookup: Send + Sync {
    /// Find the nearest ancestor of `reference` in `repo` whose tag maps to
    /// one of `known` (or to a semver release).
    fn resolve_ref(&self, repo: &str, reference: &str, known: &[StandardVersion]) -> Result<RefResolution>;
}

/// Map a tag name to a release: an exact known version, a known version
/// with a `v` prefix, or a semver tag.
pub fn version_for_tag(tag: &str, known: &[StandardVersion]) -> Option<StandardVersion> {
    if let Some(v) = known
        .iter()
        .find(|v| tag == v.to_string() || tag.strip_prefix('v') == Some(v.to_string().as_str()))
    {
        return Some(v.clone());
    }
    let sv = semver::Version::parse(tag.strip_prefix('v').unwrap_or(tag)).ok()?;
    let text = if sv.pre.is_empty() {
        format!("{}.{}.{}", sv.major, sv.minor, sv.patch)
    } else {
        format!("{}.{}.{}-{}", sv.major, sv.minor, sv.patch, sv.pre)
    };
    StandardVersion::parse(&text).ok()
}

/// Memoizes another lookup per (repository, ref).
pub struct CachedLookup<L> {
    inner: L,
    memo: Mutex<HashMap<(String, String), RefResolution>>,
}

impl<L: RefLookup> CachedLookup<L> {
    pub fn new(inner: L) -> Self {
        CachedLookup {
            inner,
            memo: Mutex::new(HashMap::new()),
        }
    }
}

impl<L: RefLookup> RefLookup for CachedLookup<L> {
    fn resolve_ref(&self, repo: &str, reference: &str, known: &[StandardVersion]) -> Result<RefResolution> {
        let key = (repo.to_string(), reference.to_string());
        if let Some(hit) = self.memo.lock().ok().and_then(|memo| memo.get(&key).cloned()) {
            return Ok(hit);
        }
        let found = self.inner.resolve_ref(repo, reference, known)?;
        if let Ok(mut memo) = self.memo.lock() {
            memo.insert(key, found.clone());
        }
        Ok(found)
    }
}

/// Resolves refs by running the `git` command line tool.
///
/// Local repository directories are used in place; anything else is
/// cloned (bare) once into `clone_dir`.
pub struct GitCliLookup {
    clone_dir: PathBuf,
}

impl GitCliLookup {
    pub fn new(clone_dir: impl Into<PathBuf>) -> Self {
        GitCliLookup {
            clone_dir: clone_dir.into(),
        }
    }

    fn checkout_for(&self, repo: &str, reference: &str) -> Result<PathBuf> {
        let local = Path::new(repo);
        if local.is_dir() {
            return Ok(local.to_path_buf());
        }
        let digest = Sha256::digest(repo.as_bytes());
        let name: String = digest.iter().take(8).map(|b| format!("{b:02x}")).collect();
        let dest = self.clone_dir.join(name);
        if !dest.exists() {
            std::fs::create_dir_all(&self.clone_dir)
                .map_err(|e| VersionError::lookup(reference, format!("cannot create clone directory: {e}")))?;
            let dest_str = dest.to_string_lossy().to_string();
            run_git(None, &["clone", "--bare", "--quiet", repo, &dest_str], reference)?;
        }
        Ok(dest)
    }
}

fn run_git(dir: Option<&Path>, args: &[&str], reference: &str) -> Result<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.arg("-C").arg(dir);
    }
    let output = cmd
        .args(args)
        .output()
        .map_err(|e| VersionError::lookup(reference, format!("cannot run git: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(VersionError::lookup(
            reference,
            format!("git {} failed: {}", args.join(" "), stderr.trim()),
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn parse_count(text: &str, reference: &str) -> Result<u64> {
    text.parse::<u64>()
        .map_err(|_| VersionError::lookup(reference, format!("unexpected commit count '{text}'")))
}

impl RefLookup for GitCliLookup {
    fn resolve_ref(&self, repo: &str, reference: &str, known: &[StandardVersion]) -> Result<RefResolution> {
        let dir = self.checkout_for(repo, reference)?;
        let rev = format!("{reference}^{{commit}}");
        let commit = run_git(Some(&dir), &["rev-parse", "--verify", "--quiet", &rev], reference)?;

        let tags = run_git(Some(&dir), &["tag", "--merged", &commit], reference)?;
        let mut best: Option<(u64, StandardVersion)> = None;
        for tag in tags.lines().map(str::trim).filter(|t| !t.is_empty()) {
            let Some(version) = version_for_tag(tag, known) else {
                continue;
            };
            let range = format!("{tag}..{commit}");
            let distance = parse_count(&run_git(Some(&dir), &["rev-list", "--count", &range], reference)?, reference)?;
            let closer = match &best {
                None => true,
                Some((d, v)) => distance < *d || (distance == *d && version > *v),
            };
            if closer {
                best = Some((distance, version));
            }
        }

        match best {
            Some((distance, anchor)) => Ok(RefResolution {
                anchor: Some(anchor),
                distance,
            }),
            None => {
                let total = parse_count(&run_git(Some(&dir), &["rev-list", "--count", &commit], reference)?, reference)?;
                Ok(RefResolution {
                    anchor: None,
                    distance: total.saturating_sub(1),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedLookup {
        calls: AtomicUsize,
        result: Option<RefResolution>,
    }

    impl RefLookup for FixedLookup {
        fn resolve_ref(&self, _repo: &str, reference: &str, _known: &[StandardVersion]) -> Result<RefResolution> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result
                .clone()
                .ok_or_else(|| VersionError::lookup(reference, "no such ref"))
        }
    }

    fn sv(s: &str) -> StandardVersion {
        StandardVersion::parse(s).unwrap()
    }

    #[test]
    fn parse_git_forms() {
        let g = GitVersion::parse("git.feature/x").unwrap();
        assert_eq!(g.reference(), "feature/x");
        assert!(!g.is_resolved());

        let g = GitVersion::parse("mybranch=1.2").unwrap();
        assert_eq!(g.anchor(), Some(&sv("1.2")));
        assert_eq!(g.to_string(), "mybranch=1.2");

        let sha = "a".repeat(40);
        let g = GitVersion::parse(&sha).unwrap();
        assert!(g.is_commit());

        assert!(GitVersion::parse("1.2").is_err());
        assert!(GitVersion::parse("git.").is_err());
    }

    #[test]
    fn resolve_folds_distance_into_anchor() {
        let lookup = FixedLookup {
            calls: AtomicUsize::new(0),
            result: Some(RefResolution {
                anchor: Some(sv("1.2")),
                distance: 5,
            }),
        };
        let mut g = GitVersion::parse("git.main").unwrap();
        g.resolve(&lookup, "repo", &[]).unwrap();
        let anchor = g.anchor().unwrap();
        assert_eq!(anchor.to_string(), "1.2-git.5");
        assert!(*anchor > sv("1.2"));
        assert!(*anchor < sv("1.2.0"));
        assert!(*anchor < sv("1.3"));
    }

    #[test]
    fn resolve_without_tag_anchors_at_zero() {
        let lookup = FixedLookup {
            calls: AtomicUsize::new(0),
            result: Some(RefResolution {
                anchor: None,
                distance: 0,
            }),
        };
        let mut g = GitVersion::parse("git.abc").unwrap();
        g.resolve(&lookup, "repo", &[]).unwrap();
        assert_eq!(g.anchor(), Some(&sv("0")));
    }

    #[test]
    fn lookup_failure_is_reported() {
        let lookup = FixedLookup {
            calls: AtomicUsize::new(0),
            result: None,
        };
        let mut g = GitVersion::parse("git.nope").unwrap();
        let err = g.resolve(&lookup, "repo", &[]).unwrap_err();
        assert!(matches!(err, VersionError::Lookup { .. }));
    }

    #[test]
    fn cached_lookup_memoizes() {
        let cached = CachedLookup::new(FixedLookup {
            calls: AtomicUsize::new(0),
            result: Some(RefResolution {
                anchor: Some(sv("2.0")),
                distance: 0,
            }),
        });
        for _ in 0..3 {
            cached.resolve_ref("repo", "v2", &[]).unwrap();
        }
        cached.resolve_ref("repo", "other", &[]).unwrap();
        assert_eq!(cached.inner.calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn tags_map_to_versions() {
        let known = vec![sv("1.0"), sv("2.1")];
        assert_eq!(version_for_tag("v2.1", &known), Some(sv("2.1")));
        assert_eq!(version_for_tag("1.0", &known), Some(sv("1.0")));
        assert_eq!(version_for_tag("v3.4.5", &known), Some(sv("3.4.5")));
        assert_eq!(version_for_tag("3.4.5-rc.1", &known), Some(sv("3.4.5rc1")));
        assert_eq!(version_for_tag("release-candidate", &known), None);
    }

    #[test]
    fn git_cli_lookup_fails_outside_a_repository() {
        let dir = tempfile::tempdir().unwrap();
        let lookup = GitCliLookup::new(dir.path().join("clones"));
        let repo = dir.path().to_string_lossy().to_string();
        let err = lookup.resolve_ref(&repo, "main", &[]).unwrap_err();
        assert!(matches!(err, VersionError::Lookup { .. }));
    }
}
