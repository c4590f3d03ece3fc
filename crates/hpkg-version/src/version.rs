//! The concrete version type: a release or a git ref.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Result, VersionError};
use crate::git::{is_git_version, GitVersion, RefLookup};
use crate::standard::StandardVersion;

/// A single concrete version.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Version {
    Standard(StandardVersion),
    Git(GitVersion),
}

impl Version {
    /// Parse a version, recognising git syntax separately from releases.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        if is_git_version(input) {
            Ok(Version::Git(GitVersion::parse(input)?))
        } else {
            Ok(Version::Standard(StandardVersion::parse(input)?))
        }
    }

    /// Compare two versions. Unresolved git refs cannot be ordered against
    /// anything but themselves.
    pub fn compare(&self, other: &Version) -> Result<Ordering> {
        for v in [self, other] {
            if let Version::Git(g) = v {
                if !g.is_resolved() && self != other {
                    return Err(VersionError::Unresolved {
                        reference: g.reference().to_string(),
                    });
                }
            }
        }
        Ok(self.cmp(other))
    }

    /// The release this version is ordered as: itself, or a git ref's
    /// resolved anchor.
    pub fn effective(&self) -> Option<&StandardVersion> {
        match self {
            Version::Standard(v) => Some(v),
            Version::Git(g) => g.anchor(),
        }
    }

    pub fn as_standard(&self) -> Option<&StandardVersion> {
        match self {
            Version::Standard(v) => Some(v),
            Version::Git(_) => None,
        }
    }

    pub fn is_git(&self) -> bool {
        matches!(self, Version::Git(_))
    }

    pub fn is_develop(&self) -> bool {
        match self {
            Version::Standard(v) => v.is_develop(),
            Version::Git(_) => false,
        }
    }

    /// Whether this is a git ref still waiting for a lookup.
    pub fn needs_lookup(&self) -> bool {
        matches!(self, Version::Git(g) if !g.is_resolved())
    }

    /// Resolve a git ref in place; releases are unaffected.
    pub fn resolve(&mut self, lookup: &dyn RefLookup, repo: &str, known: &[StandardVersion]) -> Result<()> {
        match self {
            Version::Git(g) => g.resolve(lookup, repo, known),
            Version::Standard(_) => Ok(()),
        }
    }

    /// Total order used for containers. Unresolved git refs sort first, by
    /// reference; resolved refs sort just above their anchor.
    fn sort_key(&self) -> (Option<&StandardVersion>, u8, &str) {
        match self {
            Version::Standard(v) => (Some(v), 0, ""),
            Version::Git(g) => (g.anchor(), 1, g.reference()),
        }
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.sort_key().hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.sort_key().cmp(&other.sort_key())
    }
}

impl From<StandardVersion> for Version {
    fn from(v: StandardVersion) -> Self {
        Version::Standard(v)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Version::Standard(v) => write!(f, "{v}"),
            Version::Git(g) => write!(f, "{g}"),
        }
    }
}

impl FromStr for Version {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        Version::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = VersionError;

    fn try_from(s: String) -> Result<Self> {
        Version::parse(&s)
    }
}

impl From<Version> for String {
    fn from(v: Version) -> String {
        v.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn distinguishes_git_syntax() {
        assert!(!v("1.2.3").is_git());
        assert!(v("git.main").is_git());
        assert!(v("branch=1.0").is_git());
        assert!(v("0123456789abcdef0123456789abcdef01234567").is_git());
    }

    #[test]
    fn total_order_is_transitive() {
        let mut versions = vec![
            v("develop"),
            v("1.2.0"),
            v("1.2.0rc1"),
            v("1.2"),
            v("1.10"),
            v("1.2a"),
            v("0.9"),
            v("main"),
        ];
        versions.sort();
        let rendered: Vec<String> = versions.iter().map(ToString::to_string).collect();
        assert_eq!(
            rendered,
            vec!["0.9", "1.2", "1.2a", "1.2.0rc1", "1.2.0", "1.10", "main", "develop"]
        );
        for a in &versions {
            for b in &versions {
                for c in &versions {
                    if a <= b && b <= c {
                        assert!(a <= c);
                    }
                }
            }
        }
    }

    #[test]
    fn resolved_git_sorts_above_its_anchor() {
        let git = v("feature=1.2");
        assert!(git > v("1.2"));
        assert!(git < v("1.2.1"));
        assert_ne!(git, v("1.2"));
        assert_eq!(git.compare(&v("1.3")).unwrap(), Ordering::Less);
    }

    #[test]
    fn unresolved_git_refuses_comparison() {
        let git = v("git.feature");
        let err = git.compare(&v("1.0")).unwrap_err();
        assert!(matches!(err, VersionError::Unresolved { .. }));
        assert_eq!(git.compare(&git.clone()).unwrap(), Ordering::Equal);
        assert!(git.needs_lookup());
    }

    #[test]
    fn illegal_characters_rejected() {
        assert!(matches!(Version::parse("1.2$"), Err(VersionError::Format { .. })));
        assert!(matches!(Version::parse("git.a b"), Err(VersionError::Format { .. })));
    }
}
