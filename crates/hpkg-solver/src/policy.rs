//! Version preference policy.
//!
//! Two sources can ask for a version other than the highest: the
//! configuration (`[packages.<name>] version = [...]`) and the package
//! itself (`preferred = true`). Which of them wins is a policy choice,
//! named here rather than buried in the sort.

use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;

use hpkg_version::Version;
use serde::{Deserialize, Serialize};

/// Precedence between configured and package-declared version preferences.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionPolicy {
    /// A configured preference beats a version the package marks preferred.
    #[default]
    ConfigFirst,
    /// A version the package marks preferred beats configured preferences.
    PackageFirst,
}

/// The policy used when the configuration does not name one.
pub const DEFAULT_VERSION_POLICY: VersionPolicy = VersionPolicy::ConfigFirst;

/// A declared version that fits the node's current constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionCandidate {
    pub version: Version,
    pub preferred: bool,
    pub deprecated: bool,
    /// Position of the first configured preference admitting the version.
    pub config_rank: Option<usize>,
}

impl VersionPolicy {
    pub fn name(self) -> &'static str {
        match self {
            VersionPolicy::ConfigFirst => "config-first",
            VersionPolicy::PackageFirst => "package-first",
        }
    }

    /// Sort candidates most preferred first.
    ///
    /// Deprecated versions always come last. Then the two preference
    /// sources in policy order, then released versions before develop
    /// versions, then the highest version.
    pub fn sort(self, candidates: &mut [VersionCandidate]) {
        candidates.sort_by_cached_key(|c| {
            let config = c.config_rank.unwrap_or(usize::MAX);
            let package = usize::from(!c.preferred);
            let (first, second) = match self {
                VersionPolicy::ConfigFirst => (config, package),
                VersionPolicy::PackageFirst => (package, config),
            };
            (c.deprecated, first, second, c.version.is_develop(), Reverse(c.version.clone()))
        });
    }
}

impl fmt::Display for VersionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VersionPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "config-first" => Ok(VersionPolicy::ConfigFirst),
            "package-first" => Ok(VersionPolicy::PackageFirst),
            other => Err(format!("unknown version policy '{other}'")),
        }
    }
}
