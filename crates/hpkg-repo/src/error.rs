//! Repository error types.

use std::path::PathBuf;

use hpkg_spec::SpecError;
use hpkg_version::VersionError;

/// Errors that can occur while reading package definitions.
#[derive(Debug, thiserror::Error)]
pub enum RepoError {
    /// No package or virtual of this name exists.
    #[error("unknown package: {name}")]
    UnknownPackage { name: String },

    /// A package definition is malformed.
    #[error("invalid definition for package '{name}': {detail}")]
    InvalidDefinition { name: String, detail: String },

    /// Reading the repository directory failed.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error in {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Version(#[from] VersionError),
}

impl RepoError {
    pub(crate) fn invalid(name: &str, detail: impl Into<String>) -> Self {
        RepoError::InvalidDefinition {
            name: name.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn unknown(name: &str) -> Self {
        RepoError::UnknownPackage { name: name.to_string() }
    }
}

/// Result type alias for repository operations.
pub type Result<T> = std::result::Result<T, RepoError>;
