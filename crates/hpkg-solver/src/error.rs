//! Solver error types.

use std::path::PathBuf;
use std::time::Duration;

use hpkg_repo::RepoError;
use hpkg_spec::SpecError;
use hpkg_version::VersionError;

use crate::failure::ResolutionFailure;

/// Problems in the solver configuration file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
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

    /// Every problem found while validating the configuration.
    #[error("invalid configuration:\n  {}", problems.join("\n  "))]
    Invalid { problems: Vec<String> },
}

/// Errors that end a solve.
#[derive(Debug, thiserror::Error)]
pub enum SolveError {
    /// The search finished without finding a valid assignment.
    #[error(transparent)]
    Unsatisfiable(ResolutionFailure),

    /// The step or time budget ran out before the search finished.
    #[error("resolution did not finish within {steps} steps ({elapsed:?})")]
    Timeout { steps: usize, elapsed: Duration },

    /// A requested name is neither a package nor a provided virtual.
    #[error("unknown package: {name}")]
    UnknownPackage { name: String },

    /// A request the solver cannot act on, such as an anonymous root.
    #[error("invalid request '{spec}': {detail}")]
    InvalidRequest { spec: String, detail: String },

    /// A worker thread solving one root panicked.
    #[error("solver thread for '{0}' panicked")]
    WorkerPanicked(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Spec(#[from] SpecError),

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("store error at {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl SolveError {
    pub(crate) fn store(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        SolveError::Store {
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for solver operations.
pub type Result<T> = std::result::Result<T, SolveError>;
