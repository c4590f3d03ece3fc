//! Audit error types.

use hpkg_repo::RepoError;
use hpkg_solver::SolveError;

/// Errors that stop an audit from running. Problems found by the checks
/// themselves are reported as findings, not errors.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// A tag that is neither a check name nor a group.
    #[error("unknown audit check or group '{tag}'")]
    UnknownCheck { tag: String },

    #[error(transparent)]
    Repo(#[from] RepoError),

    #[error(transparent)]
    Solve(#[from] SolveError),
}

/// Result type alias for audit operations.
pub type Result<T> = std::result::Result<T, AuditError>;
