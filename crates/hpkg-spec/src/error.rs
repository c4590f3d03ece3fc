//! Error types for the spec data model.

use std::fmt;

use hpkg_version::VersionError;

/// The part of a spec a conflicting constraint applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ConstraintKind {
    Name,
    Version,
    Variant,
    Compiler,
    Architecture,
    Flags,
    Dependency,
}

impl fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ConstraintKind::Name => "name",
            ConstraintKind::Version => "version",
            ConstraintKind::Variant => "variant",
            ConstraintKind::Compiler => "compiler",
            ConstraintKind::Architecture => "architecture",
            ConstraintKind::Flags => "compiler flag",
            ConstraintKind::Dependency => "dependency",
        };
        f.write_str(label)
    }
}

/// Errors from the spec data model.
#[derive(Debug, thiserror::Error)]
pub enum SpecError {
    /// Spec syntax error.
    #[error("invalid spec '{input}': {detail}")]
    Parse { input: String, detail: String },

    /// Two constraints on the same attribute have no common solution.
    #[error("{kind} constraint '{required}' conflicts with '{provided}'")]
    Unsatisfiable {
        kind: ConstraintKind,
        provided: String,
        required: String,
    },

    /// A node would gain a second, different dependency of the same name.
    #[error("'{parent}' cannot depend on '{name}' twice")]
    DuplicateDependency { parent: String, name: String },

    #[error("node {0} not found")]
    NodeNotFound(usize),

    #[error("circular dependency detected involving '{0}'")]
    CircularDependency(String),

    #[error("invalid value for variant '{name}': {detail}")]
    InvalidVariant { name: String, detail: String },

    #[error("spec '{name}' is not concrete: {detail}")]
    NotConcrete { name: String, detail: String },

    #[error("malformed spec document: {0}")]
    Document(String),

    #[error("integrity check failed for '{name}': expected {expected}, got {actual}")]
    IntegrityFailed {
        name: String,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Version(#[from] VersionError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SpecError {
    pub(crate) fn parse(input: &str, detail: impl Into<String>) -> Self {
        SpecError::Parse {
            input: input.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn unsatisfiable(kind: ConstraintKind, provided: impl ToString, required: impl ToString) -> Self {
        SpecError::Unsatisfiable {
            kind,
            provided: provided.to_string(),
            required: required.to_string(),
        }
    }
}

/// Result type alias for spec operations.
pub type Result<T> = std::result::Result<T, SpecError>;
