//! Version error types.

/// Errors produced while parsing, comparing or resolving versions.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VersionError {
    /// The input is not a legal version, range or list.
    #[error("invalid version '{input}': {detail}")]
    Format { input: String, detail: String },

    /// A range whose lower bound lies above its upper bound.
    #[error("invalid version range '{lo}:{hi}': lower bound exceeds upper bound")]
    EmptyRange { lo: String, hi: String },

    /// A git reference could not be resolved to a version.
    #[error("cannot resolve git reference '{reference}': {detail}")]
    Lookup { reference: String, detail: String },

    /// An unresolved git version took part in a comparison.
    #[error("git version '{reference}' must be resolved before it can be compared")]
    Unresolved { reference: String },
}

impl VersionError {
    pub(crate) fn format(input: &str, detail: impl Into<String>) -> Self {
        VersionError::Format {
            input: input.to_string(),
            detail: detail.into(),
        }
    }

    pub(crate) fn lookup(reference: &str, detail: impl Into<String>) -> Self {
        VersionError::Lookup {
            reference: reference.to_string(),
            detail: detail.into(),
        }
    }
}

/// Result type alias for version operations.
pub type Result<T> = std::result::Result<T, VersionError>;
