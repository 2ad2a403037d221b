//! Error types for the permissions module.

use thiserror::Error;

/// Errors that can occur while building or loading permission policy.
#[derive(Debug, Error)]
pub enum PermsError {
    /// A path pattern could not be parsed.
    #[error("invalid path pattern {pattern:?}: {reason}")]
    InvalidPattern {
        pattern: String,
        reason: &'static str,
    },

    /// An operation name was not recognized.
    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    /// Policy configuration could not be decoded.
    #[error("policy configuration error: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for permission operations.
pub type Result<T> = std::result::Result<T, PermsError>;
