//! Error types for the actorlink core.

use thiserror::Error;

/// Errors raised while parsing or decoding core values.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("invalid peer id: {0}")]
    InvalidPeerId(String),

    #[error("invalid actor id: {0}")]
    InvalidActorId(String),

    #[error("unknown connection method: {0}")]
    UnknownConnectionMethod(String),

    #[error("unknown granularity: {0}")]
    UnknownGranularity(String),

    #[error("decoding error: {0}")]
    DecodingError(String),
}

/// Validation errors for caller-supplied protocol fields.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("target must not be empty")]
    EmptyTarget,

    #[error("{field} contains reserved character {ch:?}")]
    ReservedCharacter { field: &'static str, ch: char },

    #[error("relationship type {0:?} is invalid")]
    InvalidRelationshipType(String),

    #[error("base uri {0:?} is not an http(s) uri")]
    InvalidBaseUri(String),

    #[error("description exceeds {max} bytes (got {got})")]
    DescriptionTooLong { max: usize, got: usize },

    #[error("{0}")]
    Core(#[from] CoreError),
}
