//! Error types for the peer module.

use std::time::Duration;

use thiserror::Error;

/// Errors a peer call can produce.
#[derive(Debug, Error)]
pub enum PeerError {
    /// The peer could not be reached at all.
    #[error("peer unreachable: {0}")]
    Unreachable(String),

    /// The peer did not answer in time.
    #[error("peer did not answer within {0:?}")]
    Timeout(Duration),

    /// The peer answered and refused.
    #[error("peer rejected the request: {0}")]
    Rejected(String),

    /// The peer answered with something malformed.
    #[error("invalid response from peer: {0}")]
    InvalidResponse(String),
}

impl PeerError {
    /// Whether the failure says nothing about the peer's intent.
    pub fn is_transient(&self) -> bool {
        matches!(self, PeerError::Unreachable(_) | PeerError::Timeout(_))
    }
}

/// Errors from an OAuth2 client registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry could not be reached.
    #[error("client registry unavailable: {0}")]
    Unavailable(String),

    /// The registry refused to revoke the client.
    #[error("client registry refused: {0}")]
    Refused(String),
}

/// Result type for peer operations.
pub type Result<T> = std::result::Result<T, PeerError>;
