//! Error types for protocol operations.

use actorlink_core::{CoreError, PeerId, SubscriptionId, ValidationError};
use actorlink_peer::{PeerError, RegistryError};
use actorlink_perms::PermsError;
use actorlink_store::StoreError;
use thiserror::Error;

/// Errors that can occur during protocol operations.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// No trust relationship exists with the peer.
    #[error("no trust relationship with {0}")]
    NoSuchTrust(PeerId),

    /// The subscription does not exist for this subscriber.
    #[error("no subscription {0}")]
    NoSuchSubscription(SubscriptionId),

    /// The relationship or policy does not allow the operation.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A relationship with the peer already exists.
    #[error("trust relationship with {0} already exists")]
    DuplicateTrust(String),

    /// The peer could not be reached or did not answer in time.
    #[error("peer unreachable: {0}")]
    PeerUnreachable(PeerError),

    /// The peer answered and refused, or answered with garbage.
    #[error("peer rejected: {0}")]
    PeerRejected(PeerError),

    /// The presented bearer secret matches no relationship.
    #[error("invalid secret")]
    InvalidSecret,

    /// A patch tried to change a field fixed at creation.
    #[error("field {0} cannot be modified")]
    ImmutableField(&'static str),

    /// Caller-supplied data failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The OAuth2 client registry refused or failed a revocation.
    #[error("client registry error: {0}")]
    ClientRegistry(#[from] RegistryError),

    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Policy configuration error.
    #[error("permission error: {0}")]
    Permission(#[from] PermsError),

    /// Malformed configuration document.
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

impl From<PeerError> for ProtocolError {
    fn from(err: PeerError) -> Self {
        if err.is_transient() {
            ProtocolError::PeerUnreachable(err)
        } else {
            ProtocolError::PeerRejected(err)
        }
    }
}

impl From<CoreError> for ProtocolError {
    fn from(err: CoreError) -> Self {
        ProtocolError::Validation(err.into())
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_peer_error_mapping() {
        let err: ProtocolError = PeerError::Timeout(Duration::from_secs(1)).into();
        assert!(matches!(err, ProtocolError::PeerUnreachable(_)));

        let err: ProtocolError = PeerError::Unreachable("refused".into()).into();
        assert!(matches!(err, ProtocolError::PeerUnreachable(_)));

        let err: ProtocolError = PeerError::Rejected("no".into()).into();
        assert!(matches!(err, ProtocolError::PeerRejected(_)));

        let err: ProtocolError = PeerError::InvalidResponse("garbage".into()).into();
        assert!(matches!(err, ProtocolError::PeerRejected(_)));
    }
}
