//! Peer protocol message types.
//!
//! These are the payloads exchanged between actors. The physical encoding
//! belongs to the transport; every message derives serde so adapters can
//! pick one.

use std::collections::BTreeSet;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use actorlink_core::{ActorId, BearerSecret, Granularity, SubscriptionId};

/// Protocol version this implementation speaks.
pub const PROTOCOL_VERSION: &str = "1.0";

/// Feature tags advertised in capability exchange.
pub mod features {
    use std::collections::BTreeSet;

    /// Dual-approval trust handshake.
    pub const TRUST: &str = "trust";
    /// Subscriptions with ordered diff feeds.
    pub const SUBSCRIPTIONS: &str = "subscriptions";
    /// Resync markers after suspension.
    pub const SUBSCRIPTION_RESYNC: &str = "subscription-resync";
    /// Pushed diff callbacks.
    pub const CALLBACKS: &str = "callbacks";
    /// Per-trust permission overrides.
    pub const PERMISSIONS: &str = "permissions";

    /// Every feature this implementation supports.
    pub fn all() -> BTreeSet<String> {
        [TRUST, SUBSCRIPTIONS, SUBSCRIPTION_RESYNC, CALLBACKS, PERMISSIONS]
            .into_iter()
            .map(str::to_string)
            .collect()
    }
}

/// Message size limits.
pub mod limits {
    /// Max feature tags in a capability response.
    pub const MAX_FEATURES: usize = 64;
    /// Max length of one feature tag.
    pub const MAX_FEATURE_LEN: usize = 64;
    /// Max length of a protocol version string.
    pub const MAX_VERSION_LEN: usize = 32;
    /// Max payload carried by one pushed diff.
    pub const MAX_DIFF_PAYLOAD: usize = 1024 * 1024;
}

/// Sent by the initiator to open a trust relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRequest {
    /// The initiating actor.
    pub from_actor: ActorId,

    /// Where the initiator can be reached.
    pub base_uri: String,

    /// Requested relationship type.
    pub relationship_type: String,

    /// Bearer secret both sides will use for this relationship.
    pub secret: BearerSecret,

    /// Token the recipient may echo back to verify the initiator.
    pub verification_token: String,

    /// Free-text description.
    #[serde(default)]
    pub description: String,
}

/// The recipient's answer to a [`TrustRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRequestAck {
    /// The recipient's actor id, which becomes the initiator's peer id.
    pub actor_id: ActorId,

    /// Whether the recipient approved immediately.
    pub approved: bool,
}

/// Tells a peer that the local side approved the relationship.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalNotice {
    /// The approving actor.
    pub from_actor: ActorId,
}

/// A peer's self-described capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCapabilities {
    pub protocol_version: String,
    pub supported_features: BTreeSet<String>,
}

impl PeerCapabilities {
    /// Capabilities of this implementation.
    pub fn current() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            supported_features: features::all(),
        }
    }

    /// Check that the response respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        if self.protocol_version.len() > limits::MAX_VERSION_LEN {
            return Err("protocol version too long");
        }
        if self.supported_features.len() > limits::MAX_FEATURES {
            return Err("too many features");
        }
        if self
            .supported_features
            .iter()
            .any(|f| f.is_empty() || f.len() > limits::MAX_FEATURE_LEN)
        {
            return Err("malformed feature tag");
        }
        Ok(())
    }
}

/// Content of a pushed diff.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffNoticeBody {
    /// The change itself (`low` and `high` granularity).
    Payload(Bytes),
    /// Something changed; fetch it (`none` granularity).
    Trigger,
    /// Changes were dropped while suspended; refetch full state.
    Resync,
}

/// A diff pushed from the data owner to a subscriber.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffNotice {
    /// The data owner.
    pub from_actor: ActorId,

    pub subscription_id: SubscriptionId,

    pub sequence: u64,

    pub target: String,

    #[serde(default)]
    pub subtarget: String,

    #[serde(default)]
    pub resource: String,

    pub granularity: Granularity,

    pub body: DiffNoticeBody,
}

impl DiffNotice {
    /// Check that the notice respects size limits.
    pub fn validate_limits(&self) -> Result<(), &'static str> {
        if let DiffNoticeBody::Payload(payload) = &self.body {
            if payload.len() > limits::MAX_DIFF_PAYLOAD {
                return Err("diff payload too large");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_current_capabilities_within_limits() {
        let caps = PeerCapabilities::current();
        assert_eq!(caps.protocol_version, PROTOCOL_VERSION);
        assert!(caps.supported_features.contains(features::SUBSCRIPTION_RESYNC));
        assert!(caps.validate_limits().is_ok());
    }

    #[test]
    fn test_capability_limits_exceeded() {
        let caps = PeerCapabilities {
            protocol_version: "1.0".into(),
            supported_features: (0..=limits::MAX_FEATURES).map(|i| format!("f{i}")).collect(),
        };
        assert!(caps.validate_limits().is_err());

        let caps = PeerCapabilities {
            protocol_version: "1.0".into(),
            supported_features: [String::new()].into_iter().collect(),
        };
        assert!(caps.validate_limits().is_err());
    }

    #[test]
    fn test_diff_payload_limit() {
        let notice = |body| DiffNotice {
            from_actor: ActorId::new("a").unwrap(),
            subscription_id: SubscriptionId::from_string("s"),
            sequence: 1,
            target: "properties".into(),
            subtarget: String::new(),
            resource: String::new(),
            granularity: Granularity::High,
            body,
        };
        assert!(notice(DiffNoticeBody::Trigger).validate_limits().is_ok());
        let big = Bytes::from(vec![0u8; limits::MAX_DIFF_PAYLOAD + 1]);
        assert!(notice(DiffNoticeBody::Payload(big)).validate_limits().is_err());
    }
}
