//! Actor configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use actorlink_core::{validate_base_uri, ActorId};
use actorlink_peer::{features, PeerCapabilities, PROTOCOL_VERSION};
use actorlink_perms::PolicyConfig;

use crate::error::Result;

/// What to do when a trust request names a peer that is already trusted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicateTrustPolicy {
    /// Fail with `DuplicateTrust`.
    #[default]
    Reject,
    /// Replace the record and its secret in one store update.
    Rotate,
}

/// Configuration for an [`Actor`](crate::Actor).
///
/// Durations are written in milliseconds in the JSON form:
///
/// ```json
/// { "peer_timeout_ms": 5000, "auto_approve": ["mcp_client"] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Deadline for every outbound peer call.
    #[serde(rename = "peer_timeout_ms", with = "duration_ms")]
    pub peer_timeout: Duration,

    pub duplicate_trust: DuplicateTrustPolicy,

    /// Capability snapshots older than this are stale.
    #[serde(rename = "capability_max_age_ms", with = "duration_ms")]
    pub capability_max_age: Duration,

    /// Relationship types approved on receipt of the request.
    pub auto_approve: BTreeSet<String>,

    /// Version advertised to peers.
    pub protocol_version: String,

    /// Features advertised to peers.
    pub supported_features: BTreeSet<String>,

    /// Default rules per relationship type.
    pub policy: PolicyConfig,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            peer_timeout: Duration::from_secs(20),
            duplicate_trust: DuplicateTrustPolicy::Reject,
            capability_max_age: Duration::from_secs(60 * 60),
            auto_approve: BTreeSet::new(),
            protocol_version: PROTOCOL_VERSION.to_string(),
            supported_features: features::all(),
            policy: PolicyConfig::default(),
        }
    }
}

impl ProtocolConfig {
    /// Parse a config from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Set the peer call deadline.
    pub fn with_peer_timeout(mut self, timeout: Duration) -> Self {
        self.peer_timeout = timeout;
        self
    }

    /// Set the duplicate trust policy.
    pub fn with_duplicate_trust(mut self, policy: DuplicateTrustPolicy) -> Self {
        self.duplicate_trust = policy;
        self
    }

    /// Set the capability staleness bound.
    pub fn with_capability_max_age(mut self, max_age: Duration) -> Self {
        self.capability_max_age = max_age;
        self
    }

    /// Approve requests of this relationship type without operator action.
    pub fn with_auto_approve(mut self, relationship_type: impl Into<String>) -> Self {
        self.auto_approve.insert(relationship_type.into());
        self
    }

    /// Replace the permission policy.
    pub fn with_policy(mut self, policy: PolicyConfig) -> Self {
        self.policy = policy;
        self
    }

    /// The capabilities this actor reports to peers.
    pub fn capabilities(&self) -> PeerCapabilities {
        PeerCapabilities {
            protocol_version: self.protocol_version.clone(),
            supported_features: self.supported_features.clone(),
        }
    }
}

/// Who the local actor is and where peers reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActorIdentity {
    pub actor_id: ActorId,
    pub base_uri: String,
}

impl ActorIdentity {
    /// Create an identity, validating the base uri.
    pub fn new(actor_id: ActorId, base_uri: impl Into<String>) -> Result<Self> {
        let base_uri = base_uri.into();
        validate_base_uri(&base_uri)?;
        Ok(Self { actor_id, base_uri })
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
