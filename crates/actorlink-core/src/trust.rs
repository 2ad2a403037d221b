//! Trust relationships between an actor and its peers.
//!
//! A relationship is approved independently on each side. The local side
//! owns `approved`; `peer_approved` is the last value the peer reported.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::{ActorId, PeerId};
use crate::secret::BearerSecret;

/// How a relationship was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMethod {
    /// Actor-to-actor trust handshake.
    Trust,
    /// OAuth2 authorization of a client.
    #[serde(alias = "oauth2")]
    OAuth,
    /// Created as a side effect of a subscription request.
    Subscription,
    /// MCP client connection.
    Mcp,
}

impl ConnectionMethod {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionMethod::Trust => "trust",
            ConnectionMethod::OAuth => "oauth",
            ConnectionMethod::Subscription => "subscription",
            ConnectionMethod::Mcp => "mcp",
        }
    }
}

impl FromStr for ConnectionMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trust" => Ok(ConnectionMethod::Trust),
            "oauth" | "oauth2" => Ok(ConnectionMethod::OAuth),
            "subscription" => Ok(ConnectionMethod::Subscription),
            "mcp" => Ok(ConnectionMethod::Mcp),
            other => Err(CoreError::UnknownConnectionMethod(other.to_string())),
        }
    }
}

impl fmt::Display for ConnectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The peer's self-described protocol capabilities, as last fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitySnapshot {
    /// Protocol version the peer reported.
    pub peer_protocol_version: Option<String>,
    /// Feature tags the peer reported.
    pub peer_supported_features: BTreeSet<String>,
    /// When the snapshot was taken (Unix ms). `None` if never fetched.
    pub capabilities_fetched_at: Option<i64>,
}

impl CapabilitySnapshot {
    /// Whether the snapshot is older than `max_age_ms` (or was never taken).
    pub fn is_stale(&self, now: i64, max_age_ms: i64) -> bool {
        match self.capabilities_fetched_at {
            Some(at) => now.saturating_sub(at) > max_age_ms,
            None => true,
        }
    }

    /// Whether the peer advertised `feature`.
    pub fn supports(&self, feature: &str) -> bool {
        self.peer_supported_features.contains(feature)
    }
}

/// Approval state of a relationship, viewed from one side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalState {
    /// At least one side has not approved yet.
    Pending { approved: bool, peer_approved: bool },
    /// Both sides approved.
    FullyApproved,
}

/// A trust relationship record, keyed by `(actor_id, peer_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustRelationship {
    pub actor_id: ActorId,
    pub peer_id: PeerId,
    /// Relationship type, e.g. `friend`, `admin`, `mcp_client`.
    pub relationship_type: String,
    /// Bearer secret shared by both sides.
    pub secret: BearerSecret,
    /// The peer's network root.
    pub base_uri: String,
    pub connection_method: ConnectionMethod,
    /// Local-side approval.
    pub approved: bool,
    /// Last-known remote-side approval.
    pub peer_approved: bool,
    pub verified: bool,
    pub verification_token: Option<String>,
    pub description: String,
    /// Unix ms.
    pub created_at: i64,
    /// Unix ms of the last bearer-authenticated access.
    pub last_accessed_at: Option<i64>,
    #[serde(default)]
    pub capabilities: CapabilitySnapshot,
}

impl TrustRelationship {
    /// Whether both sides approved.
    pub fn is_fully_approved(&self) -> bool {
        self.approved && self.peer_approved
    }

    /// Current approval state.
    pub fn approval_state(&self) -> ApprovalState {
        if self.is_fully_approved() {
            ApprovalState::FullyApproved
        } else {
            ApprovalState::Pending {
                approved: self.approved,
                peer_approved: self.peer_approved,
            }
        }
    }
}

/// Mutable fields of a trust relationship.
///
/// `relationship_type` and `secret` exist so that callers attempting to
/// change them can be rejected explicitly rather than silently ignored.
#[derive(Debug, Clone, Default)]
pub struct TrustPatch {
    pub description: Option<String>,
    pub base_uri: Option<String>,
    pub capabilities: Option<CapabilitySnapshot>,
    pub relationship_type: Option<String>,
    pub secret: Option<BearerSecret>,
}

impl TrustPatch {
    /// Create an empty patch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a new description.
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Set a new base uri.
    pub fn base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    /// Replace the capability snapshot.
    pub fn capabilities(mut self, capabilities: CapabilitySnapshot) -> Self {
        self.capabilities = Some(capabilities);
        self
    }

    /// Name of the first immutable field this patch tries to change.
    pub fn immutable_field(&self) -> Option<&'static str> {
        if self.relationship_type.is_some() {
            Some("relationship_type")
        } else if self.secret.is_some() {
            Some("secret")
        } else {
            None
        }
    }

    /// Apply the mutable fields to a record. Returns whether anything changed.
    pub fn apply_to(&self, trust: &mut TrustRelationship) -> bool {
        let mut changed = false;
        if let Some(description) = &self.description {
            changed |= trust.description != *description;
            trust.description = description.clone();
        }
        if let Some(base_uri) = &self.base_uri {
            changed |= trust.base_uri != *base_uri;
            trust.base_uri = base_uri.clone();
        }
        if let Some(capabilities) = &self.capabilities {
            changed |= trust.capabilities != *capabilities;
            trust.capabilities = capabilities.clone();
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TrustRelationship {
        TrustRelationship {
            actor_id: ActorId::new("a").unwrap(),
            peer_id: PeerId::simple("b"),
            relationship_type: "friend".into(),
            secret: BearerSecret::generate(),
            base_uri: "https://b.example/b".into(),
            connection_method: ConnectionMethod::Trust,
            approved: true,
            peer_approved: false,
            verified: true,
            verification_token: None,
            description: String::new(),
            created_at: 0,
            last_accessed_at: None,
            capabilities: CapabilitySnapshot::default(),
        }
    }

    #[test]
    fn test_fully_approved_requires_both_sides() {
        let mut trust = sample();
        assert_eq!(
            trust.approval_state(),
            ApprovalState::Pending {
                approved: true,
                peer_approved: false
            }
        );
        trust.peer_approved = true;
        assert!(trust.is_fully_approved());
        assert_eq!(trust.approval_state(), ApprovalState::FullyApproved);
    }

    #[test]
    fn test_connection_method_aliases() {
        assert_eq!("oauth2".parse::<ConnectionMethod>().unwrap(), ConnectionMethod::OAuth);
        assert_eq!("MCP".parse::<ConnectionMethod>().unwrap(), ConnectionMethod::Mcp);
        assert!("carrier-pigeon".parse::<ConnectionMethod>().is_err());
    }

    #[test]
    fn test_patch_reports_immutable_fields() {
        let patch = TrustPatch::new().description("x");
        assert_eq!(patch.immutable_field(), None);

        let patch = TrustPatch {
            relationship_type: Some("admin".into()),
            ..TrustPatch::default()
        };
        assert_eq!(patch.immutable_field(), Some("relationship_type"));
    }

    #[test]
    fn test_patch_apply_detects_change() {
        let mut trust = sample();
        assert!(!TrustPatch::new().apply_to(&mut trust));
        assert!(TrustPatch::new().description("hello").apply_to(&mut trust));
        assert_eq!(trust.description, "hello");
        assert!(!TrustPatch::new().description("hello").apply_to(&mut trust));
    }

    #[test]
    fn test_capability_staleness() {
        let mut caps = CapabilitySnapshot::default();
        assert!(caps.is_stale(1_000, 500));
        caps.capabilities_fetched_at = Some(800);
        assert!(!caps.is_stale(1_000, 500));
        assert!(caps.is_stale(1_400, 500));
    }
}
