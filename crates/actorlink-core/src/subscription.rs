//! Subscriptions and the diffs registered against them.
//!
//! A subscription is owned by the actor whose data is being watched. Each
//! change that matches it becomes a `SubscriptionDiff` with the next
//! sequence number for that subscription.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;
use crate::ids::{ActorId, PeerId, SubscriptionId};

/// Delivery-detail level requested by the subscriber.
///
/// The diff feed creates an entry for every granularity. What the levels
/// change is how a consuming adapter presents the entry: `None` is a bare
/// trigger, `High` carries the full payload, and `Low` is left to the
/// adapter's rate policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    None,
    Low,
    High,
}

impl Granularity {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Granularity::None => "none",
            Granularity::Low => "low",
            Granularity::High => "high",
        }
    }

    /// Whether pushed notifications carry the payload.
    pub fn carries_payload(&self) -> bool {
        !matches!(self, Granularity::None)
    }
}

impl FromStr for Granularity {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Granularity::None),
            "low" => Ok(Granularity::Low),
            "high" => Ok(Granularity::High),
            other => Err(CoreError::UnknownGranularity(other.to_string())),
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a subscriber asks to watch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    pub target: String,
    /// Empty matches every subtarget under `target`.
    #[serde(default)]
    pub subtarget: String,
    /// Empty matches every resource.
    #[serde(default)]
    pub resource: String,
    pub granularity: Granularity,
    /// Push diffs to the subscriber as they are registered.
    #[serde(default)]
    pub callback: bool,
}

impl SubscriptionRequest {
    /// Watch a whole target with the given granularity.
    pub fn new(target: impl Into<String>, granularity: Granularity) -> Self {
        Self {
            target: target.into(),
            subtarget: String::new(),
            resource: String::new(),
            granularity,
            callback: false,
        }
    }

    /// Narrow to a subtarget.
    pub fn subtarget(mut self, subtarget: impl Into<String>) -> Self {
        self.subtarget = subtarget.into();
        self
    }

    /// Narrow to a resource.
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = resource.into();
        self
    }

    /// Request push delivery.
    pub fn with_callback(mut self) -> Self {
        self.callback = true;
        self
    }

    /// Path the permission evaluator sees for this request.
    pub fn resource_path(&self) -> String {
        resource_path(&self.target, &self.subtarget, &self.resource)
    }
}

/// Join non-empty components into a `/`-separated resource path.
pub fn resource_path(target: &str, subtarget: &str, resource: &str) -> String {
    let mut path = target.to_string();
    for part in [subtarget, resource] {
        if !part.is_empty() {
            path.push('/');
            path.push_str(part);
        }
    }
    path
}

/// A registered subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Owner of the watched data.
    pub actor_id: ActorId,
    /// The subscriber.
    pub peer_id: PeerId,
    pub subscription_id: SubscriptionId,
    pub target: String,
    pub subtarget: String,
    pub resource: String,
    pub granularity: Granularity,
    /// Last sequence number assigned. Starts at 0.
    pub sequence_counter: u64,
    pub callback: bool,
    /// Unix ms.
    pub created_at: i64,
}

impl Subscription {
    /// Build a new subscription from a request.
    pub fn from_request(
        actor_id: ActorId,
        peer_id: PeerId,
        request: &SubscriptionRequest,
        now: i64,
    ) -> Self {
        Self {
            actor_id,
            peer_id,
            subscription_id: SubscriptionId::generate(),
            target: request.target.clone(),
            subtarget: request.subtarget.clone(),
            resource: request.resource.clone(),
            granularity: request.granularity,
            sequence_counter: 0,
            callback: request.callback,
            created_at: now,
        }
    }

    /// Whether a change at `(target, subtarget, resource)` belongs to this
    /// subscription. Exact equality on the subscription's non-empty fields;
    /// its empty fields are wildcards.
    pub fn matches(&self, target: &str, subtarget: &str, resource: &str) -> bool {
        self.target == target
            && (self.subtarget.is_empty() || self.subtarget == subtarget)
            && (self.resource.is_empty() || self.resource == resource)
    }
}

/// Body of a diff entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DiffBody {
    /// An incremental change.
    Delta(Bytes),
    /// Suppressed changes were dropped; refetch full state.
    Resync,
}

impl DiffBody {
    /// Whether this entry is a resync marker.
    pub fn is_resync(&self) -> bool {
        matches!(self, DiffBody::Resync)
    }

    /// The payload, for delta entries.
    pub fn payload(&self) -> Option<&Bytes> {
        match self {
            DiffBody::Delta(payload) => Some(payload),
            DiffBody::Resync => None,
        }
    }
}

/// One sequenced entry of a subscription's feed. Immutable once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDiff {
    pub actor_id: ActorId,
    pub subscription_id: SubscriptionId,
    /// Strictly increasing from 1 per subscription.
    pub sequence: u64,
    pub body: DiffBody,
    /// Unix ms.
    pub created_at: i64,
}
