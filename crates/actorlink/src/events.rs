//! Protocol events.
//!
//! The actor reports lifecycle transitions to an [`EventSink`]. Each
//! transition is reported exactly once, after the state change is stored.

use actorlink_core::{ActorId, PeerId, SubscriptionId, SuspensionKey};
use actorlink_peer::DiffNotice;

/// Which side's approval completed a relationship.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalOrigin {
    /// The local operator approved last.
    Local,
    /// The peer's approval notice arrived last.
    Remote,
}

/// A protocol state transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolEvent {
    /// A peer asked to establish trust.
    TrustRequested {
        actor_id: ActorId,
        peer_id: PeerId,
        relationship_type: String,
    },

    /// A relationship became fully approved.
    TrustFullyApproved {
        actor_id: ActorId,
        peer_id: PeerId,
        origin: ApprovalOrigin,
    },

    /// A relationship was deleted.
    TrustDeleted { actor_id: ActorId, peer_id: PeerId },

    /// A resync marker was appended after a resume.
    ResyncIssued {
        actor_id: ActorId,
        subscription_id: SubscriptionId,
        key: SuspensionKey,
        sequence: u64,
    },

    /// A trusted peer pushed a diff to this actor.
    DiffReceived {
        actor_id: ActorId,
        peer_id: PeerId,
        notice: DiffNotice,
    },
}

/// Receives protocol events.
///
/// Called inline by the actor, so implementations must not block.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ProtocolEvent);
}

/// Logs every event through `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl EventSink for TracingSink {
    fn emit(&self, event: ProtocolEvent) {
        match &event {
            ProtocolEvent::TrustRequested {
                actor_id,
                peer_id,
                relationship_type,
            } => tracing::info!(
                actor = %actor_id,
                peer = %peer_id,
                relationship = %relationship_type,
                "trust requested"
            ),
            ProtocolEvent::TrustFullyApproved {
                actor_id,
                peer_id,
                origin,
            } => tracing::info!(
                actor = %actor_id,
                peer = %peer_id,
                ?origin,
                "trust fully approved"
            ),
            ProtocolEvent::TrustDeleted { actor_id, peer_id } => {
                tracing::info!(actor = %actor_id, peer = %peer_id, "trust deleted")
            }
            ProtocolEvent::ResyncIssued {
                actor_id,
                subscription_id,
                key,
                sequence,
            } => tracing::info!(
                actor = %actor_id,
                subscription = %subscription_id,
                key = %key,
                sequence,
                "resync issued"
            ),
            ProtocolEvent::DiffReceived {
                actor_id,
                peer_id,
                notice,
            } => tracing::debug!(
                actor = %actor_id,
                peer = %peer_id,
                subscription = %notice.subscription_id,
                sequence = notice.sequence,
                "diff received"
            ),
        }
    }
}
