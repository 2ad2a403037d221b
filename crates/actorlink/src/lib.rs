//! # actorlink
//!
//! The control plane of a peer-to-peer actor protocol: mutual trust,
//! bearer-secret authentication, subscriptions, and ordered diff feeds.
//!
//! ## Overview
//!
//! An [`Actor`] is one network-addressable participant. It provides:
//!
//! - **Trust**: dual-approved relationships with other actors, each carrying
//!   a bearer secret both sides present on every call
//! - **Subscriptions**: peers register interest in this actor's data and
//!   receive an ordered, resumable feed of diffs
//! - **Suspensions**: diff registration can be paused per key; resuming
//!   issues a resync marker to every affected subscription
//! - **Permissions**: every peer operation is checked against the
//!   relationship type's rules and per-relationship overrides
//!
//! ## Key Concepts
//!
//! - **Fully approved**: both sides approved. Nothing beyond reading the
//!   relationship is allowed before that.
//! - **Sequence**: per-subscription, strictly increasing from 1, never
//!   reused after entries are acknowledged.
//! - **Fail-closed**: a path no rule matches is denied.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use actorlink::{Actor, ActorIdentity, ProtocolConfig};
//! use actorlink::core::ActorId;
//! use actorlink::peer::{MemoryPeerNetwork, PeerTransport};
//! use actorlink::store::SqliteStore;
//!
//! async fn example() -> actorlink::Result<()> {
//!     let identity = ActorIdentity::new(ActorId::new("alice")?, "https://alice.example/a")?;
//!     let store = SqliteStore::open("alice.db")?;
//!     let network: Arc<dyn PeerTransport> = MemoryPeerNetwork::new();
//!
//!     let alice = Actor::new(identity, store, network, ProtocolConfig::default());
//!
//!     // Ask another actor for a friend relationship
//!     let trust = alice
//!         .initiate_trust("https://bob.example/b", "friend", "hi bob")
//!         .await?;
//!     assert!(trust.approved);
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! This crate re-exports the component crates for convenience:
//!
//! - `actorlink::core` - Data model (PeerId, TrustRelationship, etc.)
//! - `actorlink::perms` - Permission rules and evaluator
//! - `actorlink::store` - Storage abstraction, memory and SQLite backends
//! - `actorlink::peer` - Peer transport contracts and messages

mod actor;
pub mod config;
mod endpoint;
pub mod error;
pub mod events;
mod feed;
mod locks;
mod permissions;
mod suspension;
mod trust;

// Re-export component crates
pub use actorlink_core as core;
pub use actorlink_peer as peer;
pub use actorlink_perms as perms;
pub use actorlink_store as store;

// Re-export main types for convenience
pub use actor::Actor;
pub use config::{ActorIdentity, DuplicateTrustPolicy, ProtocolConfig};
pub use error::{ProtocolError, Result};
pub use events::{ApprovalOrigin, EventSink, ProtocolEvent, TracingSink};
pub use feed::{CallbackFailure, CallbackReport, RegisteredDiff};

// Re-export commonly used types
pub use actorlink_core::{
    ActorId, BearerSecret, DiffBody, Granularity, PeerId, Subscription, SubscriptionDiff,
    SubscriptionId, SubscriptionRequest, SuspensionKey, TrustPatch, TrustRelationship,
};
pub use actorlink_perms::{Decision, Operation, PolicyConfig, RuleSet};
