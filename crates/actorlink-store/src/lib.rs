//! # actorlink store
//!
//! Storage contract for actorlink protocol state. Provides a trait-based
//! interface with SQLite and in-memory implementations.
//!
//! ## Overview
//!
//! The store module abstracts persistence behind the [`Store`] trait,
//! allowing the protocol layer to be storage-agnostic. The primary
//! implementation is [`SqliteStore`], with [`MemoryStore`] for testing.
//!
//! ## Key Types
//!
//! - [`Store`] - The async trait for all storage operations
//! - [`SqliteStore`] - SQLite-based persistent storage
//! - [`MemoryStore`] - In-memory storage for tests
//! - [`InsertResult`] - Result of inserting a keyed record
//!
//! ## Usage
//!
//! ```rust,no_run
//! use actorlink_core::{ActorId, DiffBody, Granularity, PeerId, Subscription, SubscriptionRequest};
//! use actorlink_store::{SqliteStore, Store};
//!
//! async fn example() -> actorlink_store::Result<()> {
//!     let store = SqliteStore::open("actorlink.db")?;
//!
//!     let actor = ActorId::new("a1").unwrap();
//!     let request = SubscriptionRequest::new("properties", Granularity::High);
//!     let sub = Subscription::from_request(actor.clone(), PeerId::simple("b2"), &request, 0);
//!     store.insert_subscription(&sub).await?;
//!
//!     let diff = store.append_diff(&actor, &sub.subscription_id, &DiffBody::Resync, 0).await?;
//!     assert_eq!(diff.sequence, 1);
//!     Ok(())
//! }
//! ```
//!
//! ## Design Notes
//!
//! - **Secret index**: a secret identifies at most one relationship per actor
//! - **Atomic sequencing**: diff sequence numbers are assigned inside the store
//! - **Caller-ordered cascades**: deleting a trust leaves its subscriptions to the caller

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::{InsertResult, Store};
