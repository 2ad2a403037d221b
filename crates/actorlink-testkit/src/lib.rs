//! # actorlink testkit
//!
//! Testing utilities for actorlink.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: actors on an in-memory peer network, wired up in one call
//! - **Recording sink**: an [`EventSink`](actorlink::EventSink) that keeps
//!   every protocol event for assertions
//! - **Generators**: Proptest strategies for ids, requests, and rule sets
//!
//! ## Test Fixtures
//!
//! ```rust
//! use actorlink_testkit::fixtures::TestNetwork;
//! use actorlink::ProtocolConfig;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let net = TestNetwork::new();
//! let alice = net.spawn("alice", ProtocolConfig::default()).await.unwrap();
//! let bob = net.spawn("bob", ProtocolConfig::default()).await.unwrap();
//! net.befriend(&alice, &bob, "friend").await.unwrap();
//! # });
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use actorlink_testkit::generators::peer_id;
//!
//! proptest! {
//!     #[test]
//!     fn encoding_is_reversible(peer in peer_id()) {
//!         prop_assert_eq!(PeerId::parse(&peer.encode()).unwrap(), peer);
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{init_tracing, RecordingSink, TestActor, TestNetwork};
