//! # actorlink peer
//!
//! Contracts for talking to other actors.
//!
//! ## Overview
//!
//! The core never speaks a wire protocol. It calls a [`PeerTransport`] to
//! reach a peer's base URI, and exposes itself to inbound calls through
//! [`PeerEndpoint`]. Every outbound call is wrapped in [`bounded`] so a slow
//! peer surfaces as [`PeerError::Timeout`] instead of hanging the caller.
//!
//! ## Message Flow
//!
//! ```text
//! Initiator                              Recipient
//!   |-------- TrustRequest -------------->|  creates pending record
//!   |<------- TrustRequestAck ------------|
//!   |                                     |  (operator approves)
//!   |<------- ApprovalNotice -------------|
//!   |-------- fetch_capabilities -------->|
//!   |<------- PeerCapabilities -----------|
//!   |                                     |
//!   |<------- DiffNotice -----------------|  pushed per subscription
//! ```
//!
//! ## Testing
//!
//! [`MemoryPeerNetwork`] routes calls by base URI to registered endpoints
//! and can simulate unreachable or slow peers. [`MemoryClientRegistry`]
//! stands in for an OAuth2 issuer.

pub mod error;
pub mod messages;
pub mod oauth;
pub mod transport;

pub use error::{PeerError, RegistryError, Result};
pub use messages::{
    features, limits, ApprovalNotice, DiffNotice, DiffNoticeBody, PeerCapabilities, TrustRequest,
    TrustRequestAck, PROTOCOL_VERSION,
};
pub use oauth::{memory::MemoryClientRegistry, OAuth2ClientRegistry};
pub use transport::{bounded, memory::MemoryPeerNetwork, PeerEndpoint, PeerTransport};
