//! The Actor: one protocol participant.
//!
//! An [`Actor`] owns the local side of every trust relationship, the
//! subscriptions peers hold on its data, and its suspension keys. Operations
//! are split by concern across `trust`, `feed`, `suspension`, and
//! `permissions`; inbound peer calls arrive through the
//! [`PeerEndpoint`](actorlink_peer::PeerEndpoint) impl in `endpoint`.

use std::future::Future;
use std::sync::Arc;

use actorlink_core::{ActorId, PeerId, SuspensionKey};
use actorlink_peer::{bounded, OAuth2ClientRegistry, PeerTransport};
use actorlink_perms::PermissionEvaluator;
use actorlink_store::Store;

use crate::config::{ActorIdentity, ProtocolConfig};
use crate::error::Result;
use crate::events::{EventSink, ProtocolEvent, TracingSink};
use crate::locks::KeyedLocks;

/// A protocol participant bound to a store and a transport.
///
/// Provides a unified API for:
/// - Establishing, approving, and revoking trust with peers
/// - Managing subscriptions and their ordered diff feeds
/// - Suspending and resuming diff registration
/// - Evaluating peer permissions
pub struct Actor<S: Store> {
    /// Who this actor is.
    pub(crate) identity: ActorIdentity,
    /// The storage backend.
    pub(crate) store: Arc<S>,
    /// Outbound calls to peers.
    pub(crate) transport: Arc<dyn PeerTransport>,
    /// Revokes OAuth2 client credentials on delete, if configured.
    pub(crate) clients: Option<Arc<dyn OAuth2ClientRegistry>>,
    pub(crate) evaluator: PermissionEvaluator,
    pub(crate) config: ProtocolConfig,
    pub(crate) events: Arc<dyn EventSink>,
    pub(crate) trust_locks: KeyedLocks<PeerId>,
    pub(crate) suspension_locks: KeyedLocks<SuspensionKey>,
}

impl<S: Store> Actor<S> {
    /// Create a new actor.
    ///
    /// Events go to a [`TracingSink`] until replaced with
    /// [`with_event_sink`](Self::with_event_sink).
    pub fn new(
        identity: ActorIdentity,
        store: S,
        transport: Arc<dyn PeerTransport>,
        config: ProtocolConfig,
    ) -> Self {
        Self::with_shared_store(identity, Arc::new(store), transport, config)
    }

    /// Create an actor over a store shared with other actors.
    pub fn with_shared_store(
        identity: ActorIdentity,
        store: Arc<S>,
        transport: Arc<dyn PeerTransport>,
        config: ProtocolConfig,
    ) -> Self {
        Self {
            evaluator: PermissionEvaluator::new(config.policy.clone()),
            identity,
            store,
            transport,
            clients: None,
            config,
            events: Arc::new(TracingSink),
            trust_locks: KeyedLocks::new(),
            suspension_locks: KeyedLocks::new(),
        }
    }

    /// Send events to `sink`.
    pub fn with_event_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.events = sink;
        self
    }

    /// Revoke OAuth2 client credentials through `registry` on delete.
    pub fn with_client_registry(mut self, registry: Arc<dyn OAuth2ClientRegistry>) -> Self {
        self.clients = Some(registry);
        self
    }

    /// The local actor id.
    pub fn id(&self) -> &ActorId {
        &self.identity.actor_id
    }

    /// Where peers reach this actor.
    pub fn base_uri(&self) -> &str {
        &self.identity.base_uri
    }

    /// Get the store reference.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the configuration.
    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Get the permission evaluator.
    pub fn evaluator(&self) -> &PermissionEvaluator {
        &self.evaluator
    }

    pub(crate) fn emit(&self, event: ProtocolEvent) {
        self.events.emit(event);
    }

    /// Run a transport call under the configured deadline.
    pub(crate) async fn call_peer<T, F>(&self, call: F) -> Result<T>
    where
        F: Future<Output = actorlink_peer::Result<T>>,
    {
        Ok(bounded(self.config.peer_timeout, call).await?)
    }
}
