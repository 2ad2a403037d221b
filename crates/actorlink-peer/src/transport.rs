//! Transport abstraction for peer calls.
//!
//! [`PeerTransport`] is the outbound side: how an actor reaches another
//! actor's base URI. [`PeerEndpoint`] is the inbound side: what a transport
//! dispatches to when a request arrives. Implementations may use HTTP or any
//! other carrier; the core never sees the wire.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;

use actorlink_core::BearerSecret;

use crate::error::{PeerError, Result};
use crate::messages::{ApprovalNotice, DiffNotice, PeerCapabilities, TrustRequest, TrustRequestAck};

/// Outbound calls to a peer actor.
///
/// Calls made with a relationship's secret authenticate the caller to the
/// peer. Implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Deliver a trust request. The peer creates its reciprocal record
    /// before answering.
    async fn notify_trust_request(
        &self,
        peer_base_uri: &str,
        request: TrustRequest,
    ) -> Result<TrustRequestAck>;

    /// Tell the peer the local side approved.
    async fn notify_approval(
        &self,
        peer_base_uri: &str,
        secret: &BearerSecret,
        notice: ApprovalNotice,
    ) -> Result<()>;

    /// Ask the peer for its protocol version and features.
    async fn fetch_capabilities(
        &self,
        peer_base_uri: &str,
        secret: &BearerSecret,
    ) -> Result<PeerCapabilities>;

    /// Push a diff to a subscriber.
    async fn notify_diff(
        &self,
        peer_base_uri: &str,
        secret: &BearerSecret,
        notice: DiffNotice,
    ) -> Result<()>;
}

/// Inbound handler for peer calls.
///
/// Refusals are reported as [`PeerError::Rejected`].
#[async_trait]
pub trait PeerEndpoint: Send + Sync {
    /// Handle an incoming trust request.
    async fn on_trust_request(&self, request: TrustRequest) -> Result<TrustRequestAck>;

    /// Handle the peer's approval of an existing relationship.
    async fn on_approval(&self, secret: &BearerSecret, notice: ApprovalNotice) -> Result<()>;

    /// Report local capabilities to an authenticated peer.
    async fn capabilities(&self, secret: &BearerSecret) -> Result<PeerCapabilities>;

    /// Handle a diff pushed by a peer this actor subscribed to.
    async fn on_diff(&self, secret: &BearerSecret, notice: DiffNotice) -> Result<()>;
}

/// Run a peer call with a deadline.
///
/// Expiry yields [`PeerError::Timeout`]; the call's own error passes through.
pub async fn bounded<T, F>(timeout: Duration, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(PeerError::Timeout(timeout)),
    }
}

/// An in-memory peer network for testing.
///
/// Routes calls by base URI directly into registered endpoints, with
/// switches for simulating outages and slow peers.
pub mod memory {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::{Arc, Weak};
    use tokio::sync::RwLock;

    /// Shared routing table for in-memory peers.
    ///
    /// Endpoints are held weakly so that actors registered here can also
    /// hold the network without forming a cycle.
    #[derive(Default)]
    pub struct MemoryPeerNetwork {
        endpoints: RwLock<HashMap<String, Weak<dyn PeerEndpoint>>>,
        unreachable: RwLock<HashSet<String>>,
        latency: RwLock<HashMap<String, Duration>>,
    }

    impl MemoryPeerNetwork {
        /// Create a new memory network.
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        /// Route calls for `base_uri` to `endpoint`.
        pub async fn register(&self, base_uri: impl Into<String>, endpoint: &Arc<dyn PeerEndpoint>) {
            self.endpoints
                .write()
                .await
                .insert(base_uri.into(), Arc::downgrade(endpoint));
        }

        /// Stop routing calls for `base_uri`.
        pub async fn unregister(&self, base_uri: &str) {
            self.endpoints.write().await.remove(base_uri);
        }

        /// Make `base_uri` fail with [`PeerError::Unreachable`].
        pub async fn set_unreachable(&self, base_uri: &str, unreachable: bool) {
            let mut set = self.unreachable.write().await;
            if unreachable {
                set.insert(base_uri.to_string());
            } else {
                set.remove(base_uri);
            }
        }

        /// Delay every call to `base_uri` by `delay`.
        pub async fn set_latency(&self, base_uri: &str, delay: Duration) {
            self.latency
                .write()
                .await
                .insert(base_uri.to_string(), delay);
        }

        async fn route(&self, base_uri: &str) -> Result<Arc<dyn PeerEndpoint>> {
            if self.unreachable.read().await.contains(base_uri) {
                return Err(PeerError::Unreachable(format!("{base_uri}: connection refused")));
            }

            let delay = self.latency.read().await.get(base_uri).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            self.endpoints
                .read()
                .await
                .get(base_uri)
                .and_then(Weak::upgrade)
                .ok_or_else(|| PeerError::Unreachable(format!("{base_uri}: no such host")))
        }
    }

    #[async_trait]
    impl PeerTransport for MemoryPeerNetwork {
        async fn notify_trust_request(
            &self,
            peer_base_uri: &str,
            request: TrustRequest,
        ) -> Result<TrustRequestAck> {
            self.route(peer_base_uri).await?.on_trust_request(request).await
        }

        async fn notify_approval(
            &self,
            peer_base_uri: &str,
            secret: &BearerSecret,
            notice: ApprovalNotice,
        ) -> Result<()> {
            self.route(peer_base_uri).await?.on_approval(secret, notice).await
        }

        async fn fetch_capabilities(
            &self,
            peer_base_uri: &str,
            secret: &BearerSecret,
        ) -> Result<PeerCapabilities> {
            self.route(peer_base_uri).await?.capabilities(secret).await
        }

        async fn notify_diff(
            &self,
            peer_base_uri: &str,
            secret: &BearerSecret,
            notice: DiffNotice,
        ) -> Result<()> {
            self.route(peer_base_uri).await?.on_diff(secret, notice).await
        }
    }
}
