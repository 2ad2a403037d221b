//! Inbound peer calls.
//!
//! Every call except the initial trust request must carry the secret of an
//! existing relationship. Protocol errors are reported to the caller as
//! rejections.

use async_trait::async_trait;

use actorlink_core::{ActorId, BearerSecret, TrustRelationship};
use actorlink_peer::{
    ApprovalNotice, DiffNotice, PeerCapabilities, PeerEndpoint, PeerError, TrustRequest,
    TrustRequestAck,
};
use actorlink_store::Store;

use crate::actor::Actor;
use crate::error::ProtocolError;
use crate::events::ProtocolEvent;

fn reject(err: ProtocolError) -> PeerError {
    PeerError::Rejected(err.to_string())
}

impl<S: Store> Actor<S> {
    /// Authenticate a caller claiming to be `claimed`.
    async fn authenticate_peer(
        &self,
        secret: &BearerSecret,
        claimed: &ActorId,
    ) -> Result<TrustRelationship, PeerError> {
        let trust = self.authenticate(secret).await.map_err(reject)?;
        if trust.peer_id != claimed.as_peer() {
            return Err(PeerError::Rejected(format!(
                "secret does not belong to {claimed}"
            )));
        }
        Ok(trust)
    }
}

#[async_trait]
impl<S: Store + 'static> PeerEndpoint for Actor<S> {
    async fn on_trust_request(&self, request: TrustRequest) -> Result<TrustRequestAck, PeerError> {
        let trust = self.receive_trust_request(request).await.map_err(reject)?;
        Ok(TrustRequestAck {
            actor_id: self.id().clone(),
            approved: trust.approved,
        })
    }

    async fn on_approval(&self, secret: &BearerSecret, notice: ApprovalNotice) -> Result<(), PeerError> {
        let trust = self.authenticate_peer(secret, &notice.from_actor).await?;
        self.receive_approval(&trust.peer_id)
            .await
            .map_err(reject)?;
        Ok(())
    }

    async fn capabilities(&self, secret: &BearerSecret) -> Result<PeerCapabilities, PeerError> {
        self.authenticate(secret).await.map_err(reject)?;
        Ok(self.config.capabilities())
    }

    async fn on_diff(&self, secret: &BearerSecret, notice: DiffNotice) -> Result<(), PeerError> {
        let trust = self.authenticate_peer(secret, &notice.from_actor).await?;
        if !trust.is_fully_approved() {
            return Err(PeerError::Rejected(format!(
                "relationship with {} is not fully approved",
                trust.peer_id
            )));
        }
        notice
            .validate_limits()
            .map_err(|reason| PeerError::Rejected(reason.to_string()))?;

        self.emit(ProtocolEvent::DiffReceived {
            actor_id: self.id().clone(),
            peer_id: trust.peer_id,
            notice,
        });
        Ok(())
    }
}
