//! Trust lifecycle.
//!
//! A relationship moves through `pending -> fully approved -> deleted`.
//! Each side owns its `approved` flag and learns the other side's through the
//! handshake acknowledgment or an approval notice. The fully-approved event
//! fires on whichever side's flag flips last, once per side.

use actorlink_core::{
    now_millis, validate_base_uri, validate_description, validate_relationship_type,
    BearerSecret, CapabilitySnapshot, ConnectionMethod, PeerId, TrustPatch, TrustRelationship,
};
use actorlink_peer::{bounded, ApprovalNotice, PeerError, TrustRequest};
use actorlink_perms::RuleSet;
use actorlink_store::{InsertResult, Store};

use crate::actor::Actor;
use crate::config::DuplicateTrustPolicy;
use crate::error::{ProtocolError, Result};
use crate::events::{ApprovalOrigin, ProtocolEvent};

impl<S: Store> Actor<S> {
    // ─────────────────────────────────────────────────────────────────────────
    // Handshake
    // ─────────────────────────────────────────────────────────────────────────

    /// Ask the actor at `peer_base_uri` to establish trust.
    ///
    /// The local record is created only after the peer acknowledges, so a
    /// failed or timed-out handshake leaves nothing behind. The record starts
    /// approved locally; `peer_approved` is whatever the peer reported.
    ///
    /// # Errors
    /// - `DuplicateTrust` if a relationship with the same base uri or the
    ///   acknowledged peer id exists and the policy is `Reject`.
    /// - `PeerUnreachable` / `PeerRejected` if the handshake fails.
    pub async fn initiate_trust(
        &self,
        peer_base_uri: &str,
        relationship_type: &str,
        description: &str,
    ) -> Result<TrustRelationship> {
        validate_base_uri(peer_base_uri)?;
        validate_relationship_type(relationship_type)?;
        validate_description(description)?;

        if self.config.duplicate_trust == DuplicateTrustPolicy::Reject {
            let existing = self.store.list_trusts(self.id()).await?;
            if existing.iter().any(|t| t.base_uri == peer_base_uri) {
                return Err(ProtocolError::DuplicateTrust(peer_base_uri.to_string()));
            }
        }

        let secret = BearerSecret::generate();
        let verification_token = fresh_token();
        let request = TrustRequest {
            from_actor: self.id().clone(),
            base_uri: self.base_uri().to_string(),
            relationship_type: relationship_type.to_string(),
            secret: secret.clone(),
            verification_token: verification_token.clone(),
            description: description.to_string(),
        };

        let ack = self
            .call_peer(self.transport.notify_trust_request(peer_base_uri, request))
            .await?;

        let trust = TrustRelationship {
            actor_id: self.id().clone(),
            peer_id: ack.actor_id.as_peer(),
            relationship_type: relationship_type.to_string(),
            secret,
            base_uri: peer_base_uri.to_string(),
            connection_method: ConnectionMethod::Trust,
            approved: true,
            peer_approved: ack.approved,
            verified: true,
            verification_token: Some(verification_token),
            description: description.to_string(),
            created_at: now_millis(),
            last_accessed_at: None,
            capabilities: CapabilitySnapshot::default(),
        };

        let _guard = self.trust_locks.lock(&trust.peer_id).await;
        self.store_new_trust(&trust).await?;

        tracing::info!(
            actor = %self.id(),
            peer = %trust.peer_id,
            relationship = %trust.relationship_type,
            peer_approved = trust.peer_approved,
            "trust initiated"
        );
        if trust.is_fully_approved() {
            self.emit(ProtocolEvent::TrustFullyApproved {
                actor_id: self.id().clone(),
                peer_id: trust.peer_id.clone(),
                origin: ApprovalOrigin::Remote,
            });
        }

        Ok(trust)
    }

    /// Accept an incoming trust request.
    ///
    /// Creates the reciprocal record, unapproved locally unless the
    /// relationship type is configured for auto-approval.
    pub async fn receive_trust_request(&self, request: TrustRequest) -> Result<TrustRelationship> {
        validate_base_uri(&request.base_uri)?;
        validate_relationship_type(&request.relationship_type)?;
        validate_description(&request.description)?;

        let auto_approve = self.config.auto_approve.contains(&request.relationship_type);
        let trust = TrustRelationship {
            actor_id: self.id().clone(),
            peer_id: request.from_actor.as_peer(),
            relationship_type: request.relationship_type,
            secret: request.secret,
            base_uri: request.base_uri,
            connection_method: ConnectionMethod::Trust,
            approved: auto_approve,
            peer_approved: true,
            verified: false,
            verification_token: Some(request.verification_token),
            description: request.description,
            created_at: now_millis(),
            last_accessed_at: None,
            capabilities: CapabilitySnapshot::default(),
        };

        let _guard = self.trust_locks.lock(&trust.peer_id).await;
        self.store_new_trust(&trust).await?;

        tracing::info!(
            actor = %self.id(),
            peer = %trust.peer_id,
            relationship = %trust.relationship_type,
            auto_approve,
            "trust request received"
        );
        self.emit(ProtocolEvent::TrustRequested {
            actor_id: self.id().clone(),
            peer_id: trust.peer_id.clone(),
            relationship_type: trust.relationship_type.clone(),
        });
        if trust.is_fully_approved() {
            self.emit(ProtocolEvent::TrustFullyApproved {
                actor_id: self.id().clone(),
                peer_id: trust.peer_id.clone(),
                origin: ApprovalOrigin::Local,
            });
        }

        Ok(trust)
    }

    /// Establish a fully approved relationship with a peer that is not an
    /// actor, such as a dynamically registered OAuth2 client.
    ///
    /// No peer is contacted. The returned record carries the secret the
    /// client will present.
    pub async fn establish_client_trust(
        &self,
        peer_id: PeerId,
        relationship_type: &str,
        connection_method: ConnectionMethod,
        description: &str,
    ) -> Result<TrustRelationship> {
        validate_relationship_type(relationship_type)?;
        validate_description(description)?;

        let trust = TrustRelationship {
            actor_id: self.id().clone(),
            peer_id,
            relationship_type: relationship_type.to_string(),
            secret: BearerSecret::generate(),
            base_uri: String::new(),
            connection_method,
            approved: true,
            peer_approved: true,
            verified: true,
            verification_token: None,
            description: description.to_string(),
            created_at: now_millis(),
            last_accessed_at: None,
            capabilities: CapabilitySnapshot::default(),
        };

        let _guard = self.trust_locks.lock(&trust.peer_id).await;
        self.store_new_trust(&trust).await?;

        tracing::info!(
            actor = %self.id(),
            peer = %trust.peer_id,
            method = %connection_method,
            "client trust established"
        );
        self.emit(ProtocolEvent::TrustFullyApproved {
            actor_id: self.id().clone(),
            peer_id: trust.peer_id.clone(),
            origin: ApprovalOrigin::Local,
        });

        Ok(trust)
    }

    /// Insert a new record, applying the duplicate policy.
    async fn store_new_trust(&self, trust: &TrustRelationship) -> Result<()> {
        match self.store.insert_trust(trust).await? {
            InsertResult::Inserted => Ok(()),
            InsertResult::AlreadyExists => match self.config.duplicate_trust {
                DuplicateTrustPolicy::Reject => {
                    Err(ProtocolError::DuplicateTrust(trust.peer_id.encode()))
                }
                DuplicateTrustPolicy::Rotate => {
                    self.store.update_trust(trust).await?;
                    tracing::info!(
                        actor = %self.id(),
                        peer = %trust.peer_id,
                        "trust replaced with rotated secret"
                    );
                    Ok(())
                }
            },
            InsertResult::SecretConflict => Err(ProtocolError::InvalidSecret),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Approval
    // ─────────────────────────────────────────────────────────────────────────

    /// Approve a relationship locally and tell the peer.
    ///
    /// The local approval is stored before the peer is notified and stays
    /// stored if the notice fails. Calling again retries the notice without
    /// re-firing the approval event.
    pub async fn approve_trust(&self, peer_id: &PeerId) -> Result<TrustRelationship> {
        let trust = {
            let _guard = self.trust_locks.lock(peer_id).await;
            let mut trust = self.require_trust(peer_id).await?;

            if !trust.approved {
                trust.approved = true;
                self.store.update_trust(&trust).await?;
                tracing::info!(actor = %self.id(), peer = %peer_id, "trust approved");

                if trust.is_fully_approved() {
                    self.emit(ProtocolEvent::TrustFullyApproved {
                        actor_id: self.id().clone(),
                        peer_id: peer_id.clone(),
                        origin: ApprovalOrigin::Local,
                    });
                }
            }
            trust
        };

        if peer_id.is_actor() && !trust.base_uri.is_empty() {
            let notice = ApprovalNotice {
                from_actor: self.id().clone(),
            };
            self.call_peer(
                self.transport
                    .notify_approval(&trust.base_uri, &trust.secret, notice),
            )
            .await?;
        }

        Ok(trust)
    }

    /// Record the peer's approval of a relationship.
    pub async fn receive_approval(&self, peer_id: &PeerId) -> Result<TrustRelationship> {
        let _guard = self.trust_locks.lock(peer_id).await;
        let mut trust = self.require_trust(peer_id).await?;

        if !trust.peer_approved {
            trust.peer_approved = true;
            self.store.update_trust(&trust).await?;
            tracing::info!(actor = %self.id(), peer = %peer_id, "peer approved trust");

            if trust.is_fully_approved() {
                self.emit(ProtocolEvent::TrustFullyApproved {
                    actor_id: self.id().clone(),
                    peer_id: peer_id.clone(),
                    origin: ApprovalOrigin::Remote,
                });
            }
        }

        Ok(trust)
    }

    /// Mark the relationship verified if `token` matches the one the peer
    /// sent with its request.
    pub async fn verify_trust(&self, peer_id: &PeerId, token: &str) -> Result<bool> {
        let _guard = self.trust_locks.lock(peer_id).await;
        let mut trust = self.require_trust(peer_id).await?;

        if trust.verification_token.as_deref() != Some(token) {
            tracing::warn!(actor = %self.id(), peer = %peer_id, "verification token mismatch");
            return Ok(false);
        }
        if !trust.verified {
            trust.verified = true;
            self.store.update_trust(&trust).await?;
        }
        Ok(true)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Queries and Updates
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a relationship.
    pub async fn get_trust(&self, peer_id: &PeerId) -> Result<Option<TrustRelationship>> {
        Ok(self.store.get_trust(self.id(), peer_id).await?)
    }

    /// List relationships, optionally only those of one relationship type.
    pub async fn list_trusts(
        &self,
        relationship_type: Option<&str>,
    ) -> Result<Vec<TrustRelationship>> {
        let mut trusts = self.store.list_trusts(self.id()).await?;
        if let Some(relationship_type) = relationship_type {
            trusts.retain(|t| t.relationship_type == relationship_type);
        }
        Ok(trusts)
    }

    /// Find the relationship owning `secret` and record the access.
    pub async fn authenticate(&self, secret: &BearerSecret) -> Result<TrustRelationship> {
        let found = self
            .store
            .find_trust_by_secret(self.id(), secret)
            .await?
            .ok_or(ProtocolError::InvalidSecret)?;

        let _guard = self.trust_locks.lock(&found.peer_id).await;
        let mut trust = match self.store.get_trust(self.id(), &found.peer_id).await? {
            Some(trust) if trust.secret == *secret => trust,
            _ => return Err(ProtocolError::InvalidSecret),
        };

        trust.last_accessed_at = Some(now_millis());
        self.store.update_trust(&trust).await?;
        Ok(trust)
    }

    /// Update the mutable fields of a relationship.
    ///
    /// Returns `false` if no relationship exists.
    pub async fn modify_trust(&self, peer_id: &PeerId, patch: TrustPatch) -> Result<bool> {
        if let Some(field) = patch.immutable_field() {
            return Err(ProtocolError::ImmutableField(field));
        }
        if let Some(base_uri) = &patch.base_uri {
            validate_base_uri(base_uri)?;
        }
        if let Some(description) = &patch.description {
            validate_description(description)?;
        }

        let _guard = self.trust_locks.lock(peer_id).await;
        let Some(mut trust) = self.store.get_trust(self.id(), peer_id).await? else {
            return Ok(false);
        };

        if patch.apply_to(&mut trust) {
            self.store.update_trust(&trust).await?;
            tracing::debug!(actor = %self.id(), peer = %peer_id, "trust modified");
        }
        Ok(true)
    }

    /// Delete a relationship and everything hanging off it.
    ///
    /// For OAuth2 client peers the client credential is revoked first; if
    /// the registry fails, nothing is deleted. Returns `false` if no
    /// relationship exists.
    pub async fn delete_trust(&self, peer_id: &PeerId) -> Result<bool> {
        let _guard = self.trust_locks.lock(peer_id).await;
        if self.store.get_trust(self.id(), peer_id).await?.is_none() {
            return Ok(false);
        }

        if let (Some(client_id), Some(registry)) = (peer_id.oauth2_client_id(), &self.clients) {
            if !registry.delete_client(client_id).await? {
                tracing::warn!(
                    actor = %self.id(),
                    client = client_id,
                    "client registry did not know the client"
                );
            }
        }

        let subscriptions = self
            .store
            .delete_subscriptions_for_peer(self.id(), peer_id)
            .await?;
        self.store
            .delete_permission_overrides(self.id(), peer_id)
            .await?;
        let deleted = self.store.delete_trust(self.id(), peer_id).await?;

        tracing::info!(
            actor = %self.id(),
            peer = %peer_id,
            subscriptions,
            "trust deleted"
        );
        self.emit(ProtocolEvent::TrustDeleted {
            actor_id: self.id().clone(),
            peer_id: peer_id.clone(),
        });

        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Capabilities
    // ─────────────────────────────────────────────────────────────────────────

    /// Fetch the peer's protocol version and features and store them.
    ///
    /// If the peer cannot be reached the previous snapshot is kept and the
    /// unchanged record is returned.
    pub async fn refresh_capabilities(&self, peer_id: &PeerId) -> Result<TrustRelationship> {
        let trust = self.require_trust(peer_id).await?;
        if !peer_id.is_actor() || trust.base_uri.is_empty() {
            return Ok(trust);
        }

        let fetched = bounded(
            self.config.peer_timeout,
            self.transport
                .fetch_capabilities(&trust.base_uri, &trust.secret),
        )
        .await;
        let capabilities = match fetched {
            Ok(capabilities) => capabilities,
            Err(err) if err.is_transient() => {
                tracing::warn!(
                    actor = %self.id(),
                    peer = %peer_id,
                    error = %err,
                    "capability refresh failed, keeping previous snapshot"
                );
                return Ok(trust);
            }
            Err(err) => return Err(err.into()),
        };
        capabilities
            .validate_limits()
            .map_err(|reason| PeerError::InvalidResponse(reason.to_string()))?;

        let _guard = self.trust_locks.lock(peer_id).await;
        let mut trust = self.require_trust(peer_id).await?;
        trust.capabilities = CapabilitySnapshot {
            peer_protocol_version: Some(capabilities.protocol_version),
            peer_supported_features: capabilities.supported_features,
            capabilities_fetched_at: Some(now_millis()),
        };
        self.store.update_trust(&trust).await?;

        tracing::debug!(
            actor = %self.id(),
            peer = %peer_id,
            version = ?trust.capabilities.peer_protocol_version,
            "capabilities refreshed"
        );
        Ok(trust)
    }

    /// Whether the stored capability snapshot is missing or too old.
    pub async fn capabilities_stale(&self, peer_id: &PeerId) -> Result<bool> {
        let trust = self.require_trust(peer_id).await?;
        let max_age = self.config.capability_max_age.as_millis() as i64;
        Ok(trust.capabilities.is_stale(now_millis(), max_age))
    }

    /// Whether the peer advertised `feature` in its last snapshot.
    pub async fn peer_supports(&self, peer_id: &PeerId, feature: &str) -> Result<bool> {
        let trust = self.require_trust(peer_id).await?;
        Ok(trust.capabilities.supports(feature))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission Overrides
    // ─────────────────────────────────────────────────────────────────────────

    /// Replace the per-relationship override rules.
    pub async fn set_permission_overrides(&self, peer_id: &PeerId, rules: &RuleSet) -> Result<()> {
        let _guard = self.trust_locks.lock(peer_id).await;
        self.require_trust(peer_id).await?;
        self.store
            .put_permission_overrides(self.id(), peer_id, rules)
            .await?;
        Ok(())
    }

    /// Remove the per-relationship override rules.
    pub async fn clear_permission_overrides(&self, peer_id: &PeerId) -> Result<bool> {
        let _guard = self.trust_locks.lock(peer_id).await;
        Ok(self
            .store
            .delete_permission_overrides(self.id(), peer_id)
            .await?)
    }

    /// Get the per-relationship override rules.
    pub async fn permission_overrides(&self, peer_id: &PeerId) -> Result<Option<RuleSet>> {
        Ok(self
            .store
            .get_permission_overrides(self.id(), peer_id)
            .await?)
    }

    pub(crate) async fn require_trust(&self, peer_id: &PeerId) -> Result<TrustRelationship> {
        self.store
            .get_trust(self.id(), peer_id)
            .await?
            .ok_or_else(|| ProtocolError::NoSuchTrust(peer_id.clone()))
    }
}

/// A verification token: same entropy and encoding as a bearer secret.
fn fresh_token() -> String {
    BearerSecret::generate().expose().to_string()
}
