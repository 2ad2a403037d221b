//! Subscriptions and their diff feeds.
//!
//! A change registered on the data owner is appended to the feed of every
//! matching subscription whose `(target, subtarget)` key is not suspended
//! and whose subscriber may read the changed path.
//! Entries stay until the subscriber acknowledges them with
//! [`clear_diffs_through`](Actor::clear_diffs_through); there is no backlog
//! bound.

use std::collections::BTreeMap;

use bytes::Bytes;

use actorlink_core::{
    now_millis, resource_path, validate_subscription_request, validate_subtarget, validate_target,
    DiffBody, PeerId, Subscription, SubscriptionDiff, SubscriptionId, SubscriptionRequest,
    SuspensionKey,
};
use actorlink_peer::{DiffNotice, DiffNoticeBody};
use actorlink_perms::Operation;
use actorlink_store::{InsertResult, Store, StoreError};

use crate::actor::Actor;
use crate::error::{ProtocolError, Result};

/// Attempts at drawing an unused subscription id.
const MAX_ID_ATTEMPTS: usize = 3;

/// A diff appended by [`register_diff`](Actor::register_diff) or a resume,
/// with the subscription it was appended to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisteredDiff {
    pub subscription: Subscription,
    pub diff: SubscriptionDiff,
}

/// A callback push that did not go through.
#[derive(Debug)]
pub struct CallbackFailure {
    pub peer_id: PeerId,
    pub subscription_id: SubscriptionId,
    pub sequence: u64,
    pub error: ProtocolError,
}

/// Outcome of [`deliver_callbacks`](Actor::deliver_callbacks).
#[derive(Debug, Default)]
pub struct CallbackReport {
    /// `(subscription, sequence)` pairs the subscriber accepted.
    pub delivered: Vec<(SubscriptionId, u64)>,
    /// Diffs whose subscription does not want pushes.
    pub skipped: usize,
    pub failures: Vec<CallbackFailure>,
}

impl CallbackReport {
    /// Whether every push went through.
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty()
    }
}

impl<S: Store> Actor<S> {
    // ─────────────────────────────────────────────────────────────────────────
    // Subscription Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Subscribe `peer_id` to changes on this actor's data.
    ///
    /// # Errors
    /// - `NoSuchTrust` if there is no relationship with the peer.
    /// - `PermissionDenied` if the relationship is not fully approved or the
    ///   peer may not `subscribe` to the resource path.
    pub async fn create_subscription(
        &self,
        peer_id: &PeerId,
        request: &SubscriptionRequest,
    ) -> Result<Subscription> {
        validate_subscription_request(request)?;

        // Held through the insert so a concurrent delete cannot orphan it.
        let _guard = self.trust_locks.lock(peer_id).await;
        let trust = self.require_trust(peer_id).await?;
        if !trust.is_fully_approved() {
            return Err(ProtocolError::PermissionDenied(format!(
                "relationship with {peer_id} is not fully approved"
            )));
        }

        let path = request.resource_path();
        let overrides = self.store.get_permission_overrides(self.id(), peer_id).await?;
        let verdict = self.evaluator.explain(
            &self.subject(&trust, overrides.as_ref()),
            &path,
            Operation::Subscribe,
        );
        if !verdict.decision.is_allowed() {
            tracing::debug!(
                actor = %self.id(),
                peer = %peer_id,
                path = %path,
                source = ?verdict.source,
                "subscription denied"
            );
            return Err(ProtocolError::PermissionDenied(format!(
                "subscribe on {path}"
            )));
        }

        let mut subscription =
            Subscription::from_request(self.id().clone(), peer_id.clone(), request, now_millis());
        for _ in 0..MAX_ID_ATTEMPTS {
            if self.store.insert_subscription(&subscription).await? == InsertResult::Inserted {
                tracing::info!(
                    actor = %self.id(),
                    peer = %peer_id,
                    subscription = %subscription.subscription_id,
                    path = %path,
                    granularity = subscription.granularity.as_str(),
                    "subscription created"
                );
                return Ok(subscription);
            }
            subscription.subscription_id = SubscriptionId::generate();
        }

        Err(StoreError::InvalidData("no unused subscription id".into()).into())
    }

    /// Get a subscription held by `peer_id`.
    pub async fn get_subscription(
        &self,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>> {
        Ok(self
            .store
            .get_subscription(self.id(), peer_id, subscription_id)
            .await?)
    }

    /// List subscriptions on this actor, optionally only those of one peer.
    pub async fn list_subscriptions(&self, peer_id: Option<&PeerId>) -> Result<Vec<Subscription>> {
        Ok(self.store.list_subscriptions(self.id(), peer_id).await?)
    }

    /// Delete a subscription and its feed. Returns `false` if it did not exist.
    pub async fn delete_subscription(
        &self,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<bool> {
        let deleted = self
            .store
            .delete_subscription(self.id(), peer_id, subscription_id)
            .await?;
        if deleted {
            tracing::info!(
                actor = %self.id(),
                peer = %peer_id,
                subscription = %subscription_id,
                "subscription deleted"
            );
        }
        Ok(deleted)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Diff Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a change and append it to every matching subscription.
    ///
    /// Subscriptions whose own `(target, subtarget)` key is suspended get
    /// nothing, and neither do subscribers denied `read` on the changed path
    /// (or whose relationship is no longer fully approved). Granularity does not suppress creation; it only shapes what
    /// a callback push carries.
    pub async fn register_diff(
        &self,
        target: &str,
        subtarget: &str,
        resource: &str,
        payload: Bytes,
    ) -> Result<Vec<RegisteredDiff>> {
        validate_target(target)?;
        validate_subtarget(subtarget)?;

        let subscriptions = self.store.list_subscriptions(self.id(), None).await?;
        let body = DiffBody::Delta(payload);
        let path = resource_path(target, subtarget, resource);
        let mut suspended: BTreeMap<SuspensionKey, bool> = BTreeMap::new();
        let mut readable: BTreeMap<PeerId, bool> = BTreeMap::new();
        let mut registered = Vec::new();

        for subscription in subscriptions {
            if !subscription.matches(target, subtarget, resource) {
                continue;
            }

            let may_read = match readable.get(&subscription.peer_id) {
                Some(cached) => *cached,
                None => {
                    let allowed = self.may_read(&subscription.peer_id, &path).await?;
                    readable.insert(subscription.peer_id.clone(), allowed);
                    allowed
                }
            };
            if !may_read {
                tracing::debug!(
                    actor = %self.id(),
                    subscription = %subscription.subscription_id,
                    path = %path,
                    "diff withheld from subscriber"
                );
                continue;
            }

            let key = SuspensionKey::for_subscription(&subscription.target, &subscription.subtarget);
            let is_suspended = match suspended.get(&key) {
                Some(cached) => *cached,
                None => {
                    let found = self.store.has_suspension(self.id(), &key).await?;
                    suspended.insert(key.clone(), found);
                    found
                }
            };
            if is_suspended {
                tracing::debug!(
                    actor = %self.id(),
                    subscription = %subscription.subscription_id,
                    key = %key,
                    "diff suppressed by suspension"
                );
                continue;
            }

            let diff = match self
                .store
                .append_diff(self.id(), &subscription.subscription_id, &body, now_millis())
                .await
            {
                Ok(diff) => diff,
                // Deleted since it was listed.
                Err(StoreError::NotFound(_)) => continue,
                Err(err) => return Err(err.into()),
            };

            tracing::debug!(
                actor = %self.id(),
                subscription = %subscription.subscription_id,
                sequence = diff.sequence,
                "diff registered"
            );
            registered.push(RegisteredDiff { subscription, diff });
        }

        Ok(registered)
    }

    /// Get the feed of a subscription from `from_seq` (inclusive), oldest
    /// first.
    pub async fn list_diffs(
        &self,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
        from_seq: u64,
    ) -> Result<Vec<SubscriptionDiff>> {
        self.require_subscription(peer_id, subscription_id).await?;
        Ok(self
            .store
            .get_diffs(self.id(), subscription_id, from_seq)
            .await?)
    }

    /// Acknowledge every diff with `sequence <= through`.
    ///
    /// Idempotent. Returns how many entries were removed.
    pub async fn clear_diffs_through(
        &self,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
        through: u64,
    ) -> Result<usize> {
        self.require_subscription(peer_id, subscription_id).await?;
        let removed = self
            .store
            .delete_diffs_through(self.id(), subscription_id, through)
            .await?;
        tracing::debug!(
            actor = %self.id(),
            subscription = %subscription_id,
            through,
            removed,
            "diffs acknowledged"
        );
        Ok(removed)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Callback Delivery
    // ─────────────────────────────────────────────────────────────────────────

    /// Push registered diffs to subscribers that asked for callbacks.
    ///
    /// `high` and `low` subscriptions receive the payload, `none`
    /// subscriptions a bare trigger, and resync entries a resync marker. A
    /// payload over the notice size limit is sent as a trigger. Failed
    /// pushes are reported; the diffs stay in the feed either way.
    pub async fn deliver_callbacks(&self, registered: &[RegisteredDiff]) -> CallbackReport {
        let mut report = CallbackReport::default();

        for RegisteredDiff { subscription, diff } in registered {
            if !subscription.callback {
                report.skipped += 1;
                continue;
            }

            match self.push_diff(subscription, diff).await {
                Ok(()) => report
                    .delivered
                    .push((subscription.subscription_id.clone(), diff.sequence)),
                Err(error) => {
                    tracing::warn!(
                        actor = %self.id(),
                        peer = %subscription.peer_id,
                        subscription = %subscription.subscription_id,
                        sequence = diff.sequence,
                        error = %error,
                        "callback push failed"
                    );
                    report.failures.push(CallbackFailure {
                        peer_id: subscription.peer_id.clone(),
                        subscription_id: subscription.subscription_id.clone(),
                        sequence: diff.sequence,
                        error,
                    });
                }
            }
        }

        report
    }

    async fn push_diff(&self, subscription: &Subscription, diff: &SubscriptionDiff) -> Result<()> {
        let trust = self.require_trust(&subscription.peer_id).await?;
        if !trust.is_fully_approved() {
            return Err(ProtocolError::PermissionDenied(format!(
                "relationship with {} is not fully approved",
                trust.peer_id
            )));
        }
        if trust.base_uri.is_empty() {
            return Err(ProtocolError::PermissionDenied(format!(
                "{} has no callback address",
                trust.peer_id
            )));
        }

        let body = match &diff.body {
            DiffBody::Resync => DiffNoticeBody::Resync,
            DiffBody::Delta(payload) if subscription.granularity.carries_payload() => {
                DiffNoticeBody::Payload(payload.clone())
            }
            DiffBody::Delta(_) => DiffNoticeBody::Trigger,
        };
        let mut notice = DiffNotice {
            from_actor: self.id().clone(),
            subscription_id: subscription.subscription_id.clone(),
            sequence: diff.sequence,
            target: subscription.target.clone(),
            subtarget: subscription.subtarget.clone(),
            resource: subscription.resource.clone(),
            granularity: subscription.granularity,
            body,
        };
        if notice.validate_limits().is_err() {
            notice.body = DiffNoticeBody::Trigger;
        }

        self.call_peer(
            self.transport
                .notify_diff(&trust.base_uri, &trust.secret, notice),
        )
        .await
    }

    async fn require_subscription(
        &self,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<Subscription> {
        self.store
            .get_subscription(self.id(), peer_id, subscription_id)
            .await?
            .ok_or_else(|| ProtocolError::NoSuchSubscription(subscription_id.clone()))
    }

    /// Whether `peer_id` may currently read `path`. A missing or not fully
    /// approved relationship reads nothing.
    async fn may_read(&self, peer_id: &PeerId, path: &str) -> Result<bool> {
        let Some(trust) = self.store.get_trust(self.id(), peer_id).await? else {
            return Ok(false);
        };
        if !trust.is_fully_approved() {
            return Ok(false);
        }
        let overrides = self.store.get_permission_overrides(self.id(), peer_id).await?;
        Ok(self
            .evaluator
            .evaluate(&self.subject(&trust, overrides.as_ref()), path, Operation::Read)
            .is_allowed())
    }
}
