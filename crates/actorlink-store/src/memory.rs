//! In-memory implementation of the Store trait.
//!
//! This is primarily for testing. It has the same semantics as SQLite
//! but keeps everything in memory with no persistence.

use std::collections::{BTreeMap, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;

use actorlink_core::{
    ActorId, BearerSecret, DiffBody, PeerId, SecretDigest, Subscription, SubscriptionDiff,
    SubscriptionId, SuspensionKey, SuspensionRecord, TrustRelationship,
};
use actorlink_perms::RuleSet;

use crate::error::{Result, StoreError};
use crate::traits::{InsertResult, Store};

/// In-memory store implementation.
///
/// All data is lost when the store is dropped. Thread-safe via RwLock.
pub struct MemoryStore {
    inner: RwLock<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    /// Trust relationships by (actor, peer).
    trusts: BTreeMap<(ActorId, PeerId), TrustRelationship>,

    /// Secret index: (actor, digest) -> peer.
    secrets: HashMap<(ActorId, SecretDigest), PeerId>,

    /// Per-trust override rules.
    overrides: HashMap<(ActorId, PeerId), RuleSet>,

    /// Subscriptions by (actor, id).
    subscriptions: BTreeMap<(ActorId, SubscriptionId), Subscription>,

    /// Diff feeds by (actor, subscription id), keyed by sequence.
    diffs: HashMap<(ActorId, SubscriptionId), BTreeMap<u64, SubscriptionDiff>>,

    /// Suspended keys.
    suspensions: BTreeMap<(ActorId, SuspensionKey), SuspensionRecord>,
}

impl MemoryStoreInner {
    fn remove_subscription(&mut self, actor_id: &ActorId, subscription_id: &SubscriptionId) {
        let key = (actor_id.clone(), subscription_id.clone());
        self.subscriptions.remove(&key);
        self.diffs.remove(&key);
    }
}

impl MemoryStore {
    /// Create a new empty in-memory store.
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(MemoryStoreInner::default()),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryStoreInner>> {
        self.inner.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryStoreInner>> {
        self.inner.write().map_err(|_| StoreError::Poisoned)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_trust(&self, trust: &TrustRelationship) -> Result<InsertResult> {
        let mut inner = self.write()?;

        let key = (trust.actor_id.clone(), trust.peer_id.clone());
        if inner.trusts.contains_key(&key) {
            return Ok(InsertResult::AlreadyExists);
        }

        let secret_key = (trust.actor_id.clone(), trust.secret.digest());
        if inner.secrets.contains_key(&secret_key) {
            return Ok(InsertResult::SecretConflict);
        }

        inner.secrets.insert(secret_key, trust.peer_id.clone());
        inner.trusts.insert(key, trust.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_trust(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<Option<TrustRelationship>> {
        let inner = self.read()?;
        Ok(inner.trusts.get(&(actor_id.clone(), peer_id.clone())).cloned())
    }

    async fn update_trust(&self, trust: &TrustRelationship) -> Result<bool> {
        let mut inner = self.write()?;

        let key = (trust.actor_id.clone(), trust.peer_id.clone());
        let Some(old_digest) = inner.trusts.get(&key).map(|t| t.secret.digest()) else {
            return Ok(false);
        };

        let new_digest = trust.secret.digest();
        if new_digest != old_digest {
            let new_key = (trust.actor_id.clone(), new_digest);
            if inner.secrets.contains_key(&new_key) {
                return Err(StoreError::SecretConflict {
                    actor_id: trust.actor_id.to_string(),
                });
            }
            inner.secrets.remove(&(trust.actor_id.clone(), old_digest));
            inner.secrets.insert(new_key, trust.peer_id.clone());
        }

        inner.trusts.insert(key, trust.clone());
        Ok(true)
    }

    async fn delete_trust(&self, actor_id: &ActorId, peer_id: &PeerId) -> Result<bool> {
        let mut inner = self.write()?;

        match inner.trusts.remove(&(actor_id.clone(), peer_id.clone())) {
            Some(trust) => {
                inner.secrets.remove(&(actor_id.clone(), trust.secret.digest()));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn list_trusts(&self, actor_id: &ActorId) -> Result<Vec<TrustRelationship>> {
        let inner = self.read()?;

        let mut trusts: Vec<TrustRelationship> = inner
            .trusts
            .iter()
            .filter(|((actor, _), _)| actor == actor_id)
            .map(|(_, trust)| trust.clone())
            .collect();
        trusts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.peer_id.encode().cmp(&b.peer_id.encode()))
        });
        Ok(trusts)
    }

    async fn find_trust_by_secret(
        &self,
        actor_id: &ActorId,
        secret: &BearerSecret,
    ) -> Result<Option<TrustRelationship>> {
        let inner = self.read()?;

        let Some(peer_id) = inner.secrets.get(&(actor_id.clone(), secret.digest())) else {
            return Ok(None);
        };
        Ok(inner.trusts.get(&(actor_id.clone(), peer_id.clone())).cloned())
    }

    async fn get_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<Option<RuleSet>> {
        let inner = self.read()?;
        Ok(inner.overrides.get(&(actor_id.clone(), peer_id.clone())).cloned())
    }

    async fn put_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        rules: &RuleSet,
    ) -> Result<()> {
        let mut inner = self.write()?;
        inner
            .overrides
            .insert((actor_id.clone(), peer_id.clone()), rules.clone());
        Ok(())
    }

    async fn delete_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner
            .overrides
            .remove(&(actor_id.clone(), peer_id.clone()))
            .is_some())
    }

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<InsertResult> {
        let mut inner = self.write()?;

        let key = (
            subscription.actor_id.clone(),
            subscription.subscription_id.clone(),
        );
        if inner.subscriptions.contains_key(&key) {
            return Ok(InsertResult::AlreadyExists);
        }
        inner.subscriptions.insert(key, subscription.clone());
        Ok(InsertResult::Inserted)
    }

    async fn get_subscription(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>> {
        let inner = self.read()?;
        Ok(inner
            .subscriptions
            .get(&(actor_id.clone(), subscription_id.clone()))
            .filter(|sub| sub.peer_id == *peer_id)
            .cloned())
    }

    async fn find_subscription(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>> {
        let inner = self.read()?;
        Ok(inner
            .subscriptions
            .get(&(actor_id.clone(), subscription_id.clone()))
            .cloned())
    }

    async fn list_subscriptions(
        &self,
        actor_id: &ActorId,
        peer_id: Option<&PeerId>,
    ) -> Result<Vec<Subscription>> {
        let inner = self.read()?;

        let mut subs: Vec<Subscription> = inner
            .subscriptions
            .iter()
            .filter(|((actor, _), sub)| {
                actor == actor_id && peer_id.map_or(true, |peer| sub.peer_id == *peer)
            })
            .map(|(_, sub)| sub.clone())
            .collect();
        subs.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.subscription_id.cmp(&b.subscription_id))
        });
        Ok(subs)
    }

    async fn delete_subscription(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<bool> {
        let mut inner = self.write()?;

        let owned = inner
            .subscriptions
            .get(&(actor_id.clone(), subscription_id.clone()))
            .is_some_and(|sub| sub.peer_id == *peer_id);
        if owned {
            inner.remove_subscription(actor_id, subscription_id);
        }
        Ok(owned)
    }

    async fn delete_subscriptions_for_peer(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<usize> {
        let mut inner = self.write()?;

        let ids: Vec<SubscriptionId> = inner
            .subscriptions
            .iter()
            .filter(|((actor, _), sub)| actor == actor_id && sub.peer_id == *peer_id)
            .map(|((_, id), _)| id.clone())
            .collect();
        for id in &ids {
            inner.remove_subscription(actor_id, id);
        }
        Ok(ids.len())
    }

    async fn append_diff(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        body: &DiffBody,
        created_at: i64,
    ) -> Result<SubscriptionDiff> {
        let mut inner = self.write()?;

        let key = (actor_id.clone(), subscription_id.clone());
        let Some(sub) = inner.subscriptions.get_mut(&key) else {
            return Err(StoreError::NotFound(format!(
                "subscription {subscription_id} of actor {actor_id}"
            )));
        };
        sub.sequence_counter += 1;

        let diff = SubscriptionDiff {
            actor_id: actor_id.clone(),
            subscription_id: subscription_id.clone(),
            sequence: sub.sequence_counter,
            body: body.clone(),
            created_at,
        };
        inner
            .diffs
            .entry(key)
            .or_default()
            .insert(diff.sequence, diff.clone());
        Ok(diff)
    }

    async fn get_diffs(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        from_seq: u64,
    ) -> Result<Vec<SubscriptionDiff>> {
        let inner = self.read()?;

        Ok(inner
            .diffs
            .get(&(actor_id.clone(), subscription_id.clone()))
            .map(|feed| feed.range(from_seq..).map(|(_, d)| d.clone()).collect())
            .unwrap_or_default())
    }

    async fn delete_diffs_through(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        through: u64,
    ) -> Result<usize> {
        let mut inner = self.write()?;

        let Some(feed) = inner
            .diffs
            .get_mut(&(actor_id.clone(), subscription_id.clone()))
        else {
            return Ok(0);
        };
        let kept = feed.split_off(&through.saturating_add(1));
        let removed = feed.len();
        *feed = kept;
        Ok(removed)
    }

    async fn insert_suspension(&self, record: &SuspensionRecord) -> Result<bool> {
        let mut inner = self.write()?;

        let key = (record.actor_id.clone(), record.key.clone());
        if inner.suspensions.contains_key(&key) {
            return Ok(false);
        }
        inner.suspensions.insert(key, record.clone());
        Ok(true)
    }

    async fn has_suspension(&self, actor_id: &ActorId, key: &SuspensionKey) -> Result<bool> {
        let inner = self.read()?;
        Ok(inner
            .suspensions
            .contains_key(&(actor_id.clone(), key.clone())))
    }

    async fn delete_suspension(&self, actor_id: &ActorId, key: &SuspensionKey) -> Result<bool> {
        let mut inner = self.write()?;
        Ok(inner
            .suspensions
            .remove(&(actor_id.clone(), key.clone()))
            .is_some())
    }

    async fn list_suspensions(&self, actor_id: &ActorId) -> Result<Vec<SuspensionRecord>> {
        let inner = self.read()?;
        Ok(inner
            .suspensions
            .iter()
            .filter(|((actor, _), _)| actor == actor_id)
            .map(|(_, record)| record.clone())
            .collect())
    }
}
