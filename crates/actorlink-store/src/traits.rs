//! Store trait: the abstract interface for protocol state persistence.
//!
//! This trait keeps the protocol layer storage-agnostic. Implementations
//! include SQLite (primary) and in-memory (for tests).

use async_trait::async_trait;
use actorlink_core::{
    ActorId, BearerSecret, DiffBody, PeerId, Subscription, SubscriptionDiff, SubscriptionId,
    SuspensionKey, SuspensionRecord, TrustRelationship,
};
use actorlink_perms::RuleSet;

use crate::error::Result;

/// Result of inserting a keyed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertResult {
    /// Record was inserted.
    Inserted,
    /// A record with the same key already exists. Nothing was written.
    AlreadyExists,
    /// The trust's secret is already assigned to another relationship of the
    /// same actor. Nothing was written.
    SecretConflict,
}

/// The Store trait: async interface for protocol state.
///
/// All methods are async to support both sync (SQLite) and async backends.
/// For SQLite, we use `spawn_blocking` internally to avoid blocking the runtime.
///
/// # Design Notes
///
/// - **Secret index**: every trust's secret is indexed per actor. Inserts and
///   updates that would give two relationships of one actor the same secret
///   are refused.
/// - **Atomic sequencing**: `append_diff` increments the subscription's
///   counter and writes the diff as one step, so concurrent appends observe
///   distinct, gap-free sequence numbers.
/// - **No cascades**: deleting a trust does not delete its subscriptions or
///   overrides. The caller orders the cascade.
#[async_trait]
pub trait Store: Send + Sync {
    // ─────────────────────────────────────────────────────────────────────────
    // Trust Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a new trust relationship.
    ///
    /// # Returns
    /// - `Inserted` if the `(actor_id, peer_id)` pair was new.
    /// - `AlreadyExists` if a relationship with that peer exists.
    /// - `SecretConflict` if another peer of the actor holds the same secret.
    async fn insert_trust(&self, trust: &TrustRelationship) -> Result<InsertResult>;

    /// Get a trust relationship.
    async fn get_trust(&self, actor_id: &ActorId, peer_id: &PeerId)
        -> Result<Option<TrustRelationship>>;

    /// Overwrite an existing trust relationship, re-indexing its secret.
    ///
    /// Returns `false` if no relationship exists for the pair. Fails with
    /// [`StoreError::SecretConflict`](crate::StoreError::SecretConflict) if the
    /// new secret belongs to another peer.
    async fn update_trust(&self, trust: &TrustRelationship) -> Result<bool>;

    /// Delete a trust relationship and its secret index entry.
    async fn delete_trust(&self, actor_id: &ActorId, peer_id: &PeerId) -> Result<bool>;

    /// List an actor's trust relationships, oldest first.
    async fn list_trusts(&self, actor_id: &ActorId) -> Result<Vec<TrustRelationship>>;

    /// Look up the relationship that owns `secret`.
    async fn find_trust_by_secret(
        &self,
        actor_id: &ActorId,
        secret: &BearerSecret,
    ) -> Result<Option<TrustRelationship>>;

    // ─────────────────────────────────────────────────────────────────────────
    // Permission Override Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Get the override rules stored for a relationship.
    async fn get_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<Option<RuleSet>>;

    /// Store (or replace) the override rules for a relationship.
    async fn put_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        rules: &RuleSet,
    ) -> Result<()>;

    /// Delete the override rules for a relationship.
    async fn delete_permission_overrides(&self, actor_id: &ActorId, peer_id: &PeerId)
        -> Result<bool>;

    // ─────────────────────────────────────────────────────────────────────────
    // Subscription Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Insert a subscription. `AlreadyExists` if the id is taken.
    async fn insert_subscription(&self, subscription: &Subscription) -> Result<InsertResult>;

    /// Get a subscription held by a specific peer.
    async fn get_subscription(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>>;

    /// Get a subscription by id alone.
    async fn find_subscription(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>>;

    /// List an actor's subscriptions, optionally only those of one peer.
    ///
    /// Ordered by creation time, then id.
    async fn list_subscriptions(
        &self,
        actor_id: &ActorId,
        peer_id: Option<&PeerId>,
    ) -> Result<Vec<Subscription>>;

    /// Delete a subscription and all of its diffs.
    async fn delete_subscription(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<bool>;

    /// Delete every subscription (and diff) held by `peer_id`.
    ///
    /// Returns the number of subscriptions removed.
    async fn delete_subscriptions_for_peer(&self, actor_id: &ActorId, peer_id: &PeerId)
        -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Diff Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Append a diff with the subscription's next sequence number.
    ///
    /// Fails with `NotFound` if the subscription does not exist.
    async fn append_diff(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        body: &DiffBody,
        created_at: i64,
    ) -> Result<SubscriptionDiff>;

    /// Get the diffs with `seq >= from_seq`, ordered by seq.
    async fn get_diffs(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        from_seq: u64,
    ) -> Result<Vec<SubscriptionDiff>>;

    /// Delete the diffs with `seq <= through`. Returns how many were removed.
    async fn delete_diffs_through(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        through: u64,
    ) -> Result<usize>;

    // ─────────────────────────────────────────────────────────────────────────
    // Suspension Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Record a suspension. Returns `false` if the key was already suspended.
    async fn insert_suspension(&self, record: &SuspensionRecord) -> Result<bool>;

    /// Check whether a key is suspended.
    async fn has_suspension(&self, actor_id: &ActorId, key: &SuspensionKey) -> Result<bool>;

    /// Remove a suspension. Returns `false` if the key was not suspended.
    async fn delete_suspension(&self, actor_id: &ActorId, key: &SuspensionKey) -> Result<bool>;

    /// List an actor's suspensions, ordered by key.
    async fn list_suspensions(&self, actor_id: &ActorId) -> Result<Vec<SuspensionRecord>>;
}
