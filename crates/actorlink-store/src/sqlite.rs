//! SQLite implementation of the Store trait.
//!
//! This is the primary storage backend. It uses rusqlite with bundled
//! SQLite, wrapped in async via tokio::spawn_blocking.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use actorlink_core::{
    ActorId, BearerSecret, CapabilitySnapshot, DiffBody, PeerId, Subscription, SubscriptionDiff,
    SubscriptionId, SuspensionKey, SuspensionRecord, TrustRelationship,
};
use actorlink_perms::RuleSet;

use crate::error::{Result, StoreError};
use crate::migration;
use crate::traits::{InsertResult, Store};

const DIFF_KIND_DELTA: i64 = 0;
const DIFF_KIND_RESYNC: i64 = 1;

const TRUST_COLUMNS: &str = "actor_id, peer_id, relationship_type, secret, base_uri,
    connection_method, approved, peer_approved, verified, verification_token, description,
    created_at, last_accessed_at, peer_protocol_version, peer_features, capabilities_fetched_at";

const SUBSCRIPTION_COLUMNS: &str = "actor_id, peer_id, subscription_id, target, subtarget,
    resource, granularity, sequence_counter, callback, created_at";

/// SQLite-based store implementation.
///
/// Thread-safe via internal Mutex. All operations use spawn_blocking
/// to avoid blocking the async runtime.
pub struct SqliteStore {
    /// The SQLite connection, protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open a SQLite database at the given path.
    ///
    /// Creates the file and runs migrations if it doesn't exist.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory SQLite database.
    ///
    /// Useful for testing.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run a blocking operation on the connection from a worker thread.
    async fn run<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = self.conn.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = conn.lock().map_err(|e| {
                StoreError::Database(rusqlite::Error::SqliteFailure(
                    rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_LOCKED),
                    Some(format!("mutex poisoned: {}", e)),
                ))
            })?;
            f(&mut conn)
        })
        .await
        .map_err(|e| {
            StoreError::Database(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("spawn_blocking failed: {}", e)),
            ))
        })?
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Row Conversion
// ─────────────────────────────────────────────────────────────────────────────

fn conversion_error<E>(column: &str, ty: Type, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(0, ty, Box::new(ColumnError {
        column: column.to_string(),
        source: Box::new(err),
    }))
}

#[derive(Debug)]
struct ColumnError {
    column: String,
    source: Box<dyn std::error::Error + Send + Sync>,
}

impl std::fmt::Display for ColumnError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "column {}: {}", self.column, self.source)
    }
}

impl std::error::Error for ColumnError {}

fn actor_column(row: &Row<'_>, column: &str) -> rusqlite::Result<ActorId> {
    let raw: String = row.get(column)?;
    ActorId::new(raw).map_err(|e| conversion_error(column, Type::Text, e))
}

fn peer_column(row: &Row<'_>, column: &str) -> rusqlite::Result<PeerId> {
    let raw: String = row.get(column)?;
    PeerId::parse(&raw).map_err(|e| conversion_error(column, Type::Text, e))
}

fn row_to_trust(row: &Row<'_>) -> rusqlite::Result<TrustRelationship> {
    let method: String = row.get("connection_method")?;
    let features_cbor: Vec<u8> = row.get("peer_features")?;

    let peer_supported_features: BTreeSet<String> = if features_cbor.is_empty() {
        BTreeSet::new()
    } else {
        ciborium::from_reader(&features_cbor[..])
            .map_err(|e| conversion_error("peer_features", Type::Blob, e))?
    };

    Ok(TrustRelationship {
        actor_id: actor_column(row, "actor_id")?,
        peer_id: peer_column(row, "peer_id")?,
        relationship_type: row.get("relationship_type")?,
        secret: BearerSecret::from_string(row.get::<_, String>("secret")?),
        base_uri: row.get("base_uri")?,
        connection_method: method
            .parse()
            .map_err(|e| conversion_error("connection_method", Type::Text, e))?,
        approved: row.get("approved")?,
        peer_approved: row.get("peer_approved")?,
        verified: row.get("verified")?,
        verification_token: row.get("verification_token")?,
        description: row.get("description")?,
        created_at: row.get("created_at")?,
        last_accessed_at: row.get("last_accessed_at")?,
        capabilities: CapabilitySnapshot {
            peer_protocol_version: row.get("peer_protocol_version")?,
            peer_supported_features,
            capabilities_fetched_at: row.get("capabilities_fetched_at")?,
        },
    })
}

fn row_to_subscription(row: &Row<'_>) -> rusqlite::Result<Subscription> {
    let granularity: String = row.get("granularity")?;
    let sequence_counter: i64 = row.get("sequence_counter")?;

    Ok(Subscription {
        actor_id: actor_column(row, "actor_id")?,
        peer_id: peer_column(row, "peer_id")?,
        subscription_id: SubscriptionId::from_string(row.get::<_, String>("subscription_id")?),
        target: row.get("target")?,
        subtarget: row.get("subtarget")?,
        resource: row.get("resource")?,
        granularity: granularity
            .parse()
            .map_err(|e| conversion_error("granularity", Type::Text, e))?,
        sequence_counter: sequence_counter as u64,
        callback: row.get("callback")?,
        created_at: row.get("created_at")?,
    })
}

fn row_to_diff(row: &Row<'_>) -> rusqlite::Result<SubscriptionDiff> {
    let seq: i64 = row.get("seq")?;
    let kind: i64 = row.get("kind")?;
    let payload: Option<Vec<u8>> = row.get("payload")?;

    let body = match kind {
        DIFF_KIND_RESYNC => DiffBody::Resync,
        _ => DiffBody::Delta(Bytes::from(payload.unwrap_or_default())),
    };

    Ok(SubscriptionDiff {
        actor_id: actor_column(row, "actor_id")?,
        subscription_id: SubscriptionId::from_string(row.get::<_, String>("subscription_id")?),
        sequence: seq as u64,
        body,
        created_at: row.get("created_at")?,
    })
}

fn row_to_suspension(row: &Row<'_>) -> rusqlite::Result<SuspensionRecord> {
    let target: String = row.get("target")?;
    let subtarget: String = row.get("subtarget")?;

    Ok(SuspensionRecord {
        actor_id: actor_column(row, "actor_id")?,
        key: SuspensionKey::new(target, Some(&subtarget)),
        created_at: row.get("created_at")?,
    })
}

fn encode_cbor<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| StoreError::Serialization(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::from_reader(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn secret_holder(
    conn: &Connection,
    actor_id: &str,
    digest: &[u8],
) -> rusqlite::Result<Option<String>> {
    conn.query_row(
        "SELECT peer_id FROM trusts WHERE actor_id = ?1 AND secret_digest = ?2",
        params![actor_id, digest],
        |row| row.get(0),
    )
    .optional()
}

fn delete_subscription_rows(
    conn: &Connection,
    actor_id: &str,
    subscription_id: &str,
) -> rusqlite::Result<()> {
    conn.execute(
        "DELETE FROM subscription_diffs WHERE actor_id = ?1 AND subscription_id = ?2",
        params![actor_id, subscription_id],
    )?;
    conn.execute(
        "DELETE FROM subscriptions WHERE actor_id = ?1 AND subscription_id = ?2",
        params![actor_id, subscription_id],
    )?;
    Ok(())
}

#[async_trait]
impl Store for SqliteStore {
    // ─────────────────────────────────────────────────────────────────────────
    // Trusts
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_trust(&self, trust: &TrustRelationship) -> Result<InsertResult> {
        let trust = trust.clone();
        let features = encode_cbor(&trust.capabilities.peer_supported_features)?;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let actor = trust.actor_id.as_str();
            let peer = trust.peer_id.encode();
            let digest = trust.secret.digest();

            let existing: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM trusts WHERE actor_id = ?1 AND peer_id = ?2",
                    params![actor, peer],
                    |row| row.get(0),
                )
                .optional()?;
            if existing.is_some() {
                return Ok(InsertResult::AlreadyExists);
            }

            if secret_holder(&tx, actor, digest.as_bytes())?.is_some() {
                return Ok(InsertResult::SecretConflict);
            }

            tx.execute(
                "INSERT INTO trusts (
                    actor_id, peer_id, relationship_type, secret, secret_digest, base_uri,
                    connection_method, approved, peer_approved, verified, verification_token,
                    description, created_at, last_accessed_at, peer_protocol_version,
                    peer_features, capabilities_fetched_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
                params![
                    actor,
                    peer,
                    trust.relationship_type,
                    trust.secret.expose(),
                    digest.as_bytes().as_slice(),
                    trust.base_uri,
                    trust.connection_method.as_str(),
                    trust.approved,
                    trust.peer_approved,
                    trust.verified,
                    trust.verification_token,
                    trust.description,
                    trust.created_at,
                    trust.last_accessed_at,
                    trust.capabilities.peer_protocol_version,
                    features,
                    trust.capabilities.capabilities_fetched_at,
                ],
            )?;
            tx.commit()?;

            Ok(InsertResult::Inserted)
        })
        .await
    }

    async fn get_trust(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<Option<TrustRelationship>> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();

        self.run(move |conn| {
            let trust = conn
                .query_row(
                    &format!("SELECT {TRUST_COLUMNS} FROM trusts WHERE actor_id = ?1 AND peer_id = ?2"),
                    params![actor, peer],
                    row_to_trust,
                )
                .optional()?;
            Ok(trust)
        })
        .await
    }

    async fn update_trust(&self, trust: &TrustRelationship) -> Result<bool> {
        let trust = trust.clone();
        let features = encode_cbor(&trust.capabilities.peer_supported_features)?;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let actor = trust.actor_id.as_str();
            let peer = trust.peer_id.encode();
            let digest = trust.secret.digest();

            if let Some(holder) = secret_holder(&tx, actor, digest.as_bytes())? {
                if holder != peer {
                    return Err(StoreError::SecretConflict {
                        actor_id: actor.to_string(),
                    });
                }
            }

            let updated = tx.execute(
                "UPDATE trusts SET
                    relationship_type = ?3, secret = ?4, secret_digest = ?5, base_uri = ?6,
                    connection_method = ?7, approved = ?8, peer_approved = ?9, verified = ?10,
                    verification_token = ?11, description = ?12, created_at = ?13,
                    last_accessed_at = ?14, peer_protocol_version = ?15, peer_features = ?16,
                    capabilities_fetched_at = ?17
                 WHERE actor_id = ?1 AND peer_id = ?2",
                params![
                    actor,
                    peer,
                    trust.relationship_type,
                    trust.secret.expose(),
                    digest.as_bytes().as_slice(),
                    trust.base_uri,
                    trust.connection_method.as_str(),
                    trust.approved,
                    trust.peer_approved,
                    trust.verified,
                    trust.verification_token,
                    trust.description,
                    trust.created_at,
                    trust.last_accessed_at,
                    trust.capabilities.peer_protocol_version,
                    features,
                    trust.capabilities.capabilities_fetched_at,
                ],
            )?;
            tx.commit()?;

            Ok(updated > 0)
        })
        .await
    }

    async fn delete_trust(&self, actor_id: &ActorId, peer_id: &PeerId) -> Result<bool> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();

        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM trusts WHERE actor_id = ?1 AND peer_id = ?2",
                params![actor, peer],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_trusts(&self, actor_id: &ActorId) -> Result<Vec<TrustRelationship>> {
        let actor = actor_id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {TRUST_COLUMNS} FROM trusts WHERE actor_id = ?1 ORDER BY created_at, peer_id"
            ))?;
            let trusts = stmt
                .query_map(params![actor], row_to_trust)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(trusts)
        })
        .await
    }

    async fn find_trust_by_secret(
        &self,
        actor_id: &ActorId,
        secret: &BearerSecret,
    ) -> Result<Option<TrustRelationship>> {
        let actor = actor_id.to_string();
        let digest = secret.digest();

        self.run(move |conn| {
            let trust = conn
                .query_row(
                    &format!(
                        "SELECT {TRUST_COLUMNS} FROM trusts WHERE actor_id = ?1 AND secret_digest = ?2"
                    ),
                    params![actor, digest.as_bytes().as_slice()],
                    row_to_trust,
                )
                .optional()?;
            Ok(trust)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Permission Overrides
    // ─────────────────────────────────────────────────────────────────────────

    async fn get_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<Option<RuleSet>> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();

        self.run(move |conn| {
            let rules: Option<Vec<u8>> = conn
                .query_row(
                    "SELECT rules FROM permission_overrides WHERE actor_id = ?1 AND peer_id = ?2",
                    params![actor, peer],
                    |row| row.get(0),
                )
                .optional()?;
            rules.map(|bytes| decode_cbor(&bytes)).transpose()
        })
        .await
    }

    async fn put_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        rules: &RuleSet,
    ) -> Result<()> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();
        let rules = encode_cbor(rules)?;

        self.run(move |conn| {
            conn.execute(
                "INSERT INTO permission_overrides (actor_id, peer_id, rules, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(actor_id, peer_id) DO UPDATE SET
                    rules = excluded.rules,
                    updated_at = excluded.updated_at",
                params![actor, peer, rules, actorlink_core::now_millis()],
            )?;
            Ok(())
        })
        .await
    }

    async fn delete_permission_overrides(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<bool> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();

        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM permission_overrides WHERE actor_id = ?1 AND peer_id = ?2",
                params![actor, peer],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Subscriptions
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_subscription(&self, subscription: &Subscription) -> Result<InsertResult> {
        let sub = subscription.clone();

        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO subscriptions (
                    actor_id, peer_id, subscription_id, target, subtarget, resource,
                    granularity, sequence_counter, callback, created_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    sub.actor_id.as_str(),
                    sub.peer_id.encode(),
                    sub.subscription_id.as_str(),
                    sub.target,
                    sub.subtarget,
                    sub.resource,
                    sub.granularity.as_str(),
                    sub.sequence_counter as i64,
                    sub.callback,
                    sub.created_at,
                ],
            )?;

            Ok(if inserted > 0 {
                InsertResult::Inserted
            } else {
                InsertResult::AlreadyExists
            })
        })
        .await
    }

    async fn get_subscription(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();
        let id = subscription_id.to_string();

        self.run(move |conn| {
            let sub = conn
                .query_row(
                    &format!(
                        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                         WHERE actor_id = ?1 AND peer_id = ?2 AND subscription_id = ?3"
                    ),
                    params![actor, peer, id],
                    row_to_subscription,
                )
                .optional()?;
            Ok(sub)
        })
        .await
    }

    async fn find_subscription(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
    ) -> Result<Option<Subscription>> {
        let actor = actor_id.to_string();
        let id = subscription_id.to_string();

        self.run(move |conn| {
            let sub = conn
                .query_row(
                    &format!(
                        "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                         WHERE actor_id = ?1 AND subscription_id = ?2"
                    ),
                    params![actor, id],
                    row_to_subscription,
                )
                .optional()?;
            Ok(sub)
        })
        .await
    }

    async fn list_subscriptions(
        &self,
        actor_id: &ActorId,
        peer_id: Option<&PeerId>,
    ) -> Result<Vec<Subscription>> {
        let actor = actor_id.to_string();
        let peer = peer_id.map(PeerId::encode);

        self.run(move |conn| {
            let subs = if let Some(peer) = peer {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                     WHERE actor_id = ?1 AND peer_id = ?2
                     ORDER BY created_at, subscription_id"
                ))?;
                let subs = stmt
                    .query_map(params![actor, peer], row_to_subscription)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                subs
            } else {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {SUBSCRIPTION_COLUMNS} FROM subscriptions
                     WHERE actor_id = ?1
                     ORDER BY created_at, subscription_id"
                ))?;
                let subs = stmt
                    .query_map(params![actor], row_to_subscription)?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                subs
            };

            Ok(subs)
        })
        .await
    }

    async fn delete_subscription(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
        subscription_id: &SubscriptionId,
    ) -> Result<bool> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();
        let id = subscription_id.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let owned: Option<i64> = tx
                .query_row(
                    "SELECT 1 FROM subscriptions
                     WHERE actor_id = ?1 AND peer_id = ?2 AND subscription_id = ?3",
                    params![actor, peer, id],
                    |row| row.get(0),
                )
                .optional()?;
            if owned.is_none() {
                return Ok(false);
            }

            delete_subscription_rows(&tx, &actor, &id)?;
            tx.commit()?;
            Ok(true)
        })
        .await
    }

    async fn delete_subscriptions_for_peer(
        &self,
        actor_id: &ActorId,
        peer_id: &PeerId,
    ) -> Result<usize> {
        let actor = actor_id.to_string();
        let peer = peer_id.encode();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let ids: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT subscription_id FROM subscriptions WHERE actor_id = ?1 AND peer_id = ?2",
                )?;
                let ids = stmt
                    .query_map(params![actor, peer], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                ids
            };
            for id in &ids {
                delete_subscription_rows(&tx, &actor, id)?;
            }
            tx.commit()?;

            Ok(ids.len())
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Diffs
    // ─────────────────────────────────────────────────────────────────────────

    async fn append_diff(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        body: &DiffBody,
        created_at: i64,
    ) -> Result<SubscriptionDiff> {
        let actor_id = actor_id.clone();
        let subscription_id = subscription_id.clone();
        let body = body.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;

            let bumped = tx.execute(
                "UPDATE subscriptions SET sequence_counter = sequence_counter + 1
                 WHERE actor_id = ?1 AND subscription_id = ?2",
                params![actor_id.as_str(), subscription_id.as_str()],
            )?;
            if bumped == 0 {
                return Err(StoreError::NotFound(format!(
                    "subscription {subscription_id} of actor {actor_id}"
                )));
            }

            let seq: i64 = tx.query_row(
                "SELECT sequence_counter FROM subscriptions
                 WHERE actor_id = ?1 AND subscription_id = ?2",
                params![actor_id.as_str(), subscription_id.as_str()],
                |row| row.get(0),
            )?;

            let (kind, payload) = match &body {
                DiffBody::Delta(payload) => (DIFF_KIND_DELTA, Some(payload.to_vec())),
                DiffBody::Resync => (DIFF_KIND_RESYNC, None),
            };
            tx.execute(
                "INSERT INTO subscription_diffs (actor_id, subscription_id, seq, kind, payload, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    actor_id.as_str(),
                    subscription_id.as_str(),
                    seq,
                    kind,
                    payload,
                    created_at,
                ],
            )?;
            tx.commit()?;

            Ok(SubscriptionDiff {
                actor_id,
                subscription_id,
                sequence: seq as u64,
                body,
                created_at,
            })
        })
        .await
    }

    async fn get_diffs(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        from_seq: u64,
    ) -> Result<Vec<SubscriptionDiff>> {
        // Sequences are stored as i64; nothing lies beyond i64::MAX.
        let Ok(from_seq) = i64::try_from(from_seq) else {
            return Ok(Vec::new());
        };
        let actor = actor_id.to_string();
        let id = subscription_id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT actor_id, subscription_id, seq, kind, payload, created_at
                 FROM subscription_diffs
                 WHERE actor_id = ?1 AND subscription_id = ?2 AND seq >= ?3
                 ORDER BY seq",
            )?;
            let diffs = stmt
                .query_map(params![actor, id, from_seq], row_to_diff)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(diffs)
        })
        .await
    }

    async fn delete_diffs_through(
        &self,
        actor_id: &ActorId,
        subscription_id: &SubscriptionId,
        through: u64,
    ) -> Result<usize> {
        let actor = actor_id.to_string();
        let id = subscription_id.to_string();
        let through = i64::try_from(through).unwrap_or(i64::MAX);

        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM subscription_diffs
                 WHERE actor_id = ?1 AND subscription_id = ?2 AND seq <= ?3",
                params![actor, id, through],
            )?;
            Ok(deleted)
        })
        .await
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Suspensions
    // ─────────────────────────────────────────────────────────────────────────

    async fn insert_suspension(&self, record: &SuspensionRecord) -> Result<bool> {
        let record = record.clone();

        self.run(move |conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO suspensions (actor_id, target, subtarget, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    record.actor_id.as_str(),
                    record.key.target,
                    record.key.subtarget_str(),
                    record.created_at,
                ],
            )?;
            Ok(inserted > 0)
        })
        .await
    }

    async fn has_suspension(&self, actor_id: &ActorId, key: &SuspensionKey) -> Result<bool> {
        let actor = actor_id.to_string();
        let key = key.clone();

        self.run(move |conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM suspensions WHERE actor_id = ?1 AND target = ?2 AND subtarget = ?3",
                    params![actor, key.target, key.subtarget_str()],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
        .await
    }

    async fn delete_suspension(&self, actor_id: &ActorId, key: &SuspensionKey) -> Result<bool> {
        let actor = actor_id.to_string();
        let key = key.clone();

        self.run(move |conn| {
            let deleted = conn.execute(
                "DELETE FROM suspensions WHERE actor_id = ?1 AND target = ?2 AND subtarget = ?3",
                params![actor, key.target, key.subtarget_str()],
            )?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn list_suspensions(&self, actor_id: &ActorId) -> Result<Vec<SuspensionRecord>> {
        let actor = actor_id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT actor_id, target, subtarget, created_at FROM suspensions
                 WHERE actor_id = ?1 ORDER BY target, subtarget",
            )?;
            let records = stmt
                .query_map(params![actor], row_to_suspension)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(records)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actorlink_core::{ConnectionMethod, Granularity, SubscriptionRequest};
    use actorlink_perms::{AccessRule, Operation};

    fn actor() -> ActorId {
        ActorId::new("owner").unwrap()
    }

    fn trust(peer: PeerId) -> TrustRelationship {
        TrustRelationship {
            actor_id: actor(),
            peer_id: peer,
            relationship_type: "mcp_client".into(),
            secret: BearerSecret::generate(),
            base_uri: "https://client.example/cb".into(),
            connection_method: ConnectionMethod::OAuth,
            approved: true,
            peer_approved: false,
            verified: false,
            verification_token: Some("tok".into()),
            description: "desktop client".into(),
            created_at: 1_700_000_000_000,
            last_accessed_at: None,
            capabilities: CapabilitySnapshot {
                peer_protocol_version: Some("1.0".into()),
                peer_supported_features: ["subscriptions".to_string(), "trust".to_string()]
                    .into_iter()
                    .collect(),
                capabilities_fetched_at: Some(1_700_000_000_500),
            },
        }
    }

    #[tokio::test]
    async fn test_trust_columns_survive_storage() {
        let store = SqliteStore::open_memory().unwrap();
        let t = trust(PeerId::oauth2_client("user@example.org", "mcp_1"));

        assert_eq!(store.insert_trust(&t).await.unwrap(), InsertResult::Inserted);
        let back = store.get_trust(&actor(), &t.peer_id).await.unwrap().unwrap();
        assert_eq!(back, t);
    }

    #[tokio::test]
    async fn test_secret_conflict_on_insert() {
        let store = SqliteStore::open_memory().unwrap();
        let first = trust(PeerId::simple("b"));
        let mut second = trust(PeerId::simple("c"));
        second.secret = first.secret.clone();

        store.insert_trust(&first).await.unwrap();
        assert_eq!(
            store.insert_trust(&second).await.unwrap(),
            InsertResult::SecretConflict
        );
    }

    #[tokio::test]
    async fn test_overrides_stored_as_cbor() {
        let store = SqliteStore::open_memory().unwrap();
        let peer = PeerId::simple("b");
        let rules = RuleSet::new()
            .with(AccessRule::deny("properties/secret").unwrap())
            .with(AccessRule::allow("properties/*", [Operation::Read]).unwrap());

        store.put_permission_overrides(&actor(), &peer, &rules).await.unwrap();
        assert_eq!(
            store.get_permission_overrides(&actor(), &peer).await.unwrap(),
            Some(rules)
        );
        assert!(store.delete_permission_overrides(&actor(), &peer).await.unwrap());
        assert!(store.get_permission_overrides(&actor(), &peer).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_append_diff_requires_subscription() {
        let store = SqliteStore::open_memory().unwrap();
        let missing = SubscriptionId::from_string("nope");
        let err = store
            .append_diff(&actor(), &missing, &DiffBody::Resync, 0)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_resync_and_delta_bodies() {
        let store = SqliteStore::open_memory().unwrap();
        let sub = Subscription::from_request(
            actor(),
            PeerId::simple("b"),
            &SubscriptionRequest::new("properties", Granularity::Low),
            0,
        );
        store.insert_subscription(&sub).await.unwrap();

        store
            .append_diff(&actor(), &sub.subscription_id, &DiffBody::Delta(Bytes::from_static(b"{}")), 5)
            .await
            .unwrap();
        store
            .append_diff(&actor(), &sub.subscription_id, &DiffBody::Resync, 6)
            .await
            .unwrap();

        let diffs = store.get_diffs(&actor(), &sub.subscription_id, 1).await.unwrap();
        assert_eq!(diffs.len(), 2);
        assert_eq!(diffs[0].body, DiffBody::Delta(Bytes::from_static(b"{}")));
        assert!(diffs[1].body.is_resync());

        let stored = store.find_subscription(&actor(), &sub.subscription_id).await.unwrap().unwrap();
        assert_eq!(stored.sequence_counter, 2);
    }

    #[tokio::test]
    async fn test_reopen_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("actorlink.db");
        let t = trust(PeerId::simple("b"));

        {
            let store = SqliteStore::open(&path).unwrap();
            store.insert_trust(&t).await.unwrap();
            store
                .insert_suspension(&SuspensionRecord {
                    actor_id: actor(),
                    key: SuspensionKey::new("properties", Some("status")),
                    created_at: 1,
                })
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        assert!(store.find_trust_by_secret(&actor(), &t.secret).await.unwrap().is_some());
        assert!(store
            .has_suspension(&actor(), &SuspensionKey::new("properties", Some("status")))
            .await
            .unwrap());
    }
}
