//! Database schema migrations for SQLite.
//!
//! We use a simple versioned migration system. Each migration is a SQL string
//! that transforms the schema from version N to N+1.

use actorlink_core::now_millis;
use rusqlite::Connection;

use crate::error::{Result, StoreError};

/// Current schema version.
pub const CURRENT_VERSION: u32 = 1;

/// Initialize or migrate the database schema.
///
/// This function is idempotent - it can be called multiple times safely.
pub fn migrate(conn: &mut Connection) -> Result<()> {
    // Create migrations table if it doesn't exist
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
        [],
    )?;

    let current: u32 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )?;

    // Apply migrations
    if current < CURRENT_VERSION {
        let tx = conn.transaction()?;

        for version in (current + 1)..=CURRENT_VERSION {
            apply_migration(&tx, version)?;

            tx.execute(
                "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
                rusqlite::params![version, now_millis()],
            )?;
        }

        tx.commit()?;
    }

    Ok(())
}

/// Apply a specific migration version.
fn apply_migration(conn: &Connection, version: u32) -> Result<()> {
    match version {
        1 => apply_v1(conn),
        _ => Err(StoreError::Migration(format!(
            "unknown migration version: {}",
            version
        ))),
    }
}

/// Migration v1: Initial schema.
fn apply_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Trust relationships, one row per (actor, peer)
        CREATE TABLE trusts (
            actor_id TEXT NOT NULL,
            peer_id TEXT NOT NULL,                -- canonical PeerId encoding
            relationship_type TEXT NOT NULL,
            secret TEXT NOT NULL,
            secret_digest BLOB NOT NULL,          -- 32 bytes, BLAKE3 of the secret
            base_uri TEXT NOT NULL,
            connection_method TEXT NOT NULL,
            approved INTEGER NOT NULL,
            peer_approved INTEGER NOT NULL,
            verified INTEGER NOT NULL,
            verification_token TEXT,
            description TEXT NOT NULL,
            created_at INTEGER NOT NULL,
            last_accessed_at INTEGER,
            peer_protocol_version TEXT,
            peer_features BLOB NOT NULL,          -- CBOR array of feature tags
            capabilities_fetched_at INTEGER,

            PRIMARY KEY (actor_id, peer_id),
            UNIQUE (actor_id, secret_digest)
        );

        -- Per-trust permission override rules
        CREATE TABLE permission_overrides (
            actor_id TEXT NOT NULL,
            peer_id TEXT NOT NULL,
            rules BLOB NOT NULL,                  -- CBOR RuleSet
            updated_at INTEGER NOT NULL,
            PRIMARY KEY (actor_id, peer_id)
        );

        -- Subscriptions held by peers on an actor's data
        CREATE TABLE subscriptions (
            actor_id TEXT NOT NULL,
            subscription_id TEXT NOT NULL,
            peer_id TEXT NOT NULL,
            target TEXT NOT NULL,
            subtarget TEXT NOT NULL DEFAULT '',
            resource TEXT NOT NULL DEFAULT '',
            granularity TEXT NOT NULL,
            sequence_counter INTEGER NOT NULL DEFAULT 0,
            callback INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            PRIMARY KEY (actor_id, subscription_id)
        );

        -- Ordered diff feed per subscription
        CREATE TABLE subscription_diffs (
            actor_id TEXT NOT NULL,
            subscription_id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            kind INTEGER NOT NULL,                -- 0=delta, 1=resync
            payload BLOB,                         -- NULL for resync
            created_at INTEGER NOT NULL,
            PRIMARY KEY (actor_id, subscription_id, seq)
        );

        -- Suspended (target, subtarget) keys; '' is the bare-target key
        CREATE TABLE suspensions (
            actor_id TEXT NOT NULL,
            target TEXT NOT NULL,
            subtarget TEXT NOT NULL DEFAULT '',
            created_at INTEGER NOT NULL,
            PRIMARY KEY (actor_id, target, subtarget)
        );

        -- Indexes for common queries
        CREATE INDEX idx_trusts_base_uri ON trusts(actor_id, base_uri);
        CREATE INDEX idx_subscriptions_peer ON subscriptions(actor_id, peer_id);
        CREATE INDEX idx_subscriptions_target ON subscriptions(actor_id, target, subtarget);
        "#,
    )?;

    Ok(())
}
