//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// CBOR column encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The record an operation depends on does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The secret is already assigned to a different relationship of the
    /// same actor.
    #[error("secret already in use by another relationship of actor {actor_id}")]
    SecretConflict { actor_id: String },

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// An in-memory lock was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    Poisoned,
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
