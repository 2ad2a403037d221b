//! Suspension keys.
//!
//! A suspension pauses diff registration for one `(target, subtarget)` key.
//! The bare-target key and each target+subtarget key are distinct: suspending
//! `properties` does not suspend `properties:status`.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ids::ActorId;

/// Key of a suspension, encoded as `target` or `target:subtarget`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SuspensionKey {
    pub target: String,
    pub subtarget: Option<String>,
}

impl SuspensionKey {
    /// Build a key. An empty subtarget is the same as no subtarget.
    pub fn new(target: impl Into<String>, subtarget: Option<&str>) -> Self {
        Self {
            target: target.into(),
            subtarget: subtarget.filter(|s| !s.is_empty()).map(str::to_string),
        }
    }

    /// The key a subscription's `(target, subtarget)` is checked against.
    pub fn for_subscription(target: &str, subtarget: &str) -> Self {
        Self::new(target, Some(subtarget))
    }

    /// The subtarget, or `""` for a bare-target key.
    pub fn subtarget_str(&self) -> &str {
        self.subtarget.as_deref().unwrap_or("")
    }

    /// Canonical encoding.
    pub fn encode(&self) -> String {
        match &self.subtarget {
            Some(subtarget) => format!("{}:{}", self.target, subtarget),
            None => self.target.clone(),
        }
    }
}

impl fmt::Display for SuspensionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// A stored suspension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuspensionRecord {
    pub actor_id: ActorId,
    pub key: SuspensionKey,
    /// Unix ms.
    pub created_at: i64,
}
