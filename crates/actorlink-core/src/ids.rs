//! Identifiers: actors, peers, and subscriptions.
//!
//! All identifiers are newtypes (or sum types) so that an actor id can never
//! be passed where a peer id is expected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Prefix that marks the canonical encoding of an OAuth2 client peer.
pub const OAUTH2_CLIENT_PREFIX: &str = "oauth2-client:";

/// Identity of an actor hosted by this node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActorId(String);

impl ActorId {
    /// Create an actor id, rejecting empty strings.
    pub fn new(id: impl Into<String>) -> Result<Self, CoreError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(CoreError::InvalidActorId("empty".into()));
        }
        Ok(Self(id))
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The peer id other actors use to refer to this actor.
    pub fn as_peer(&self) -> PeerId {
        PeerId::Simple(self.0.clone())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActorId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Identity of a peer as seen from the local actor.
///
/// A peer is either another actor (`Simple`) or a dynamically registered
/// OAuth2 client that was granted a trust relationship on behalf of a human
/// user. The canonical string form is used at the storage boundary:
///
/// ```text
/// Simple("a1b2")                      -> "a1b2"
/// OAuth2Client { "u@x.org", "c-42" }  -> "oauth2-client:u@x.org:c-42"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeerId {
    /// Another actor, identified by its actor id.
    Simple(String),
    /// An OAuth2 client registered dynamically for a user.
    OAuth2Client {
        /// Email of the user that authorized the client.
        email: String,
        /// Issuer-assigned client id.
        client_id: String,
    },
}

impl PeerId {
    /// Create a simple peer id.
    pub fn simple(id: impl Into<String>) -> Self {
        PeerId::Simple(id.into())
    }

    /// Create an OAuth2 client peer id.
    pub fn oauth2_client(email: impl Into<String>, client_id: impl Into<String>) -> Self {
        PeerId::OAuth2Client {
            email: email.into(),
            client_id: client_id.into(),
        }
    }

    /// Canonical string encoding.
    pub fn encode(&self) -> String {
        match self {
            PeerId::Simple(id) => id.clone(),
            PeerId::OAuth2Client { email, client_id } => {
                format!("{OAUTH2_CLIENT_PREFIX}{email}:{client_id}")
            }
        }
    }

    /// Parse the canonical string encoding.
    pub fn parse(s: &str) -> Result<Self, CoreError> {
        if s.is_empty() {
            return Err(CoreError::InvalidPeerId("empty".into()));
        }

        let Some(rest) = s.strip_prefix(OAUTH2_CLIENT_PREFIX) else {
            return Ok(PeerId::Simple(s.to_string()));
        };

        // The client id is the last segment; emails do not carry ':'.
        match rest.rsplit_once(':') {
            Some((email, client_id)) if !email.is_empty() && !client_id.is_empty() => {
                Ok(PeerId::OAuth2Client {
                    email: email.to_string(),
                    client_id: client_id.to_string(),
                })
            }
            _ => Err(CoreError::InvalidPeerId(s.to_string())),
        }
    }

    /// The OAuth2 client id, if this peer is a registered client.
    pub fn oauth2_client_id(&self) -> Option<&str> {
        match self {
            PeerId::OAuth2Client { client_id, .. } => Some(client_id),
            PeerId::Simple(_) => None,
        }
    }

    /// Whether this peer is another actor.
    pub fn is_actor(&self) -> bool {
        matches!(self, PeerId::Simple(_))
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl FromStr for PeerId {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PeerId {
    type Error = CoreError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<PeerId> for String {
    fn from(peer: PeerId) -> Self {
        peer.encode()
    }
}

/// Identifier of a subscription, unique within the owning actor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubscriptionId(String);

impl SubscriptionId {
    /// Generate a fresh random subscription id (16 bytes, hex).
    pub fn generate() -> Self {
        use rand::Rng;
        let bytes: [u8; 16] = rand::thread_rng().gen();
        Self(hex::encode(bytes))
    }

    /// Wrap an existing id.
    pub fn from_string(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw id.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
