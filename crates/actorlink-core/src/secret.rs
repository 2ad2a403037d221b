//! Bearer secrets and their index digests.
//!
//! A secret is the sole credential a peer presents on every authenticated
//! call. Secrets are opaque hex strings drawn from the OS-seeded thread RNG.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Number of random bytes in a freshly generated secret (160 bits).
pub const SECRET_BYTES: usize = 20;

/// Domain separator for secret digests.
const DIGEST_DOMAIN: &[u8] = b"actorlink-secret-v1:";

/// An opaque, unguessable bearer token.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BearerSecret(String);

impl BearerSecret {
    /// Generate a fresh secret.
    pub fn generate() -> Self {
        use rand::RngCore;
        let mut bytes = [0u8; SECRET_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// Wrap a secret received from a peer or presented by a caller.
    pub fn from_string(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// The raw token, as it travels in an Authorization header.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Digest used as the key of the secret reverse index.
    pub fn digest(&self) -> SecretDigest {
        let mut hasher = blake3::Hasher::new();
        hasher.update(DIGEST_DOMAIN);
        hasher.update(self.0.as_bytes());
        SecretDigest(*hasher.finalize().as_bytes())
    }
}

impl fmt::Debug for BearerSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerSecret(<redacted>)")
    }
}

/// BLAKE3 digest of a bearer secret.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct SecretDigest(pub [u8; 32]);

impl SecretDigest {
    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretDigest({})", &self.to_hex()[..16])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_secret_has_160_bits() {
        let secret = BearerSecret::generate();
        assert_eq!(secret.expose().len(), SECRET_BYTES * 2);
        assert!(secret.expose().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_secrets_do_not_repeat() {
        let secrets: std::collections::HashSet<String> = (0..256)
            .map(|_| BearerSecret::generate().expose().to_string())
            .collect();
        assert_eq!(secrets.len(), 256);
    }

    #[test]
    fn test_digest_is_stable() {
        let a = BearerSecret::from_string("s3cr3t-token");
        let b = BearerSecret::from_string("s3cr3t-token");
        assert_eq!(a.digest(), b.digest());
        assert_ne!(a.digest(), BearerSecret::from_string("other").digest());
    }

    #[test]
    fn test_debug_redacts() {
        let secret = BearerSecret::from_string("s3cr3t-token");
        assert!(!format!("{:?}", secret).contains("s3cr3t"));
    }
}
