//! OAuth2 client registry contract.
//!
//! Actors may hold trust relationships with dynamically registered OAuth2
//! clients. Deleting such a relationship must also revoke the client's
//! credential at the issuer, which this contract abstracts.

use async_trait::async_trait;

use crate::error::RegistryError;

/// Revokes dynamically registered OAuth2 clients.
#[async_trait]
pub trait OAuth2ClientRegistry: Send + Sync {
    /// Delete the client and invalidate its credentials.
    ///
    /// Returns `false` if the registry did not know the client.
    async fn delete_client(&self, client_id: &str) -> Result<bool, RegistryError>;
}

/// An in-memory client registry for testing.
pub mod memory {
    use super::*;
    use std::collections::BTreeSet;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::RwLock;

    /// Registry backed by a set of client ids.
    #[derive(Default)]
    pub struct MemoryClientRegistry {
        clients: RwLock<BTreeSet<String>>,
        unavailable: AtomicBool,
    }

    impl MemoryClientRegistry {
        /// Create an empty registry.
        pub fn new() -> Self {
            Self::default()
        }

        /// Register a client id.
        pub async fn register_client(&self, client_id: impl Into<String>) {
            self.clients.write().await.insert(client_id.into());
        }

        /// Whether a client id is registered.
        pub async fn contains(&self, client_id: &str) -> bool {
            self.clients.read().await.contains(client_id)
        }

        /// Make every call fail with [`RegistryError::Unavailable`].
        pub fn set_unavailable(&self, unavailable: bool) {
            self.unavailable.store(unavailable, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl OAuth2ClientRegistry for MemoryClientRegistry {
        async fn delete_client(&self, client_id: &str) -> Result<bool, RegistryError> {
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(RegistryError::Unavailable("registry offline".into()));
            }
            Ok(self.clients.write().await.remove(client_id))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryClientRegistry;
    use super::*;

    #[tokio::test]
    async fn test_delete_client() {
        let registry = MemoryClientRegistry::new();
        registry.register_client("mcp_1").await;

        assert!(registry.delete_client("mcp_1").await.unwrap());
        assert!(!registry.contains("mcp_1").await);
        assert!(!registry.delete_client("mcp_1").await.unwrap());
    }

    #[tokio::test]
    async fn test_unavailable_registry() {
        let registry = MemoryClientRegistry::new();
        registry.register_client("mcp_1").await;
        registry.set_unavailable(true);

        assert!(matches!(
            registry.delete_client("mcp_1").await,
            Err(RegistryError::Unavailable(_))
        ));
        assert!(registry.contains("mcp_1").await);
    }
}
