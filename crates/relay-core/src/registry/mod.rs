//! Model registry access
//!
//! The registry lives in an external store behind [`ModelStore`]. The
//! [`Registry`] accessor wraps a store and absorbs its failures: an
//! unreachable store reads as empty and updates become no-ops, so the gateway
//! degrades to "no providers available" instead of erroring.

pub mod memory;
pub mod rtdb;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::model::{ModelEntry, ModelPatch};

pub use memory::InMemoryStore;
pub use rtdb::RtdbStore;
pub use sqlite::SqliteStore;

/// Storage backend for model entries.
///
/// `update` writes only the fields present in the patch (last write wins per
/// field). Implementations must not create entries from `update`.
#[async_trait]
pub trait ModelStore: Send + Sync {
    /// Backend label for logs (e.g. "sqlite")
    fn backend_name(&self) -> &str;

    /// All entries in registry order
    async fn list(&self) -> Result<Vec<ModelEntry>>;

    /// Apply a partial update to one entry
    async fn update(&self, id: &str, patch: &ModelPatch) -> Result<()>;

    /// Replace the whole registry
    async fn replace_all(&self, entries: &[ModelEntry]) -> Result<()>;
}

/// Failure-tolerant accessor shared by the router, checker and gateway
#[derive(Clone)]
pub struct Registry {
    store: Arc<dyn ModelStore>,
}

impl Registry {
    pub fn new(store: Arc<dyn ModelStore>) -> Self {
        Self { store }
    }

    pub fn backend_name(&self) -> &str {
        self.store.backend_name()
    }

    /// All entries, or none if the store cannot be read
    pub async fn list(&self) -> Vec<ModelEntry> {
        match self.store.list().await {
            Ok(entries) => {
                debug!("Loaded {} model entries from {}", entries.len(), self.backend_name());
                entries
            }
            Err(e) => {
                warn!("Error fetching AI models from {}: {:#}", self.backend_name(), e);
                Vec::new()
            }
        }
    }

    /// Best-effort partial update; failures are logged and swallowed
    pub async fn update(&self, id: &str, patch: &ModelPatch) {
        if patch.is_empty() {
            return;
        }
        if let Err(e) = self.store.update(id, patch).await {
            warn!("Error updating AI model {}: {:#}", id, e);
        }
    }

    /// Replace the registry. Errors are returned so seeding can report them.
    pub async fn replace_all(&self, entries: &[ModelEntry]) -> Result<()> {
        self.store.replace_all(entries).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{HealthStatus, Provider};

    struct BrokenStore;

    #[async_trait]
    impl ModelStore for BrokenStore {
        fn backend_name(&self) -> &str {
            "broken"
        }
        async fn list(&self) -> Result<Vec<ModelEntry>> {
            anyhow::bail!("connection refused")
        }
        async fn update(&self, _id: &str, _patch: &ModelPatch) -> Result<()> {
            anyhow::bail!("connection refused")
        }
        async fn replace_all(&self, _entries: &[ModelEntry]) -> Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    #[tokio::test]
    async fn test_unreachable_store_reads_empty() {
        let registry = Registry::new(Arc::new(BrokenStore));
        assert!(registry.list().await.is_empty());
        registry
            .update(
                "x",
                &ModelPatch {
                    error_count: Some(1),
                    ..Default::default()
                },
            )
            .await;
        assert!(registry.replace_all(&[]).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_passes_through_to_store() {
        let store = Arc::new(InMemoryStore::new(vec![ModelEntry::new(
            "a",
            "A",
            Provider::OpenAi,
            "gpt-4o",
        )]));
        let registry = Registry::new(store.clone());
        registry
            .update(
                "a",
                &ModelPatch {
                    status: Some(HealthStatus::Yellow),
                    ..Default::default()
                },
            )
            .await;
        let entries = registry.list().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].status, HealthStatus::Yellow);
        assert_eq!(registry.backend_name(), "memory");
    }
}
