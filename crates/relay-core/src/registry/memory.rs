//! In-process model store

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::model::{ModelEntry, ModelPatch};

use super::ModelStore;

/// Keeps entries in memory, in insertion order. Used for tests and for
/// ephemeral deployments seeded at startup.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    entries: RwLock<Vec<ModelEntry>>,
}

impl InMemoryStore {
    pub fn new(entries: Vec<ModelEntry>) -> Self {
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Snapshot of one entry
    pub async fn get(&self, id: &str) -> Option<ModelEntry> {
        self.entries.read().await.iter().find(|e| e.id == id).cloned()
    }
}

#[async_trait]
impl ModelStore for InMemoryStore {
    fn backend_name(&self) -> &str {
        "memory"
    }

    async fn list(&self) -> Result<Vec<ModelEntry>> {
        Ok(self.entries.read().await.clone())
    }

    async fn update(&self, id: &str, patch: &ModelPatch) -> Result<()> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or_else(|| anyhow!("No model entry with id '{}'", id))?;
        patch.apply_to(entry);
        Ok(())
    }

    async fn replace_all(&self, entries: &[ModelEntry]) -> Result<()> {
        *self.entries.write().await = entries.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provider;

    #[tokio::test]
    async fn test_update_unknown_id_fails() {
        let store = InMemoryStore::default();
        let result = store.update("missing", &ModelPatch::default()).await;
        assert!(result.is_err());
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_replace_all_keeps_order() {
        let store = InMemoryStore::default();
        store
            .replace_all(&[
                ModelEntry::new("b", "B", Provider::Groq, "m"),
                ModelEntry::new("a", "A", Provider::Groq, "m"),
            ])
            .await
            .unwrap();
        let ids: Vec<String> = store.list().await.unwrap().into_iter().map(|e| e.id).collect();
        assert_eq!(ids, vec!["b", "a"]);
        assert!(store.get("a").await.is_some());
    }
}
