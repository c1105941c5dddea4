//! Failover router with per-entry key rotation and health bookkeeping

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::model::{HealthStatus, ModelEntry, ModelPatch};
use crate::providers::{ChatCompletion, ChatRequest, ProviderCaller, ProviderError};
use crate::registry::Registry;

/// Consecutive live failures an entry may accumulate before it turns red
pub const DEFAULT_ERROR_THRESHOLD: u32 = 5;

#[derive(Debug, Clone, Error)]
pub enum RouteError {
    /// Nothing enabled and non-red in the registry
    #[error("No AI models available. Please contact admin.")]
    NoProviders,

    /// Every candidate was skipped or failed. `last_error` is absent when
    /// nothing was actually called.
    #[error("All AI providers failed")]
    AllProvidersFailed { last_error: Option<ProviderError> },
}

impl RouteError {
    /// Message of the last provider failure, if any provider was called
    pub fn last_error_message(&self) -> Option<&str> {
        match self {
            Self::AllProvidersFailed {
                last_error: Some(e),
            } => Some(e.message()),
            _ => None,
        }
    }
}

/// Entries eligible for routing, in attempt order: enabled and not red,
/// stable-sorted by ascending priority.
pub fn select_candidates(entries: Vec<ModelEntry>) -> Vec<ModelEntry> {
    let mut candidates: Vec<ModelEntry> =
        entries.into_iter().filter(|e| e.is_candidate()).collect();
    candidates.sort_by_key(|e| e.priority);
    candidates
}

/// Routes a chat request across registry entries, one at a time, until one
/// succeeds.
#[derive(Clone)]
pub struct FailoverRouter {
    registry: Registry,
    providers: Arc<dyn ProviderCaller>,
    error_threshold: u32,
}

impl FailoverRouter {
    pub fn new(registry: Registry, providers: Arc<dyn ProviderCaller>) -> Self {
        Self {
            registry,
            providers,
            error_threshold: DEFAULT_ERROR_THRESHOLD,
        }
    }

    /// Entries turn red once their error count exceeds `threshold`
    pub fn with_error_threshold(mut self, threshold: u32) -> Self {
        self.error_threshold = threshold;
        self
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Send `request` to the first candidate that succeeds
    pub async fn route(&self, request: &ChatRequest) -> Result<ChatCompletion, RouteError> {
        let candidates = select_candidates(self.registry.list().await);
        if candidates.is_empty() {
            warn!("No routable AI models in registry");
            return Err(RouteError::NoProviders);
        }

        debug!(
            "Routing '{}' request across {} candidates",
            request.feature,
            candidates.len()
        );

        let mut last_error = None;

        for (idx, entry) in candidates.iter().enumerate() {
            let Some((key_index, api_key)) = entry.current_key() else {
                debug!("Skipping {}: no API keys configured", entry.id);
                continue;
            };

            debug!(
                "Trying {} ({}/{}) with key {} ({}/{})",
                entry.id,
                entry.provider,
                entry.model_id,
                key_index,
                idx + 1,
                candidates.len()
            );

            match self.providers.call(entry, request, api_key).await {
                Ok(completion) => {
                    if idx > 0 {
                        info!("Request succeeded on failover model {}", entry.id);
                    }
                    self.record_success(entry, key_index).await;
                    return Ok(completion);
                }
                Err(e) => {
                    warn!("Model {} failed: {}", entry.id, e);
                    self.record_failure(entry, &e).await;
                    last_error = Some(e);
                }
            }
        }

        Err(RouteError::AllProvidersFailed { last_error })
    }

    async fn record_success(&self, entry: &ModelEntry, key_index: usize) {
        let patch = ModelPatch {
            current_key_index: Some((key_index + 1) % entry.api_keys.len()),
            used_today: Some(entry.used_today + 1),
            status: Some(HealthStatus::Green),
            error_count: Some(0),
            ..Default::default()
        };
        self.registry.update(&entry.id, &patch).await;
    }

    async fn record_failure(&self, entry: &ModelEntry, error: &ProviderError) {
        let error_count = entry.error_count + 1;
        let status = if error_count > self.error_threshold {
            HealthStatus::Red
        } else {
            HealthStatus::Yellow
        };
        if status == HealthStatus::Red {
            warn!("Model {} marked red after {} consecutive failures", entry.id, error_count);
        }
        let patch = ModelPatch {
            error_count: Some(error_count),
            status: Some(status),
            last_error: Some(error.message().to_string()),
            ..Default::default()
        };
        self.registry.update(&entry.id, &patch).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provider;
    use crate::providers::Message;
    use crate::providers::test_support::ScriptedCaller;
    use crate::registry::{InMemoryStore, ModelStore};
    use anyhow::Result;
    use async_trait::async_trait;

    fn entry(id: &str, priority: i64, keys: &[&str]) -> ModelEntry {
        let mut e = ModelEntry::new(id, id, Provider::OpenAi, "gpt-4o");
        e.priority = priority;
        e.api_keys = keys.iter().map(|k| k.to_string()).collect();
        e
    }

    fn request() -> ChatRequest {
        ChatRequest::new(vec![Message::user("hello")])
    }

    fn setup(
        entries: Vec<ModelEntry>,
        failing: &[&str],
    ) -> (FailoverRouter, Arc<InMemoryStore>, Arc<ScriptedCaller>) {
        let store = Arc::new(InMemoryStore::new(entries));
        let caller = Arc::new(ScriptedCaller::failing(failing));
        let router = FailoverRouter::new(Registry::new(store.clone()), caller.clone());
        (router, store, caller)
    }

    #[test]
    fn test_select_candidates_filters_and_sorts_stably() {
        let mut disabled = entry("disabled", 0, &["k"]);
        disabled.enabled = false;
        let mut red = entry("red", 0, &["k"]);
        red.status = HealthStatus::Red;
        let mut yellow = entry("yellow", 2, &["k"]);
        yellow.status = HealthStatus::Yellow;

        let ids: Vec<String> = select_candidates(vec![
            entry("c", 3, &["k"]),
            yellow,
            disabled,
            entry("a", 1, &["k"]),
            red,
            entry("b", 2, &["k"]),
        ])
        .into_iter()
        .map(|e| e.id)
        .collect();
        assert_eq!(ids, vec!["a", "yellow", "b", "c"]);
    }

    #[tokio::test]
    async fn test_failover_to_second_candidate() {
        let (router, store, caller) = setup(
            vec![entry("A", 1, &["a1"]), entry("B", 2, &["b1"])],
            &["A"],
        );

        let completion = router.route(&request()).await.unwrap();
        assert_eq!(completion.text(), Some("from B"));
        assert_eq!(caller.calls().len(), 2);

        let a = store.get("A").await.unwrap();
        assert_eq!(a.error_count, 1);
        assert_eq!(a.status, HealthStatus::Yellow);
        assert_eq!(a.last_error.as_deref(), Some("OpenAI Error 500: A is down"));

        let b = store.get("B").await.unwrap();
        assert_eq!(b.current_key_index, 0);
        assert_eq!(b.used_today, 1);
        assert_eq!(b.status, HealthStatus::Green);
    }

    #[tokio::test]
    async fn test_success_rotates_key_and_resets_health() {
        let mut e = entry("A", 1, &["k0", "k1", "k2"]);
        e.current_key_index = 7;
        e.error_count = 3;
        e.status = HealthStatus::Yellow;
        e.used_today = 10;
        let (router, store, caller) = setup(vec![e], &[]);

        router.route(&request()).await.unwrap();
        assert_eq!(caller.calls(), vec![("A".to_string(), "k1".to_string())]);

        let a = store.get("A").await.unwrap();
        assert_eq!(a.current_key_index, 2);
        assert_eq!(a.used_today, 11);
        assert_eq!(a.error_count, 0);
        assert_eq!(a.status, HealthStatus::Green);

        router.route(&request()).await.unwrap();
        router.route(&request()).await.unwrap();
        assert_eq!(store.get("A").await.unwrap().current_key_index, 1);
    }

    #[tokio::test]
    async fn test_single_key_index_stays_zero() {
        let (router, store, _) = setup(vec![entry("A", 1, &["only"])], &[]);
        router.route(&request()).await.unwrap();
        assert_eq!(store.get("A").await.unwrap().current_key_index, 0);
    }

    #[tokio::test]
    async fn test_turns_red_only_after_threshold_exceeded() {
        let mut e = entry("A", 1, &["k"]);
        e.error_count = 4;
        let (router, store, _) = setup(vec![e], &["A"]);

        let err = router.route(&request()).await.unwrap_err();
        assert!(matches!(err, RouteError::AllProvidersFailed { .. }));
        let a = store.get("A").await.unwrap();
        assert_eq!(a.error_count, 5);
        assert_eq!(a.status, HealthStatus::Yellow);

        router.route(&request()).await.unwrap_err();
        let a = store.get("A").await.unwrap();
        assert_eq!(a.error_count, 6);
        assert_eq!(a.status, HealthStatus::Red);

        let err = router.route(&request()).await.unwrap_err();
        assert!(matches!(err, RouteError::NoProviders));
    }

    #[tokio::test]
    async fn test_custom_error_threshold() {
        let mut e = entry("A", 1, &["k"]);
        e.error_count = 1;
        let (router, store, _) = setup(vec![e], &["A"]);
        let router = router.with_error_threshold(1);
        router.route(&request()).await.unwrap_err();
        assert_eq!(store.get("A").await.unwrap().status, HealthStatus::Red);
    }

    #[tokio::test]
    async fn test_no_candidates_makes_no_calls() {
        let mut red = entry("A", 1, &["k"]);
        red.status = HealthStatus::Red;
        let mut off = entry("B", 1, &["k"]);
        off.enabled = false;
        let (router, _, caller) = setup(vec![red, off], &[]);

        let err = router.route(&request()).await.unwrap_err();
        assert!(matches!(err, RouteError::NoProviders));
        assert_eq!(err.to_string(), "No AI models available. Please contact admin.");
        assert!(caller.calls().is_empty());
    }

    #[tokio::test]
    async fn test_zero_key_entry_skipped_without_mutation() {
        let (router, store, caller) = setup(
            vec![entry("empty", 0, &[]), entry("B", 1, &["b"])],
            &[],
        );
        let completion = router.route(&request()).await.unwrap();
        assert_eq!(completion.text(), Some("from B"));
        assert_eq!(caller.calls().len(), 1);

        let empty = store.get("empty").await.unwrap();
        assert_eq!(empty, entry("empty", 0, &[]));
    }

    #[tokio::test]
    async fn test_all_skipped_has_no_last_error() {
        let (router, _, caller) = setup(vec![entry("empty", 0, &[])], &[]);
        let err = router.route(&request()).await.unwrap_err();
        match &err {
            RouteError::AllProvidersFailed { last_error } => assert!(last_error.is_none()),
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.last_error_message().is_none());
        assert!(caller.calls().is_empty());
    }

    #[tokio::test]
    async fn test_all_failed_carries_last_error() {
        let (router, _, caller) = setup(
            vec![entry("A", 1, &["a"]), entry("B", 2, &["b"])],
            &["A", "B"],
        );
        let err = router.route(&request()).await.unwrap_err();
        assert_eq!(err.to_string(), "All AI providers failed");
        assert_eq!(err.last_error_message(), Some("OpenAI Error 500: B is down"));
        let order: Vec<String> = caller.calls().into_iter().map(|(id, _)| id).collect();
        assert_eq!(order, vec!["A", "B"]);
    }

    /// Store whose reads work but whose writes always fail
    struct ReadOnlyStore(InMemoryStore);

    #[async_trait]
    impl ModelStore for ReadOnlyStore {
        fn backend_name(&self) -> &str {
            "read-only"
        }
        async fn list(&self) -> Result<Vec<ModelEntry>> {
            self.0.list().await
        }
        async fn update(&self, _id: &str, _patch: &ModelPatch) -> Result<()> {
            anyhow::bail!("permission denied")
        }
        async fn replace_all(&self, _entries: &[ModelEntry]) -> Result<()> {
            anyhow::bail!("permission denied")
        }
    }

    #[tokio::test]
    async fn test_update_failures_do_not_change_outcome() {
        let store = Arc::new(ReadOnlyStore(InMemoryStore::new(vec![
            entry("A", 1, &["a"]),
            entry("B", 2, &["b"]),
        ])));
        let caller = Arc::new(ScriptedCaller::failing(&["A"]));
        let router = FailoverRouter::new(Registry::new(store), caller);

        let completion = router.route(&request()).await.unwrap();
        assert_eq!(completion.text(), Some("from B"));
    }
}
