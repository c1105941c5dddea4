//! Scheduled health checks of registry entries

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use relay_scheduler::Job;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::model::{HealthStatus, ModelPatch};
use crate::providers::{ChatRequest, Message, ProviderCaller};
use crate::registry::Registry;

/// Consecutive check failures at which an entry turns red
pub const DEFAULT_RED_THRESHOLD: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Ok,
    Failed,
}

/// One line of a check run report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckResult {
    pub id: String,
    pub status: CheckOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Sends a minimal request to every enabled entry and records the result.
///
/// Red entries are checked too, which is how they recover. Checks never rotate
/// keys or count towards daily usage.
#[derive(Clone)]
pub struct HealthChecker {
    registry: Registry,
    providers: Arc<dyn ProviderCaller>,
    red_threshold: u32,
}

impl HealthChecker {
    pub fn new(registry: Registry, providers: Arc<dyn ProviderCaller>) -> Self {
        Self {
            registry,
            providers,
            red_threshold: DEFAULT_RED_THRESHOLD,
        }
    }

    pub fn with_red_threshold(mut self, threshold: u32) -> Self {
        self.red_threshold = threshold;
        self
    }

    /// Check every enabled entry that has keys, sequentially
    pub async fn run_once(&self) -> Vec<CheckResult> {
        let entries = self.registry.list().await;
        let ping = ChatRequest::new(vec![Message::user("ping")]).with_feature("health-check");
        let mut results = Vec::new();

        for entry in entries.iter().filter(|e| e.enabled) {
            let Some((_, api_key)) = entry.current_key() else {
                debug!("Not checking {}: no API keys configured", entry.id);
                continue;
            };

            match self.providers.call(entry, &ping, api_key).await {
                Ok(_) => {
                    if entry.status != HealthStatus::Green || entry.error_count != 0 {
                        info!("Model {} recovered", entry.id);
                        let patch = ModelPatch {
                            status: Some(HealthStatus::Green),
                            error_count: Some(0),
                            ..Default::default()
                        };
                        self.registry.update(&entry.id, &patch).await;
                    }
                    results.push(CheckResult {
                        id: entry.id.clone(),
                        status: CheckOutcome::Ok,
                        error: None,
                    });
                }
                Err(e) => {
                    let error_count = entry.error_count + 1;
                    let status = if error_count >= self.red_threshold {
                        HealthStatus::Red
                    } else {
                        HealthStatus::Yellow
                    };
                    warn!("Health check failed for {} ({}): {}", entry.id, status, e);
                    let patch = ModelPatch {
                        status: Some(status),
                        error_count: Some(error_count),
                        last_error: Some(format!("Health Check: {}", e.message())),
                        ..Default::default()
                    };
                    self.registry.update(&entry.id, &patch).await;
                    results.push(CheckResult {
                        id: entry.id.clone(),
                        status: CheckOutcome::Failed,
                        error: Some(e.message().to_string()),
                    });
                }
            }
        }

        let failed = results
            .iter()
            .filter(|r| r.status == CheckOutcome::Failed)
            .count();
        info!("Health check complete: {} checked, {} failed", results.len(), failed);
        results
    }
}

#[async_trait]
impl Job for HealthChecker {
    fn name(&self) -> &str {
        "health-check"
    }

    async fn run(&self) -> Result<()> {
        self.run_once().await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ModelEntry, Provider};
    use crate::providers::test_support::ScriptedCaller;
    use crate::registry::InMemoryStore;

    fn entry(id: &str, keys: &[&str]) -> ModelEntry {
        let mut e = ModelEntry::new(id, id, Provider::Groq, "llama3-8b-8192");
        e.api_keys = keys.iter().map(|k| k.to_string()).collect();
        e
    }

    fn setup(
        entries: Vec<ModelEntry>,
        failing: &[&str],
    ) -> (HealthChecker, Arc<InMemoryStore>, Arc<ScriptedCaller>) {
        let store = Arc::new(InMemoryStore::new(entries));
        let caller = Arc::new(ScriptedCaller::failing(failing));
        let checker = HealthChecker::new(Registry::new(store.clone()), caller.clone());
        (checker, store, caller)
    }

    #[tokio::test]
    async fn test_check_uses_current_key_without_rotation() {
        let mut e = entry("A", &["k0", "k1"]);
        e.current_key_index = 3;
        e.used_today = 9;
        let (checker, store, caller) = setup(vec![e.clone()], &[]);

        let results = checker.run_once().await;
        assert_eq!(
            results,
            vec![CheckResult {
                id: "A".to_string(),
                status: CheckOutcome::Ok,
                error: None
            }]
        );
        assert_eq!(caller.calls(), vec![("A".to_string(), "k1".to_string())]);
        assert_eq!(store.get("A").await.unwrap(), e);
    }

    #[tokio::test]
    async fn test_check_recovers_red_entry() {
        let mut e = entry("A", &["k"]);
        e.status = HealthStatus::Red;
        e.error_count = 6;
        let (checker, store, _) = setup(vec![e], &[]);

        checker.run_once().await;
        let a = store.get("A").await.unwrap();
        assert_eq!(a.status, HealthStatus::Green);
        assert_eq!(a.error_count, 0);
    }

    #[tokio::test]
    async fn test_check_failure_escalates_to_red_at_threshold() {
        let mut e = entry("A", &["k"]);
        e.error_count = 1;
        let (checker, store, _) = setup(vec![e], &["A"]);

        let results = checker.run_once().await;
        assert_eq!(results[0].status, CheckOutcome::Failed);
        assert_eq!(results[0].error.as_deref(), Some("Groq Error 500: A is down"));
        let a = store.get("A").await.unwrap();
        assert_eq!(a.error_count, 2);
        assert_eq!(a.status, HealthStatus::Yellow);
        assert_eq!(a.last_error.as_deref(), Some("Health Check: Groq Error 500: A is down"));

        checker.run_once().await;
        let a = store.get("A").await.unwrap();
        assert_eq!(a.error_count, 3);
        assert_eq!(a.status, HealthStatus::Red);
        assert_eq!(a.used_today, 0);
        assert_eq!(a.current_key_index, 0);
    }

    #[tokio::test]
    async fn test_check_skips_disabled_and_keyless() {
        let mut off = entry("off", &["k"]);
        off.enabled = false;
        let (checker, _, caller) = setup(vec![off, entry("nokeys", &[]), entry("ok", &["k"])], &[]);

        let results = checker.run_once().await;
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "ok");
        assert_eq!(caller.calls().len(), 1);
    }

    #[test]
    fn test_check_result_serialization() {
        let json = serde_json::to_value(CheckResult {
            id: "A".to_string(),
            status: CheckOutcome::Failed,
            error: Some("boom".to_string()),
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"id": "A", "status": "failed", "error": "boom"}));

        let json = serde_json::to_value(CheckResult {
            id: "B".to_string(),
            status: CheckOutcome::Ok,
            error: None,
        })
        .unwrap();
        assert_eq!(json, serde_json::json!({"id": "B", "status": "ok"}));
    }

    #[tokio::test]
    async fn test_job_run_succeeds_even_when_checks_fail() {
        let (checker, _, _) = setup(vec![entry("A", &["k"])], &["A"]);
        assert_eq!(checker.name(), "health-check");
        assert!(checker.run().await.is_ok());
    }
}
