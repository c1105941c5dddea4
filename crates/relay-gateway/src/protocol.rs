//! JSON bodies exchanged over the gateway endpoints

use std::collections::BTreeMap;

use relay_core::{CheckResult, HealthStatus, ModelEntry};
use serde::{Deserialize, Serialize};

pub const ERR_METHOD_NOT_ALLOWED: &str = "Method not allowed";
pub const ERR_INVALID_REQUEST: &str = "Invalid request";
pub const ERR_INTERNAL: &str = "Internal Server Error";
pub const ERR_NOT_FOUND: &str = "Not found";

/// Error body. `detail` and `lastError` only appear when there is something
/// to say.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(rename = "lastError", default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: None,
            last_error: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_last_error(mut self, last_error: Option<String>) -> Self {
        self.last_error = last_error;
        self
    }
}

/// Body of a check run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckReport {
    pub success: bool,
    pub results: Vec<CheckResult>,
}

/// Body of a seed run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeedReport {
    pub success: bool,
    pub count: usize,
}

/// Registry listing with keys masked
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelList {
    pub backend: String,
    pub models: Vec<ModelEntry>,
}

/// Gateway status summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub status: String,
    pub backend: String,
    pub started_at: String,
    pub uptime_secs: u64,
    pub models: ModelCounts,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelCounts {
    pub total: usize,
    pub enabled: usize,
    /// Entry count per health status ("green", "yellow", "red")
    pub by_status: BTreeMap<String, usize>,
}

impl ModelCounts {
    pub fn tally(entries: &[ModelEntry]) -> Self {
        let mut by_status: BTreeMap<String, usize> =
            [HealthStatus::Green, HealthStatus::Yellow, HealthStatus::Red]
                .iter()
                .map(|s| (s.to_string(), 0))
                .collect();
        for e in entries {
            *by_status.entry(e.status.to_string()).or_default() += 1;
        }
        Self {
            total: entries.len(),
            enabled: entries.iter().filter(|e| e.enabled).count(),
            by_status,
        }
    }
}
