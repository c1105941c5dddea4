use anyhow::{Context, Result};
use relay_core::model::mask_secret;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub router: RouterConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub client: ClientConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    #[default]
    Sqlite,
    Rtdb,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_store_path")]
    pub path: String,
    #[serde(default)]
    pub database_url: String,
    #[serde(default)]
    pub auth_token: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("backend", &self.backend)
            .field("path", &self.path)
            .field("database_url", &self.database_url)
            .field("auth_token", &mask_secret(&self.auth_token))
            .finish()
    }
}

fn default_store_path() -> String {
    "~/.relay/registry.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: default_store_path(),
            database_url: String::new(),
            auth_token: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouterConfig {
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u32,
}

fn default_error_threshold() -> u32 {
    relay_core::router::DEFAULT_ERROR_THRESHOLD
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            error_threshold: default_error_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthConfig {
    #[serde(default = "default_health_enabled")]
    pub enabled: bool,
    /// Six-field cron expression, seconds first
    #[serde(default = "default_health_schedule")]
    pub schedule: String,
    #[serde(default = "default_red_threshold")]
    pub red_threshold: u32,
}

fn default_health_enabled() -> bool {
    true
}

fn default_health_schedule() -> String {
    "0 */10 * * * *".to_string()
}

fn default_red_threshold() -> u32 {
    relay_core::health::DEFAULT_RED_THRESHOLD
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: default_health_enabled(),
            schedule: default_health_schedule(),
            red_threshold: default_red_threshold(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Endpoint overrides keyed by provider name
    #[serde(default)]
    pub base_urls: BTreeMap<String, String>,
}

fn default_timeout_secs() -> u64 {
    120
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            base_urls: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    #[serde(default = "default_pilot_ratio")]
    pub pilot_ratio: u64,
    #[serde(default = "default_total_capacity")]
    pub total_capacity: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:8787".to_string()
}

fn default_pilot_ratio() -> u64 {
    relay_client::quota::DEFAULT_PILOT_RATIO
}

fn default_total_capacity() -> u64 {
    relay_client::quota::DEFAULT_TOTAL_CAPACITY
}

fn default_max_retries() -> u32 {
    1
}

fn default_retry_delay_ms() -> u64 {
    1000
}

fn default_bulk_concurrency() -> usize {
    relay_client::service::DEFAULT_BULK_CONCURRENCY
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: default_gateway_url(),
            pilot_ratio: default_pilot_ratio(),
            total_capacity: default_total_capacity(),
            max_retries: default_max_retries(),
            retry_delay_ms: default_retry_delay_ms(),
            bulk_concurrency: default_bulk_concurrency(),
        }
    }
}

impl ClientConfig {
    /// Gateway URL, falling back to the local default when the configured
    /// value expanded to nothing
    pub fn effective_gateway_url(&self) -> String {
        if self.gateway_url.trim().is_empty() {
            default_gateway_url()
        } else {
            self.gateway_url.trim().to_string()
        }
    }
}

pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".relay")
}

impl RelayConfig {
    pub fn load(custom_path: &Option<PathBuf>) -> Result<Self> {
        let path = custom_path
            .clone()
            .unwrap_or_else(|| config_dir().join("config.toml"));

        let content = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Failed to read config at {}. Run `relay init` first.",
                path.display()
            )
        })?;

        let config = Self::parse(&content)
            .with_context(|| format!("Failed to parse config at {}", path.display()))?;

        if !config.store.auth_token.is_empty() && !content.contains("${FIREBASE_AUTH_TOKEN}") {
            warn!(
                "Store auth token is hardcoded in config file. For security, use environment variables: auth_token = \"${{FIREBASE_AUTH_TOKEN}}\""
            );
        }

        Ok(config)
    }

    /// Parse config text after environment expansion
    pub fn parse(content: &str) -> Result<Self> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }
}

/// Allowlist of environment variable names that may be expanded in config files
const ALLOWED_ENV_VARS: &[&str] = &[
    "FIREBASE_DATABASE_URL",
    "FIREBASE_AUTH_TOKEN",
    "RELAY_GATEWAY_URL",
    "RELAY_BIND",
    "HOME",
    "USER",
];

fn expand_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    let mut pos = 0;
    while pos < result.len() {
        let Some(start) = result[pos..].find("${") else {
            break;
        };
        let abs_start = pos + start;
        let Some(end) = result[abs_start..].find('}') else {
            break;
        };
        let var_name = result[abs_start + 2..abs_start + end].to_string();

        if !ALLOWED_ENV_VARS.contains(&var_name.as_str()) {
            warn!(
                "Skipping expansion of unrecognized env var '{}' in config (not in allowlist)",
                var_name
            );
            pos = abs_start + end + 1;
            continue;
        }

        let value = std::env::var(&var_name).unwrap_or_default();
        let value_len = value.len();
        result = format!(
            "{}{}{}",
            &result[..abs_start],
            value,
            &result[abs_start + end + 1..]
        );
        pos = abs_start + value_len;
    }
    result
}

/// Expand a leading `~/` to the home directory
pub fn expand_home(s: &str) -> PathBuf {
    if let Some(rest) = s.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(s)
}
