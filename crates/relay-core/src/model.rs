//! Registry data model: configured provider bindings and their health state

use serde::{Deserialize, Serialize};

/// Known LLM providers. Anything unrecognized is treated as an
/// OpenAI-compatible endpoint and keeps its original name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Provider {
    Groq,
    Gemini,
    OpenAi,
    DeepSeek,
    Mistral,
    OpenRouter,
    Perplexity,
    Together,
    Fireworks,
    Cohere,
    HuggingFace,
    Claude,
    Other(String),
}

impl Provider {
    const KNOWN: [Provider; 12] = [
        Provider::Groq,
        Provider::Gemini,
        Provider::OpenAi,
        Provider::DeepSeek,
        Provider::Mistral,
        Provider::OpenRouter,
        Provider::Perplexity,
        Provider::Together,
        Provider::Fireworks,
        Provider::Cohere,
        Provider::HuggingFace,
        Provider::Claude,
    ];

    /// Display name, as stored in the registry
    pub fn as_str(&self) -> &str {
        match self {
            Self::Groq => "Groq",
            Self::Gemini => "Gemini",
            Self::OpenAi => "OpenAI",
            Self::DeepSeek => "DeepSeek",
            Self::Mistral => "Mistral",
            Self::OpenRouter => "OpenRouter",
            Self::Perplexity => "Perplexity",
            Self::Together => "Together",
            Self::Fireworks => "Fireworks",
            Self::Cohere => "Cohere",
            Self::HuggingFace => "HuggingFace",
            Self::Claude => "Claude",
            Self::Other(name) => name,
        }
    }

    /// Parse a provider name (case-insensitive for known providers)
    pub fn parse(name: &str) -> Self {
        Self::KNOWN
            .iter()
            .find(|p| p.as_str().eq_ignore_ascii_case(name.trim()))
            .cloned()
            .unwrap_or_else(|| Self::Other(name.trim().to_string()))
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<String> for Provider {
    fn from(s: String) -> Self {
        Self::parse(&s)
    }
}

impl From<Provider> for String {
    fn from(p: Provider) -> Self {
        p.as_str().to_string()
    }
}

/// Health traffic light for a registry entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    #[default]
    Green,
    Yellow,
    Red,
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Yellow => write!(f, "yellow"),
            Self::Red => write!(f, "red"),
        }
    }
}

impl HealthStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "yellow" => Self::Yellow,
            "red" => Self::Red,
            _ => Self::Green,
        }
    }
}

/// A configured provider binding.
///
/// Stored with camelCase field names. Records may be sparse: missing counters
/// read as zero, a missing status as green and missing keys as none.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelEntry {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub provider: Provider,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default)]
    pub current_key_index: usize,
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub priority: i64,
    #[serde(default)]
    pub daily_limit: u64,
    #[serde(default)]
    pub used_today: u64,
    #[serde(default)]
    pub status: HealthStatus,
    #[serde(default)]
    pub error_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl std::fmt::Debug for ModelEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelEntry")
            .field("id", &self.id)
            .field("provider", &self.provider)
            .field("model_id", &self.model_id)
            .field("api_keys", &format_args!("<{} keys>", self.api_keys.len()))
            .field("current_key_index", &self.current_key_index)
            .field("enabled", &self.enabled)
            .field("priority", &self.priority)
            .field("status", &self.status)
            .field("error_count", &self.error_count)
            .finish()
    }
}

impl ModelEntry {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        provider: Provider,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            provider,
            model_id: model_id.into(),
            api_keys: Vec::new(),
            current_key_index: 0,
            enabled: true,
            priority: 0,
            daily_limit: 0,
            used_today: 0,
            status: HealthStatus::Green,
            error_count: 0,
            last_error: None,
        }
    }

    /// Enabled and not red. Zero-key entries still count here; callers skip
    /// them at attempt time.
    pub fn is_candidate(&self) -> bool {
        self.enabled && self.status != HealthStatus::Red
    }

    /// Index of the key to use next, reduced modulo the key count
    pub fn key_index(&self) -> Option<usize> {
        if self.api_keys.is_empty() {
            None
        } else {
            Some(self.current_key_index % self.api_keys.len())
        }
    }

    /// The key to use next together with its index
    pub fn current_key(&self) -> Option<(usize, &str)> {
        self.key_index().map(|i| (i, self.api_keys[i].as_str()))
    }

    /// Copy with every API key masked, for display
    pub fn masked(&self) -> Self {
        let mut copy = self.clone();
        copy.api_keys = self.api_keys.iter().map(|k| mask_secret(k)).collect();
        copy
    }
}

/// Mask a secret for display, keeping a short prefix and suffix
pub fn mask_secret(s: &str) -> String {
    if s.is_empty() {
        return "(empty)".to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    if chars.len() > 7 {
        let prefix: String = chars[..3].iter().collect();
        let suffix: String = chars[chars.len() - 4..].iter().collect();
        format!("{}...{}", prefix, suffix)
    } else {
        "***".to_string()
    }
}

/// Partial update of a [`ModelEntry`]. Only present fields are written, which
/// gives the store field-level last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_key_index: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub used_today: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<HealthStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl ModelPatch {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Write every present field onto `entry`
    pub fn apply_to(&self, entry: &mut ModelEntry) {
        if let Some(v) = &self.name {
            entry.name = v.clone();
        }
        if let Some(v) = &self.provider {
            entry.provider = v.clone();
        }
        if let Some(v) = &self.model_id {
            entry.model_id = v.clone();
        }
        if let Some(v) = &self.api_keys {
            entry.api_keys = v.clone();
        }
        if let Some(v) = self.current_key_index {
            entry.current_key_index = v;
        }
        if let Some(v) = self.enabled {
            entry.enabled = v;
        }
        if let Some(v) = self.priority {
            entry.priority = v;
        }
        if let Some(v) = self.daily_limit {
            entry.daily_limit = v;
        }
        if let Some(v) = self.used_today {
            entry.used_today = v;
        }
        if let Some(v) = self.status {
            entry.status = v;
        }
        if let Some(v) = self.error_count {
            entry.error_count = v;
        }
        if let Some(v) = &self.last_error {
            entry.last_error = Some(v.clone());
        }
    }
}
