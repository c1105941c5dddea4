//! Adapter dispatch by registry provider

use std::collections::HashMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use crate::model::{ModelEntry, Provider};

use super::gemini::{GEMINI_BASE_URL, GeminiProvider};
use super::groq::{GROQ_CHAT_URL, GroqProvider};
use super::openai_compat::OpenAiCompatProvider;
use super::types::{ChatCompletion, ChatRequest, ProviderAdapter, ProviderCaller, ProviderError};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// Default endpoint for a provider. For Gemini this is the API root; for
/// everything else it is the full chat-completions URL.
pub fn default_endpoint(provider: &Provider) -> &'static str {
    match provider {
        Provider::Groq => GROQ_CHAT_URL,
        Provider::Gemini => GEMINI_BASE_URL,
        Provider::DeepSeek => "https://api.deepseek.com/chat/completions",
        Provider::Mistral => "https://api.mistral.ai/v1/chat/completions",
        Provider::OpenRouter => "https://openrouter.ai/api/v1/chat/completions",
        Provider::Perplexity => "https://api.perplexity.ai/chat/completions",
        Provider::Together => "https://api.together.xyz/v1/chat/completions",
        Provider::Fireworks => "https://api.fireworks.ai/inference/v1/chat/completions",
        Provider::OpenAi
        | Provider::Cohere
        | Provider::HuggingFace
        | Provider::Claude
        | Provider::Other(_) => OPENAI_CHAT_URL,
    }
}

/// The full adapter set. One shared HTTP client; adapters are built per call.
#[derive(Debug, Clone)]
pub struct ProviderSet {
    client: Client,
    endpoints: HashMap<Provider, String>,
    app_referer: String,
    app_title: String,
}

impl ProviderSet {
    /// Build with a fresh HTTP client using `timeout` per request
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self::with_client(client))
    }

    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            endpoints: HashMap::new(),
            app_referer: "https://llm-relay.local".to_string(),
            app_title: "LLM Relay".to_string(),
        }
    }

    /// Override the endpoint used for `provider`
    pub fn with_endpoint(mut self, provider: Provider, url: impl Into<String>) -> Self {
        self.endpoints.insert(provider, url.into());
        self
    }

    /// Attribution headers sent to OpenRouter
    pub fn with_attribution(
        mut self,
        referer: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        self.app_referer = referer.into();
        self.app_title = title.into();
        self
    }

    /// Endpoint in effect for `provider`
    pub fn endpoint(&self, provider: &Provider) -> &str {
        self.endpoints
            .get(provider)
            .map(String::as_str)
            .unwrap_or_else(|| default_endpoint(provider))
    }

    /// Adapter for `provider`
    pub fn adapter_for(&self, provider: &Provider) -> Box<dyn ProviderAdapter> {
        let client = self.client.clone();
        let endpoint = self.endpoint(provider).to_string();
        match provider {
            Provider::Groq => Box::new(GroqProvider::with_url(client, endpoint)),
            Provider::Gemini => Box::new(GeminiProvider::with_base_url(client, endpoint)),
            Provider::OpenRouter => Box::new(
                OpenAiCompatProvider::new(client, provider.as_str(), endpoint)
                    .with_header("HTTP-Referer", self.app_referer.clone())
                    .with_header("X-Title", self.app_title.clone()),
            ),
            _ => Box::new(OpenAiCompatProvider::new(client, provider.as_str(), endpoint)),
        }
    }
}

#[async_trait]
impl ProviderCaller for ProviderSet {
    async fn call(
        &self,
        entry: &ModelEntry,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        let adapter = self.adapter_for(&entry.provider);
        debug!(
            "Dispatching {} to {} ({})",
            entry.id,
            adapter.provider_name(),
            entry.model_id
        );
        adapter
            .complete(&entry.model_id, request, api_key)
            .await
            .map_err(|e| e.with_model(&entry.id))
    }
}
