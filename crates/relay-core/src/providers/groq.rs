//! Groq provider - low-latency inference behind an OpenAI-shaped API

use async_trait::async_trait;
use reqwest::Client;

use super::openai_compat::OpenAiCompatProvider;
use super::types::{ChatCompletion, ChatRequest, ProviderAdapter, ProviderError};

pub const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Groq provider - wraps [`OpenAiCompatProvider`] pinned to Groq's endpoint
#[derive(Debug, Clone)]
pub struct GroqProvider {
    inner: OpenAiCompatProvider,
}

impl GroqProvider {
    pub fn new(client: Client) -> Self {
        Self::with_url(client, GROQ_CHAT_URL)
    }

    /// Point at a different chat-completions URL (proxies, tests)
    pub fn with_url(client: Client, url: impl Into<String>) -> Self {
        Self {
            inner: OpenAiCompatProvider::new(client, "Groq", url),
        }
    }

    pub fn url(&self) -> &str {
        self.inner.url()
    }
}

#[async_trait]
impl ProviderAdapter for GroqProvider {
    fn provider_name(&self) -> &str {
        self.inner.provider_name()
    }

    async fn complete(
        &self,
        model_id: &str,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        self.inner.complete(model_id, request, api_key).await
    }
}
