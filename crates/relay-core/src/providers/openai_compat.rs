//! OpenAI-compatible provider for OpenAI, DeepSeek, Mistral, OpenRouter,
//! Perplexity, Together, Fireworks and any other chat-completions endpoint.
//!
//! Messages, tools and tool choice are forwarded as-is; the response is
//! already in the unified shape.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use super::types::{ChatCompletion, ChatRequest, Message, ProviderAdapter, ProviderError, ToolSpec};

/// Chat-completions endpoint parameterized by URL and extra headers
#[derive(Clone)]
pub struct OpenAiCompatProvider {
    client: Client,
    name: String,
    url: String,
    extra_headers: Vec<(String, String)>,
}

impl std::fmt::Debug for OpenAiCompatProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatProvider")
            .field("name", &self.name)
            .field("url", &self.url)
            .finish()
    }
}

impl OpenAiCompatProvider {
    /// - `name`: provider display name used in errors (e.g. "DeepSeek")
    /// - `url`: full chat-completions URL
    pub fn new(client: Client, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            client,
            name: name.into(),
            url: url.into(),
            extra_headers: Vec::new(),
        }
    }

    /// Add a header sent with every request (e.g. OpenRouter attribution)
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_headers.push((name.into(), value.into()));
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_body<'a>(model_id: &'a str, request: &'a ChatRequest) -> CompatRequest<'a> {
        CompatRequest {
            model: model_id,
            messages: &request.messages,
            tools: request.tools.as_deref(),
            tool_choice: request.tool_choice.as_ref(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatProvider {
    fn provider_name(&self) -> &str {
        &self.name
    }

    async fn complete(
        &self,
        model_id: &str,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        let body = Self::build_body(model_id, request);

        debug!(
            "{} request: model={}, messages={}, tools={}",
            self.name,
            model_id,
            request.messages.len(),
            request.tools.as_ref().map_or(0, |t| t.len())
        );

        let mut builder = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key))
            .header("Content-Type", "application/json");
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::http(&self.name, status.as_u16(), error_text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(&self.name, e))?;
        let completion: ChatCompletion =
            serde_json::from_str(&text).map_err(|e| ProviderError::malformed(&self.name, e))?;

        debug!(
            "{} response: choices={}",
            self.name,
            completion.choices.len()
        );

        Ok(completion)
    }
}

// ── Chat-completions wire body ──

#[derive(Debug, Serialize)]
struct CompatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [ToolSpec]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_choice: Option<&'a Value>,
}
