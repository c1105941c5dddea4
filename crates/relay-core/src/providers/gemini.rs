//! Google Gemini provider
//!
//! Gemini speaks its own `generateContent` format, so requests and responses
//! are translated here. Tools and tool choice are not forwarded.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::types::{ChatCompletion, ChatRequest, Message, ProviderAdapter, ProviderError, Role};

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const PROVIDER_NAME: &str = "Gemini";

/// Google Gemini provider
#[derive(Clone)]
pub struct GeminiProvider {
    client: Client,
    base_url: String,
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GeminiProvider {
    pub fn new(client: Client) -> Self {
        Self::with_base_url(client, GEMINI_BASE_URL)
    }

    pub fn with_base_url(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn endpoint(&self, model_id: &str) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, model_id)
    }

    /// Convert unified messages to a Gemini request.
    ///
    /// System messages leave the turn sequence; the first one becomes the
    /// system instruction.
    fn to_gemini_request(messages: &[Message]) -> GeminiRequest {
        let contents = messages
            .iter()
            .filter(|m| m.role != Role::System)
            .map(|m| GeminiContent {
                role: match m.role {
                    Role::Assistant => "model".to_string(),
                    _ => "user".to_string(),
                },
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            })
            .collect();

        let system_instruction = messages
            .iter()
            .find(|m| m.role == Role::System)
            .map(|m| GeminiInstruction {
                parts: vec![GeminiPart {
                    text: Some(m.content.clone()),
                }],
            });

        GeminiRequest {
            contents,
            system_instruction,
        }
    }

    /// First candidate's first text part, or "" when Gemini returned nothing
    fn from_gemini_response(resp: GeminiResponse) -> ChatCompletion {
        let text = resp
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .unwrap_or_default();
        ChatCompletion::from_text(text)
    }
}

#[async_trait]
impl ProviderAdapter for GeminiProvider {
    fn provider_name(&self) -> &str {
        PROVIDER_NAME
    }

    async fn complete(
        &self,
        model_id: &str,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        let body = Self::to_gemini_request(&request.messages);

        if request.tools.is_some() {
            debug!(
                "Gemini adapter ignores {} tool definitions",
                request.tools.as_ref().map_or(0, |t| t.len())
            );
        }
        debug!(
            "Gemini request: model={}, contents={}, system={}",
            model_id,
            body.contents.len(),
            body.system_instruction.is_some()
        );

        let response = self
            .client
            .post(self.endpoint(model_id))
            .query(&[("key", api_key)])
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER_NAME, e))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(ProviderError::http(PROVIDER_NAME, status.as_u16(), error_text));
        }

        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::transport(PROVIDER_NAME, e))?;
        let api_response: GeminiResponse =
            serde_json::from_str(&text).map_err(|e| ProviderError::malformed(PROVIDER_NAME, e))?;

        debug!("Gemini response: candidates={}", api_response.candidates.len());

        Ok(Self::from_gemini_response(api_response))
    }
}

// ── Gemini wire types ──

#[derive(Debug, Clone, Serialize)]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(rename = "systemInstruction", skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiInstruction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize)]
struct GeminiInstruction {
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiPart {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Clone, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
}
