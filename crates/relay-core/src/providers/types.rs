//! Provider-agnostic request/response types for the gateway

use async_trait::async_trait;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;

use crate::model::ModelEntry;

/// Message role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    #[default]
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::System => write!(f, "system"),
        }
    }
}

/// A role-tagged chat message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// OpenAI-style tool definition, forwarded untouched to compatible providers.
/// Fields this crate does not model are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    #[serde(rename = "type", default = "default_tool_type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function: Option<FunctionSpec>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn default_tool_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<Value>,
    /// e.g. `strict`
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Unified chat request accepted by the gateway
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<Message>,
    #[serde(default = "default_feature")]
    pub feature: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolSpec>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
}

fn default_feature() -> String {
    "default".to_string()
}

impl ChatRequest {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            feature: default_feature(),
            tools: None,
            tool_choice: None,
        }
    }

    pub fn with_feature(mut self, feature: impl Into<String>) -> Self {
        self.feature = feature.into();
        self
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>, tool_choice: Option<Value>) -> Self {
        self.tools = Some(tools);
        self.tool_choice = tool_choice;
        self
    }

    /// Checks that deserialization alone cannot express. A request that
    /// fails here would be rejected by every provider.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.messages.is_empty() {
            return Err("messages must not be empty");
        }
        if self.messages.iter().all(|m| m.role == Role::System) {
            return Err("messages must contain at least one user or assistant message");
        }
        Ok(())
    }
}

/// Unified response: the OpenAI chat-completion shape.
///
/// Extra fields returned by OpenAI-compatible providers are kept so they
/// pass through the gateway unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatCompletion {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub choices: Vec<Choice>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<u32>,
    pub message: ResponseMessage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Value>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

impl ChatCompletion {
    /// Single assistant choice carrying `text`
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            id: None,
            model: None,
            choices: vec![Choice {
                index: None,
                message: ResponseMessage {
                    role: Role::Assistant,
                    content: text.into(),
                    tool_calls: None,
                },
                finish_reason: None,
            }],
            usage: None,
        }
    }

    /// Message of the first choice
    pub fn first_message(&self) -> Option<&ResponseMessage> {
        self.choices.first().map(|c| &c.message)
    }

    /// Text of the first choice
    pub fn text(&self) -> Option<&str> {
        self.first_message().map(|m| m.content.as_str())
    }
}

/// Failure of a single provider call
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    /// Provider display name (e.g. "Groq")
    pub provider: String,
    /// Registry id of the entry that was being called, attached by the dispatcher
    pub model_id: Option<String>,
    /// HTTP status, when the provider answered at all
    pub status: Option<u16>,
    /// Raw response body text or transport error text
    pub body: String,
    message: String,
}

impl ProviderError {
    /// Non-success HTTP status
    pub fn http(provider: &str, status: u16, body: impl Into<String>) -> Self {
        let body = body.into();
        Self {
            message: format!("{} Error {}: {}", provider, status, body),
            provider: provider.to_string(),
            model_id: None,
            status: Some(status),
            body,
        }
    }

    /// The request never produced a response (DNS, connect, timeout)
    pub fn transport(provider: &str, err: impl std::fmt::Display) -> Self {
        let body = err.to_string();
        Self {
            message: format!("{} request failed: {}", provider, body),
            provider: provider.to_string(),
            model_id: None,
            status: None,
            body,
        }
    }

    /// A 2xx response whose body could not be decoded
    pub fn malformed(provider: &str, err: impl std::fmt::Display) -> Self {
        let body = err.to_string();
        Self {
            message: format!("{} returned a malformed response: {}", provider, body),
            provider: provider.to_string(),
            model_id: None,
            status: None,
            body,
        }
    }

    pub fn with_model(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// One provider wire format
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider display name used in errors and logs
    fn provider_name(&self) -> &str;

    /// Send `request` to `model_id` using `api_key`
    async fn complete(
        &self,
        model_id: &str,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError>;
}

/// Calls whichever adapter a registry entry needs. Implemented by
/// [`super::ProviderSet`]; mocked in tests.
#[async_trait]
pub trait ProviderCaller: Send + Sync {
    async fn call(
        &self,
        entry: &ModelEntry,
        request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError>;
}
