//! HTTP client for the gateway's chat endpoint

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{ChatCompletion, ChatRequest};
use reqwest::Client;
use tracing::debug;

use crate::error::ClientError;

/// Something that can complete a chat request. The gateway client is the
/// production implementation; tests substitute scripted backends.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ClientError>;
}

/// POSTs requests to `<base>/api/ai`
#[derive(Debug, Clone)]
pub struct GatewayClient {
    client: Client,
    endpoint: String,
}

impl GatewayClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self::with_client(client, base_url))
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/ai", base_url.trim_end_matches('/')),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl CompletionBackend for GatewayClient {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatCompletion, ClientError> {
        debug!(
            "POST {} feature={} messages={}",
            self.endpoint,
            request.feature,
            request.messages.len()
        );
        let response = self.client.post(&self.endpoint).json(request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Gateway {
                status: status.as_u16(),
                body,
            });
        }

        let completion: ChatCompletion = response.json().await?;
        if completion.choices.is_empty() {
            return Err(ClientError::EmptyResponse);
        }
        Ok(completion)
    }
}
