//! Application-facing AI service

use std::future::Future;
use std::sync::Arc;

use relay_core::providers::ResponseMessage;
use relay_core::{ChatRequest, Message, ToolSpec};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::bulk::run_bulk;
use crate::error::ClientError;
use crate::gateway::CompletionBackend;
use crate::parse::parse_json;
use crate::quota::{NoUsageData, QuotaGuard, UsageClass, UsageSource};
use crate::retry::RetryPolicy;

pub const DEFAULT_BULK_CONCURRENCY: usize = 20;

const TEXT_FEATURE: &str = "text-generation";
const TOOLS_FEATURE: &str = "complex_reasoning";

/// Every call goes through the quota pre-check, then the retry policy, then
/// the backend.
#[derive(Clone)]
pub struct AiService {
    backend: Arc<dyn CompletionBackend>,
    usage: Arc<dyn UsageSource>,
    quota: QuotaGuard,
    retry: RetryPolicy,
    bulk_concurrency: usize,
}

impl AiService {
    pub fn new(backend: Arc<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            usage: Arc::new(NoUsageData),
            quota: QuotaGuard::default(),
            retry: RetryPolicy::default(),
            bulk_concurrency: DEFAULT_BULK_CONCURRENCY,
        }
    }

    pub fn with_usage_source(mut self, usage: Arc<dyn UsageSource>) -> Self {
        self.usage = usage;
        self
    }

    pub fn with_quota(mut self, quota: QuotaGuard) -> Self {
        self.quota = quota;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_bulk_concurrency(mut self, concurrency: usize) -> Self {
        self.bulk_concurrency = concurrency;
        self
    }

    pub fn bulk_concurrency(&self) -> usize {
        self.bulk_concurrency
    }

    /// Quota check, then `op` under the retry policy
    pub async fn execute<T, F, Fut>(&self, class: UsageClass, op: F) -> Result<T, ClientError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        self.quota.check(class, self.usage.as_ref()).await?;
        self.retry.run(op).await
    }

    /// Text of the first choice
    pub async fn ask(
        &self,
        messages: Vec<Message>,
        class: UsageClass,
    ) -> Result<String, ClientError> {
        let request = &ChatRequest::new(messages).with_feature(TEXT_FEATURE);
        let backend = self.backend.as_ref();
        self.execute(class, || async move {
            let completion = backend.complete(request).await?;
            completion
                .text()
                .map(str::to_string)
                .ok_or(ClientError::EmptyResponse)
        })
        .await
    }

    /// First choice parsed as JSON. Malformed output counts as a failed
    /// attempt and is retried.
    pub async fn ask_json<T>(
        &self,
        messages: Vec<Message>,
        class: UsageClass,
    ) -> Result<T, ClientError>
    where
        T: DeserializeOwned,
    {
        let request = &ChatRequest::new(messages).with_feature(TEXT_FEATURE);
        let backend = self.backend.as_ref();
        self.execute(class, || async move {
            let completion = backend.complete(request).await?;
            let text = completion.text().ok_or(ClientError::EmptyResponse)?;
            Ok(parse_json(text)?)
        })
        .await
    }

    /// Full first message, for callers that expect tool calls
    pub async fn ask_with_tools(
        &self,
        messages: Vec<Message>,
        tools: Vec<ToolSpec>,
        class: UsageClass,
    ) -> Result<ResponseMessage, ClientError> {
        let request = &ChatRequest::new(messages)
            .with_feature(TOOLS_FEATURE)
            .with_tools(tools, Some(Value::String("auto".to_string())));
        let backend = self.backend.as_ref();
        self.execute(class, || async move {
            let completion = backend.complete(request).await?;
            completion
                .first_message()
                .cloned()
                .ok_or(ClientError::EmptyResponse)
        })
        .await
    }

    /// Like [`ask`](Self::ask), handing the text to `on_chunk` as it arrives.
    /// The gateway buffers responses, so this is a single chunk.
    pub async fn ask_streaming<C>(
        &self,
        messages: Vec<Message>,
        class: UsageClass,
        mut on_chunk: C,
    ) -> Result<String, ClientError>
    where
        C: FnMut(&str),
    {
        let text = self.ask(messages, class).await?;
        on_chunk(&text);
        Ok(text)
    }

    /// Run `tasks` through the bulk engine at the configured concurrency
    pub async fn bulk<T, F, Fut>(&self, tasks: Vec<F>) -> Vec<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        debug!("Bulk request: {} tasks", tasks.len());
        run_bulk(tasks, self.bulk_concurrency).await
    }
}
