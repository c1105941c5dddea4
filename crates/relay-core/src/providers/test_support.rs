//! Mock servers and scripted callers for tests

use std::collections::HashSet;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::net::TcpListener;

use crate::model::ModelEntry;

use super::types::{ChatCompletion, ChatRequest, ProviderCaller, ProviderError};

/// Serve `app` on an ephemeral local port and return its base URL
pub async fn spawn_mock(app: axum::Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

/// Provider caller that answers per entry id and records every call
#[derive(Default)]
pub struct ScriptedCaller {
    failing: HashSet<String>,
    calls: Mutex<Vec<(String, String)>>,
}

impl ScriptedCaller {
    pub fn failing(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|s| s.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// `(entry id, api key)` for every call, in order
    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ProviderCaller for ScriptedCaller {
    async fn call(
        &self,
        entry: &ModelEntry,
        _request: &ChatRequest,
        api_key: &str,
    ) -> Result<ChatCompletion, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((entry.id.clone(), api_key.to_string()));
        if self.failing.contains(&entry.id) {
            Err(ProviderError::http(entry.provider.as_str(), 500, format!("{} is down", entry.id))
                .with_model(&entry.id))
        } else {
            Ok(ChatCompletion::from_text(format!("from {}", entry.id)))
        }
    }
}
