//! Firebase Realtime Database store over the REST API

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde_json::Value;
use tracing::{debug, warn};

use crate::model::{ModelEntry, ModelPatch};

use super::ModelStore;

const NODE: &str = "ai_models";

/// Registry kept under the `ai_models` node of a Realtime Database.
///
/// Reads accept both shapes the node can take: an object keyed by entry id,
/// or an array. Writes always key by id.
#[derive(Clone)]
pub struct RtdbStore {
    client: Client,
    database_url: String,
    auth_token: Option<String>,
}

impl std::fmt::Debug for RtdbStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RtdbStore")
            .field("database_url", &self.database_url)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "***"))
            .finish()
    }
}

impl RtdbStore {
    pub fn new(client: Client, database_url: impl Into<String>) -> Self {
        Self {
            client,
            database_url: database_url.into().trim_end_matches('/').to_string(),
            auth_token: None,
        }
    }

    /// Authenticate every request with the `auth` query parameter
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.database_url, path)
    }

    fn authed(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.auth_token {
            Some(token) => req.query(&[("auth", token)]),
            None => req,
        }
    }

    async fn send(&self, req: RequestBuilder, what: &str) -> Result<reqwest::Response> {
        let response = self
            .authed(req)
            .send()
            .await
            .with_context(|| format!("Realtime Database {} request failed", what))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Realtime Database {} returned {}: {}", what, status, body);
        }
        Ok(response)
    }
}

/// Flatten the node value into entries. Holes and unreadable records are
/// skipped.
fn entries_from_value(value: Value) -> Vec<ModelEntry> {
    let records: Vec<Value> = match value {
        Value::Null => return Vec::new(),
        Value::Array(items) => items,
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        other => {
            warn!("Unexpected {} node shape: {}", NODE, other);
            return Vec::new();
        }
    };

    records
        .into_iter()
        .filter(|v| !v.is_null())
        .filter_map(|v| match serde_json::from_value::<ModelEntry>(v) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable model record: {}", e);
                None
            }
        })
        .collect()
}

#[async_trait]
impl ModelStore for RtdbStore {
    fn backend_name(&self) -> &str {
        "rtdb"
    }

    async fn list(&self) -> Result<Vec<ModelEntry>> {
        let response = self.send(self.client.get(self.url(NODE)), "read").await?;
        let value: Value = response
            .json()
            .await
            .context("Realtime Database returned invalid JSON")?;
        let entries = entries_from_value(value);
        debug!("Read {} model entries from Realtime Database", entries.len());
        Ok(entries)
    }

    async fn update(&self, id: &str, patch: &ModelPatch) -> Result<()> {
        // PATCH creates missing nodes, so the entry has to exist first
        let lookup_url = self.url(&format!("{}/{}/id", NODE, id));
        let existing: Value = self
            .send(self.client.get(lookup_url), "lookup")
            .await?
            .json()
            .await
            .context("Realtime Database returned invalid JSON")?;
        if existing.is_null() {
            bail!("No model entry with id {}", id);
        }

        let url = self.url(&format!("{}/{}", NODE, id));
        self.send(self.client.patch(url).json(patch), "update").await?;
        Ok(())
    }

    async fn replace_all(&self, entries: &[ModelEntry]) -> Result<()> {
        let keyed: serde_json::Map<String, Value> = entries
            .iter()
            .map(|e| Ok((e.id.clone(), serde_json::to_value(e)?)))
            .collect::<Result<_>>()?;
        self.send(self.client.put(self.url(NODE)).json(&keyed), "write")
            .await?;
        Ok(())
    }
}
