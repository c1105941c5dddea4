//! SQLite model store

use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use rusqlite::types::Value;
use rusqlite::{Connection, Row, params, params_from_iter};
use tracing::{debug, info, warn};

use crate::model::{HealthStatus, ModelEntry, ModelPatch, Provider};

use super::ModelStore;

const COLUMNS: &str = "id, name, provider, model_id, api_keys, current_key_index, enabled,
    priority, daily_limit, used_today, status, error_count, last_error";

/// Registry stored in a local SQLite file, one row per entry.
/// `position` keeps the order entries were written in.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (or create) the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }
        let conn = Connection::open(path).context("Failed to open SQLite database")?;
        info!("Opened model registry at {}", path.display());
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory SQLite")?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS ai_models (
                id TEXT PRIMARY KEY,
                position INTEGER NOT NULL DEFAULT 0,
                name TEXT NOT NULL DEFAULT '',
                provider TEXT NOT NULL,
                model_id TEXT NOT NULL DEFAULT '',
                api_keys TEXT NOT NULL DEFAULT '[]',
                current_key_index INTEGER NOT NULL DEFAULT 0,
                enabled INTEGER NOT NULL DEFAULT 0,
                priority INTEGER NOT NULL DEFAULT 0,
                daily_limit INTEGER NOT NULL DEFAULT 0,
                used_today INTEGER NOT NULL DEFAULT 0,
                status TEXT NOT NULL DEFAULT 'green',
                error_count INTEGER NOT NULL DEFAULT 0,
                last_error TEXT
            )",
            [],
        )
        .context("Failed to create ai_models table")?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }
}

fn lock(conn: &Mutex<Connection>) -> std::sync::MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(|poisoned| {
        warn!("Database mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<(ModelEntry, String)> {
    let provider: String = row.get(2)?;
    let api_keys: String = row.get(4)?;
    let status: String = row.get(10)?;
    let entry = ModelEntry {
        id: row.get(0)?,
        name: row.get(1)?,
        provider: Provider::parse(&provider),
        model_id: row.get(3)?,
        api_keys: Vec::new(),
        current_key_index: row.get::<_, i64>(5)?.max(0) as usize,
        enabled: row.get(6)?,
        priority: row.get(7)?,
        daily_limit: row.get::<_, i64>(8)?.max(0) as u64,
        used_today: row.get::<_, i64>(9)?.max(0) as u64,
        status: HealthStatus::parse(&status),
        error_count: row.get::<_, i64>(11)?.max(0) as u32,
        last_error: row.get(12)?,
    };
    Ok((entry, api_keys))
}

fn int(v: impl TryInto<i64>) -> Value {
    Value::Integer(v.try_into().unwrap_or(i64::MAX))
}

/// Column assignments for the fields present in `patch`
fn patch_columns(patch: &ModelPatch) -> Result<Vec<(&'static str, Value)>> {
    let mut cols = Vec::new();
    if let Some(v) = &patch.name {
        cols.push(("name", Value::Text(v.clone())));
    }
    if let Some(v) = &patch.provider {
        cols.push(("provider", Value::Text(v.to_string())));
    }
    if let Some(v) = &patch.model_id {
        cols.push(("model_id", Value::Text(v.clone())));
    }
    if let Some(v) = &patch.api_keys {
        cols.push(("api_keys", Value::Text(serde_json::to_string(v)?)));
    }
    if let Some(v) = patch.current_key_index {
        cols.push(("current_key_index", int(v)));
    }
    if let Some(v) = patch.enabled {
        cols.push(("enabled", Value::Integer(v as i64)));
    }
    if let Some(v) = patch.priority {
        cols.push(("priority", Value::Integer(v)));
    }
    if let Some(v) = patch.daily_limit {
        cols.push(("daily_limit", int(v)));
    }
    if let Some(v) = patch.used_today {
        cols.push(("used_today", int(v)));
    }
    if let Some(v) = patch.status {
        cols.push(("status", Value::Text(v.to_string())));
    }
    if let Some(v) = patch.error_count {
        cols.push(("error_count", int(v)));
    }
    if let Some(v) = &patch.last_error {
        cols.push(("last_error", Value::Text(v.clone())));
    }
    Ok(cols)
}

#[async_trait]
impl ModelStore for SqliteStore {
    fn backend_name(&self) -> &str {
        "sqlite"
    }

    async fn list(&self) -> Result<Vec<ModelEntry>> {
        let conn = Arc::clone(&self.conn);

        tokio::task::spawn_blocking(move || -> Result<Vec<ModelEntry>> {
            let conn = lock(&conn);
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM ai_models ORDER BY position, id",
                COLUMNS
            ))?;
            let rows = stmt.query_map([], row_to_entry)?;

            let mut entries = Vec::new();
            for row in rows {
                let (mut entry, keys) = row?;
                entry.api_keys = serde_json::from_str(&keys)
                    .with_context(|| format!("Corrupt api_keys for model {}", entry.id))?;
                entries.push(entry);
            }
            Ok(entries)
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn update(&self, id: &str, patch: &ModelPatch) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let id = id.to_owned();
        let cols = patch_columns(patch)?;
        if cols.is_empty() {
            return Ok(());
        }

        tokio::task::spawn_blocking(move || -> Result<()> {
            let assignments: Vec<String> = cols
                .iter()
                .enumerate()
                .map(|(i, (col, _))| format!("{} = ?{}", col, i + 1))
                .collect();
            let sql = format!(
                "UPDATE ai_models SET {} WHERE id = ?{}",
                assignments.join(", "),
                cols.len() + 1
            );
            let mut values: Vec<Value> = cols.into_iter().map(|(_, v)| v).collect();
            values.push(Value::Text(id.clone()));

            let conn = lock(&conn);
            let changed = conn.execute(&sql, params_from_iter(values))?;
            if changed == 0 {
                bail!("No model entry with id '{}'", id);
            }
            debug!("Updated model {}", id);
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }

    async fn replace_all(&self, entries: &[ModelEntry]) -> Result<()> {
        let conn = Arc::clone(&self.conn);
        let entries = entries.to_vec();

        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = lock(&conn);
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM ai_models", [])?;
            for (position, e) in entries.iter().enumerate() {
                tx.execute(
                    &format!(
                        "INSERT INTO ai_models (position, {}) VALUES
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
                        COLUMNS
                    ),
                    params![
                        position as i64,
                        e.id,
                        e.name,
                        e.provider.as_str(),
                        e.model_id,
                        serde_json::to_string(&e.api_keys)?,
                        e.current_key_index as i64,
                        e.enabled,
                        e.priority,
                        e.daily_limit as i64,
                        e.used_today as i64,
                        e.status.to_string(),
                        e.error_count as i64,
                        e.last_error,
                    ],
                )
                .with_context(|| format!("Failed to insert model {}", e.id))?;
            }
            tx.commit()?;
            info!("Wrote {} model entries", entries.len());
            Ok(())
        })
        .await
        .context("spawn_blocking task panicked")?
    }
}
