//! Append-only state log
//!
//! Every observe tick appends one `StateRecord`. The log is read by the
//! external dashboard, so the record schema must stay stable across
//! restarts. Three backends:
//! - `JsonlStateStore`: one JSON object per line in a flat file
//! - `MemoryStateStore`: in-process, for tests and dry runs
//! - `SupabaseStateStore`: `strategy_states` table over the Supabase REST API

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::core::state::StrategyState;

/// Errors for state log operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote database rejected the request
    #[error("Database error: {0}")]
    Database(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

/// Why a record was written
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// Regular observe tick
    Observation,
    /// Snapshot taken after a rebalance plan ran
    PostRebalance,
    /// Final snapshot after an unwind
    PostUnwind,
    /// A failure ended the tick; no state attached
    Error,
}

/// One line of the state log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: RecordKind,
    pub state: Option<StrategyState>,
    pub note: Option<String>,
}

impl StateRecord {
    fn with_state(kind: RecordKind, state: StrategyState, note: Option<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp: state.timestamp,
            kind,
            state: Some(state),
            note,
        }
    }

    pub fn observation(state: StrategyState) -> Self {
        Self::with_state(RecordKind::Observation, state, None)
    }

    pub fn post_rebalance(state: StrategyState, note: impl Into<String>) -> Self {
        Self::with_state(RecordKind::PostRebalance, state, Some(note.into()))
    }

    pub fn post_unwind(state: StrategyState) -> Self {
        Self::with_state(RecordKind::PostUnwind, state, None)
    }

    pub fn error(timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            id: Uuid::now_v7(),
            timestamp,
            kind: RecordKind::Error,
            state: None,
            note: Some(message.into()),
        }
    }
}

/// Append-only sink for state records
#[async_trait]
pub trait StateSink: Send + Sync {
    /// Append one record; append order is chronological order
    async fn append(&self, record: &StateRecord) -> Result<(), StoreError>;

    /// Records with `from <= timestamp <= to`, oldest first
    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, StoreError>;
}

// ============================================================================
// JSON lines
// ============================================================================

/// Flat file with one JSON record per line
pub struct JsonlStateStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlStateStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl StateSink for JsonlStateStore {
    async fn append(&self, record: &StateRecord) -> Result<(), StoreError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let _guard = self.write_lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        tracing::debug!(path = %self.path.display(), kind = ?record.kind, "[STORE] Record appended");
        Ok(())
    }

    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for (line_no, line) in content.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StateRecord>(line) {
                Ok(record) if record.timestamp >= from && record.timestamp <= to => {
                    records.push(record)
                }
                Ok(_) => {}
                Err(e) => {
                    // A torn final line after a crash is expected; skip it
                    tracing::warn!(
                        path = %self.path.display(),
                        line = line_no + 1,
                        error = %e,
                        "[STORE] Skipping unreadable record"
                    );
                }
            }
        }
        Ok(records)
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default, Clone)]
pub struct MemoryStateStore {
    records: Arc<std::sync::Mutex<Vec<StateRecord>>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every record appended so far
    pub fn records(&self) -> Vec<StateRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StateSink for MemoryStateStore {
    async fn append(&self, record: &StateRecord) -> Result<(), StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Database("memory store poisoned".into()))?
            .push(record.clone());
        Ok(())
    }

    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let records = self
            .records
            .lock()
            .map_err(|_| StoreError::Database("memory store poisoned".into()))?;
        Ok(records
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect())
    }
}

// ============================================================================
// Supabase
// ============================================================================

/// Table the records are written to
pub const SUPABASE_TABLE: &str = "strategy_states";

/// State log backed by a Supabase table
pub struct SupabaseStateStore {
    /// Supabase project URL (e.g., https://xxx.supabase.co)
    supabase_url: String,
    client: reqwest::Client,
}

impl SupabaseStateStore {
    /// Build a client with the anon key as `apikey` and bearer token
    pub fn new(supabase_url: &str, anon_key: &str) -> Result<Self, StoreError> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            "apikey",
            reqwest::header::HeaderValue::from_str(anon_key)
                .map_err(|e| StoreError::InvalidConfig(format!("apikey header: {}", e)))?,
        );
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&format!("Bearer {}", anon_key))
                .map_err(|e| StoreError::InvalidConfig(format!("authorization header: {}", e)))?,
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            supabase_url: supabase_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.supabase_url, SUPABASE_TABLE)
    }
}

#[async_trait]
impl StateSink for SupabaseStateStore {
    async fn append(&self, record: &StateRecord) -> Result<(), StoreError> {
        let response = self
            .client
            .post(self.table_url())
            .header("Prefer", "return=minimal")
            .json(record)
            .send()
            .await?;

        match response.status() {
            reqwest::StatusCode::CREATED | reqwest::StatusCode::OK => {
                tracing::debug!(id = %record.id, kind = ?record.kind, "[STORE] Record saved to Supabase");
                Ok(())
            }
            reqwest::StatusCode::CONFLICT => {
                let err_msg = format!("Record already exists: {}", record.id);
                tracing::error!(id = %record.id, "[STORE] Failed to save record: {}", err_msg);
                Err(StoreError::Database(err_msg))
            }
            reqwest::StatusCode::UNAUTHORIZED => {
                tracing::error!("[STORE] Failed to save record: invalid Supabase credentials");
                Err(StoreError::Database("Invalid Supabase credentials".to_string()))
            }
            status => {
                let body = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "<no body>".to_string());
                tracing::error!(
                    status = %status,
                    response_body = %body,
                    "[STORE] Failed to save record to Supabase"
                );
                Err(StoreError::Database(format!("Supabase error {}: {}", status, body)))
            }
        }
    }

    async fn range(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StateRecord>, StoreError> {
        let from = from.to_rfc3339_opts(SecondsFormat::Millis, true);
        let to = to.to_rfc3339_opts(SecondsFormat::Millis, true);
        let response = self
            .client
            .get(self.table_url())
            .query(&[
                ("select", "*".to_string()),
                ("timestamp", format!("gte.{}", from)),
                ("timestamp", format!("lte.{}", to)),
                ("order", "timestamp.asc".to_string()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<no body>".to_string());
            return Err(StoreError::Database(format!("Supabase error {}: {}", status, body)));
        }

        Ok(response.json::<Vec<StateRecord>>().await?)
    }
}
