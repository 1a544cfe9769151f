//! # Status Ledger
//!
//! Auditable record of every per-item outcome, plus the hand-off of
//! confirmed uploads into the long-lived creative inventory.
//!
//! ## Overview
//!
//! Each run writes `upload_status_<run_id>.jsonl` under the ledger
//! directory. A batch's rows are appended in one durable write before the
//! engine moves on, so a crash loses at most the batch in flight.
//!
//! Successful rows are then upserted into an [`InventoryStore`] keyed by
//! `local_id`. Only `platform_id` and `upload_date` are written; every
//! other inventory column belongs to other tooling.

use crate::item::{BatchId, RunId, UploadResult, UploadStatus};
use crate::{Result, UploadError};
use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::Row;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info};

/// One line of the run ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusLedgerRecord {
    pub local_id: String,
    pub filename: String,
    pub creative_kind: String,
    pub platform: String,
    pub platform_id: Option<String>,
    pub status: UploadStatus,
    pub error_message: Option<String>,
    pub retries: u32,
    pub batch_id: String,
    /// `YYYY-MM-DD`
    pub upload_date: String,
    /// `HH:MM:SS`
    pub upload_time: String,
    /// RFC 3339
    pub recorded_at: String,
}

impl StatusLedgerRecord {
    fn from_result(result: &UploadResult, platform: &str, batch_id: &BatchId, clock: &dyn Clock) -> Self {
        let now = clock.now();
        Self {
            local_id: result.item.local_id.clone(),
            filename: result.item.filename.clone(),
            creative_kind: result.item.creative_kind.as_str().to_string(),
            platform: platform.to_string(),
            platform_id: result.platform_id.clone(),
            status: result.status,
            error_message: result.error_message.clone(),
            retries: result.retries,
            batch_id: batch_id.to_string(),
            upload_date: now.format("%Y-%m-%d").to_string(),
            upload_time: now.format("%H:%M:%S").to_string(),
            recorded_at: now.to_rfc3339(),
        }
    }
}

// ============================================================================
// Run ledger file
// ============================================================================

/// Run-scoped JSON Lines file
pub struct RunLedger {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
}

impl RunLedger {
    /// File name used for the ledger of `run_id`
    pub fn file_name(run_id: &RunId) -> String {
        format!("upload_status_{}.jsonl", run_id)
    }

    /// Prepare the ledger directory; the file itself appears on first append
    pub async fn create(fs: Arc<dyn FileSystemAccess>, dir: &Path, run_id: &RunId) -> Result<Self> {
        fs.create_dir_all(dir)
            .await
            .map_err(|e| UploadError::Storage(format!("cannot create ledger dir: {}", e)))?;

        Ok(Self {
            fs,
            path: dir.join(Self::file_name(run_id)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Durably append `records` in a single write
    pub async fn append(&self, records: &[StatusLedgerRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let mut buf = String::new();
        for record in records {
            buf.push_str(&serde_json::to_string(record)?);
            buf.push('\n');
        }

        self.fs
            .append_file(&self.path, Bytes::from(buf))
            .await
            .map_err(|e| UploadError::Storage(format!("ledger append failed: {}", e)))
    }

    /// Every record written so far
    pub async fn read_all(&self) -> Result<Vec<StatusLedgerRecord>> {
        if !self.fs.exists(&self.path).await? {
            return Ok(Vec::new());
        }
        let data = self.fs.read_file(&self.path).await?;
        String::from_utf8_lossy(&data)
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(UploadError::from))
            .collect()
    }
}

// ============================================================================
// Inventory
// ============================================================================

/// Long-lived creative inventory updated with confirmed uploads
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Set `platform_id` and `upload_date` of the row for `local_id`
    async fn record_upload(&self, local_id: &str, platform_id: &str, upload_date: &str) -> Result<()>;
}

/// SQLite-backed inventory
pub struct SqliteInventoryStore {
    pool: SqlitePool,
}

impl SqliteInventoryStore {
    /// Open (creating if needed) the inventory database at `path`
    pub async fn connect(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| UploadError::Storage(format!("cannot create inventory dir: {}", e)))?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePool::connect_with(options)
            .await
            .map_err(|e| UploadError::Storage(format!("Failed to connect to inventory: {}", e)))?;

        let store = Self { pool };
        store.initialize().await?;
        debug!(path = ?path, "Opened creative inventory");
        Ok(store)
    }

    /// Inventory held in a private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| UploadError::Storage(format!("Failed to connect to inventory: {}", e)))?;

        let store = Self { pool };
        store.initialize().await?;
        Ok(store)
    }

    async fn initialize(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS creative_inventory (
                local_id TEXT PRIMARY KEY,
                platform_id TEXT,
                upload_date TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| UploadError::Storage(format!("Failed to create table: {}", e)))?;
        Ok(())
    }

    /// `(platform_id, upload_date)` stored for `local_id`
    pub async fn get(&self, local_id: &str) -> Result<Option<(Option<String>, Option<String>)>> {
        let row = sqlx::query("SELECT platform_id, upload_date FROM creative_inventory WHERE local_id = ?")
            .bind(local_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|row| (row.get(0), row.get(1))))
    }
}

#[async_trait]
impl InventoryStore for SqliteInventoryStore {
    async fn record_upload(&self, local_id: &str, platform_id: &str, upload_date: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO creative_inventory (local_id, platform_id, upload_date)
            VALUES (?, ?, ?)
            ON CONFLICT(local_id) DO UPDATE SET
                platform_id = excluded.platform_id,
                upload_date = excluded.upload_date
            "#,
        )
        .bind(local_id)
        .bind(platform_id)
        .bind(upload_date)
        .execute(&self.pool)
        .await
        .map_err(|e| UploadError::Storage(format!("Failed to update inventory: {}", e)))?;

        debug!(local_id, platform_id, "Inventory updated");
        Ok(())
    }
}

/// Inventory kept in memory
#[derive(Default)]
pub struct InMemoryInventoryStore {
    rows: Mutex<HashMap<String, (String, String)>>,
}

impl InMemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, local_id: &str) -> Option<(String, String)> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(local_id)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl InventoryStore for InMemoryInventoryStore {
    async fn record_upload(&self, local_id: &str, platform_id: &str, upload_date: &str) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(local_id.to_string(), (platform_id.to_string(), upload_date.to_string()));
        Ok(())
    }
}

// ============================================================================
// Ledger
// ============================================================================

/// Run ledger file plus inventory merge
pub struct StatusLedger {
    run: RunLedger,
    inventory: Arc<dyn InventoryStore>,
    clock: Arc<dyn Clock>,
    platform: String,
}

impl StatusLedger {
    pub fn new(
        run: RunLedger,
        inventory: Arc<dyn InventoryStore>,
        clock: Arc<dyn Clock>,
        platform: impl Into<String>,
    ) -> Self {
        Self {
            run,
            inventory,
            clock,
            platform: platform.into(),
        }
    }

    pub fn path(&self) -> &Path {
        self.run.path()
    }

    pub fn run_ledger(&self) -> &RunLedger {
        &self.run
    }

    /// Persist the outcomes of one batch
    ///
    /// # Errors
    ///
    /// Fails only when the run ledger cannot be written. Inventory failures
    /// are logged and do not fail the batch.
    pub async fn record(&self, batch_id: &BatchId, results: &[UploadResult]) -> Result<()> {
        let records: Vec<StatusLedgerRecord> = results
            .iter()
            .map(|result| StatusLedgerRecord::from_result(result, &self.platform, batch_id, self.clock.as_ref()))
            .collect();
        self.run.append(&records).await?;

        let mut merged = 0;
        for record in records.iter().filter(|r| r.status == UploadStatus::Success) {
            let Some(platform_id) = record.platform_id.as_deref() else {
                continue;
            };
            match self
                .inventory
                .record_upload(&record.local_id, platform_id, &record.upload_date)
                .await
            {
                Ok(()) => merged += 1,
                Err(e) => error!(
                    local_id = %record.local_id,
                    platform_id,
                    error = %e,
                    "Failed to update inventory"
                ),
            }
        }

        info!(batch = %batch_id, rows = records.len(), inventory = merged, "Batch ledgered");
        Ok(())
    }
}
