//! # Upload Cache Store
//!
//! Persistent filename → platform id map, consulted before any network work.
//!
//! ## Overview
//!
//! The store keeps every row it has ever appended; the in-memory index points
//! each filename at its newest row. Forced re-uploads therefore add rows
//! rather than rewriting old ones.
//!
//! It also remembers the last complete listing snapshot seen per creative
//! kind during this run, so consecutive batches can skip the pre-upload
//! scan. That set is only trusted while it is non-empty and has not been
//! marked stale; a freshly loaded store is stale.
//!
//! ## Backends
//!
//! - [`JsonlCacheBackend`]: one JSON object per line, appended durably
//! - [`InMemoryCacheBackend`]: for tests and dry tooling

use crate::item::CreativeKind;
use crate::{Result, UploadError};
use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

/// Review state assigned to freshly uploaded creatives
pub const REVIEW_PENDING: &str = "pending";

/// One confirmed upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub filename: String,
    pub platform_id: String,
    /// `YYYY-MM-DD`
    pub upload_date: String,
    /// `video` or `image`
    pub file_kind: String,
    pub creative_kind: CreativeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<String>,
    pub review_status: String,
}

// ============================================================================
// Backends
// ============================================================================

/// Durable storage behind a [`CacheStore`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// All rows in append order; a missing store is empty
    async fn read_all(&self) -> Result<Vec<CacheEntry>>;

    /// Append one row; must be durable when this returns
    async fn append(&self, entry: &CacheEntry) -> Result<()>;
}

/// Whether the file currently ends on a row boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tail {
    Unknown,
    Clean,
    /// Last line has no newline; the next append must start a fresh line
    Torn,
}

impl Tail {
    fn of(data: &[u8]) -> Self {
        match data.last() {
            None | Some(b'\n') => Tail::Clean,
            Some(_) => Tail::Torn,
        }
    }
}

/// JSON Lines file backend
///
/// A crash mid-append can leave a final line without its newline. Such a
/// fragment is skipped on load and the next append starts on a new line, so
/// rows written after the crash stay readable.
pub struct JsonlCacheBackend {
    fs: Arc<dyn FileSystemAccess>,
    path: PathBuf,
    tail: AsyncMutex<Tail>,
}

impl JsonlCacheBackend {
    pub fn new(fs: Arc<dyn FileSystemAccess>, path: impl Into<PathBuf>) -> Self {
        Self {
            fs,
            path: path.into(),
            tail: AsyncMutex::new(Tail::Unknown),
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }

    async fn inspect_tail(&self) -> Result<Tail> {
        if !self.fs.exists(&self.path).await? {
            return Ok(Tail::Clean);
        }
        let data = self.fs.read_file(&self.path).await?;
        Ok(Tail::of(&data))
    }
}

#[async_trait]
impl CacheBackend for JsonlCacheBackend {
    async fn read_all(&self) -> Result<Vec<CacheEntry>> {
        let mut tail = self.tail.lock().await;
        if !self.fs.exists(&self.path).await? {
            debug!(path = ?self.path, "No cache file yet, starting empty");
            *tail = Tail::Clean;
            return Ok(Vec::new());
        }

        let data = self.fs.read_file(&self.path).await?;
        *tail = Tail::of(&data);
        if *tail == Tail::Torn {
            warn!(path = ?self.path, "Cache file ends in a partial row");
        }
        let text = String::from_utf8_lossy(&data);

        let mut entries = Vec::new();
        for (line_no, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match serde_json::from_str::<CacheEntry>(line) {
                Ok(entry) => entries.push(entry),
                // A crash mid-append can leave a torn last line
                Err(e) => warn!(
                    path = ?self.path,
                    line = line_no + 1,
                    error = %e,
                    "Skipping malformed cache row"
                ),
            }
        }

        Ok(entries)
    }

    async fn append(&self, entry: &CacheEntry) -> Result<()> {
        let mut tail = self.tail.lock().await;
        if *tail == Tail::Unknown {
            *tail = self.inspect_tail().await?;
        }

        let mut line = String::new();
        if *tail == Tail::Torn {
            line.push('\n');
        }
        line.push_str(&serde_json::to_string(entry)?);
        line.push('\n');

        match self.fs.append_file(&self.path, Bytes::from(line)).await {
            Ok(()) => {
                *tail = Tail::Clean;
                Ok(())
            }
            Err(e) => {
                // A failed write may have left a fragment of its own
                *tail = Tail::Unknown;
                Err(UploadError::Storage(format!("cache append failed: {}", e)))
            }
        }
    }
}

/// Volatile backend keeping rows in memory
#[derive(Default)]
pub struct InMemoryCacheBackend {
    rows: Mutex<Vec<CacheEntry>>,
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backend pre-populated as if earlier runs had appended `rows`
    pub fn with_entries(rows: Vec<CacheEntry>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Every row appended so far, including preloaded ones
    pub fn rows(&self) -> Vec<CacheEntry> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl CacheBackend for InMemoryCacheBackend {
    async fn read_all(&self) -> Result<Vec<CacheEntry>> {
        Ok(self.rows())
    }

    async fn append(&self, entry: &CacheEntry) -> Result<()> {
        self.rows
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(entry.clone());
        Ok(())
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct KnownRemoteIds {
    by_kind: HashMap<CreativeKind, HashSet<String>>,
    stale: bool,
}

/// Filename-keyed upload cache, injected into the engine
pub struct CacheStore {
    backend: Arc<dyn CacheBackend>,
    entries: RwLock<HashMap<String, CacheEntry>>,
    remote: RwLock<KnownRemoteIds>,
}

impl CacheStore {
    /// Create an empty, unloaded store
    pub fn new(backend: Arc<dyn CacheBackend>) -> Self {
        Self {
            backend,
            entries: RwLock::new(HashMap::new()),
            remote: RwLock::new(KnownRemoteIds {
                by_kind: HashMap::new(),
                stale: true,
            }),
        }
    }

    /// Read the backend into memory, returning the number of distinct filenames
    pub async fn load(&self) -> Result<usize> {
        let rows = self.backend.read_all().await?;
        let row_count = rows.len();

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        for row in rows {
            entries.insert(row.filename.clone(), row);
        }

        info!(rows = row_count, filenames = entries.len(), "Loaded upload cache");
        Ok(entries.len())
    }

    /// Platform id recorded for `filename`, if any
    pub fn lookup(&self, filename: &str) -> Option<String> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(filename)
            .map(|entry| entry.platform_id.clone())
    }

    pub fn get(&self, filename: &str) -> Option<CacheEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(filename)
            .cloned()
    }

    /// Durably append `entry`, then point its filename at it
    pub async fn upsert(&self, entry: CacheEntry) -> Result<()> {
        self.backend.append(&entry).await?;

        debug!(filename = %entry.filename, platform_id = %entry.platform_id, "Cached upload");
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(entry.filename.clone(), entry);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Record a complete listing snapshot for `kind` and trust it again
    pub fn remember_remote_ids(&self, kind: CreativeKind, ids: &HashSet<String>) {
        let mut remote = self.remote.write().unwrap_or_else(|e| e.into_inner());
        remote.by_kind.insert(kind, ids.clone());
        remote.stale = false;
    }

    /// Stop trusting every remembered snapshot until the next full scan
    pub fn mark_stale(&self) {
        let mut remote = self.remote.write().unwrap_or_else(|e| e.into_inner());
        if !remote.stale {
            debug!("Known remote ids marked stale");
        }
        remote.stale = true;
        remote.by_kind.clear();
    }

    /// Remembered ids for `kind`, when they can stand in for a scan
    pub fn trusted_remote_ids(&self, kind: CreativeKind) -> Option<HashSet<String>> {
        let remote = self.remote.read().unwrap_or_else(|e| e.into_inner());
        if remote.stale {
            return None;
        }
        remote
            .by_kind
            .get(&kind)
            .filter(|ids| !ids.is_empty())
            .cloned()
    }
}
