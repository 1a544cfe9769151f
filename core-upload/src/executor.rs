//! # Upload Executor
//!
//! Submits one [`UploadBatch`] and works out which platform id each
//! submitted file received.
//!
//! ## Overview
//!
//! An attempt walks through these phases:
//!
//! 1. **Filtering**: cached, missing or oversized items are resolved locally
//! 2. **Pre-snapshot**: trusted remote ids from the cache store, or a scan
//! 3. **Submitting**: every remaining file attached in one operation
//! 4. **Awaiting terminal state**: poll the form until all files settle
//! 5. **Post-snapshot**: full scan of the listing
//! 6. **Matching**: diff the snapshots and pair new ids with filenames
//!
//! State that must survive a failed attempt lives in [`BatchProgress`].
//! When an attempt fails after files were submitted, the next attempt scans
//! first and claims whatever the earlier submission created, so files that
//! made it onto the platform are never submitted twice.
//!
//! With a screenshot directory configured, each step of an attempt is
//! captured through [`BatchScreenshots`].

use crate::cache::{CacheEntry, CacheStore, REVIEW_PENDING};
use crate::item::{CreativeItem, CreativeKind, UploadBatch, UploadResult};
use crate::remote::Console;
use crate::scanner::{ListingScanner, RemoteSnapshot};
use crate::screenshots::{self, BatchScreenshots};
use crate::{Result, UploadError};
use async_trait::async_trait;
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::config::UploadConfig;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

/// Per-batch state carried from one attempt to the next
#[derive(Debug, Default)]
pub struct BatchProgress {
    /// Resolved outcomes keyed by position in the batch
    pub results: BTreeMap<usize, UploadResult>,
    /// Snapshot taken before the last submission
    pub baseline: Option<RemoteSnapshot>,
    /// Files were handed to the platform and not yet reconciled
    pub submitted: bool,
    /// Attempts started so far
    pub attempt: u32,
}

impl BatchProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Positions of items that still need an outcome
    pub fn pending(&self, batch: &UploadBatch) -> Vec<usize> {
        (0..batch.len())
            .filter(|index| !self.results.contains_key(index))
            .collect()
    }

    pub fn is_resolved(&self, batch: &UploadBatch) -> bool {
        self.results.len() >= batch.len()
    }

    fn retries(&self) -> u32 {
        self.attempt.saturating_sub(1)
    }

    fn resolve(&mut self, index: usize, result: UploadResult) {
        let retries = self.retries();
        self.results.insert(index, result.with_retries(retries));
    }

    /// Outcomes in batch order, failing every unresolved item with `error`
    pub fn into_results(mut self, batch: &UploadBatch, error: Option<&UploadError>) -> Vec<UploadResult> {
        let retries = self.retries();
        batch
            .items
            .iter()
            .enumerate()
            .map(|(index, item)| {
                self.results.remove(&index).unwrap_or_else(|| {
                    let message = error
                        .map(ToString::to_string)
                        .unwrap_or_else(|| "Upload did not complete".to_string());
                    UploadResult::failed(item.clone(), message).with_retries(retries)
                })
            })
            .collect()
    }
}

/// One attempt at a batch
#[async_trait]
pub trait BatchExecutor: Send + Sync {
    /// Resolve as many items of `batch` as possible, recording them in `progress`
    ///
    /// Returning `Ok` means every item has an outcome.
    async fn execute(
        &self,
        console: &Console,
        batch: &UploadBatch,
        progress: &mut BatchProgress,
    ) -> Result<()>;
}

/// Timing and policy knobs of the executor
#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub force: bool,
    pub dry_run: bool,
    pub full_refresh: bool,
    pub poll_interval: Duration,
    pub per_item_timeout: Duration,
    pub settle_delay: Duration,
    pub native_image_max_bytes: u64,
    pub max_pages: usize,
    /// Root of the step screenshots, `None` to skip them
    pub screenshot_dir: Option<PathBuf>,
}

impl ExecutorSettings {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            force: config.force,
            dry_run: config.dry_run,
            full_refresh: config.full_refresh,
            poll_interval: config.poll_interval,
            per_item_timeout: config.per_item_timeout,
            settle_delay: config.settle_delay,
            native_image_max_bytes: config.native_image_max_bytes,
            max_pages: config.max_pages,
            screenshot_dir: config
                .take_screenshots
                .then(|| config.screenshot_dir.clone()),
        }
    }
}

/// Console-driven [`BatchExecutor`]
pub struct UploadExecutor {
    cache: Arc<CacheStore>,
    fs: Arc<dyn FileSystemAccess>,
    clock: Arc<dyn Clock>,
    scanner: ListingScanner,
    settings: ExecutorSettings,
}

impl UploadExecutor {
    pub fn new(
        cache: Arc<CacheStore>,
        fs: Arc<dyn FileSystemAccess>,
        clock: Arc<dyn Clock>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            cache,
            fs,
            clock,
            scanner: ListingScanner::new(settings.max_pages),
            settings,
        }
    }

    // ========================================================================
    // Filtering
    // ========================================================================

    async fn filter(&self, batch: &UploadBatch, progress: &mut BatchProgress) -> Result<()> {
        for index in progress.pending(batch) {
            let item = &batch.items[index];

            if !self.settings.force {
                if let Some(platform_id) = self.cache.lookup(&item.filename) {
                    debug!(filename = %item.filename, platform_id = %platform_id, "Cached, not uploading");
                    progress.resolve(index, UploadResult::duplicate(item.clone(), Some(platform_id)));
                    continue;
                }
            }

            if !self.fs.exists(&item.local_path).await? {
                let err = UploadError::LocalFileMissing {
                    path: item.local_path.clone(),
                };
                warn!(filename = %item.filename, error = %err, "Skipping missing file");
                progress.resolve(index, UploadResult::failed(item.clone(), err.to_string()));
                continue;
            }

            if item.creative_kind == CreativeKind::NativeImage {
                let size = self.fs.metadata(&item.local_path).await?.size;
                if size > self.settings.native_image_max_bytes {
                    let reason = format!(
                        "Native image is {} bytes, limit is {}",
                        size, self.settings.native_image_max_bytes
                    );
                    warn!(filename = %item.filename, "{}", reason);
                    progress.resolve(index, UploadResult::skipped(item.clone(), reason));
                }
            }
        }
        Ok(())
    }

    // ========================================================================
    // Snapshots
    // ========================================================================

    async fn full_scan(&self, console: &Console, kind: CreativeKind, phase: &str) -> Result<RemoteSnapshot> {
        let snapshot = self.scanner.scan(console.reader.as_ref(), kind).await?;
        if snapshot.pages_read == 0 {
            return Err(UploadError::TransientNetwork(format!(
                "{} listing scan read no pages",
                phase
            )));
        }
        Ok(snapshot)
    }

    async fn pre_snapshot(&self, console: &Console, kind: CreativeKind) -> Result<RemoteSnapshot> {
        if !self.settings.full_refresh {
            if let Some(ids) = self.cache.trusted_remote_ids(kind) {
                debug!(kind = %kind, ids = ids.len(), "Reusing known remote ids");
                return Ok(RemoteSnapshot::from_known(ids));
            }
        }
        self.full_scan(console, kind, "Pre-upload").await
    }

    // ========================================================================
    // Submission
    // ========================================================================

    async fn await_terminal(&self, console: &Console, submitted: usize) -> Result<()> {
        let timeout = self.settings.per_item_timeout * submitted as u32;
        let deadline = Instant::now() + timeout;

        loop {
            let progress = console.surface.progress().await?;
            if progress.is_terminal(submitted) {
                if progress.errored > 0 {
                    warn!(errored = progress.errored, "Console reported upload errors");
                }
                debug!(completed = progress.completed, "Uploads reached terminal state");
                return Ok(());
            }

            if Instant::now() >= deadline {
                return Err(UploadError::TerminalStateTimeout {
                    submitted,
                    finished: progress.finished(),
                    timeout,
                });
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    fn screenshots(&self, batch: &UploadBatch, attempt: u32) -> BatchScreenshots {
        BatchScreenshots::new(self.settings.screenshot_dir.as_deref(), batch, attempt)
    }

    // ========================================================================
    // Matching
    // ========================================================================

    /// Claim new ids for the pending items; returns positions left unmatched
    async fn claim_new_ids(
        &self,
        console: &Console,
        batch: &UploadBatch,
        progress: &mut BatchProgress,
        pending: &[usize],
        new_ids: &HashSet<String>,
    ) -> Result<Vec<usize>> {
        let items: Vec<CreativeItem> = pending.iter().map(|&i| batch.items[i].clone()).collect();
        let matched = self
            .scanner
            .resolve_names(console.reader.as_ref(), batch.kind, &items, new_ids)
            .await?;

        let mut unmatched = Vec::new();
        for &index in pending {
            let item = &batch.items[index];
            match matched.get(&item.filename) {
                Some(platform_id) => {
                    self.cache.upsert(self.cache_entry(item, platform_id)).await?;
                    info!(filename = %item.filename, platform_id = %platform_id, "Upload confirmed");
                    progress.resolve(index, UploadResult::success(item.clone(), platform_id.clone()));
                }
                None => unmatched.push(index),
            }
        }
        Ok(unmatched)
    }

    fn cache_entry(&self, item: &CreativeItem, platform_id: &str) -> CacheEntry {
        CacheEntry {
            filename: item.filename.clone(),
            platform_id: platform_id.to_string(),
            upload_date: self.clock.now().format("%Y-%m-%d").to_string(),
            file_kind: item.creative_kind.file_kind().to_string(),
            creative_kind: item.creative_kind,
            dimensions: item.dimensions.clone(),
            review_status: REVIEW_PENDING.to_string(),
        }
    }

    /// Reconcile a submission made by an earlier, failed attempt
    async fn recover(&self, console: &Console, batch: &UploadBatch, progress: &mut BatchProgress) -> Result<()> {
        let Some(baseline) = progress.baseline.clone() else {
            progress.submitted = false;
            return Ok(());
        };

        info!("Checking listing for files submitted by the previous attempt");
        let current = self.full_scan(console, batch.kind, "Recovery").await?;
        let new_ids = current.difference(&baseline);

        let pending = progress.pending(batch);
        if !new_ids.is_empty() {
            let unmatched = self
                .claim_new_ids(console, batch, progress, &pending, &new_ids)
                .await?;
            info!(
                recovered = pending.len() - unmatched.len(),
                resubmit = unmatched.len(),
                "Recovered earlier submission"
            );
        }

        progress.baseline = Some(current);
        progress.submitted = false;
        Ok(())
    }
}

#[async_trait]
impl BatchExecutor for UploadExecutor {
    #[instrument(skip_all, fields(batch = %batch.id, kind = %batch.kind))]
    async fn execute(
        &self,
        console: &Console,
        batch: &UploadBatch,
        progress: &mut BatchProgress,
    ) -> Result<()> {
        progress.attempt += 1;
        let mut shots = self.screenshots(batch, progress.attempt);

        let outcome = self.attempt(console, batch, progress, &mut shots).await;
        if let Err(e) = &outcome {
            if !e.is_session_expired() && !matches!(e, UploadError::TerminalStateTimeout { .. }) {
                shots
                    .capture(console.surface.as_ref(), self.fs.as_ref(), screenshots::BATCH_ERROR)
                    .await;
            }
        }
        outcome
    }
}

impl UploadExecutor {
    async fn attempt(
        &self,
        console: &Console,
        batch: &UploadBatch,
        progress: &mut BatchProgress,
        shots: &mut BatchScreenshots,
    ) -> Result<()> {
        let surface = console.surface.as_ref();
        let fs = self.fs.as_ref();

        self.filter(batch, progress).await?;

        if progress.submitted {
            self.recover(console, batch, progress).await?;
        }

        let pending = progress.pending(batch);
        if pending.is_empty() {
            debug!("Nothing left to submit");
            return Ok(());
        }

        // A recovery scan doubles as the baseline for resubmitting
        let baseline = match progress.baseline.take() {
            Some(snapshot) => snapshot,
            None => self.pre_snapshot(console, batch.kind).await?,
        };

        surface.open_upload_form(batch.kind).await?;
        shots.capture(surface, fs, screenshots::FORM_OPEN).await;

        if self.settings.dry_run {
            shots.capture(surface, fs, screenshots::DRY_RUN_READY).await;
            info!(items = pending.len(), "Dry run, nothing submitted");
            for index in pending {
                progress.resolve(index, UploadResult::dry_run(batch.items[index].clone()));
            }
            return Ok(());
        }

        let paths: Vec<PathBuf> = pending
            .iter()
            .map(|&i| batch.items[i].local_path.clone())
            .collect();
        progress.baseline = Some(baseline.clone());
        progress.submitted = true;
        surface.submit_files(&paths).await?;
        info!(files = paths.len(), "Submitted batch");
        shots.capture(surface, fs, screenshots::FILES_UPLOADED).await;

        if let Err(e) = self.await_terminal(console, paths.len()).await {
            if matches!(e, UploadError::TerminalStateTimeout { .. }) {
                shots.capture(surface, fs, screenshots::TIMEOUT_INCOMPLETE).await;
            }
            return Err(e);
        }
        shots.capture(surface, fs, screenshots::UPLOADS_COMPLETE).await;
        tokio::time::sleep(self.settings.settle_delay).await;

        let post = self.full_scan(console, batch.kind, "Post-upload").await?;
        if post.complete {
            self.cache.remember_remote_ids(batch.kind, &post.ids);
        } else {
            self.cache.mark_stale();
        }

        let new_ids = post.difference(&baseline);
        info!(new_ids = new_ids.len(), "Diffed listing snapshots");

        if new_ids.is_empty() {
            shots.capture(surface, fs, screenshots::NO_NEW_IDS).await;
            for index in pending {
                let item = &batch.items[index];
                let note = UploadError::DuplicateRejected {
                    filename: item.filename.clone(),
                };
                info!(filename = %item.filename, "{}", note);
                let mut result = UploadResult::duplicate(item.clone(), None);
                result.error_message = Some(note.to_string());
                progress.resolve(index, result);
            }
        } else {
            let unmatched = self
                .claim_new_ids(console, batch, progress, &pending, &new_ids)
                .await?;
            for index in unmatched {
                let item = &batch.items[index];
                let err = UploadError::IdExtractionFailure {
                    filename: item.filename.clone(),
                };
                warn!(filename = %item.filename, "{}", err);
                progress.resolve(index, UploadResult::failed(item.clone(), err.to_string()));
            }
            shots.capture(surface, fs, screenshots::BATCH_SUCCESS).await;
        }

        progress.submitted = false;
        progress.baseline = None;
        Ok(())
    }
}
