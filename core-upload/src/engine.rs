//! # Upload Engine
//!
//! Orchestrates one upload run from candidate list to ledger.
//!
//! ## Overview
//!
//! 1. Apply the optional per-kind limit
//! 2. Resolve cached and repeated filenames without touching the network
//!    (ledgered under batch sequence `0`)
//! 3. Acquire a console session and bind a [`Console`] to it
//! 4. For each batch: run it through the [`RetryController`], ledger the
//!    results, re-acquire the session if it expired
//! 5. Release the session and return a [`RunSummary`]
//!
//! A failing batch never stops the run. The only run-fatal errors are
//! failures to write the run ledger.
//!
//! ## Cancellation
//!
//! The run observes a [`CancellationToken`] between batches, while waiting
//! for a session and while a batch is in flight. An interrupted batch is not
//! ledgered; batches completed before it stay on disk.
//!
//! ## Usage
//!
//! ```ignore
//! let engine = UploadEngine::new(&config, dependencies)?;
//! let summary = engine.run(items, CancellationToken::new()).await?;
//! println!("{} uploaded", summary.count(UploadStatus::Success));
//! ```

use crate::cache::CacheStore;
use crate::chunker::{apply_kind_limit, BatchChunker};
use crate::executor::{BatchExecutor, ExecutorSettings, UploadExecutor};
use crate::item::{BatchId, CreativeItem, RunId, UploadBatch, UploadResult, UploadStatus};
use crate::ledger::{InventoryStore, RunLedger, StatusLedger};
use crate::remote::{Console, ConsoleFactory};
use crate::retry::{RetryController, RetryPolicy};
use crate::{Result, UploadError};
use bridge_traits::session::{AuthSession, SessionProvider};
use bridge_traits::storage::FileSystemAccess;
use bridge_traits::time::Clock;
use core_runtime::config::UploadConfig;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};

/// Collaborators injected into the engine
#[derive(Clone)]
pub struct EngineDependencies {
    pub cache: Arc<CacheStore>,
    pub file_system: Arc<dyn FileSystemAccess>,
    pub sessions: Arc<dyn SessionProvider>,
    pub consoles: Arc<dyn ConsoleFactory>,
    pub inventory: Arc<dyn InventoryStore>,
    pub clock: Arc<dyn Clock>,
}

/// Aggregate outcome of one run
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub run_id: RunId,
    pub counts: BTreeMap<UploadStatus, usize>,
    /// Batches handed to the retry controller, including interrupted ones
    pub batches_attempted: usize,
    pub cancelled: bool,
    pub ledger_path: PathBuf,
}

impl RunSummary {
    fn new(run_id: RunId, ledger_path: PathBuf) -> Self {
        Self {
            run_id,
            counts: BTreeMap::new(),
            batches_attempted: 0,
            cancelled: false,
            ledger_path,
        }
    }

    fn add(&mut self, results: &[UploadResult]) {
        for result in results {
            *self.counts.entry(result.status).or_insert(0) += 1;
        }
    }

    pub fn count(&self, status: UploadStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    /// Items that received a ledgered outcome
    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }
}

/// Batch upload and duplicate-detection engine
pub struct UploadEngine {
    deps: EngineDependencies,
    chunker: BatchChunker,
    retry: RetryController,
    force: bool,
    limit_per_kind: Option<usize>,
    ledger_dir: PathBuf,
    platform_name: String,
}

impl UploadEngine {
    /// Build an engine driving the console through [`UploadExecutor`]
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::InvalidInput`] when the batch size is zero.
    pub fn new(config: &UploadConfig, deps: EngineDependencies) -> Result<Self> {
        let executor = Arc::new(UploadExecutor::new(
            Arc::clone(&deps.cache),
            Arc::clone(&deps.file_system),
            Arc::clone(&deps.clock),
            ExecutorSettings::from_config(config),
        ));
        Self::with_executor(config, deps, executor)
    }

    /// Build an engine around a custom batch executor
    pub fn with_executor(
        config: &UploadConfig,
        deps: EngineDependencies,
        executor: Arc<dyn BatchExecutor>,
    ) -> Result<Self> {
        let retry = RetryController::new(
            RetryPolicy::from_config(config),
            executor,
            Arc::clone(&deps.cache),
        );

        Ok(Self {
            chunker: BatchChunker::new(config.max_batch_size)?,
            retry,
            force: config.force,
            limit_per_kind: config.limit_per_kind,
            ledger_dir: config.ledger_dir.clone(),
            platform_name: config.platform_name.clone(),
            deps,
        })
    }

    /// Upload `items`, returning once every item has a ledgered outcome or
    /// the run was cancelled
    #[instrument(skip_all, fields(items = items.len()))]
    pub async fn run(&self, items: Vec<CreativeItem>, cancel: CancellationToken) -> Result<RunSummary> {
        let run_id = RunId::from_timestamp(self.deps.clock.now());
        let run_ledger = RunLedger::create(Arc::clone(&self.deps.file_system), &self.ledger_dir, &run_id).await?;
        let ledger = StatusLedger::new(
            run_ledger,
            Arc::clone(&self.deps.inventory),
            Arc::clone(&self.deps.clock),
            self.platform_name.clone(),
        );
        let mut summary = RunSummary::new(run_id.clone(), ledger.path().to_path_buf());

        info!(run = %run_id, ledger = ?ledger.path(), "Starting upload run");

        let items = apply_kind_limit(items, self.limit_per_kind);
        let (resolved, candidates) = self.prefilter(items);
        if !resolved.is_empty() {
            ledger.record(&BatchId::prefilter(run_id.clone()), &resolved).await?;
            summary.add(&resolved);
        }

        let batches = self.chunker.chunk(&run_id, candidates);
        if batches.is_empty() {
            info!(run = %run_id, "Nothing to upload");
            return Ok(summary);
        }

        let mut session = None;
        let outcome = self
            .run_batches(&ledger, &batches, &mut session, &cancel, &mut summary)
            .await;

        if let Some(session) = session {
            if let Err(e) = self.deps.sessions.release(session).await {
                warn!(error = %e, "Failed to release console session");
            }
        }
        outcome?;

        info!(
            run = %run_id,
            success = summary.count(UploadStatus::Success),
            duplicate = summary.count(UploadStatus::Duplicate),
            failed = summary.count(UploadStatus::Failed),
            skipped = summary.count(UploadStatus::Skipped),
            dry_run = summary.count(UploadStatus::DryRun),
            batches = summary.batches_attempted,
            cancelled = summary.cancelled,
            "Upload run finished"
        );
        Ok(summary)
    }

    /// Split off items that need no network work
    fn prefilter(&self, items: Vec<CreativeItem>) -> (Vec<UploadResult>, Vec<CreativeItem>) {
        let mut seen = HashSet::new();
        let mut resolved = Vec::new();
        let mut candidates = Vec::new();

        for item in items {
            if !seen.insert(item.filename.clone()) {
                warn!(filename = %item.filename, "Repeated filename, skipping");
                resolved.push(UploadResult::skipped(item, "Repeated filename in candidate set"));
                continue;
            }
            if !self.force {
                if let Some(platform_id) = self.deps.cache.lookup(&item.filename) {
                    resolved.push(UploadResult::duplicate(item, Some(platform_id)));
                    continue;
                }
            }
            candidates.push(item);
        }

        info!(
            cached_or_repeated = resolved.len(),
            candidates = candidates.len(),
            "Filtered candidates against cache"
        );
        (resolved, candidates)
    }

    async fn run_batches(
        &self,
        ledger: &StatusLedger,
        batches: &[UploadBatch],
        session: &mut Option<AuthSession>,
        cancel: &CancellationToken,
        summary: &mut RunSummary,
    ) -> Result<()> {
        let mut console = match self.acquire(cancel).await {
            Ok(Some(acquired)) => {
                let console = self.deps.consoles.bind(&acquired);
                *session = Some(acquired);
                console
            }
            Ok(None) => {
                summary.cancelled = true;
                return Ok(());
            }
            Err(e) => {
                error!(error = %e, "Could not acquire console session");
                return self.fail_remaining(ledger, batches, &e, summary).await;
            }
        };

        for (index, batch) in batches.iter().enumerate() {
            if cancel.is_cancelled() {
                summary.cancelled = true;
                break;
            }

            summary.batches_attempted += 1;
            info!(batch = %batch.id, kind = %batch.kind, items = batch.len(), "Uploading batch");

            let report = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    warn!(batch = %batch.id, "Run cancelled, abandoning batch in flight");
                    self.deps.cache.mark_stale();
                    summary.cancelled = true;
                    break;
                }
                report = self.retry.run_batch(&console, batch) => report,
            };

            ledger.record(&batch.id, &report.results).await?;
            summary.add(&report.results);

            let remaining = &batches[index + 1..];
            if !report.session_expired() || remaining.is_empty() {
                continue;
            }

            warn!(batch = %batch.id, "Console session expired, acquiring a new one");
            if let Some(expired) = session.take() {
                if let Err(e) = self.deps.sessions.release(expired).await {
                    warn!(error = %e, "Failed to release expired session");
                }
            }

            match self.acquire(cancel).await {
                Ok(Some(acquired)) => {
                    console = self.deps.consoles.bind(&acquired);
                    *session = Some(acquired);
                }
                Ok(None) => {
                    summary.cancelled = true;
                    break;
                }
                Err(e) => {
                    error!(error = %e, "Could not re-acquire console session");
                    return self.fail_remaining(ledger, remaining, &e, summary).await;
                }
            }
        }

        Ok(())
    }

    /// Wait for a session; `None` when cancelled first
    async fn acquire(&self, cancel: &CancellationToken) -> Result<Option<AuthSession>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Ok(None),
            acquired = self.deps.sessions.acquire() => {
                let session = acquired?;
                info!(session = %session.id, "Console session ready");
                Ok(Some(session))
            }
        }
    }

    async fn fail_remaining(
        &self,
        ledger: &StatusLedger,
        batches: &[UploadBatch],
        err: &UploadError,
        summary: &mut RunSummary,
    ) -> Result<()> {
        for batch in batches {
            let results: Vec<UploadResult> = batch
                .items
                .iter()
                .map(|item| UploadResult::failed(item.clone(), err.to_string()))
                .collect();
            ledger.record(&batch.id, &results).await?;
            summary.add(&results);
        }
        Ok(())
    }
}
