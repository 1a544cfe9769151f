//! # Retry Controller
//!
//! Runs a [`BatchExecutor`] under a bounded [`RetryPolicy`]. The controller
//! never gives up on a batch silently: whatever happens, every item of the
//! batch comes back with exactly one [`UploadResult`].

use crate::cache::CacheStore;
use crate::executor::{BatchExecutor, BatchProgress};
use crate::item::{UploadBatch, UploadResult};
use crate::remote::Console;
use crate::UploadError;
use core_runtime::config::UploadConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, instrument, warn};

/// How many times a batch is attempted and how long to wait in between
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }

    pub fn from_config(config: &UploadConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay)
    }

    /// Whether another attempt may fix `err`
    pub fn is_retryable(&self, err: &UploadError) -> bool {
        err.is_retryable()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(2))
    }
}

/// Outcome of one batch after all attempts
#[derive(Debug)]
pub struct BatchReport {
    /// One result per item, in batch order
    pub results: Vec<UploadResult>,
    pub attempts: u32,
    /// Error that ended the final attempt, if it failed
    pub last_error: Option<UploadError>,
}

impl BatchReport {
    /// The batch ended because the console session is gone
    pub fn session_expired(&self) -> bool {
        self.last_error
            .as_ref()
            .is_some_and(UploadError::is_session_expired)
    }
}

/// Wraps an executor with the retry policy
pub struct RetryController {
    policy: RetryPolicy,
    executor: Arc<dyn BatchExecutor>,
    cache: Arc<CacheStore>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, executor: Arc<dyn BatchExecutor>, cache: Arc<CacheStore>) -> Self {
        Self {
            policy,
            executor,
            cache,
        }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    #[instrument(skip_all, fields(batch = %batch.id, items = batch.len()))]
    pub async fn run_batch(&self, console: &Console, batch: &UploadBatch) -> BatchReport {
        let mut progress = BatchProgress::new();

        let last_error = loop {
            let err = match self.executor.execute(console, batch, &mut progress).await {
                Ok(()) => break None,
                Err(err) => err,
            };

            // Whatever the failure, the listing may have changed under us
            self.cache.mark_stale();

            if !self.policy.is_retryable(&err) {
                error!(attempt = progress.attempt, error = %err, "Batch failed, not retryable");
                break Some(err);
            }
            if progress.attempt >= self.policy.max_attempts {
                error!(attempts = progress.attempt, error = %err, "Batch failed, retries exhausted");
                break Some(err);
            }

            warn!(
                attempt = progress.attempt,
                max_attempts = self.policy.max_attempts,
                error = %err,
                "Batch attempt failed, retrying"
            );
            tokio::time::sleep(self.policy.delay).await;
        };

        let attempts = progress.attempt;
        let results = progress.into_results(batch, last_error.as_ref());
        if last_error.is_none() {
            info!(attempts, "Batch finished");
        }

        BatchReport {
            results,
            attempts,
            last_error,
        }
    }
}
