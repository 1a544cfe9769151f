//! # Creative Upload Engine
//!
//! Publishes locally prepared creatives to the platform's web console and
//! records the id the platform assigned to each one.
//!
//! ## Overview
//!
//! This crate manages:
//! - The filename → platform id cache consulted before any network work
//! - Paginated listing scans and before/after snapshot diffing
//! - Bounded, single-kind batch submission with retries
//! - The per-run status ledger and inventory hand-off
//!
//! The console itself is reached only through [`remote::RemoteListingReader`]
//! and [`remote::UploadSurface`]; [`console`] implements them on top of a
//! [`bridge_traits::PageDriver`].

pub mod cache;
pub mod chunker;
pub mod console;
pub mod engine;
pub mod error;
pub mod executor;
pub mod item;
pub mod ledger;
pub mod remote;
pub mod retry;
pub mod scanner;
pub mod screenshots;

pub use cache::{CacheBackend, CacheEntry, CacheStore, InMemoryCacheBackend, JsonlCacheBackend};
pub use chunker::{apply_kind_limit, BatchChunker};
pub use engine::{EngineDependencies, RunSummary, UploadEngine};
pub use error::{Result, UploadError};
pub use executor::{BatchExecutor, BatchProgress, UploadExecutor};
pub use item::{BatchId, CreativeItem, CreativeKind, RunId, UploadBatch, UploadResult, UploadStatus};
pub use ledger::{InMemoryInventoryStore, InventoryStore, SqliteInventoryStore, StatusLedger, StatusLedgerRecord};
pub use remote::{Console, ConsoleFactory, RemoteListingReader, TerminalProgress, UploadSurface};
pub use retry::{BatchReport, RetryController, RetryPolicy};
pub use scanner::{ListingScanner, RemoteSnapshot};
pub use screenshots::BatchScreenshots;
