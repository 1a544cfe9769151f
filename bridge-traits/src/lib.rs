//! # Host Bridge Traits
//!
//! Capability traits the upload core requires from its host.
//!
//! ## Overview
//!
//! This crate defines the contract between the upload engine and
//! platform-specific implementations. Each trait represents a capability that
//! the engine needs but that is provided differently per host (a desktop
//! WebDriver session, an in-process fake in tests).
//!
//! ## Traits
//!
//! ### Remote Console
//! - [`PageDriver`](browser::PageDriver) - Page-level browser primitives (find, read, click, attach files)
//! - [`SessionProvider`](session::SessionProvider) - Hands out logged-in [`AuthSession`](session::AuthSession)s
//!
//! ### Local I/O
//! - [`FileSystemAccess`](storage::FileSystemAccess) - Existence checks, reads and durable appends
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should:
//!
//! - Report a dead browser session as `SessionExpired`, never as a generic failure
//! - Report bounded waits that ran out as `Timeout`
//! - Include context (selector, path, URL) in messages
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so handles can be shared through
//! `Arc` across async tasks. The engine still serializes every remote call.

pub mod browser;
pub mod error;
pub mod session;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use browser::{ElementHandle, PageDriver};
pub use session::{AuthSession, SessionId, SessionProvider};
pub use storage::{FileMetadata, FileSystemAccess};
pub use time::{Clock, FixedClock, LogEntry, LogLevel, LoggerSink, SystemClock};
