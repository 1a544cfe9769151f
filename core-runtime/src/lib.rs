//! # Core Runtime Module
//!
//! Provides foundational runtime infrastructure for the upload engine:
//! - Logging and tracing infrastructure
//! - Configuration management (builder, validation, `.env` loading)
//!
//! ## Overview
//!
//! This crate contains the runtime utilities the other crates depend on. It
//! establishes the logging conventions and the single validated
//! configuration object every upload run is started with.

pub mod config;
pub mod error;
pub mod logging;

pub use config::{UploadConfig, UploadConfigBuilder};
pub use error::{Error, Result};
