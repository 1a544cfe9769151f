//! # Upload Configuration Module
//!
//! Provides configuration management for the creative upload engine.
//!
//! ## Overview
//!
//! The configuration system uses a builder pattern to construct an
//! [`UploadConfig`] instance holding every tunable the engine reads: batch
//! sizing, pagination ceilings, retry policy, polling timings and the
//! locations of the persistent stores. Validation is fail-fast: `build()`
//! rejects inconsistent settings with an actionable message before any
//! browser session is opened.
//!
//! ## Usage
//!
//! ### Explicit Configuration
//!
//! ```ignore
//! use core_runtime::config::UploadConfig;
//!
//! let config = UploadConfig::builder()
//!     .max_batch_size(5)
//!     .dry_run(false)
//!     .cache_path("/data/upload_cache.jsonl")
//!     .build()
//!     .expect("Failed to build config");
//! ```
//!
//! ### From the Environment
//!
//! ```ignore
//! use core_runtime::config::UploadConfig;
//!
//! // Reads UPLOAD_* variables, after loading `.env` if present
//! let config = UploadConfig::from_env()?;
//! ```
//!
//! ## Error Handling
//!
//! ```should_panic
//! use core_runtime::config::UploadConfig;
//!
//! // A zero batch size would never make progress
//! let config = UploadConfig::builder()
//!     .max_batch_size(0)
//!     .build()
//!     .expect("Should fail - batch size must be positive");
//! ```

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Largest batch the console accepts in one file-input operation
pub const MAX_BATCH_SIZE_LIMIT: usize = 100;

/// Default WebDriver endpoint (`chromedriver --port=9515`)
pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";

/// Default console page listing uploaded creatives
pub const DEFAULT_MEDIA_LIBRARY_URL: &str = "https://advertiser.trafficjunky.com/media-library";

/// Upload engine configuration.
///
/// Use [`UploadConfigBuilder`] to construct instances.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadConfig {
    /// Maximum number of files submitted in one batch
    pub max_batch_size: usize,

    /// Maximum listing pages read by one remote scan
    pub max_pages: usize,

    /// Maximum attempts per batch (first attempt included)
    pub max_retries: u32,

    /// Fixed delay between batch attempts
    pub retry_delay: Duration,

    /// Upload even when the cache already knows the filename
    pub force: bool,

    /// Open upload forms without submitting anything
    pub dry_run: bool,

    /// Ignore the known remote id set and always scan before submitting
    pub full_refresh: bool,

    /// Interval between upload progress checks
    pub poll_interval: Duration,

    /// Per-file allowance when waiting for uploads to finish
    pub per_item_timeout: Duration,

    /// Pause after uploads finish, before the listing is re-read
    pub settle_delay: Duration,

    /// Upper bound for a single page navigation
    pub navigation_timeout: Duration,

    /// Largest native image accepted by the console, in bytes
    pub native_image_max_bytes: u64,

    /// Optional cap on items per creative kind (native pairs kept together)
    pub limit_per_kind: Option<usize>,

    /// Platform name written to ledger rows
    pub platform_name: String,

    /// Console page listing uploaded creatives
    pub media_library_url: String,

    /// JSON Lines file backing the upload cache
    pub cache_path: PathBuf,

    /// Directory receiving one status ledger file per run
    pub ledger_dir: PathBuf,

    /// SQLite database holding the creative inventory
    pub inventory_db_path: PathBuf,

    /// WebDriver server endpoint
    pub webdriver_url: String,

    /// Capture the console page at each batch step
    pub take_screenshots: bool,

    /// Root directory for step screenshots, one subdirectory per run and batch
    pub screenshot_dir: PathBuf,

    /// Restore the last logged-in browser cookies before asking for a login
    pub reuse_session: bool,

    /// Where the logged-in cookies are saved between runs
    pub session_file: PathBuf,

    /// Persistent browser profile directory (`--user-data-dir`)
    pub browser_profile_dir: Option<PathBuf>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 10,
            max_pages: 50,
            max_retries: 3,
            retry_delay: Duration::from_secs(2),
            force: false,
            dry_run: true,
            full_refresh: false,
            poll_interval: Duration::from_secs(2),
            per_item_timeout: Duration::from_secs(30),
            settle_delay: Duration::from_secs(5),
            navigation_timeout: Duration::from_secs(30),
            native_image_max_bytes: 300_000,
            limit_per_kind: None,
            platform_name: "TrafficJunky".to_string(),
            media_library_url: DEFAULT_MEDIA_LIBRARY_URL.to_string(),
            cache_path: PathBuf::from("data/upload_cache.jsonl"),
            ledger_dir: PathBuf::from("data/upload_logs"),
            inventory_db_path: PathBuf::from("data/creative_inventory.db"),
            webdriver_url: DEFAULT_WEBDRIVER_URL.to_string(),
            take_screenshots: true,
            screenshot_dir: PathBuf::from("data/upload_logs/screenshots"),
            reuse_session: true,
            session_file: PathBuf::from("data/session/console_cookies.json"),
            browser_profile_dir: None,
        }
    }
}

impl UploadConfig {
    /// Creates a new builder seeded with defaults.
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::default()
    }

    /// Builds a configuration from `UPLOAD_*` environment variables.
    ///
    /// A `.env` file in the working directory (or a parent) is loaded first
    /// when present; variables already set in the process win.
    ///
    /// | Variable | Field |
    /// |----------|-------|
    /// | `UPLOAD_MAX_BATCH_SIZE` | `max_batch_size` |
    /// | `UPLOAD_MAX_PAGES` | `max_pages` |
    /// | `UPLOAD_MAX_RETRIES` | `max_retries` |
    /// | `UPLOAD_RETRY_DELAY_SECS` | `retry_delay` |
    /// | `UPLOAD_FORCE` | `force` |
    /// | `UPLOAD_DRY_RUN` | `dry_run` |
    /// | `UPLOAD_FULL_REFRESH` | `full_refresh` |
    /// | `UPLOAD_LIMIT_PER_KIND` | `limit_per_kind` |
    /// | `UPLOAD_PLATFORM_NAME` | `platform_name` |
    /// | `UPLOAD_MEDIA_LIBRARY_URL` | `media_library_url` |
    /// | `UPLOAD_CACHE_PATH` | `cache_path` |
    /// | `UPLOAD_LEDGER_DIR` | `ledger_dir` |
    /// | `UPLOAD_INVENTORY_DB` | `inventory_db_path` |
    /// | `UPLOAD_WEBDRIVER_URL` | `webdriver_url` |
    /// | `UPLOAD_TAKE_SCREENSHOTS` | `take_screenshots` |
    /// | `UPLOAD_SCREENSHOT_DIR` | `screenshot_dir` |
    /// | `UPLOAD_REUSE_SESSION` | `reuse_session` |
    /// | `UPLOAD_SESSION_FILE` | `session_file` |
    /// | `UPLOAD_BROWSER_PROFILE_DIR` | `browser_profile_dir` |
    pub fn from_env() -> Result<Self> {
        if let Err(e) = dotenvy::dotenv() {
            if !e.not_found() {
                return Err(Error::EnvFile(e.to_string()));
            }
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a configuration from an arbitrary key lookup.
    ///
    /// Used by [`from_env`](Self::from_env); exposed so hosts can feed
    /// settings from their own stores.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut builder = Self::builder();

        if let Some(v) = parse_var::<usize, _>(&lookup, "UPLOAD_MAX_BATCH_SIZE")? {
            builder = builder.max_batch_size(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "UPLOAD_MAX_PAGES")? {
            builder = builder.max_pages(v);
        }
        if let Some(v) = parse_var::<u32, _>(&lookup, "UPLOAD_MAX_RETRIES")? {
            builder = builder.max_retries(v);
        }
        if let Some(v) = parse_var::<u64, _>(&lookup, "UPLOAD_RETRY_DELAY_SECS")? {
            builder = builder.retry_delay(Duration::from_secs(v));
        }
        if let Some(v) = parse_flag(&lookup, "UPLOAD_FORCE")? {
            builder = builder.force(v);
        }
        if let Some(v) = parse_flag(&lookup, "UPLOAD_DRY_RUN")? {
            builder = builder.dry_run(v);
        }
        if let Some(v) = parse_flag(&lookup, "UPLOAD_FULL_REFRESH")? {
            builder = builder.full_refresh(v);
        }
        if let Some(v) = parse_var::<usize, _>(&lookup, "UPLOAD_LIMIT_PER_KIND")? {
            builder = builder.limit_per_kind(v);
        }
        if let Some(v) = lookup("UPLOAD_PLATFORM_NAME") {
            builder = builder.platform_name(v);
        }
        if let Some(v) = lookup("UPLOAD_MEDIA_LIBRARY_URL") {
            builder = builder.media_library_url(v);
        }
        if let Some(v) = lookup("UPLOAD_CACHE_PATH") {
            builder = builder.cache_path(v);
        }
        if let Some(v) = lookup("UPLOAD_LEDGER_DIR") {
            builder = builder.ledger_dir(v);
        }
        if let Some(v) = lookup("UPLOAD_INVENTORY_DB") {
            builder = builder.inventory_db_path(v);
        }
        if let Some(v) = lookup("UPLOAD_WEBDRIVER_URL") {
            builder = builder.webdriver_url(v);
        }
        if let Some(v) = parse_flag(&lookup, "UPLOAD_TAKE_SCREENSHOTS")? {
            builder = builder.take_screenshots(v);
        }
        if let Some(v) = lookup("UPLOAD_SCREENSHOT_DIR") {
            builder = builder.screenshot_dir(v);
        }
        if let Some(v) = parse_flag(&lookup, "UPLOAD_REUSE_SESSION")? {
            builder = builder.reuse_session(v);
        }
        if let Some(v) = lookup("UPLOAD_SESSION_FILE") {
            builder = builder.session_file(v);
        }
        if let Some(v) = lookup("UPLOAD_BROWSER_PROFILE_DIR") {
            builder = builder.browser_profile_dir(v);
        }

        builder.build()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch_size == 0 {
            return Err(Error::Config(
                "Batch size must be at least 1 file".to_string(),
            ));
        }

        if self.max_batch_size > MAX_BATCH_SIZE_LIMIT {
            return Err(Error::Config(format!(
                "Batch size exceeds maximum of {} files",
                MAX_BATCH_SIZE_LIMIT
            )));
        }

        if self.max_pages == 0 {
            return Err(Error::Config(
                "Page ceiling must be at least 1 page".to_string(),
            ));
        }

        if self.max_retries == 0 {
            return Err(Error::Config(
                "Retry count must allow at least 1 attempt".to_string(),
            ));
        }

        if self.poll_interval.is_zero() {
            return Err(Error::Config(
                "Poll interval must be greater than 0".to_string(),
            ));
        }

        if self.per_item_timeout < self.poll_interval {
            return Err(Error::Config(
                "Per-item timeout must be at least one poll interval".to_string(),
            ));
        }

        if self.navigation_timeout.is_zero() {
            return Err(Error::Config(
                "Navigation timeout must be greater than 0".to_string(),
            ));
        }

        if self.limit_per_kind == Some(0) {
            return Err(Error::Config(
                "Per-kind limit must be at least 1; omit it to upload everything".to_string(),
            ));
        }

        if self.platform_name.trim().is_empty() {
            return Err(Error::Config("Platform name cannot be empty".to_string()));
        }

        if !self.media_library_url.starts_with("http://")
            && !self.media_library_url.starts_with("https://")
        {
            return Err(Error::Config(
                "Media library URL must be an http(s) URL".to_string(),
            ));
        }

        if !self.webdriver_url.starts_with("http://") && !self.webdriver_url.starts_with("https://")
        {
            return Err(Error::Config(
                "WebDriver URL must be an http(s) URL, e.g. http://localhost:9515".to_string(),
            ));
        }

        if self.cache_path.as_os_str().is_empty() {
            return Err(Error::Config("Cache path cannot be empty".to_string()));
        }

        if self.ledger_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Ledger directory cannot be empty".to_string(),
            ));
        }

        if self.inventory_db_path.as_os_str().is_empty() {
            return Err(Error::Config(
                "Inventory database path cannot be empty".to_string(),
            ));
        }

        if self.take_screenshots && self.screenshot_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Screenshot directory cannot be empty while screenshots are enabled".to_string(),
            ));
        }

        if self.reuse_session && self.session_file.as_os_str().is_empty() {
            return Err(Error::Config(
                "Session file cannot be empty while session reuse is enabled".to_string(),
            ));
        }

        if matches!(&self.browser_profile_dir, Some(dir) if dir.as_os_str().is_empty()) {
            return Err(Error::Config(
                "Browser profile directory cannot be empty; omit it to use a fresh profile".to_string(),
            ));
        }

        Ok(())
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Invalid value '{}' for {}: {}", raw, key, e))),
        None => Ok(None),
    }
}

fn parse_flag<F>(lookup: &F, key: &str) -> Result<Option<bool>>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(Error::Config(format!(
                "Invalid value '{}' for {}: expected true or false",
                raw, key
            ))),
        },
        None => Ok(None),
    }
}

/// Builder for constructing [`UploadConfig`] instances.
///
/// Unset fields keep their defaults; [`build()`](UploadConfigBuilder::build)
/// validates the result.
#[derive(Debug, Default)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}

impl UploadConfigBuilder {
    /// Sets the maximum number of files per batch.
    ///
    /// Default: 10
    pub fn max_batch_size(mut self, size: usize) -> Self {
        self.config.max_batch_size = size;
        self
    }

    /// Sets the maximum listing pages read per scan.
    ///
    /// Default: 50
    pub fn max_pages(mut self, pages: usize) -> Self {
        self.config.max_pages = pages;
        self
    }

    /// Sets the attempts per batch.
    ///
    /// Default: 3
    pub fn max_retries(mut self, retries: u32) -> Self {
        self.config.max_retries = retries;
        self
    }

    pub fn retry_delay(mut self, delay: Duration) -> Self {
        self.config.retry_delay = delay;
        self
    }

    pub fn force(mut self, force: bool) -> Self {
        self.config.force = force;
        self
    }

    /// Enables or disables dry-run mode.
    ///
    /// Default: `true`. Real uploads must be requested explicitly.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.config.dry_run = dry_run;
        self
    }

    pub fn full_refresh(mut self, full_refresh: bool) -> Self {
        self.config.full_refresh = full_refresh;
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn per_item_timeout(mut self, timeout: Duration) -> Self {
        self.config.per_item_timeout = timeout;
        self
    }

    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.config.settle_delay = delay;
        self
    }

    pub fn navigation_timeout(mut self, timeout: Duration) -> Self {
        self.config.navigation_timeout = timeout;
        self
    }

    /// Sets the native image size ceiling in bytes.
    ///
    /// Default: 300 000 (300 KB, decimal)
    pub fn native_image_max_bytes(mut self, bytes: u64) -> Self {
        self.config.native_image_max_bytes = bytes;
        self
    }

    pub fn limit_per_kind(mut self, limit: usize) -> Self {
        self.config.limit_per_kind = Some(limit);
        self
    }

    pub fn platform_name(mut self, name: impl Into<String>) -> Self {
        self.config.platform_name = name.into();
        self
    }

    pub fn media_library_url(mut self, url: impl Into<String>) -> Self {
        self.config.media_library_url = url.into();
        self
    }

    pub fn cache_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.cache_path = path.into();
        self
    }

    pub fn ledger_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.ledger_dir = path.into();
        self
    }

    pub fn inventory_db_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.inventory_db_path = path.into();
        self
    }

    pub fn webdriver_url(mut self, url: impl Into<String>) -> Self {
        self.config.webdriver_url = url.into();
        self
    }

    /// Enables or disables step screenshots.
    ///
    /// Default: `true`
    pub fn take_screenshots(mut self, take: bool) -> Self {
        self.config.take_screenshots = take;
        self
    }

    pub fn screenshot_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.screenshot_dir = path.into();
        self
    }

    /// Enables or disables restoring saved login cookies.
    ///
    /// Default: `true`
    pub fn reuse_session(mut self, reuse: bool) -> Self {
        self.config.reuse_session = reuse;
        self
    }

    pub fn session_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.session_file = path.into();
        self
    }

    /// Keeps the browser profile (and its login) in `path` across runs.
    pub fn browser_profile_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.config.browser_profile_dir = Some(path.into());
        self
    }

    /// Builds and validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid setting.
    pub fn build(self) -> Result<UploadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = UploadConfig::builder().build().unwrap();

        assert_eq!(config.max_batch_size, 10);
        assert_eq!(config.max_pages, 50);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert!(config.dry_run);
        assert!(!config.force);
        assert_eq!(config.native_image_max_bytes, 300_000);
        assert_eq!(config.platform_name, "TrafficJunky");
        assert_eq!(config.limit_per_kind, None);
        assert!(config.take_screenshots);
        assert!(config.reuse_session);
        assert_eq!(config.browser_profile_dir, None);
    }

    #[test]
    fn test_builder_overrides() {
        let config = UploadConfig::builder()
            .max_batch_size(25)
            .force(true)
            .dry_run(false)
            .limit_per_kind(4)
            .cache_path("/tmp/cache.jsonl")
            .build()
            .unwrap();

        assert_eq!(config.max_batch_size, 25);
        assert!(config.force);
        assert!(!config.dry_run);
        assert_eq!(config.limit_per_kind, Some(4));
        assert_eq!(config.cache_path, PathBuf::from("/tmp/cache.jsonl"));
    }

    #[test]
    fn test_validate_rejects_zero_batch_size() {
        let result = UploadConfig::builder().max_batch_size(0).build();

        assert!(result
            .unwrap_err()
            .to_string()
            .contains("Batch size must be at least 1"));
    }

    #[test]
    fn test_validate_rejects_excessive_batch_size() {
        let result = UploadConfig::builder().max_batch_size(101).build();

        assert!(result.unwrap_err().to_string().contains("exceeds maximum"));
    }

    #[test]
    fn test_validate_rejects_zero_pages_and_retries() {
        assert!(UploadConfig::builder().max_pages(0).build().is_err());
        assert!(UploadConfig::builder().max_retries(0).build().is_err());
    }

    #[test]
    fn test_validate_rejects_timeout_below_poll_interval() {
        let result = UploadConfig::builder()
            .poll_interval(Duration::from_secs(5))
            .per_item_timeout(Duration::from_secs(1))
            .build();

        assert!(result.is_err());
    }

    #[test]
    fn test_validate_rejects_zero_kind_limit() {
        let result = UploadConfig::builder().limit_per_kind(0).build();

        assert!(result.unwrap_err().to_string().contains("Per-kind limit"));
    }

    #[test]
    fn test_validate_rejects_bad_urls() {
        assert!(UploadConfig::builder()
            .webdriver_url("localhost:9515")
            .build()
            .is_err());
        assert!(UploadConfig::builder()
            .media_library_url("ftp://example.test")
            .build()
            .is_err());
    }

    #[test]
    fn test_from_lookup_reads_variables() {
        let config = UploadConfig::from_lookup(lookup_from(&[
            ("UPLOAD_MAX_BATCH_SIZE", "5"),
            ("UPLOAD_DRY_RUN", "false"),
            ("UPLOAD_FORCE", "yes"),
            ("UPLOAD_RETRY_DELAY_SECS", "7"),
            ("UPLOAD_LIMIT_PER_KIND", "3"),
            ("UPLOAD_LEDGER_DIR", "/var/log/uploads"),
        ]))
        .unwrap();

        assert_eq!(config.max_batch_size, 5);
        assert!(!config.dry_run);
        assert!(config.force);
        assert_eq!(config.retry_delay, Duration::from_secs(7));
        assert_eq!(config.limit_per_kind, Some(3));
        assert_eq!(config.ledger_dir, PathBuf::from("/var/log/uploads"));
    }

    #[test]
    fn test_from_lookup_rejects_malformed_values() {
        let err = UploadConfig::from_lookup(lookup_from(&[("UPLOAD_MAX_PAGES", "many")]))
            .unwrap_err();
        assert!(err.to_string().contains("UPLOAD_MAX_PAGES"));

        let err = UploadConfig::from_lookup(lookup_from(&[("UPLOAD_DRY_RUN", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("expected true or false"));
    }

    #[test]
    fn test_from_lookup_reads_session_and_screenshot_settings() {
        let config = UploadConfig::from_lookup(lookup_from(&[
            ("UPLOAD_TAKE_SCREENSHOTS", "off"),
            ("UPLOAD_SCREENSHOT_DIR", "/tmp/shots"),
            ("UPLOAD_REUSE_SESSION", "false"),
            ("UPLOAD_SESSION_FILE", "/tmp/cookies.json"),
            ("UPLOAD_BROWSER_PROFILE_DIR", "/tmp/profile"),
        ]))
        .unwrap();

        assert!(!config.take_screenshots);
        assert_eq!(config.screenshot_dir, PathBuf::from("/tmp/shots"));
        assert!(!config.reuse_session);
        assert_eq!(config.session_file, PathBuf::from("/tmp/cookies.json"));
        assert_eq!(config.browser_profile_dir, Some(PathBuf::from("/tmp/profile")));
    }

    #[test]
    fn test_validate_rejects_empty_screenshot_dir_only_when_enabled() {
        assert!(UploadConfig::builder().screenshot_dir("").build().is_err());
        assert!(UploadConfig::builder()
            .take_screenshots(false)
            .screenshot_dir("")
            .build()
            .is_ok());
    }

    #[test]
    fn test_from_lookup_validates() {
        let result = UploadConfig::from_lookup(lookup_from(&[("UPLOAD_MAX_BATCH_SIZE", "0")]));
        assert!(result.is_err());
    }
}
