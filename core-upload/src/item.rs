//! # Upload Data Model
//!
//! Items handed to the engine, per-item outcomes and batch identity.
//!
//! ## Overview
//!
//! - [`CreativeItem`] is produced by local processing and never mutated here.
//! - [`UploadResult`] is produced exactly once per item per run.
//! - [`BatchId`] ties ledger rows to the batch that produced them. Sequence
//!   `0` is reserved for items resolved by the up-front cache filter.

use crate::{Result, UploadError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use uuid::Uuid;

// ============================================================================
// Creative Kind
// ============================================================================

/// Console category a creative is uploaded under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreativeKind {
    NativeVideo,
    NativeImage,
    Video,
    Image,
}

impl CreativeKind {
    /// Order in which kinds are uploaded during a run
    pub const UPLOAD_ORDER: [CreativeKind; 4] = [
        CreativeKind::NativeVideo,
        CreativeKind::NativeImage,
        CreativeKind::Video,
        CreativeKind::Image,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CreativeKind::NativeVideo => "native_video",
            CreativeKind::NativeImage => "native_image",
            CreativeKind::Video => "video",
            CreativeKind::Image => "image",
        }
    }

    /// Native creatives live under a separate console tab
    pub fn is_native(&self) -> bool {
        matches!(self, CreativeKind::NativeVideo | CreativeKind::NativeImage)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, CreativeKind::NativeVideo | CreativeKind::Video)
    }

    /// Media type recorded in the cache (`video` or `image`)
    pub fn file_kind(&self) -> &'static str {
        if self.is_video() {
            "video"
        } else {
            "image"
        }
    }
}

impl FromStr for CreativeKind {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "native_video" => Ok(CreativeKind::NativeVideo),
            "native_image" => Ok(CreativeKind::NativeImage),
            "video" => Ok(CreativeKind::Video),
            "image" => Ok(CreativeKind::Image),
            other => Err(UploadError::InvalidInput(format!(
                "Unknown creative kind: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for CreativeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Creative Item
// ============================================================================

/// A locally prepared media file queued for publication
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreativeItem {
    /// Identity of the item in the local inventory
    pub local_id: String,
    /// Name the console will display; the identity key for matching
    pub filename: String,
    pub local_path: PathBuf,
    pub creative_kind: CreativeKind,
    /// Shared by a native video and its companion image
    pub pair_id: Option<String>,
    /// Pixel dimensions such as `640x360`
    pub dimensions: Option<String>,
}

impl CreativeItem {
    /// Create an item whose filename is the final component of `local_path`
    ///
    /// # Errors
    ///
    /// Returns an error if the path has no UTF-8 file name.
    pub fn new(
        local_id: impl Into<String>,
        local_path: impl Into<PathBuf>,
        creative_kind: CreativeKind,
    ) -> Result<Self> {
        let local_path = local_path.into();
        let filename = local_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                UploadError::InvalidInput(format!(
                    "Path has no usable file name: {}",
                    local_path.display()
                ))
            })?
            .to_string();

        Ok(Self {
            local_id: local_id.into(),
            filename,
            local_path,
            creative_kind,
            pair_id: None,
            dimensions: None,
        })
    }

    pub fn with_pair_id(mut self, pair_id: impl Into<String>) -> Self {
        self.pair_id = Some(pair_id.into());
        self
    }

    pub fn with_dimensions(mut self, dimensions: impl Into<String>) -> Self {
        self.dimensions = Some(dimensions.into());
        self
    }

    /// Filename without its final extension
    pub fn stem(&self) -> &str {
        file_stem(&self.filename)
    }
}

/// Name without its final extension (`a.b.mp4` → `a.b`)
pub(crate) fn file_stem(name: &str) -> &str {
    Path::new(name)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(name)
}

// ============================================================================
// Upload Status & Result
// ============================================================================

/// Outcome of one item in one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    /// A new platform id was created and matched to the item
    Success,
    /// The platform already holds the item
    Duplicate,
    Failed,
    /// Not attempted (validation or repeated filename)
    Skipped,
    /// Form opened but nothing submitted
    DryRun,
}

impl UploadStatus {
    pub const ALL: [UploadStatus; 5] = [
        UploadStatus::Success,
        UploadStatus::Duplicate,
        UploadStatus::Failed,
        UploadStatus::Skipped,
        UploadStatus::DryRun,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            UploadStatus::Success => "success",
            UploadStatus::Duplicate => "duplicate",
            UploadStatus::Failed => "failed",
            UploadStatus::Skipped => "skipped",
            UploadStatus::DryRun => "dry_run",
        }
    }
}

impl FromStr for UploadStatus {
    type Err = UploadError;

    fn from_str(s: &str) -> Result<Self> {
        UploadStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| UploadError::InvalidInput(format!("Unknown upload status: {}", s)))
    }
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-item outcome, created once and never mutated after reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResult {
    pub item: CreativeItem,
    pub status: UploadStatus,
    pub platform_id: Option<String>,
    pub error_message: Option<String>,
    /// Batch attempts consumed beyond the first
    pub retries: u32,
}

impl UploadResult {
    fn new(item: CreativeItem, status: UploadStatus) -> Self {
        Self {
            item,
            status,
            platform_id: None,
            error_message: None,
            retries: 0,
        }
    }

    pub fn success(item: CreativeItem, platform_id: impl Into<String>) -> Self {
        let mut result = Self::new(item, UploadStatus::Success);
        result.platform_id = Some(platform_id.into());
        result
    }

    /// Already present remotely; the id is known only when cached
    pub fn duplicate(item: CreativeItem, platform_id: Option<String>) -> Self {
        let mut result = Self::new(item, UploadStatus::Duplicate);
        result.platform_id = platform_id;
        result
    }

    pub fn failed(item: CreativeItem, error: impl Into<String>) -> Self {
        let mut result = Self::new(item, UploadStatus::Failed);
        result.error_message = Some(error.into());
        result
    }

    pub fn skipped(item: CreativeItem, reason: impl Into<String>) -> Self {
        let mut result = Self::new(item, UploadStatus::Skipped);
        result.error_message = Some(reason.into());
        result
    }

    pub fn dry_run(item: CreativeItem) -> Self {
        Self::new(item, UploadStatus::DryRun)
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

// ============================================================================
// Run & Batch Identity
// ============================================================================

const RUN_SUFFIX_LEN: usize = 8;

/// Identifier of one engine run, derived from its start time
///
/// A random suffix keeps runs started within the same second apart.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// `YYYYMMDD_HHMMSS_xxxxxxxx` of the run start
    pub fn from_timestamp(started_at: DateTime<Utc>) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        Self(format!(
            "{}_{}",
            started_at.format("%Y%m%d_%H%M%S"),
            &suffix[..RUN_SUFFIX_LEN]
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of one batch within a run
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BatchId {
    pub run_id: RunId,
    pub sequence: u32,
}

impl BatchId {
    pub fn new(run_id: RunId, sequence: u32) -> Self {
        Self { run_id, sequence }
    }

    /// Batch used for items resolved before any network work
    pub fn prefilter(run_id: RunId) -> Self {
        Self::new(run_id, 0)
    }

    pub fn is_prefilter(&self) -> bool {
        self.sequence == 0
    }
}

impl std::fmt::Display for BatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-b{:02}", self.run_id, self.sequence)
    }
}

/// Bounded, single-kind group of items submitted together
#[derive(Debug, Clone, PartialEq)]
pub struct UploadBatch {
    pub id: BatchId,
    pub kind: CreativeKind,
    pub items: Vec<CreativeItem>,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
