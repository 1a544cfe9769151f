//! # Remote Console Capabilities
//!
//! The engine talks to the platform only through these two traits: a
//! paginated listing it can read, and an upload form it can fill. Selector
//! details live in the implementations ([`crate::console`] for a real
//! browser, scripted fakes in tests).

use crate::item::CreativeKind;
use crate::Result;
use async_trait::async_trait;
use bridge_traits::session::AuthSession;
use bytes::Bytes;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

/// Read access to the platform's paginated creative listing
///
/// Calls are stateful: they act on whatever listing page is currently open.
#[async_trait]
pub trait RemoteListingReader: Send + Sync {
    /// Navigate to page 1 of the listing holding `kind`
    async fn open_listing(&self, kind: CreativeKind) -> Result<()>;

    /// Platform ids rendered on the current page
    ///
    /// A page where no lookup strategy matches yields an empty set.
    async fn collect_visible_ids(&self) -> Result<HashSet<String>>;

    /// Display name of a creative on the current page
    async fn read_display_name(&self, id: &str) -> Result<Option<String>>;

    async fn has_next_page(&self) -> Result<bool>;

    /// Move to the next listing page
    async fn advance(&self) -> Result<()>;
}

/// Progress of the files attached to the upload form
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TerminalProgress {
    pub completed: usize,
    pub errored: usize,
    pub in_flight: usize,
    /// The console shows its "processing" banner
    pub processing: bool,
}

impl TerminalProgress {
    /// Files that reached a terminal state, successful or not
    pub fn finished(&self) -> usize {
        self.completed + self.errored
    }

    /// Every submitted file is done and the console is idle
    pub fn is_terminal(&self, submitted: usize) -> bool {
        self.finished() >= submitted && !self.processing
    }
}

/// The platform's upload form
#[async_trait]
pub trait UploadSurface: Send + Sync {
    /// Navigate to the form that accepts `kind`
    async fn open_upload_form(&self, kind: CreativeKind) -> Result<()>;

    /// Attach every file in one submission
    async fn submit_files(&self, paths: &[PathBuf]) -> Result<()>;

    async fn progress(&self) -> Result<TerminalProgress>;

    /// PNG capture of the form as it looks now
    ///
    /// `None` when the surface cannot take screenshots.
    async fn screenshot(&self) -> Result<Option<Bytes>> {
        Ok(None)
    }
}

/// Listing reader and upload form bound to one console session
#[derive(Clone)]
pub struct Console {
    pub reader: Arc<dyn RemoteListingReader>,
    pub surface: Arc<dyn UploadSurface>,
}

impl Console {
    pub fn new(reader: Arc<dyn RemoteListingReader>, surface: Arc<dyn UploadSurface>) -> Self {
        Self { reader, surface }
    }
}

/// Builds a [`Console`] on top of an authenticated session
pub trait ConsoleFactory: Send + Sync {
    fn bind(&self, session: &AuthSession) -> Console;
}
