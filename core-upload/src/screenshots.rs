//! Step screenshots of a batch attempt
//!
//! Captures land under
//! `<root>/<run id>/batch_<NN>_<kind>/[attempt_<N>/]<counter>_<step>.png` so a
//! failed batch can be inspected after the run. Capturing never fails the
//! batch: a surface without capture support or a write error only logs.

use crate::item::UploadBatch;
use crate::remote::UploadSurface;
use bridge_traits::storage::FileSystemAccess;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const FORM_OPEN: &str = "upload_form_open";
pub const DRY_RUN_READY: &str = "DRY_RUN_ready";
pub const FILES_UPLOADED: &str = "files_uploaded";
pub const UPLOADS_COMPLETE: &str = "all_uploads_complete";
pub const TIMEOUT_INCOMPLETE: &str = "TIMEOUT_incomplete";
pub const BATCH_SUCCESS: &str = "success_batch";
pub const NO_NEW_IDS: &str = "WARNING_no_new_ids";
pub const BATCH_ERROR: &str = "ERROR_batch_upload";

/// Screenshot sink for one attempt at one batch
#[derive(Debug)]
pub struct BatchScreenshots {
    dir: Option<PathBuf>,
    taken: u32,
}

impl BatchScreenshots {
    /// `root` of `None` turns every capture into a no-op
    pub fn new(root: Option<&Path>, batch: &UploadBatch, attempt: u32) -> Self {
        let dir = root.map(|root| {
            let mut dir = root.join(batch.id.run_id.as_str()).join(format!(
                "batch_{:02}_{}",
                batch.id.sequence,
                batch.kind.as_str()
            ));
            if attempt > 1 {
                dir = dir.join(format!("attempt_{}", attempt));
            }
            dir
        });
        Self { dir, taken: 0 }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Capture the surface and store it under the next counter
    pub async fn capture(&mut self, surface: &dyn UploadSurface, fs: &dyn FileSystemAccess, step: &str) {
        let Some(dir) = self.dir.as_ref() else {
            return;
        };

        let png = match surface.screenshot().await {
            Ok(Some(png)) => png,
            Ok(None) => {
                debug!("Surface cannot take screenshots, disabling capture");
                self.dir = None;
                return;
            }
            Err(e) => {
                debug!(step, error = %e, "Screenshot failed");
                return;
            }
        };

        self.taken += 1;
        let path = dir.join(format!("{:02}_{}.png", self.taken, step));
        match fs.write_file(&path, png).await {
            Ok(()) => debug!(path = ?path, "Saved screenshot"),
            Err(e) => debug!(path = ?path, error = %e, "Could not save screenshot"),
        }
    }
}
