//! Upload form backed by a live console page

use super::selectors::ConsoleSelectors;
use super::{open_kind_listing, ConsoleSettings};
use crate::item::CreativeKind;
use crate::remote::{TerminalProgress, UploadSurface};
use crate::{Result, UploadError};
use async_trait::async_trait;
use bridge_traits::browser::{ElementHandle, PageDriver};
use bridge_traits::BridgeError;
use bytes::Bytes;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// How long the file input may take to appear after opening the form
const FILE_INPUT_WAIT: Duration = Duration::from_secs(10);

pub struct ConsoleUploadSurface {
    page: Arc<dyn PageDriver>,
    selectors: Arc<ConsoleSelectors>,
    settings: ConsoleSettings,
}

impl ConsoleUploadSurface {
    pub fn new(
        page: Arc<dyn PageDriver>,
        selectors: Arc<ConsoleSelectors>,
        settings: ConsoleSettings,
    ) -> Self {
        Self {
            page,
            selectors,
            settings,
        }
    }

    async fn wait_for_file_input(&self) -> Result<ElementHandle> {
        let deadline = Instant::now() + FILE_INPUT_WAIT;
        loop {
            if let Some(input) = self.selectors.file_input.find_first(self.page.as_ref()).await? {
                return Ok(input);
            }
            if Instant::now() >= deadline {
                return Err(UploadError::TransientNetwork(format!(
                    "File input did not appear within {:?}",
                    FILE_INPUT_WAIT
                )));
            }
            tokio::time::sleep(self.settings.element_poll).await;
        }
    }
}

#[async_trait]
impl UploadSurface for ConsoleUploadSurface {
    async fn open_upload_form(&self, kind: CreativeKind) -> Result<()> {
        open_kind_listing(self.page.as_ref(), &self.selectors, &self.settings, kind).await?;

        let chain = if kind.is_native() {
            &self.selectors.upload_button_native
        } else {
            &self.selectors.upload_button
        };
        let button = chain.find_first(self.page.as_ref()).await?.ok_or_else(|| {
            UploadError::TransientNetwork(format!("Upload button not found for {}", kind))
        })?;
        self.page.click(&button).await?;

        self.wait_for_file_input().await?;
        debug!(kind = %kind, "Upload form open");
        Ok(())
    }

    async fn submit_files(&self, paths: &[PathBuf]) -> Result<()> {
        let input = self.wait_for_file_input().await?;
        self.page.set_input_files(&input, paths).await?;
        info!(files = paths.len(), "Attached files to upload form");
        Ok(())
    }

    async fn progress(&self) -> Result<TerminalProgress> {
        let page = self.page.as_ref();

        let completed = self.selectors.preview_complete.find_all(page).await?.len();
        let errored = self.selectors.preview_error.find_all(page).await?.len();
        let in_flight = self.selectors.preview_processing.find_all(page).await?.len();

        let mut processing = false;
        for banner in self.selectors.processing_banner.find_all(page).await? {
            if page.is_displayed(&banner).await? {
                processing = true;
                break;
            }
        }

        Ok(TerminalProgress {
            completed,
            errored,
            in_flight,
            processing,
        })
    }

    async fn screenshot(&self) -> Result<Option<Bytes>> {
        match self.page.screenshot().await {
            Ok(png) => Ok(Some(png)),
            Err(BridgeError::NotAvailable(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
