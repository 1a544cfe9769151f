//! # Browser Console Implementation
//!
//! [`RemoteListingReader`](crate::remote::RemoteListingReader) and
//! [`UploadSurface`](crate::remote::UploadSurface) on top of a
//! [`PageDriver`], with every lookup going through a
//! [`SelectorChain`](selectors::SelectorChain).
//!
//! ## Usage
//!
//! ```ignore
//! use core_upload::console::{ConsoleSettings, SelectorConsoleFactory};
//! use core_upload::remote::ConsoleFactory;
//!
//! let factory = SelectorConsoleFactory::new(ConsoleSettings::from_config(&config));
//! let console = factory.bind(&session);
//! console.reader.open_listing(CreativeKind::Video).await?;
//! ```

pub mod listing;
pub mod selectors;
pub mod surface;

pub use listing::ConsoleListingReader;
pub use selectors::{ConsoleSelectors, SelectorChain, Strategy};
pub use surface::ConsoleUploadSurface;

use crate::item::CreativeKind;
use crate::remote::{Console, ConsoleFactory};
use crate::{Result, UploadError};
use bridge_traits::browser::PageDriver;
use bridge_traits::session::AuthSession;
use core_runtime::config::UploadConfig;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Timings and location of the console
#[derive(Debug, Clone)]
pub struct ConsoleSettings {
    pub media_library_url: String,
    pub navigation_timeout: Duration,
    /// Pause after switching tabs so the listing can re-render
    pub tab_settle: Duration,
    /// Pause after moving to another listing page
    pub page_settle: Duration,
    /// Interval used while waiting for an element to appear
    pub element_poll: Duration,
}

impl ConsoleSettings {
    pub fn from_config(config: &UploadConfig) -> Self {
        Self {
            media_library_url: config.media_library_url.clone(),
            navigation_timeout: config.navigation_timeout,
            tab_settle: Duration::from_secs(2),
            page_settle: Duration::from_secs(2),
            element_poll: Duration::from_millis(250),
        }
    }
}

/// Open page 1 of the listing holding `kind`
pub(crate) async fn open_kind_listing(
    page: &dyn PageDriver,
    selectors: &ConsoleSelectors,
    settings: &ConsoleSettings,
    kind: CreativeKind,
) -> Result<()> {
    tokio::time::timeout(
        settings.navigation_timeout,
        page.navigate(&settings.media_library_url),
    )
    .await
    .map_err(|_| {
        UploadError::TransientNetwork(format!(
            "Navigation to {} timed out after {:?}",
            settings.media_library_url, settings.navigation_timeout
        ))
    })??;

    if !kind.is_native() {
        return Ok(());
    }

    let tab = selectors
        .native_tab
        .find_first(page)
        .await?
        .ok_or_else(|| UploadError::TransientNetwork("Native tab not found".to_string()))?;
    page.click(&tab).await?;
    tokio::time::sleep(settings.tab_settle).await;

    let sub_tab = if kind.is_video() {
        &selectors.native_rollover_tab
    } else {
        &selectors.native_static_tab
    };
    match sub_tab.find_first(page).await? {
        Some(element) => {
            page.click(&element).await?;
            tokio::time::sleep(settings.tab_settle).await;
            debug!(kind = %kind, "Switched native sub-tab");
        }
        None => warn!(kind = %kind, chain = sub_tab.name(), "Native sub-tab not found, using default"),
    }

    Ok(())
}

/// Binds the selector-driven console to a session's page
pub struct SelectorConsoleFactory {
    selectors: Arc<ConsoleSelectors>,
    settings: ConsoleSettings,
}

impl SelectorConsoleFactory {
    pub fn new(settings: ConsoleSettings) -> Self {
        Self::with_selectors(ConsoleSelectors::default(), settings)
    }

    pub fn with_selectors(selectors: ConsoleSelectors, settings: ConsoleSettings) -> Self {
        Self {
            selectors: Arc::new(selectors),
            settings,
        }
    }

    pub fn selectors(&self) -> &ConsoleSelectors {
        &self.selectors
    }
}

impl ConsoleFactory for SelectorConsoleFactory {
    fn bind(&self, session: &AuthSession) -> Console {
        let reader = ConsoleListingReader::new(
            Arc::clone(&session.driver),
            Arc::clone(&self.selectors),
            self.settings.clone(),
        );
        let surface = ConsoleUploadSurface::new(
            Arc::clone(&session.driver),
            Arc::clone(&self.selectors),
            self.settings.clone(),
        );
        Console::new(Arc::new(reader), Arc::new(surface))
    }
}


#[cfg(test)]
mod tests {
    use super::mock_page::{instant_settings, MockPage};
    use super::*;
    use bridge_traits::browser::ElementHandle;

    #[tokio::test]
    async fn test_standard_kind_only_navigates() {
        let mut page = MockPage::new();
        page.expect_navigate()
            .withf(|url| url == "https://console.example.test/media-library")
            .times(1)
            .returning(|_| Ok(()));

        open_kind_listing(&page, &ConsoleSelectors::default(), &instant_settings(), CreativeKind::Video)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_native_image_selects_static_sub_tab() {
        let mut page = MockPage::new();
        page.expect_navigate().returning(|_| Ok(()));
        page.expect_find_all()
            .withf(|selector| selector == "a#native_tab")
            .returning(|_| Ok(vec![ElementHandle::new("tab")]));
        page.expect_find_all()
            .withf(|selector| selector == "label:has(input#native_static)")
            .returning(|_| Ok(vec![ElementHandle::new("static")]));
        page.expect_click()
            .withf(|el| el.as_str() == "tab")
            .times(1)
            .returning(|_| Ok(()));
        page.expect_click()
            .withf(|el| el.as_str() == "static")
            .times(1)
            .returning(|_| Ok(()));

        open_kind_listing(
            &page,
            &ConsoleSelectors::default(),
            &instant_settings(),
            CreativeKind::NativeImage,
        )
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_missing_native_tab_is_transient() {
        let mut page = MockPage::new();
        page.expect_navigate().returning(|_| Ok(()));
        page.expect_find_all().returning(|_| Ok(Vec::new()));
        page.expect_text().returning(|_| Ok(String::new()));

        let err = open_kind_listing(
            &page,
            &ConsoleSelectors::default(),
            &instant_settings(),
            CreativeKind::NativeVideo,
        )
        .await
        .unwrap_err();

        assert!(err.is_retryable());
    }
}
