//! Browser Page Abstractions
//!
//! The creative platform only exposes a web console, so the core drives it
//! through a small set of page-level primitives. Hosts implement
//! [`PageDriver`] on top of whatever automation backend they ship
//! (WebDriver on desktop, a scripted fake in tests).
//!
//! Selectors are CSS selectors. Text matching and fallback ordering are the
//! caller's concern; drivers only answer "which elements match right now".

use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;

use crate::error::{BridgeError, Result};

/// Opaque reference to an element on the current page.
///
/// Handles are only meaningful for the page state they were obtained from;
/// navigation invalidates them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementHandle(String);

impl ElementHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ElementHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Page-level browser automation trait
///
/// A driver is bound to exactly one page of one authenticated browser
/// session. All calls are serialized by the caller; implementations do not
/// need to support concurrent use.
///
/// # Errors
///
/// Implementations should map a lost/invalid browser session to
/// [`BridgeError::SessionExpired`](crate::error::BridgeError::SessionExpired)
/// and wait/navigation timeouts to
/// [`BridgeError::Timeout`](crate::error::BridgeError::Timeout).
///
/// # Example
///
/// ```ignore
/// use bridge_traits::browser::PageDriver;
///
/// async fn first_id(page: &dyn PageDriver) -> Result<Option<String>> {
///     match page.find_first("div.creativeContainer[data-id]").await? {
///         Some(el) => page.attribute(&el, "data-id").await,
///         None => Ok(None),
///     }
/// }
/// ```
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Load `url` and wait for the document to be ready
    async fn navigate(&self, url: &str) -> Result<()>;

    /// URL of the currently loaded document
    async fn current_url(&self) -> Result<String>;

    /// All elements matching a CSS selector, in document order
    async fn find_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;

    /// All descendants of `parent` matching a CSS selector
    async fn find_within(
        &self,
        parent: &ElementHandle,
        selector: &str,
    ) -> Result<Vec<ElementHandle>>;

    /// Attribute value, or `None` when the attribute is absent
    async fn attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    /// Rendered text content
    async fn text(&self, element: &ElementHandle) -> Result<String>;

    /// Whether the element is currently rendered and visible
    async fn is_displayed(&self, element: &ElementHandle) -> Result<bool>;

    async fn click(&self, element: &ElementHandle) -> Result<()>;

    /// Attach local files to a file input in a single operation
    ///
    /// Hidden inputs must be supported: consoles commonly hide the real
    /// `<input type="file">` behind a drop zone.
    async fn set_input_files(&self, element: &ElementHandle, paths: &[PathBuf]) -> Result<()>;

    /// PNG capture of the visible page
    ///
    /// Drivers without capture support report
    /// [`BridgeError::NotAvailable`].
    async fn screenshot(&self) -> Result<Bytes> {
        Err(BridgeError::NotAvailable("screenshots".to_string()))
    }

    /// First element matching a CSS selector
    async fn find_first(&self, selector: &str) -> Result<Option<ElementHandle>> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }
}
