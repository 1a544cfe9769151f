//! Ordered selector fallbacks
//!
//! Console markup drifts between releases, so every lookup is a
//! [`SelectorChain`]: strategies are tried in order and the first one that
//! matches anything wins. Adding a strategy never touches engine logic.

use bridge_traits::browser::{ElementHandle, PageDriver};
use bridge_traits::BridgeError;
use tracing::debug;

/// One way of locating elements
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Plain CSS selector
    Css(String),
    /// CSS selector whose rendered text contains `text` (case-insensitive)
    CssWithText { css: String, text: String },
}

impl Strategy {
    async fn resolve(
        &self,
        page: &dyn PageDriver,
        parent: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, BridgeError> {
        let css = match self {
            Strategy::Css(css) | Strategy::CssWithText { css, .. } => css,
        };

        let found = match parent {
            Some(parent) => page.find_within(parent, css).await?,
            None => page.find_all(css).await?,
        };

        let Strategy::CssWithText { text, .. } = self else {
            return Ok(found);
        };

        let needle = text.to_lowercase();
        let mut matching = Vec::new();
        for element in found {
            if page.text(&element).await?.to_lowercase().contains(&needle) {
                matching.push(element);
            }
        }
        Ok(matching)
    }
}

/// Named, ordered list of strategies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectorChain {
    name: &'static str,
    strategies: Vec<Strategy>,
}

impl SelectorChain {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            strategies: Vec::new(),
        }
    }

    pub fn css(mut self, css: impl Into<String>) -> Self {
        self.strategies.push(Strategy::Css(css.into()));
        self
    }

    pub fn css_with_text(mut self, css: impl Into<String>, text: impl Into<String>) -> Self {
        self.strategies.push(Strategy::CssWithText {
            css: css.into(),
            text: text.into(),
        });
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn strategies(&self) -> &[Strategy] {
        &self.strategies
    }

    /// Plain CSS selectors of this chain
    pub fn css_selectors(&self) -> Vec<String> {
        self.strategies
            .iter()
            .filter_map(|strategy| match strategy {
                Strategy::Css(css) => Some(css.clone()),
                Strategy::CssWithText { .. } => None,
            })
            .collect()
    }

    /// Elements matched by the first strategy that matches anything
    ///
    /// A strategy failing with a transient driver error counts as "no
    /// match"; session loss is propagated.
    pub async fn find_all(&self, page: &dyn PageDriver) -> Result<Vec<ElementHandle>, BridgeError> {
        self.resolve(page, None).await
    }

    /// Like [`find_all`](Self::find_all), scoped to descendants of `parent`
    pub async fn find_all_within(
        &self,
        page: &dyn PageDriver,
        parent: &ElementHandle,
    ) -> Result<Vec<ElementHandle>, BridgeError> {
        self.resolve(page, Some(parent)).await
    }

    pub async fn find_first(&self, page: &dyn PageDriver) -> Result<Option<ElementHandle>, BridgeError> {
        Ok(self.find_all(page).await?.into_iter().next())
    }

    async fn resolve(
        &self,
        page: &dyn PageDriver,
        parent: Option<&ElementHandle>,
    ) -> Result<Vec<ElementHandle>, BridgeError> {
        for (index, strategy) in self.strategies.iter().enumerate() {
            match strategy.resolve(page, parent).await {
                Ok(found) if !found.is_empty() => {
                    if index > 0 {
                        debug!(chain = self.name, strategy = index, "Matched using fallback strategy");
                    }
                    return Ok(found);
                }
                Ok(_) => {}
                Err(e) if e.is_transient() => {
                    debug!(chain = self.name, strategy = index, error = %e, "Strategy failed");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(Vec::new())
    }
}

/// Every lookup the console implementation performs
#[derive(Debug, Clone)]
pub struct ConsoleSelectors {
    /// One card per creative, carrying its id in one of [`creative_id_attributes`](Self::creative_id_attributes)
    pub creative_card: SelectorChain,
    /// Attributes holding the platform id on a card, tried in order
    pub creative_id_attributes: Vec<String>,
    /// Display name inside a card
    pub creative_name: SelectorChain,
    pub next_page: SelectorChain,
    /// Next-page controls switched off through a disabled ancestor
    pub next_page_disabled: SelectorChain,
    pub native_tab: SelectorChain,
    /// Native sub-tab for video creatives
    pub native_rollover_tab: SelectorChain,
    /// Native sub-tab for image creatives
    pub native_static_tab: SelectorChain,
    pub upload_button_native: SelectorChain,
    pub upload_button: SelectorChain,
    pub file_input: SelectorChain,
    pub preview_complete: SelectorChain,
    pub preview_error: SelectorChain,
    pub preview_processing: SelectorChain,
    pub processing_banner: SelectorChain,
    /// Present only once the console is logged in
    pub logged_in: SelectorChain,
}

impl Default for ConsoleSelectors {
    fn default() -> Self {
        Self {
            creative_card: SelectorChain::new("creative_card")
                .css("div.creativeContainer[data-id]")
                .css("div[data-id].creative")
                .css("[data-creative-id]"),
            creative_id_attributes: vec!["data-id".to_string(), "data-creative-id".to_string()],
            creative_name: SelectorChain::new("creative_name")
                .css("label.creativeName")
                .css(".creativeName")
                .css(".creative-name"),
            next_page: SelectorChain::new("next_page")
                .css_with_text("a.page-link", "Next")
                .css_with_text("button", "Next")
                .css("a[rel=\"next\"]")
                .css("li.next:not(.disabled) a")
                .css("a.pagination-next")
                .css(".pagination .next a"),
            next_page_disabled: SelectorChain::new("next_page_disabled")
                .css("li.page-item.disabled a.page-link")
                .css("li.disabled > a")
                .css(".pagination .disabled a")
                .css(".pagination .disabled button"),
            native_tab: SelectorChain::new("native_tab")
                .css("a#native_tab")
                .css("a[href=\"#native\"]")
                .css("[data-tab=\"native\"]")
                .css_with_text("a.nav-link", "Native"),
            native_rollover_tab: SelectorChain::new("native_rollover_tab")
                .css("label:has(input#native_rollover)")
                .css("input#native_rollover")
                .css("label.native_rollover")
                .css("input[name=\"native_type\"][value=\"1\"]"),
            native_static_tab: SelectorChain::new("native_static_tab")
                .css("label:has(input#native_static)")
                .css("input#native_static")
                .css("label.native_static")
                .css("input[name=\"native_type\"][value=\"0\"]"),
            upload_button_native: SelectorChain::new("upload_button_native")
                .css("button#newImage")
                .css("[data-gtm-index=\"uploadCreativesMediaLibrary\"]")
                .css("button.greenButton"),
            upload_button: SelectorChain::new("upload_button")
                .css("[data-action=\"add-creative\"]")
                .css("button#newImage")
                .css("[data-gtm-index=\"uploadCreativesMediaLibrary\"]")
                .css_with_text("button", "Upload"),
            file_input: SelectorChain::new("file_input")
                .css("input[type=\"file\"]")
                .css("input[accept*=\"image\"]")
                .css("input[accept*=\"video\"]")
                .css("#creative-upload")
                .css("[name=\"creative\"]")
                .css("input.dz-hidden-input"),
            preview_complete: SelectorChain::new("preview_complete")
                .css("div.dz-preview.dz-success.dz-complete"),
            preview_error: SelectorChain::new("preview_error").css("div.dz-preview.dz-error"),
            preview_processing: SelectorChain::new("preview_processing")
                .css("div.dz-preview.dz-processing"),
            processing_banner: SelectorChain::new("processing_banner")
                .css("div.processingMessage.customMessage"),
            logged_in: SelectorChain::new("logged_in")
                .css("div.creativeContainer")
                .css("button#newImage")
                .css("a#native_tab"),
        }
    }
}
