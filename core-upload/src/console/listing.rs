//! Listing reader backed by a live console page

use super::selectors::ConsoleSelectors;
use super::{open_kind_listing, ConsoleSettings};
use crate::item::CreativeKind;
use crate::remote::RemoteListingReader;
use crate::Result;
use async_trait::async_trait;
use bridge_traits::browser::{ElementHandle, PageDriver};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

pub struct ConsoleListingReader {
    page: Arc<dyn PageDriver>,
    selectors: Arc<ConsoleSelectors>,
    settings: ConsoleSettings,
}

impl ConsoleListingReader {
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

    async fn card_ids(&self) -> Result<Vec<(ElementHandle, String)>> {
        let cards = self.selectors.creative_card.find_all(self.page.as_ref()).await?;

        let mut ids = Vec::with_capacity(cards.len());
        for card in cards {
            if let Some(id) = self.card_id(&card).await? {
                ids.push((card, id));
            }
        }
        Ok(ids)
    }

    async fn card_id(&self, card: &ElementHandle) -> Result<Option<String>> {
        for attribute in &self.selectors.creative_id_attributes {
            if let Some(id) = self.page.attribute(card, attribute).await? {
                let id = id.trim();
                if !id.is_empty() {
                    return Ok(Some(id.to_string()));
                }
            }
        }
        Ok(None)
    }

    /// The first next-page control that can still be clicked
    async fn enabled_next(&self) -> Result<Option<ElementHandle>> {
        let page = self.page.as_ref();
        let candidates = self.selectors.next_page.find_all(page).await?;
        if candidates.is_empty() {
            return Ok(None);
        }

        let switched_off: HashSet<ElementHandle> = self
            .selectors
            .next_page_disabled
            .find_all(page)
            .await?
            .into_iter()
            .collect();

        for candidate in candidates {
            if switched_off.contains(&candidate) {
                continue;
            }
            if !self.is_disabled(&candidate).await? {
                return Ok(Some(candidate));
            }
        }
        Ok(None)
    }

    async fn is_disabled(&self, element: &ElementHandle) -> Result<bool> {
        let page = self.page.as_ref();

        if !page.is_displayed(element).await? {
            return Ok(true);
        }
        if let Some(class) = page.attribute(element, "class").await? {
            if class.split_whitespace().any(|c| c == "disabled") {
                return Ok(true);
            }
        }
        if page.attribute(element, "aria-disabled").await?.as_deref() == Some("true") {
            return Ok(true);
        }
        Ok(page.attribute(element, "disabled").await?.is_some())
    }
}

#[async_trait]
impl RemoteListingReader for ConsoleListingReader {
    async fn open_listing(&self, kind: CreativeKind) -> Result<()> {
        open_kind_listing(self.page.as_ref(), &self.selectors, &self.settings, kind).await
    }

    async fn collect_visible_ids(&self) -> Result<HashSet<String>> {
        let ids: HashSet<String> = self.card_ids().await?.into_iter().map(|(_, id)| id).collect();
        if ids.is_empty() {
            warn!(chain = self.selectors.creative_card.name(), "No creative cards on listing page");
        } else {
            debug!(count = ids.len(), "Collected listing ids");
        }
        Ok(ids)
    }

    async fn read_display_name(&self, id: &str) -> Result<Option<String>> {
        let Some((card, _)) = self.card_ids().await?.into_iter().find(|(_, card_id)| card_id == id) else {
            return Ok(None);
        };

        let names = self
            .selectors
            .creative_name
            .find_all_within(self.page.as_ref(), &card)
            .await?;
        let Some(label) = names.into_iter().next() else {
            return Ok(None);
        };

        let name = self.page.text(&label).await?.trim().to_string();
        Ok((!name.is_empty()).then_some(name))
    }

    async fn has_next_page(&self) -> Result<bool> {
        Ok(self.enabled_next().await?.is_some())
    }

    async fn advance(&self) -> Result<()> {
        let Some(next) = self.enabled_next().await? else {
            return Err(crate::UploadError::TransientNetwork(
                "Next page control disappeared".to_string(),
            ));
        };
        self.page.click(&next).await?;
        tokio::time::sleep(self.settings.page_settle).await;
        Ok(())
    }
}
