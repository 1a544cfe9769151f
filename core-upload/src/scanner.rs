//! # Remote Listing Scanner
//!
//! Walks the paginated listing of one creative kind and collects every
//! platform id it renders. Two snapshots taken around a submission are
//! diffed to find the ids the submission created.
//!
//! ## Failure model
//!
//! Only a lost session aborts a scan. Any other failure ends the walk early
//! and yields a snapshot flagged `complete == false`; callers must not use
//! such a snapshot as a trusted baseline for later batches.

use crate::error::UploadError;
use crate::item::{CreativeItem, CreativeKind};
use crate::remote::RemoteListingReader;
use crate::Result;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Ids observed while walking a listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteSnapshot {
    pub ids: HashSet<String>,
    pub pages_read: usize,
    /// The walk reached the last page; false when the ceiling or an error cut it short
    pub complete: bool,
}

impl RemoteSnapshot {
    /// Snapshot built from remembered ids instead of a walk
    pub fn from_known(ids: HashSet<String>) -> Self {
        Self {
            ids,
            pages_read: 0,
            complete: true,
        }
    }

    /// Ids present here but not in `baseline`
    pub fn difference(&self, baseline: &RemoteSnapshot) -> HashSet<String> {
        self.ids.difference(&baseline.ids).cloned().collect()
    }
}

/// Paginated listing walker
#[derive(Debug, Clone, Copy)]
pub struct ListingScanner {
    max_pages: usize,
}

impl ListingScanner {
    pub fn new(max_pages: usize) -> Self {
        Self {
            max_pages: max_pages.max(1),
        }
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
    }

    /// Collect every id in the listing of `kind`
    ///
    /// # Errors
    ///
    /// Returns [`UploadError::SessionExpired`] when the session is lost;
    /// every other failure is folded into an incomplete snapshot.
    pub async fn scan(
        &self,
        reader: &dyn RemoteListingReader,
        kind: CreativeKind,
    ) -> Result<RemoteSnapshot> {
        let mut snapshot = RemoteSnapshot::default();

        match self.walk(reader, kind, &mut snapshot).await {
            Ok(()) => {}
            Err(e) if e.is_session_expired() => return Err(e),
            Err(e) => {
                warn!(
                    kind = %kind,
                    pages_read = snapshot.pages_read,
                    error = %e,
                    "Listing scan aborted, snapshot incomplete"
                );
                snapshot.complete = false;
            }
        }

        info!(
            kind = %kind,
            ids = snapshot.ids.len(),
            pages = snapshot.pages_read,
            complete = snapshot.complete,
            "Listing scanned"
        );
        Ok(snapshot)
    }

    async fn walk(
        &self,
        reader: &dyn RemoteListingReader,
        kind: CreativeKind,
        snapshot: &mut RemoteSnapshot,
    ) -> Result<()> {
        reader.open_listing(kind).await?;

        loop {
            let ids = reader.collect_visible_ids().await?;
            snapshot.pages_read += 1;
            debug!(page = snapshot.pages_read, ids = ids.len(), "Listing page read");
            snapshot.ids.extend(ids);

            if !reader.has_next_page().await? {
                snapshot.complete = true;
                return Ok(());
            }

            if snapshot.pages_read >= self.max_pages {
                let err = UploadError::PaginationCeilingExceeded {
                    max_pages: self.max_pages,
                };
                warn!(kind = %kind, error = %err, "Stopping listing scan");
                return Ok(());
            }

            reader.advance().await?;
        }
    }

    /// Assign `new_ids` to the items whose display name matches
    ///
    /// Names are matched exactly first, then by filename stem. Each id is
    /// used at most once. Items without a match are absent from the map.
    ///
    /// # Errors
    ///
    /// Session loss is propagated; other reader failures surface as
    /// [`UploadError::TransientNetwork`].
    pub async fn resolve_names(
        &self,
        reader: &dyn RemoteListingReader,
        kind: CreativeKind,
        items: &[CreativeItem],
        new_ids: &HashSet<String>,
    ) -> Result<HashMap<String, String>> {
        if new_ids.is_empty() || items.is_empty() {
            return Ok(HashMap::new());
        }

        let names = self
            .read_names(reader, kind, new_ids)
            .await
            .map_err(|e| match e {
                UploadError::SessionExpired(_) | UploadError::TransientNetwork(_) => e,
                other => UploadError::TransientNetwork(other.to_string()),
            })?;

        Ok(match_names(items, &names))
    }

    async fn read_names(
        &self,
        reader: &dyn RemoteListingReader,
        kind: CreativeKind,
        new_ids: &HashSet<String>,
    ) -> Result<Vec<(String, String)>> {
        reader.open_listing(kind).await?;

        let mut names = Vec::new();
        let mut remaining = new_ids.clone();
        let mut page = 1;

        loop {
            let visible = reader.collect_visible_ids().await?;
            let mut here: Vec<&String> = visible.iter().filter(|id| remaining.contains(*id)).collect();
            here.sort();

            for id in here {
                match reader.read_display_name(id).await? {
                    Some(name) => names.push((id.clone(), name)),
                    None => debug!(id = %id, "Creative has no readable name"),
                }
            }
            remaining.retain(|id| !visible.contains(id));

            if remaining.is_empty() || page >= self.max_pages || !reader.has_next_page().await? {
                break;
            }
            reader.advance().await?;
            page += 1;
        }

        if !remaining.is_empty() {
            warn!(unseen = remaining.len(), "Some new ids were not found while reading names");
        }
        Ok(names)
    }
}

/// Pair items with `(id, display name)` entries
fn match_names(items: &[CreativeItem], names: &[(String, String)]) -> HashMap<String, String> {
    let mut used: HashSet<&str> = HashSet::new();
    let mut matched = HashMap::new();

    for item in items {
        if let Some((id, _)) = names
            .iter()
            .find(|(id, name)| !used.contains(id.as_str()) && name == &item.filename)
        {
            used.insert(id.as_str());
            matched.insert(item.filename.clone(), id.clone());
        }
    }

    for item in items {
        if matched.contains_key(&item.filename) {
            continue;
        }
        let stem = item.stem();
        if let Some((id, _)) = names
            .iter()
            .find(|(id, name)| !used.contains(id.as_str()) && name == stem)
        {
            used.insert(id.as_str());
            matched.insert(item.filename.clone(), id.clone());
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Listing split into fixed pages of `(id, name)` entries
    struct PagedListing {
        pages: Vec<Vec<(&'static str, &'static str)>>,
        current: Mutex<usize>,
        fail_on_page: Option<usize>,
        session_lost: bool,
    }

    impl PagedListing {
        fn new(pages: Vec<Vec<(&'static str, &'static str)>>) -> Self {
            Self {
                pages,
                current: Mutex::new(0),
                fail_on_page: None,
                session_lost: false,
            }
        }

        fn page(&self) -> usize {
            *self.current.lock().unwrap()
        }
    }

    #[async_trait]
    impl RemoteListingReader for PagedListing {
        async fn open_listing(&self, _kind: CreativeKind) -> Result<()> {
            if self.session_lost {
                return Err(UploadError::SessionExpired("logged out".into()));
            }
            *self.current.lock().unwrap() = 0;
            Ok(())
        }

        async fn collect_visible_ids(&self) -> Result<HashSet<String>> {
            if self.fail_on_page == Some(self.page()) {
                return Err(UploadError::TransientNetwork("listing stalled".into()));
            }
            Ok(self.pages[self.page()].iter().map(|(id, _)| id.to_string()).collect())
        }

        async fn read_display_name(&self, id: &str) -> Result<Option<String>> {
            Ok(self.pages[self.page()]
                .iter()
                .find(|(candidate, _)| *candidate == id)
                .map(|(_, name)| name.to_string()))
        }

        async fn has_next_page(&self) -> Result<bool> {
            Ok(self.page() + 1 < self.pages.len())
        }

        async fn advance(&self) -> Result<()> {
            *self.current.lock().unwrap() += 1;
            Ok(())
        }
    }

    fn ids(values: &[&str]) -> HashSet<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn item(filename: &str) -> CreativeItem {
        CreativeItem::new(filename, format!("/media/{}", filename), CreativeKind::Video).unwrap()
    }

    #[tokio::test]
    async fn test_scan_walks_all_pages() {
        let listing = PagedListing::new(vec![
            vec![("1", "a.mp4"), ("2", "b.mp4")],
            vec![("3", "c.mp4")],
        ]);

        let snapshot = ListingScanner::new(10).scan(&listing, CreativeKind::Video).await.unwrap();

        assert_eq!(snapshot.ids, ids(&["1", "2", "3"]));
        assert_eq!(snapshot.pages_read, 2);
        assert!(snapshot.complete);
    }

    #[tokio::test]
    async fn test_scan_stops_at_ceiling() {
        let listing = PagedListing::new(vec![
            vec![("1", "a.mp4")],
            vec![("2", "b.mp4")],
            vec![("3", "c.mp4")],
        ]);

        let snapshot = ListingScanner::new(2).scan(&listing, CreativeKind::Video).await.unwrap();

        assert_eq!(snapshot.pages_read, 2);
        assert_eq!(snapshot.ids, ids(&["1", "2"]));
        assert!(!snapshot.complete);
    }

    #[tokio::test]
    async fn test_scan_failure_yields_incomplete_snapshot() {
        let mut listing = PagedListing::new(vec![vec![("1", "a.mp4")], vec![("2", "b.mp4")]]);
        listing.fail_on_page = Some(1);

        let snapshot = ListingScanner::new(10).scan(&listing, CreativeKind::Video).await.unwrap();

        assert!(!snapshot.complete);
        assert_eq!(snapshot.ids, ids(&["1"]));
    }

    #[tokio::test]
    async fn test_scan_propagates_session_loss() {
        let mut listing = PagedListing::new(vec![vec![]]);
        listing.session_lost = true;

        let err = ListingScanner::new(10)
            .scan(&listing, CreativeKind::Video)
            .await
            .unwrap_err();
        assert!(err.is_session_expired());
    }

    #[tokio::test]
    async fn test_resolve_names_exact_then_stem() {
        let listing = PagedListing::new(vec![
            vec![("1", "old.mp4"), ("7", "promo_a.mp4")],
            vec![("8", "promo_b")],
        ]);
        let items = vec![item("promo_a.mp4"), item("promo_b.mp4"), item("promo_c.mp4")];

        let matched = ListingScanner::new(10)
            .resolve_names(&listing, CreativeKind::Video, &items, &ids(&["7", "8"]))
            .await
            .unwrap();

        assert_eq!(matched.get("promo_a.mp4").map(String::as_str), Some("7"));
        assert_eq!(matched.get("promo_b.mp4").map(String::as_str), Some("8"));
        assert!(!matched.contains_key("promo_c.mp4"));
    }

    #[test]
    fn test_match_names_uses_each_id_once() {
        let names = vec![("5".to_string(), "same".to_string())];
        let items = vec![item("same.mp4"), item("same.mov")];

        let matched = match_names(&items, &names);

        assert_eq!(matched.len(), 1);
        assert_eq!(matched.get("same.mp4").map(String::as_str), Some("5"));
    }

    #[test]
    fn test_other_extension_is_not_a_stem_match() {
        let names = vec![("9".to_string(), "promo.mov".to_string())];
        let items = vec![item("promo.mp4")];

        assert!(match_names(&items, &names).is_empty());
    }

    #[test]
    fn test_snapshot_difference() {
        let before = RemoteSnapshot::from_known(ids(&["1", "2"]));
        let after = RemoteSnapshot {
            ids: ids(&["1", "2", "3"]),
            pages_read: 1,
            complete: true,
        };

        assert_eq!(after.difference(&before), ids(&["3"]));
    }
}
