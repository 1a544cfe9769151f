//! End-to-end runs of the upload engine against a scripted platform

use async_trait::async_trait;
use bridge_desktop::TokioFileSystem;
use bridge_traits::browser::{ElementHandle, PageDriver};
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::session::{AuthSession, SessionProvider};
use bridge_traits::time::Clock;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use core_runtime::config::{UploadConfig, UploadConfigBuilder};
use core_upload::cache::{CacheStore, InMemoryCacheBackend, JsonlCacheBackend};
use core_upload::ledger::{InMemoryInventoryStore, StatusLedgerRecord};
use core_upload::remote::{
    Console, ConsoleFactory, RemoteListingReader, TerminalProgress, UploadSurface,
};
use core_upload::scanner::ListingScanner;
use core_upload::{
    CreativeItem, CreativeKind, EngineDependencies, Result, RunSummary, UploadEngine, UploadError,
    UploadStatus,
};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Scripted platform
// ============================================================================

struct Creative {
    id: String,
    name: String,
    kind: CreativeKind,
}

struct PlatformState {
    creatives: Vec<Creative>,
    next_id: u64,
    page_size: usize,
    kind: CreativeKind,
    page: usize,
    last_submitted: usize,
    submit_calls: usize,
    /// Refuse to create a creative whose name already exists
    reject_existing_names: bool,
    /// Name the console displays for a submitted filename
    rename: HashMap<String, String>,
    open_form_failures: u32,
    open_form_expiries: u32,
    /// Progress reads that fail after files were accepted
    progress_failures: u32,
    /// Accept files but never finish processing them
    stall_progress: bool,
    never_last_page: bool,
}

struct FakePlatform {
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    fn new() -> Self {
        Self {
            state: Mutex::new(PlatformState {
                creatives: Vec::new(),
                next_id: 5000,
                page_size: 12,
                kind: CreativeKind::Video,
                page: 0,
                last_submitted: 0,
                submit_calls: 0,
                reject_existing_names: true,
                rename: HashMap::new(),
                open_form_failures: 0,
                open_form_expiries: 0,
                progress_failures: 0,
                stall_progress: false,
                never_last_page: false,
            }),
        }
    }

    fn with<R>(&self, f: impl FnOnce(&mut PlatformState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut *state)
    }

    fn preload(&self, kind: CreativeKind, names: &[String]) {
        self.with(|st| {
            for name in names {
                let id = st.next_id.to_string();
                st.next_id += 1;
                st.creatives.push(Creative {
                    id,
                    name: name.clone(),
                    kind,
                });
            }
        });
    }

    fn submit_calls(&self) -> usize {
        self.with(|st| st.submit_calls)
    }

    fn id_of(&self, name: &str) -> Option<String> {
        self.with(|st| {
            st.creatives
                .iter()
                .rev()
                .find(|c| c.name == name)
                .map(|c| c.id.clone())
        })
    }
}

impl PlatformState {
    /// Creatives of the open kind, newest first
    fn listing(&self) -> Vec<&Creative> {
        self.creatives
            .iter()
            .rev()
            .filter(|c| c.kind == self.kind)
            .collect()
    }

    fn current_page(&self) -> Vec<&Creative> {
        self.listing()
            .into_iter()
            .skip(self.page * self.page_size)
            .take(self.page_size)
            .collect()
    }
}

#[async_trait]
impl RemoteListingReader for FakePlatform {
    async fn open_listing(&self, kind: CreativeKind) -> Result<()> {
        self.with(|st| {
            st.kind = kind;
            st.page = 0;
        });
        Ok(())
    }

    async fn collect_visible_ids(&self) -> Result<HashSet<String>> {
        Ok(self.with(|st| st.current_page().iter().map(|c| c.id.clone()).collect()))
    }

    async fn read_display_name(&self, id: &str) -> Result<Option<String>> {
        Ok(self.with(|st| {
            st.current_page()
                .iter()
                .find(|c| c.id == id)
                .map(|c| c.name.clone())
        }))
    }

    async fn has_next_page(&self) -> Result<bool> {
        Ok(self.with(|st| st.never_last_page || (st.page + 1) * st.page_size < st.listing().len()))
    }

    async fn advance(&self) -> Result<()> {
        self.with(|st| st.page += 1);
        Ok(())
    }
}

#[async_trait]
impl UploadSurface for FakePlatform {
    async fn open_upload_form(&self, kind: CreativeKind) -> Result<()> {
        self.with(|st| {
            if st.open_form_expiries > 0 {
                st.open_form_expiries -= 1;
                return Err(UploadError::SessionExpired("invalid session id".into()));
            }
            if st.open_form_failures > 0 {
                st.open_form_failures -= 1;
                return Err(UploadError::TransientNetwork("upload page timed out".into()));
            }
            st.kind = kind;
            Ok(())
        })
    }

    async fn submit_files(&self, paths: &[PathBuf]) -> Result<()> {
        self.with(|st| {
            st.submit_calls += 1;
            st.last_submitted = paths.len();
            if st.stall_progress {
                return;
            }
            for path in paths {
                let filename = path.file_name().unwrap().to_string_lossy().to_string();
                let name = st.rename.get(&filename).cloned().unwrap_or(filename);
                let kind = st.kind;
                if st.reject_existing_names
                    && st.creatives.iter().any(|c| c.kind == kind && c.name == name)
                {
                    continue;
                }
                let id = st.next_id.to_string();
                st.next_id += 1;
                st.creatives.push(Creative { id, name, kind });
            }
        });
        Ok(())
    }

    async fn progress(&self) -> Result<TerminalProgress> {
        self.with(|st| {
            if st.progress_failures > 0 {
                st.progress_failures -= 1;
                return Err(UploadError::TransientNetwork("preview area detached".into()));
            }
            let completed = if st.stall_progress { 0 } else { st.last_submitted };
            Ok(TerminalProgress {
                completed,
                errored: 0,
                in_flight: st.last_submitted - completed,
                processing: false,
            })
        })
    }

    async fn screenshot(&self) -> Result<Option<Bytes>> {
        Ok(Some(Bytes::from_static(b"\x89PNG")))
    }
}

struct FakeConsoles {
    platform: Arc<FakePlatform>,
}

impl ConsoleFactory for FakeConsoles {
    fn bind(&self, _session: &AuthSession) -> Console {
        Console::new(self.platform.clone(), self.platform.clone())
    }
}

// ============================================================================
// Sessions
// ============================================================================

/// Page that is never driven; the scripted platform stands in for it
struct DetachedPage;

#[async_trait]
impl PageDriver for DetachedPage {
    async fn navigate(&self, _url: &str) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn current_url(&self) -> BridgeResult<String> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn find_all(&self, _selector: &str) -> BridgeResult<Vec<ElementHandle>> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn find_within(&self, _parent: &ElementHandle, _selector: &str) -> BridgeResult<Vec<ElementHandle>> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn attribute(&self, _element: &ElementHandle, _name: &str) -> BridgeResult<Option<String>> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn text(&self, _element: &ElementHandle) -> BridgeResult<String> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn is_displayed(&self, _element: &ElementHandle) -> BridgeResult<bool> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn click(&self, _element: &ElementHandle) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
    async fn set_input_files(&self, _element: &ElementHandle, _paths: &[PathBuf]) -> BridgeResult<()> {
        Err(BridgeError::NotAvailable("detached".into()))
    }
}

#[derive(Default)]
struct FakeSessions {
    acquired: AtomicUsize,
    released: AtomicUsize,
    /// Acquisitions beyond this count fail
    max_sessions: Option<usize>,
    /// Never hand out a session
    wait_forever: bool,
}

#[async_trait]
impl SessionProvider for FakeSessions {
    async fn acquire(&self) -> BridgeResult<AuthSession> {
        if self.wait_forever {
            std::future::pending::<()>().await;
        }
        let count = self.acquired.fetch_add(1, Ordering::SeqCst) + 1;
        if self.max_sessions.is_some_and(|max| count > max) {
            return Err(BridgeError::NotAvailable("login window closed".into()));
        }
        Ok(AuthSession::new(Arc::new(DetachedPage)))
    }

    async fn release(&self, _session: AuthSession) -> BridgeResult<()> {
        self.released.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Clock advancing one second per reading
struct SteppingClock {
    base: DateTime<Utc>,
    ticks: AtomicI64,
}

impl Clock for SteppingClock {
    fn now(&self) -> DateTime<Utc> {
        self.base + chrono::Duration::seconds(self.ticks.fetch_add(1, Ordering::SeqCst))
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    dir: TempDir,
    platform: Arc<FakePlatform>,
    sessions: Arc<FakeSessions>,
    backend: Arc<InMemoryCacheBackend>,
    cache: Arc<CacheStore>,
    inventory: Arc<InMemoryInventoryStore>,
    clock: Arc<SteppingClock>,
}

impl Harness {
    fn new() -> Self {
        Self::with_sessions(FakeSessions::default())
    }

    fn with_sessions(sessions: FakeSessions) -> Self {
        let backend = Arc::new(InMemoryCacheBackend::new());
        Self {
            dir: tempfile::tempdir().unwrap(),
            platform: Arc::new(FakePlatform::new()),
            sessions: Arc::new(sessions),
            cache: Arc::new(CacheStore::new(backend.clone())),
            backend,
            inventory: Arc::new(InMemoryInventoryStore::new()),
            clock: Arc::new(SteppingClock {
                base: Utc.with_ymd_and_hms(2025, 3, 14, 9, 0, 0).unwrap(),
                ticks: AtomicI64::new(0),
            }),
        }
    }

    fn media_path(&self, name: &str) -> PathBuf {
        self.dir.path().join("media").join(name)
    }

    fn write_media(&self, name: &str, size: usize) -> PathBuf {
        let path = self.media_path(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, vec![0u8; size]).unwrap();
        path
    }

    fn item(&self, local_id: &str, name: &str, kind: CreativeKind) -> CreativeItem {
        let path = self.write_media(name, 1024);
        CreativeItem::new(local_id, path, kind).unwrap()
    }

    fn videos(&self, names: &[&str]) -> Vec<CreativeItem> {
        names
            .iter()
            .enumerate()
            .map(|(i, name)| self.item(&format!("c-{}", i + 1), name, CreativeKind::Video))
            .collect()
    }

    fn config(&self) -> UploadConfigBuilder {
        UploadConfig::builder()
            .dry_run(false)
            .retry_delay(Duration::ZERO)
            .poll_interval(Duration::from_millis(1))
            .per_item_timeout(Duration::from_millis(50))
            .settle_delay(Duration::ZERO)
            .ledger_dir(self.dir.path().join("logs"))
            .screenshot_dir(self.screenshot_root())
    }

    fn screenshot_root(&self) -> PathBuf {
        self.dir.path().join("screenshots")
    }

    fn screenshots(&self, summary: &RunSummary, batch_dir: &str) -> Vec<String> {
        let dir = self.screenshot_root().join(summary.run_id.as_str()).join(batch_dir);
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .filter(|name| name.ends_with(".png"))
            .collect();
        names.sort();
        names
    }

    fn deps(&self) -> EngineDependencies {
        EngineDependencies {
            cache: self.cache.clone(),
            file_system: Arc::new(TokioFileSystem::with_data_directory(self.dir.path().to_path_buf())),
            sessions: self.sessions.clone(),
            consoles: Arc::new(FakeConsoles {
                platform: self.platform.clone(),
            }),
            inventory: self.inventory.clone(),
            clock: self.clock.clone(),
        }
    }

    async fn run(&self, config: UploadConfigBuilder, items: Vec<CreativeItem>) -> RunSummary {
        let engine = UploadEngine::new(&config.build().unwrap(), self.deps()).unwrap();
        engine.run(items, CancellationToken::new()).await.unwrap()
    }
}

fn ledger_rows(path: &Path) -> Vec<StatusLedgerRecord> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

fn row<'a>(rows: &'a [StatusLedgerRecord], filename: &str) -> &'a StatusLedgerRecord {
    rows.iter().find(|r| r.filename == filename).unwrap()
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn test_new_files_are_uploaded_and_cached() {
    let h = Harness::new();
    h.platform.preload(CreativeKind::Video, &["older.mp4".to_string()]);

    let summary = h.run(h.config(), h.videos(&["promo_a.mp4", "promo_b.mp4"])).await;

    assert_eq!(summary.count(UploadStatus::Success), 2);
    assert_eq!(h.backend.rows().len(), 2);

    let rows = ledger_rows(&summary.ledger_path);
    assert_eq!(rows.len(), 2);
    for name in ["promo_a.mp4", "promo_b.mp4"] {
        let platform_id = h.platform.id_of(name).unwrap();
        assert_eq!(row(&rows, name).platform_id.as_deref(), Some(platform_id.as_str()));
        assert_eq!(h.cache.lookup(name), Some(platform_id));
    }

    let (platform_id, upload_date) = h.inventory.get("c-1").unwrap();
    assert_eq!(Some(platform_id), h.platform.id_of("promo_a.mp4"));
    assert_eq!(upload_date, "2025-03-14");
}

#[tokio::test]
async fn test_second_run_reports_duplicates_without_network() {
    let h = Harness::new();
    let items = h.videos(&["promo_a.mp4", "promo_b.mp4"]);
    h.run(h.config(), items.clone()).await;
    let submits = h.platform.submit_calls();
    let sessions = h.sessions.acquired.load(Ordering::SeqCst);

    let summary = h.run(h.config(), items).await;

    assert_eq!(summary.count(UploadStatus::Duplicate), 2);
    assert_eq!(summary.batches_attempted, 0);
    assert_eq!(h.platform.submit_calls(), submits);
    assert_eq!(h.sessions.acquired.load(Ordering::SeqCst), sessions);
    assert_eq!(h.backend.rows().len(), 2);

    let rows = ledger_rows(&summary.ledger_path);
    let first = row(&rows, "promo_a.mp4");
    assert_eq!(first.platform_id, h.cache.lookup("promo_a.mp4"));
    assert!(first.batch_id.ends_with("-b00"));
}

#[tokio::test]
async fn test_scan_collects_every_page() {
    let platform = FakePlatform::new();
    let names: Vec<String> = (0..25).map(|i| format!("old_{:02}.mp4", i)).collect();
    platform.preload(CreativeKind::Video, &names);

    let snapshot = ListingScanner::new(50)
        .scan(&platform, CreativeKind::Video)
        .await
        .unwrap();

    assert_eq!(snapshot.ids.len(), 25);
    assert_eq!(snapshot.pages_read, 3);
    assert!(snapshot.complete);
}

#[tokio::test]
async fn test_scan_halts_when_next_page_never_ends() {
    let platform = FakePlatform::new();
    platform.preload(CreativeKind::Video, &["only.mp4".to_string()]);
    platform.with(|st| st.never_last_page = true);

    let snapshot = ListingScanner::new(4)
        .scan(&platform, CreativeKind::Video)
        .await
        .unwrap();

    assert_eq!(snapshot.pages_read, 4);
    assert!(!snapshot.complete);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let h = Harness::new();
    h.platform.with(|st| st.open_form_failures = 2);

    let summary = h
        .run(h.config(), h.videos(&["a.mp4", "b.mp4", "c.mp4"]))
        .await;

    assert_eq!(summary.count(UploadStatus::Success), 3);
    for record in ledger_rows(&summary.ledger_path) {
        assert_eq!(record.status, UploadStatus::Success);
        assert_eq!(record.retries, 2);
    }
}

#[tokio::test]
async fn test_no_new_ids_means_duplicates() {
    let h = Harness::new();
    let names: Vec<String> = (0..10).map(|i| format!("dup_{}.mp4", i)).collect();
    h.platform.preload(CreativeKind::Video, &names);
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();

    let summary = h.run(h.config(), h.videos(&refs)).await;

    assert_eq!(summary.count(UploadStatus::Duplicate), 10);
    assert_eq!(h.platform.submit_calls(), 1);
    assert!(h.backend.rows().is_empty());
    for record in ledger_rows(&summary.ledger_path) {
        assert_eq!(record.platform_id, None);
    }
}

#[tokio::test]
async fn test_force_reuploads_cached_files() {
    let h = Harness::new();
    let items = h.videos(&["promo_a.mp4"]);
    h.run(h.config(), items.clone()).await;
    let first_id = h.cache.lookup("promo_a.mp4").unwrap();
    h.platform.with(|st| st.reject_existing_names = false);

    let summary = h.run(h.config().force(true), items).await;

    assert_eq!(summary.count(UploadStatus::Success), 1);
    assert_eq!(h.platform.submit_calls(), 2);
    let second_id = h.cache.lookup("promo_a.mp4").unwrap();
    assert_ne!(first_id, second_id);
    assert_eq!(h.backend.rows().len(), 2);
}

#[tokio::test]
async fn test_missing_file_fails_without_retry() {
    let h = Harness::new();
    let mut items = h.videos(&["present.mp4"]);
    items.push(CreativeItem::new("c-9", h.media_path("gone.mp4"), CreativeKind::Video).unwrap());

    let summary = h.run(h.config(), items).await;

    let rows = ledger_rows(&summary.ledger_path);
    let gone = row(&rows, "gone.mp4");
    assert_eq!(gone.status, UploadStatus::Failed);
    assert_eq!(gone.retries, 0);
    assert!(gone.error_message.as_deref().unwrap().contains("Local file missing"));
    assert_eq!(row(&rows, "present.mp4").status, UploadStatus::Success);
}

#[tokio::test]
async fn test_oversized_native_image_is_skipped() {
    let h = Harness::new();
    let big = CreativeItem::new("c-1", h.write_media("BIG-IMG.jpg", 300_001), CreativeKind::NativeImage).unwrap();
    let small = h.item("c-2", "SMALL-IMG.jpg", CreativeKind::NativeImage);

    let summary = h.run(h.config(), vec![big, small]).await;

    let rows = ledger_rows(&summary.ledger_path);
    assert_eq!(row(&rows, "BIG-IMG.jpg").status, UploadStatus::Skipped);
    assert_eq!(row(&rows, "SMALL-IMG.jpg").status, UploadStatus::Success);
}

#[tokio::test]
async fn test_repeated_filename_is_skipped() {
    let h = Harness::new();
    let first = h.item("c-1", "same.mp4", CreativeKind::Video);
    let repeat = CreativeItem::new("c-2", first.local_path.clone(), CreativeKind::Video).unwrap();

    let summary = h.run(h.config(), vec![first, repeat]).await;

    assert_eq!(summary.count(UploadStatus::Success), 1);
    assert_eq!(summary.count(UploadStatus::Skipped), 1);
}

#[tokio::test]
async fn test_unmatched_name_is_flagged() {
    let h = Harness::new();
    h.platform.with(|st| {
        st.rename.insert("a.mp4".to_string(), "renamed by console".to_string());
        st.rename.insert("b.mp4".to_string(), "b".to_string());
    });

    let summary = h.run(h.config(), h.videos(&["a.mp4", "b.mp4"])).await;

    let rows = ledger_rows(&summary.ledger_path);
    let a = row(&rows, "a.mp4");
    assert_eq!(a.status, UploadStatus::Failed);
    assert!(a.error_message.as_deref().unwrap().contains("Id extraction failed"));
    // Extension dropped by the console still matches
    assert_eq!(row(&rows, "b.mp4").status, UploadStatus::Success);
}

#[tokio::test]
async fn test_retry_after_submission_does_not_resubmit() {
    let h = Harness::new();
    h.platform.with(|st| st.progress_failures = 1);

    let summary = h.run(h.config(), h.videos(&["a.mp4", "b.mp4"])).await;

    assert_eq!(summary.count(UploadStatus::Success), 2);
    assert_eq!(h.platform.submit_calls(), 1);
    for record in ledger_rows(&summary.ledger_path) {
        assert_eq!(record.retries, 1);
    }
}

#[tokio::test]
async fn test_terminal_state_timeout_exhausts_retries() {
    let h = Harness::new();
    h.platform.with(|st| st.stall_progress = true);

    let summary = h
        .run(h.config().max_retries(2), h.videos(&["slow.mp4"]))
        .await;

    let rows = ledger_rows(&summary.ledger_path);
    let slow = row(&rows, "slow.mp4");
    assert_eq!(slow.status, UploadStatus::Failed);
    assert_eq!(slow.retries, 1);
    assert!(slow.error_message.as_deref().unwrap().contains("did not finish"));
    assert!(h.cache.is_empty());
}

#[tokio::test]
async fn test_timeout_screenshots_each_attempt() {
    let h = Harness::new();
    h.platform.with(|st| st.stall_progress = true);

    let summary = h
        .run(h.config().max_retries(2), h.videos(&["slow.mp4"]))
        .await;

    assert_eq!(
        h.screenshots(&summary, "batch_01_video"),
        vec!["01_upload_form_open.png", "02_files_uploaded.png", "03_TIMEOUT_incomplete.png"]
    );
    assert_eq!(
        h.screenshots(&summary, "batch_01_video/attempt_2"),
        vec!["01_upload_form_open.png", "02_files_uploaded.png", "03_TIMEOUT_incomplete.png"]
    );
}

#[tokio::test]
async fn test_successful_batch_steps_are_screenshotted() {
    let h = Harness::new();

    let summary = h.run(h.config(), h.videos(&["a.mp4", "b.mp4"])).await;

    assert_eq!(summary.count(UploadStatus::Success), 2);
    assert_eq!(
        h.screenshots(&summary, "batch_01_video"),
        vec![
            "01_upload_form_open.png",
            "02_files_uploaded.png",
            "03_all_uploads_complete.png",
            "04_success_batch.png",
        ]
    );
    let png = std::fs::read(
        h.screenshot_root()
            .join(summary.run_id.as_str())
            .join("batch_01_video/01_upload_form_open.png"),
    )
    .unwrap();
    assert_eq!(png, b"\x89PNG");
}

#[tokio::test]
async fn test_failed_open_is_screenshotted_as_error() {
    let h = Harness::new();
    h.platform.with(|st| st.open_form_failures = 1);

    let summary = h
        .run(h.config().max_retries(1), h.videos(&["a.mp4"]))
        .await;

    assert_eq!(summary.count(UploadStatus::Failed), 1);
    assert_eq!(
        h.screenshots(&summary, "batch_01_video"),
        vec!["01_ERROR_batch_upload.png"]
    );
}

#[tokio::test]
async fn test_screenshots_can_be_turned_off() {
    let h = Harness::new();

    h.run(h.config().take_screenshots(false), h.videos(&["a.mp4"]))
        .await;

    assert!(!h.screenshot_root().exists());
}

#[tokio::test]
async fn test_session_expiry_reacquires_for_next_batch() {
    let h = Harness::new();
    h.platform.with(|st| st.open_form_expiries = 1);

    let summary = h
        .run(h.config().max_batch_size(1), h.videos(&["a.mp4", "b.mp4"]))
        .await;

    let rows = ledger_rows(&summary.ledger_path);
    assert_eq!(row(&rows, "a.mp4").status, UploadStatus::Failed);
    assert_eq!(row(&rows, "b.mp4").status, UploadStatus::Success);
    assert_eq!(h.sessions.acquired.load(Ordering::SeqCst), 2);
    assert_eq!(h.sessions.released.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_failed_reacquisition_fails_remaining_batches() {
    let h = Harness::with_sessions(FakeSessions {
        max_sessions: Some(1),
        ..FakeSessions::default()
    });
    h.platform.with(|st| st.open_form_expiries = 1);

    let summary = h
        .run(h.config().max_batch_size(1), h.videos(&["a.mp4", "b.mp4", "c.mp4"]))
        .await;

    assert_eq!(summary.count(UploadStatus::Failed), 3);
    assert_eq!(summary.batches_attempted, 1);
    let rows = ledger_rows(&summary.ledger_path);
    assert!(row(&rows, "c.mp4")
        .error_message
        .as_deref()
        .unwrap()
        .contains("login window closed"));
}

#[tokio::test]
async fn test_cancel_while_waiting_for_login() {
    let h = Harness::with_sessions(FakeSessions {
        wait_forever: true,
        ..FakeSessions::default()
    });
    let engine = UploadEngine::new(&h.config().build().unwrap(), h.deps()).unwrap();
    let cancel = CancellationToken::new();

    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        trigger.cancel();
    });

    let summary = engine.run(h.videos(&["a.mp4"]), cancel).await.unwrap();

    assert!(summary.cancelled);
    assert_eq!(summary.total(), 0);
    assert_eq!(h.platform.submit_calls(), 0);
}

#[tokio::test]
async fn test_dry_run_submits_nothing() {
    let h = Harness::new();

    let summary = h
        .run(h.config().dry_run(true), h.videos(&["a.mp4", "b.mp4"]))
        .await;

    assert_eq!(summary.count(UploadStatus::DryRun), 2);
    assert_eq!(h.platform.submit_calls(), 0);
    assert!(h.backend.rows().is_empty());
}

#[tokio::test]
async fn test_batches_follow_kind_order() {
    let h = Harness::new();
    let items = vec![
        h.item("c-1", "plain.jpg", CreativeKind::Image),
        h.item("c-2", "PAIR-VID.mp4", CreativeKind::NativeVideo).with_pair_id("PAIR"),
        h.item("c-3", "PAIR-IMG.jpg", CreativeKind::NativeImage).with_pair_id("PAIR"),
    ];

    let summary = h.run(h.config(), items).await;

    assert_eq!(summary.count(UploadStatus::Success), 3);
    let rows = ledger_rows(&summary.ledger_path);
    let order: Vec<&str> = rows.iter().map(|r| r.filename.as_str()).collect();
    assert_eq!(order, vec!["PAIR-VID.mp4", "PAIR-IMG.jpg", "plain.jpg"]);
}

#[tokio::test]
async fn test_jsonl_cache_survives_restart() {
    let h = Harness::new();
    let fs = Arc::new(TokioFileSystem::with_data_directory(h.dir.path().to_path_buf()));
    let cache_path = h.dir.path().join("upload_cache.jsonl");
    let cache = Arc::new(CacheStore::new(Arc::new(JsonlCacheBackend::new(fs.clone(), cache_path.clone()))));
    cache.load().await.unwrap();

    let mut deps = h.deps();
    deps.cache = cache;
    let engine = UploadEngine::new(&h.config().build().unwrap(), deps).unwrap();
    engine
        .run(h.videos(&["persisted.mp4"]), CancellationToken::new())
        .await
        .unwrap();

    let reloaded = CacheStore::new(Arc::new(JsonlCacheBackend::new(fs, cache_path)));
    assert_eq!(reloaded.load().await.unwrap(), 1);
    assert_eq!(reloaded.lookup("persisted.mp4"), h.platform.id_of("persisted.mp4"));
}
