//! Core service façade and bootstrap helpers.
//!
//! This crate wires host-provided bridge implementations (filesystem,
//! browser session, clock) and the persistent stores into a ready
//! [`UploadEngine`]. Desktop hosts enable the `desktop-shims` feature, which
//! builds everything from an [`UploadConfig`] using `bridge-desktop`.

pub mod error;

pub use error::{CoreError, Result};

use std::sync::Arc;

use bridge_traits::{session::SessionProvider, storage::FileSystemAccess, time::Clock};
use core_runtime::config::UploadConfig;
use core_upload::{
    CacheStore, ConsoleFactory, CreativeItem, EngineDependencies, InventoryStore, RunSummary,
    UploadEngine,
};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Aggregated handle to all dependencies the engine requires.
#[derive(Clone)]
pub struct CoreDependencies {
    pub filesystem: Arc<dyn FileSystemAccess>,
    pub sessions: Arc<dyn SessionProvider>,
    pub consoles: Arc<dyn ConsoleFactory>,
    pub cache: Arc<CacheStore>,
    pub inventory: Arc<dyn InventoryStore>,
    pub clock: Arc<dyn Clock>,
}

impl From<CoreDependencies> for EngineDependencies {
    fn from(deps: CoreDependencies) -> Self {
        Self {
            cache: deps.cache,
            file_system: deps.filesystem,
            sessions: deps.sessions,
            consoles: deps.consoles,
            inventory: deps.inventory,
            clock: deps.clock,
        }
    }
}

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<UploadConfig>,
    deps: CoreDependencies,
    engine: Arc<UploadEngine>,
}

impl CoreService {
    /// Create a new service from a validated configuration and explicit dependencies.
    pub fn new(config: UploadConfig, deps: CoreDependencies) -> Result<Self> {
        config.validate()?;
        let engine = UploadEngine::new(&config, deps.clone().into())?;
        Ok(Self {
            config: Arc::new(config),
            deps,
            engine: Arc::new(engine),
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    /// Access the dependencies being used by the service.
    pub fn dependencies(&self) -> &CoreDependencies {
        &self.deps
    }

    /// Upload `items`; see [`UploadEngine::run`].
    pub async fn run(&self, items: Vec<CreativeItem>, cancel: CancellationToken) -> Result<RunSummary> {
        info!(
            items = items.len(),
            dry_run = self.config.dry_run,
            force = self.config.force,
            "Upload requested"
        );
        Ok(self.engine.run(items, cancel).await?)
    }
}

/// Convenience bootstrapper for desktop hosts.
///
/// Loads the JSONL upload cache, opens the SQLite inventory and prepares a
/// WebDriver-backed login flow. No browser is started until the first run
/// needs a session.
///
/// ```ignore
/// use core_service::bootstrap_desktop;
/// use core_runtime::config::UploadConfig;
///
/// let core = bootstrap_desktop(UploadConfig::from_env()?).await?;
/// let summary = core.run(items, CancellationToken::new()).await?;
/// ```
#[cfg(feature = "desktop-shims")]
pub async fn bootstrap_desktop(config: UploadConfig) -> Result<CoreService> {
    use bridge_desktop::{ManualLoginSessionProvider, TokioFileSystem, WebDriverOptions};
    use bridge_traits::time::SystemClock;
    use core_upload::console::{ConsoleSelectors, ConsoleSettings, SelectorConsoleFactory};
    use core_upload::{JsonlCacheBackend, SqliteInventoryStore};

    config.validate()?;

    let filesystem: Arc<dyn FileSystemAccess> = Arc::new(TokioFileSystem::new());

    let cache = Arc::new(CacheStore::new(Arc::new(JsonlCacheBackend::new(
        Arc::clone(&filesystem),
        config.cache_path.clone(),
    ))));
    let cached = cache.load().await?;

    let inventory = SqliteInventoryStore::connect(&config.inventory_db_path)
        .await
        .map_err(|e| CoreError::InitializationFailed(format!("inventory: {}", e)))?;

    let selectors = ConsoleSelectors::default();
    let mut sessions = ManualLoginSessionProvider::new(
        config.webdriver_url.clone(),
        config.media_library_url.clone(),
    )
    .with_logged_in_markers(selectors.logged_in.css_selectors())
    .with_options(WebDriverOptions {
        page_load_timeout: config.navigation_timeout,
        user_data_dir: config.browser_profile_dir.clone(),
        ..WebDriverOptions::default()
    });
    if config.reuse_session {
        sessions = sessions.with_session_file(config.session_file.clone());
    }
    let consoles =
        SelectorConsoleFactory::with_selectors(selectors, ConsoleSettings::from_config(&config));

    info!(
        cached,
        cache = ?config.cache_path,
        inventory = ?config.inventory_db_path,
        reuse_session = config.reuse_session,
        "Desktop bridges ready"
    );

    CoreService::new(
        config,
        CoreDependencies {
            filesystem,
            sessions: Arc::new(sessions),
            consoles: Arc::new(consoles),
            cache,
            inventory: Arc::new(inventory),
            clock: Arc::new(SystemClock),
        },
    )
}
