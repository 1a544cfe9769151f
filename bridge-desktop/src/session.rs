//! Manual-login Session Provider
//!
//! Opens a visible browser window on the media library page and waits for a
//! human to finish logging in. Login itself is never automated; the provider
//! only polls for a marker that is present once the console is usable.
//!
//! With a session file configured, the cookies of the last successful login
//! are restored first. A human is only asked to log in when they no longer
//! grant access; the fresh cookies are then saved for the next run.

use async_trait::async_trait;
use bridge_traits::{
    browser::PageDriver,
    error::{BridgeError, Result},
    session::{AuthSession, SessionId, SessionProvider},
};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::webdriver::{WebDriverOptions, WebDriverPage};

/// How often the "waiting for login" message is repeated, in polls
const REMIND_EVERY: u32 = 30;

/// Login checks after restoring saved cookies before asking for a manual login
const RESTORE_CHECKS: u32 = 3;

/// Session provider that waits for an interactive login
///
/// `acquire` suspends until one of `logged_in_markers` matches on the page.
/// There is no upper bound unless `login_timeout` is set; callers cancel by
/// dropping the future.
pub struct ManualLoginSessionProvider {
    webdriver_url: String,
    start_url: String,
    logged_in_markers: Vec<String>,
    poll_interval: Duration,
    login_timeout: Option<Duration>,
    session_file: Option<PathBuf>,
    options: WebDriverOptions,
    open: Mutex<HashMap<SessionId, Arc<WebDriverPage>>>,
}

impl ManualLoginSessionProvider {
    /// Create a provider for the driver at `webdriver_url` that opens `start_url`
    pub fn new(webdriver_url: impl Into<String>, start_url: impl Into<String>) -> Self {
        Self {
            webdriver_url: webdriver_url.into(),
            start_url: start_url.into(),
            logged_in_markers: Vec::new(),
            poll_interval: Duration::from_secs(2),
            login_timeout: None,
            session_file: None,
            options: WebDriverOptions::default(),
            open: Mutex::new(HashMap::new()),
        }
    }

    /// CSS selectors that only match once the console is logged in
    pub fn with_logged_in_markers(mut self, markers: Vec<String>) -> Self {
        self.logged_in_markers = markers;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = Some(timeout);
        self
    }

    pub fn with_options(mut self, options: WebDriverOptions) -> Self {
        self.options = options;
        self
    }

    /// Save login cookies to `path` and restore them on later acquisitions
    pub fn with_session_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_file = Some(path.into());
        self
    }

    /// Try the saved cookies; `Ok(true)` when they still grant access
    async fn restore_session(&self, page: &WebDriverPage, file: &Path) -> Result<bool> {
        let Some(cookies) = read_saved_cookies(file).await? else {
            debug!(path = ?file, "No saved console session");
            return Ok(false);
        };

        let mut restored = 0usize;
        for cookie in cookies {
            match page.add_cookie(cookie).await {
                Ok(()) => restored += 1,
                Err(e @ BridgeError::SessionExpired(_)) => return Err(e),
                Err(e) => debug!(error = %e, "Skipping saved cookie"),
            }
        }
        if restored == 0 {
            return Ok(false);
        }

        page.navigate(&self.start_url).await?;
        for check in 0..RESTORE_CHECKS {
            if self.is_logged_in(page).await? {
                info!(cookies = restored, "Logged in using saved session");
                return Ok(true);
            }
            if check + 1 < RESTORE_CHECKS {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        warn!(path = ?file, "Saved session expired, manual login required");
        Ok(false)
    }

    async fn save_session(&self, page: &WebDriverPage, file: &Path) {
        let saved = match page.cookies().await {
            Ok(cookies) => write_saved_cookies(file, &cookies).await.map(|()| cookies.len()),
            Err(e) => Err(e),
        };
        match saved {
            Ok(count) => info!(path = ?file, cookies = count, "Saved console session"),
            Err(e) => warn!(path = ?file, error = %e, "Failed to save console session"),
        }
    }

    async fn manual_login(&self, page: &WebDriverPage) -> Result<()> {
        match self.login_timeout {
            Some(limit) => tokio::time::timeout(limit, self.wait_for_login(page))
                .await
                .map_err(|_| {
                    BridgeError::Timeout(format!("Login not completed within {:?}", limit))
                })?,
            None => self.wait_for_login(page).await,
        }
    }

    async fn log_in(&self, page: &WebDriverPage) -> Result<()> {
        if let Some(file) = &self.session_file {
            match self.restore_session(page, file).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e @ BridgeError::SessionExpired(_)) => return Err(e),
                Err(e) => warn!(error = %e, "Could not restore saved session"),
            }
        }

        self.manual_login(page).await?;

        if let Some(file) = &self.session_file {
            self.save_session(page, file).await;
        }
        Ok(())
    }

    async fn is_logged_in(&self, page: &WebDriverPage) -> Result<bool> {
        for marker in &self.logged_in_markers {
            if page.find_first(marker).await?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    async fn wait_for_login(&self, page: &WebDriverPage) -> Result<()> {
        let mut polls: u32 = 0;
        loop {
            match self.is_logged_in(page).await {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                // The login flow navigates between pages; lookups can fail mid-redirect
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Login check failed, retrying");
                }
                Err(e) => return Err(e),
            }

            if polls % REMIND_EVERY == 0 {
                info!(url = %self.start_url, "Waiting for manual login in the browser window");
            }
            polls = polls.wrapping_add(1);
            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl SessionProvider for ManualLoginSessionProvider {
    async fn acquire(&self) -> Result<AuthSession> {
        if self.logged_in_markers.is_empty() {
            return Err(BridgeError::NotAvailable(
                "No logged-in markers configured".to_string(),
            ));
        }

        let page = Arc::new(WebDriverPage::start(&self.webdriver_url, self.options.clone()).await?);
        page.navigate(&self.start_url).await?;

        if let Err(e) = self.log_in(&page).await {
            if let Err(quit_err) = page.quit().await {
                warn!(error = %quit_err, "Failed to close browser after login failure");
            }
            return Err(e);
        }

        // Login may have redirected elsewhere; land back on the start page
        page.navigate(&self.start_url).await?;

        let session = AuthSession::new(page.clone());
        self.open.lock().await.insert(session.id, page);
        info!(session = %session.id, "Console session acquired");
        Ok(session)
    }

    async fn release(&self, session: AuthSession) -> Result<()> {
        let page = self.open.lock().await.remove(&session.id);
        match page {
            Some(page) => page.quit().await,
            None => {
                warn!(session = %session.id, "Release requested for unknown session");
                Ok(())
            }
        }
    }
}

/// Cookies saved by an earlier login, `None` when nothing was saved
async fn read_saved_cookies(path: &Path) -> Result<Option<Vec<Value>>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(BridgeError::Io(e)),
    };

    let cookies: Vec<Value> = serde_json::from_slice(&data).map_err(|e| {
        BridgeError::OperationFailed(format!("Unreadable session file {}: {}", path.display(), e))
    })?;
    Ok(Some(
        cookies
            .into_iter()
            .filter(|cookie| cookie.get("name").is_some() && cookie.get("value").is_some())
            .collect(),
    ))
}

async fn write_saved_cookies(path: &Path, cookies: &[Value]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let data = serde_json::to_vec_pretty(cookies)
        .map_err(|e| BridgeError::OperationFailed(format!("Session encoding: {}", e)))?;
    tokio::fs::write(path, data).await?;
    Ok(())
}
