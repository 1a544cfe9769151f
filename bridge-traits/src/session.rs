//! Authenticated Session Abstractions
//!
//! Logging into the creative console may require a human (one-time codes,
//! captchas), so session acquisition lives behind [`SessionProvider`]. The
//! core only ever asks for "a working session" and never performs login
//! logic itself.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::browser::PageDriver;
use crate::error::Result;

/// Unique identifier for an acquired browser session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Capability token for a logged-in console session
///
/// Holding an `AuthSession` means the page behind `driver` was verified as
/// logged in at `acquired_at`. It says nothing about later validity; the
/// driver reports expiry through `BridgeError::SessionExpired`.
#[derive(Clone)]
pub struct AuthSession {
    pub id: SessionId,
    pub driver: Arc<dyn PageDriver>,
    pub acquired_at: DateTime<Utc>,
}

impl AuthSession {
    pub fn new(driver: Arc<dyn PageDriver>) -> Self {
        Self {
            id: SessionId::new(),
            driver,
            acquired_at: Utc::now(),
        }
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("id", &self.id)
            .field("driver", &"PageDriver { ... }")
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// Session provider trait
///
/// `acquire` may suspend for as long as a human needs to finish logging in;
/// callers that need an upper bound wrap it in their own timeout or
/// cancellation.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::session::SessionProvider;
///
/// async fn connect(provider: &dyn SessionProvider) -> Result<()> {
///     let session = provider.acquire().await?;
///     tracing::info!(session = %session.id, "Console session ready");
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Return a logged-in session, prompting for login if needed
    async fn acquire(&self) -> Result<AuthSession>;

    /// Close the browser context behind a session
    async fn release(&self, _session: AuthSession) -> Result<()> {
        Ok(())
    }
}
