//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `FileSystemAccess` using `tokio::fs`, with durable appends
//! - `PageDriver` using the W3C WebDriver protocol over `reqwest`
//! - `SessionProvider` that waits for a human to log in through a visible
//!   browser window
//!
//! A WebDriver server (`chromedriver`, `geckodriver`) must be running at the
//! configured URL.
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ManualLoginSessionProvider, TokioFileSystem};
//! use bridge_traits::SessionProvider;
//!
//! #[tokio::main]
//! async fn main() {
//!     let fs = TokioFileSystem::new();
//!     let sessions = ManualLoginSessionProvider::new(
//!         "http://localhost:9515",
//!         "https://advertiser.trafficjunky.com/media-library",
//!     )
//!     .with_logged_in_markers(vec!["div.creativeContainer".into()]);
//!
//!     let session = sessions.acquire().await.unwrap();
//! }
//! ```

mod filesystem;
mod session;
mod webdriver;

pub use filesystem::TokioFileSystem;
pub use session::ManualLoginSessionProvider;
pub use webdriver::{WebDriverOptions, WebDriverPage};
