//! Workspace entry crate.
//!
//! Re-exports the upload engine and, with the `desktop-shims` feature, the
//! service façade that wires it to a WebDriver browser and local stores.
//! Hosts depend on `creative-flow-workspace` instead of picking the
//! individual workspace crates.

pub use core_upload as upload;

#[cfg(feature = "desktop-shims")]
pub use core_service::{bootstrap_desktop, CoreDependencies, CoreError, CoreService};
