//! wd-harness: parallel WebDriver test harness
//!
//! Coordinates browser sessions for parallel test workers, resolves
//! elements through self-healing locators and retries element operations
//! that fail transiently.
//!
//! ## Layout
//! - `driver`: session boundary (W3C HTTP backend, mock backend)
//! - `lifecycle`: per-worker drivers, browser pool, run context
//! - `locator`: locator specs and the self-healing resolver
//! - `element`: retrying element wrappers and element lists
//! - `wait`: timeout-bounded condition polling
//! - `page`: page object base
//! - `report`: step reporting

pub mod error;
pub mod config;

pub mod driver;
pub mod element;
pub mod lifecycle;
pub mod locator;
pub mod page;
pub mod report;
pub mod wait;

// Re-exports
pub use error::{Error, Result};

/// wd-harness library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
