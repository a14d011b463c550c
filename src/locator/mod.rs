//! # Self-healing locators
//!
//! A page field is described by a [`LocatorSpec`]: one primary locator plus
//! ranked alternatives. [`SelfHealingLocator`] resolves it against the live
//! DOM, substituting alternatives when the primary stops matching, and
//! remembers the winner per field in a shared [`LocatorCache`].
//!
//! ## Usage
//! ```rust,no_run
//! use wd_harness::driver::{By, WebDriver};
//! use wd_harness::locator::{LocatorCache, LocatorSpec, SelfHealingLocator};
//!
//! # async fn example(driver: &dyn WebDriver) -> wd_harness::Result<()> {
//! let login = LocatorSpec::new(By::id("login"), "Login button")
//!     .with_alternative(By::css("button[type=submit]"))
//!     .with_alternative(By::xpath("//button[text()='Log in']"));
//!
//! let locator = SelfHealingLocator::new(LocatorCache::new());
//! locator.resolve_one(driver, &login).await?.click().await?;
//! # Ok(())
//! # }
//! ```

pub mod spec;
pub mod healing;

#[cfg(test)]
mod tests;

pub use spec::{indexed_locator, xpath_literal, LocatorSpec};
pub use healing::{LocatorCache, ResolvedList, SelfHealingLocator};
