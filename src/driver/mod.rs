//! # Browser session boundary
//!
//! The harness never drives a browser itself. It coordinates calls against
//! the capability set defined here, and any backend that implements it can
//! be plugged in.
//!
//! ## Module structure
//! - `traits`: `WebDriver`, `WebElement`, `DriverFactory`, `By`, capabilities
//! - `http`: W3C WebDriver over HTTP (chromedriver, geckodriver, grid)
//! - `mock`: scriptable in-memory backend for tests
//!
//! ## Usage
//! ```rust,no_run
//! use wd_harness::driver::{By, BrowserType, Capabilities, DriverFactory, HttpDriverFactory};
//!
//! # async fn example() -> wd_harness::Result<()> {
//! let factory = HttpDriverFactory::new("http://localhost:9515")?;
//! let driver = factory
//!     .create(BrowserType::Chrome, true, &Capabilities::default())
//!     .await?;
//! driver.navigate("https://example.com").await?;
//! let heading = driver.find_element(&By::css("h1")).await?;
//! println!("{}", heading.text().await?);
//! driver.quit().await?;
//! # Ok(())
//! # }
//! ```

pub mod traits;
pub mod http;
pub mod mock;


pub use traits::{
    By, BrowserType, Capabilities, DriverFactory, Timeouts, WebDriver, WebElement, ELEMENT_KEY,
};
pub use http::{HttpDriverFactory, HttpWebDriver, HttpWebElement};
