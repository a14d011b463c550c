//! Configuration management for wd-harness
//!
//! Values are resolved once, either from `WDH_*` environment variables or a
//! TOML file, and handed to the services at construction.

use crate::driver::BrowserType;
use crate::{Error, Result};
use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Harness configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Browser to launch
    pub browser: BrowserType,

    /// Run browsers without a visible window
    pub headless: bool,

    /// Remote end (chromedriver, geckodriver, Selenium grid)
    pub webdriver_url: String,

    /// Concurrent driver cap for the lifecycle manager
    pub max_browsers_allowed: usize,

    /// Browser cap for the checkout/return pool
    pub pool_size: usize,

    /// Attempts per element operation
    pub max_retries: u32,

    /// Delay between element operation attempts in milliseconds
    pub retry_delay_ms: u64,

    /// Implicit wait applied to every new session in milliseconds
    pub implicit_wait_ms: u64,

    /// Page load timeout in milliseconds
    pub page_load_timeout_ms: u64,

    /// Script timeout in milliseconds
    pub script_timeout_ms: u64,

    /// Default explicit wait for condition polling in milliseconds
    pub explicit_wait_ms: u64,

    /// Poll interval for condition waits in milliseconds
    pub poll_interval_ms: u64,

    /// Upper bound on one WebDriver HTTP command in milliseconds
    pub request_timeout_ms: u64,

    /// Maximize the window after session creation
    pub maximize_window: bool,

    /// Outline elements before acting on them
    pub highlight_on_action: bool,

    /// Log level
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            browser: BrowserType::Chrome,
            headless: true,
            webdriver_url: "http://localhost:4444".to_string(),
            max_browsers_allowed: 5,
            pool_size: 3,
            max_retries: 3,
            retry_delay_ms: 500,
            implicit_wait_ms: 0,
            page_load_timeout_ms: 30000,
            script_timeout_ms: 30000,
            explicit_wait_ms: 10000,
            poll_interval_ms: 250,
            request_timeout_ms: 60000,
            maximize_window: true,
            highlight_on_action: false,
            log_level: "info".to_string(),
        }
    }
}

fn parse_var<T: FromStr>(name: &str) -> Result<Option<T>> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| Error::configuration(format!("Invalid {}", name))),
        Err(_) => Ok(None),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();

        if let Some(browser) = parse_var::<BrowserType>("WDH_BROWSER")? {
            config.browser = browser;
        }

        if let Some(headless) = parse_var("WDH_HEADLESS")? {
            config.headless = headless;
        }

        if let Ok(url) = env::var("WDH_WEBDRIVER_URL") {
            config.webdriver_url = url;
        }

        if let Some(max) = parse_var("WDH_MAX_BROWSERS")? {
            config.max_browsers_allowed = max;
        }

        if let Some(size) = parse_var("WDH_POOL_SIZE")? {
            config.pool_size = size;
        }

        if let Some(retries) = parse_var("WDH_MAX_RETRIES")? {
            config.max_retries = retries;
        }

        if let Some(delay) = parse_var("WDH_RETRY_DELAY_MS")? {
            config.retry_delay_ms = delay;
        }

        if let Some(wait) = parse_var("WDH_IMPLICIT_WAIT_MS")? {
            config.implicit_wait_ms = wait;
        }

        if let Some(timeout) = parse_var("WDH_PAGE_LOAD_TIMEOUT_MS")? {
            config.page_load_timeout_ms = timeout;
        }

        if let Some(timeout) = parse_var("WDH_SCRIPT_TIMEOUT_MS")? {
            config.script_timeout_ms = timeout;
        }

        if let Some(wait) = parse_var("WDH_EXPLICIT_WAIT_MS")? {
            config.explicit_wait_ms = wait;
        }

        if let Some(interval) = parse_var("WDH_POLL_INTERVAL_MS")? {
            config.poll_interval_ms = interval;
        }

        if let Some(timeout) = parse_var("WDH_REQUEST_TIMEOUT_MS")? {
            config.request_timeout_ms = timeout;
        }

        if let Some(maximize) = parse_var("WDH_MAXIMIZE")? {
            config.maximize_window = maximize;
        }

        if let Some(highlight) = parse_var("WDH_HIGHLIGHT")? {
            config.highlight_on_action = highlight;
        }

        if let Ok(log_level) = env::var("WDH_LOG_LEVEL") {
            config.log_level = log_level;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::configuration(format!("Failed to read config file: {}", e)))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::configuration(format!("Failed to parse config: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Reject values that would leave the harness unable to run anything
    pub fn validate(&self) -> Result<()> {
        if self.max_browsers_allowed == 0 {
            return Err(Error::configuration("max_browsers_allowed must be > 0"));
        }
        if self.pool_size == 0 {
            return Err(Error::configuration("pool_size must be > 0"));
        }
        if self.max_retries == 0 {
            return Err(Error::configuration("max_retries must be > 0"));
        }
        if self.request_timeout_ms == 0 {
            return Err(Error::configuration("request_timeout_ms must be > 0"));
        }
        Ok(())
    }

    /// Retry policy for element wrappers built from this configuration
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            retry_delay: Duration::from_millis(self.retry_delay_ms),
        }
    }

    /// Default explicit wait
    pub fn explicit_wait(&self) -> Duration {
        Duration::from_millis(self.explicit_wait_ms)
    }

    /// Default poll interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Bounded retry parameters for element operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub max_retries: u32,
    /// Fixed sleep between attempts
    pub retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl RetryPolicy {
    /// Policy that runs the operation exactly once
    pub fn single_attempt() -> Self {
        Self {
            max_retries: 1,
            retry_delay: Duration::ZERO,
        }
    }
}
