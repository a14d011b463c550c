//! Browser session capability traits
//!
//! This module defines the abstract interface the harness drives. Any
//! automation backend that can satisfy it is a valid browser session.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use crate::Error;

/// Locator strategy plus value
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "using", content = "value", rename_all = "snake_case")]
pub enum By {
    Id(String),
    Name(String),
    ClassName(String),
    Css(String),
    XPath(String),
    LinkText(String),
    PartialLinkText(String),
    TagName(String),
}

impl By {
    pub fn id(value: impl Into<String>) -> Self {
        By::Id(value.into())
    }

    pub fn name(value: impl Into<String>) -> Self {
        By::Name(value.into())
    }

    pub fn class_name(value: impl Into<String>) -> Self {
        By::ClassName(value.into())
    }

    pub fn css(value: impl Into<String>) -> Self {
        By::Css(value.into())
    }

    pub fn xpath(value: impl Into<String>) -> Self {
        By::XPath(value.into())
    }

    pub fn link_text(value: impl Into<String>) -> Self {
        By::LinkText(value.into())
    }

    pub fn partial_link_text(value: impl Into<String>) -> Self {
        By::PartialLinkText(value.into())
    }

    pub fn tag_name(value: impl Into<String>) -> Self {
        By::TagName(value.into())
    }

    /// Strategy tag
    pub fn strategy(&self) -> &'static str {
        match self {
            By::Id(_) => "id",
            By::Name(_) => "name",
            By::ClassName(_) => "className",
            By::Css(_) => "cssSelector",
            By::XPath(_) => "xpath",
            By::LinkText(_) => "linkText",
            By::PartialLinkText(_) => "partialLinkText",
            By::TagName(_) => "tagName",
        }
    }

    /// Raw locator value
    pub fn value(&self) -> &str {
        match self {
            By::Id(v)
            | By::Name(v)
            | By::ClassName(v)
            | By::Css(v)
            | By::XPath(v)
            | By::LinkText(v)
            | By::PartialLinkText(v)
            | By::TagName(v) => v,
        }
    }

    /// Map to a W3C `(using, value)` pair
    ///
    /// W3C only knows css, xpath, link text, partial link text and tag name;
    /// id, name and class are lowered to CSS.
    pub fn to_w3c(&self) -> (&'static str, String) {
        match self {
            By::Id(v) => ("css selector", format!("[id=\"{}\"]", escape_css_string(v))),
            By::Name(v) => ("css selector", format!("[name=\"{}\"]", escape_css_string(v))),
            By::ClassName(v) => ("css selector", format!(".{}", v.trim())),
            By::Css(v) => ("css selector", v.clone()),
            By::XPath(v) => ("xpath", v.clone()),
            By::LinkText(v) => ("link text", v.clone()),
            By::PartialLinkText(v) => ("partial link text", v.clone()),
            By::TagName(v) => ("tag name", v.clone()),
        }
    }
}

fn escape_css_string(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

impl fmt::Display for By {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "By.{}: {}", self.strategy(), self.value())
    }
}

/// Supported browsers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    #[default]
    Chrome,
    Firefox,
    Edge,
    Safari,
}

impl BrowserType {
    /// W3C `browserName` capability
    pub fn browser_name(&self) -> &'static str {
        match self {
            BrowserType::Chrome => "chrome",
            BrowserType::Firefox => "firefox",
            BrowserType::Edge => "MicrosoftEdge",
            BrowserType::Safari => "safari",
        }
    }
}

impl FromStr for BrowserType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            "firefox" | "ff" => Ok(BrowserType::Firefox),
            "edge" | "msedge" => Ok(BrowserType::Edge),
            "safari" => Ok(BrowserType::Safari),
            other => Err(Error::configuration(format!("Unsupported browser: {}", other))),
        }
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BrowserType::Chrome => "chrome",
            BrowserType::Firefox => "firefox",
            BrowserType::Edge => "edge",
            BrowserType::Safari => "safari",
        };
        f.write_str(name)
    }
}

/// Extra session capabilities
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Additional browser command-line arguments
    pub args: Vec<String>,
    /// Free-form capabilities merged into `alwaysMatch`
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Capabilities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn with_capability(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Build the W3C `alwaysMatch` object for a browser
    pub fn to_w3c(&self, browser: BrowserType, headless: bool) -> serde_json::Value {
        let mut args = self.args.clone();
        let mut always = serde_json::Map::new();
        always.insert("browserName".into(), browser.browser_name().into());

        match browser {
            BrowserType::Chrome | BrowserType::Edge => {
                if headless {
                    args.push("--headless=new".into());
                }
                args.push("--disable-dev-shm-usage".into());
                let key = if browser == BrowserType::Chrome {
                    "goog:chromeOptions"
                } else {
                    "ms:edgeOptions"
                };
                always.insert(key.into(), serde_json::json!({ "args": args }));
            }
            BrowserType::Firefox => {
                if headless {
                    args.push("-headless".into());
                }
                always.insert("moz:firefoxOptions".into(), serde_json::json!({ "args": args }));
            }
            BrowserType::Safari => {}
        }

        for (key, value) in &self.extra {
            always.insert(key.clone(), value.clone());
        }

        serde_json::Value::Object(always)
    }
}

/// Session timeouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub implicit: Duration,
    pub page_load: Duration,
    pub script: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            implicit: Duration::ZERO,
            page_load: Duration::from_secs(30),
            script: Duration::from_secs(30),
        }
    }
}

/// A live element handle bound to a driver session
///
/// Handles go stale when the DOM node is replaced; staleness surfaces lazily
/// as [`Error::StaleElement`] on the next call.
#[async_trait]
pub trait WebElement: Send + Sync + fmt::Debug {
    /// Remote element id
    fn id(&self) -> &str;

    /// W3C element reference, usable as a script argument
    fn element_ref(&self) -> serde_json::Value {
        let mut reference = serde_json::Map::new();
        reference.insert(ELEMENT_KEY.to_string(), self.id().into());
        serde_json::Value::Object(reference)
    }

    async fn click(&self) -> Result<(), Error>;

    async fn clear(&self) -> Result<(), Error>;

    async fn send_keys(&self, text: &str) -> Result<(), Error>;

    async fn text(&self) -> Result<String, Error>;

    async fn attribute(&self, name: &str) -> Result<Option<String>, Error>;

    async fn is_displayed(&self) -> Result<bool, Error>;

    async fn is_enabled(&self) -> Result<bool, Error>;

    /// Find the first descendant matching `by`
    async fn find_child(&self, by: &By) -> Result<Arc<dyn WebElement>, Error>;

    /// Find all descendants matching `by`
    async fn find_children(&self, by: &By) -> Result<Vec<Arc<dyn WebElement>>, Error>;
}

/// W3C element identifier key
pub const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// A browser session
#[async_trait]
pub trait WebDriver: Send + Sync + fmt::Debug {
    fn session_id(&self) -> &str;

    async fn navigate(&self, url: &str) -> Result<(), Error>;

    async fn current_url(&self) -> Result<String, Error>;

    async fn title(&self) -> Result<String, Error>;

    async fn find_element(&self, by: &By) -> Result<Arc<dyn WebElement>, Error>;

    async fn find_elements(&self, by: &By) -> Result<Vec<Arc<dyn WebElement>>, Error>;

    /// Run synchronous script; element references may appear in `args`
    async fn execute_script(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value, Error>;

    async fn set_timeouts(&self, timeouts: Timeouts) -> Result<(), Error>;

    async fn maximize_window(&self) -> Result<(), Error>;

    async fn delete_all_cookies(&self) -> Result<(), Error>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> Result<Vec<u8>, Error>;

    async fn quit(&self) -> Result<(), Error>;

    /// Liveness probe
    async fn is_alive(&self) -> bool {
        self.title().await.is_ok()
    }
}

/// Creates browser sessions
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn create(
        &self,
        browser: BrowserType,
        headless: bool,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn WebDriver>, Error>;
}
