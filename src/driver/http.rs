//! W3C WebDriver backend
//!
//! Speaks the W3C WebDriver JSON wire protocol over HTTP to chromedriver,
//! geckodriver, msedgedriver or a Selenium grid.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use reqwest::Method;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use super::traits::*;
use crate::config::Config;
use crate::Error;

/// Upper bound on a single WebDriver command unless configured otherwise
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Shared HTTP state of one remote session
#[derive(Debug)]
struct HttpSession {
    client: reqwest::Client,
    session_id: String,
    session_url: String,
}

impl HttpSession {
    async fn command(&self, method: Method, path: &str, body: Option<Value>) -> Result<Value, Error> {
        let url = format!("{}{}", self.session_url, path);
        send(&self.client, method, &url, body).await
    }

    fn element_from(self: &Arc<Self>, value: &Value) -> Result<Arc<dyn WebElement>, Error> {
        let id = value
            .get(ELEMENT_KEY)
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::internal(format!("Malformed element reference: {}", value)))?;

        Ok(Arc::new(HttpWebElement {
            id: id.to_string(),
            session: Arc::clone(self),
        }))
    }

    fn elements_from(self: &Arc<Self>, value: &Value) -> Result<Vec<Arc<dyn WebElement>>, Error> {
        value
            .as_array()
            .ok_or_else(|| Error::internal("Expected an element array"))?
            .iter()
            .map(|v| self.element_from(v))
            .collect()
    }
}

/// Send one command and unwrap the `value` envelope
async fn send(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    body: Option<Value>,
) -> Result<Value, Error> {
    debug!("WebDriver {} {}", method, url);

    let mut request = client.request(method, url);
    if let Some(body) = body {
        request = request.json(&body);
    }

    let response = request.send().await?;
    let status = response.status();
    let payload: Value = response.json().await?;
    let value = payload.get("value").cloned().unwrap_or(Value::Null);

    if status.is_success() {
        return Ok(value);
    }

    let error = value
        .get("error")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown error")
        .to_string();
    let message = value
        .get("message")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();

    Err(map_protocol_error(error, message))
}

/// Translate a W3C error code into the harness taxonomy
pub(crate) fn map_protocol_error(error: String, message: String) -> Error {
    match error.as_str() {
        "no such element" => Error::not_found(message),
        "stale element reference" => Error::stale(message),
        "invalid session id" => Error::session_invalid(message),
        "javascript error" => Error::script_execution(message),
        "timeout" | "script timeout" => Error::timeout(message),
        _ => Error::webdriver(error, message),
    }
}

fn locator_body(by: &By) -> Value {
    let (using, value) = by.to_w3c();
    json!({ "using": using, "value": value })
}

/// Browser session over the W3C protocol
#[derive(Debug, Clone)]
pub struct HttpWebDriver {
    session: Arc<HttpSession>,
}

impl HttpWebDriver {
    /// Open a new remote session
    #[instrument(skip(client, always_match))]
    pub async fn connect(
        client: reqwest::Client,
        endpoint: &str,
        always_match: Value,
    ) -> Result<Self, Error> {
        let endpoint = endpoint.trim_end_matches('/');
        let body = json!({ "capabilities": { "alwaysMatch": always_match } });

        let value = send(&client, Method::POST, &format!("{}/session", endpoint), Some(body))
            .await
            .map_err(|e| Error::session_creation(format!("{} at {}", e, endpoint)))?;

        let session_id = value
            .get("sessionId")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::session_creation("Response carried no sessionId"))?
            .to_string();

        info!("Opened WebDriver session {}", session_id);

        Ok(Self {
            session: Arc::new(HttpSession {
                client,
                session_url: format!("{}/session/{}", endpoint, session_id),
                session_id,
            }),
        })
    }
}

#[async_trait]
impl WebDriver for HttpWebDriver {
    fn session_id(&self) -> &str {
        &self.session.session_id
    }

    async fn navigate(&self, url: &str) -> Result<(), Error> {
        info!("Navigating to {}", url);
        self.session
            .command(Method::POST, "/url", Some(json!({ "url": url })))
            .await?;
        Ok(())
    }

    async fn current_url(&self) -> Result<String, Error> {
        let value = self.session.command(Method::GET, "/url", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn title(&self) -> Result<String, Error> {
        let value = self.session.command(Method::GET, "/title", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn find_element(&self, by: &By) -> Result<Arc<dyn WebElement>, Error> {
        let value = self
            .session
            .command(Method::POST, "/element", Some(locator_body(by)))
            .await?;
        self.session.element_from(&value)
    }

    async fn find_elements(&self, by: &By) -> Result<Vec<Arc<dyn WebElement>>, Error> {
        let value = self
            .session
            .command(Method::POST, "/elements", Some(locator_body(by)))
            .await?;
        self.session.elements_from(&value)
    }

    async fn execute_script(&self, script: &str, args: Vec<Value>) -> Result<Value, Error> {
        self.session
            .command(
                Method::POST,
                "/execute/sync",
                Some(json!({ "script": script, "args": args })),
            )
            .await
    }

    async fn set_timeouts(&self, timeouts: Timeouts) -> Result<(), Error> {
        let body = json!({
            "implicit": timeouts.implicit.as_millis() as u64,
            "pageLoad": timeouts.page_load.as_millis() as u64,
            "script": timeouts.script.as_millis() as u64,
        });
        self.session.command(Method::POST, "/timeouts", Some(body)).await?;
        Ok(())
    }

    async fn maximize_window(&self) -> Result<(), Error> {
        self.session
            .command(Method::POST, "/window/maximize", Some(json!({})))
            .await?;
        Ok(())
    }

    async fn delete_all_cookies(&self) -> Result<(), Error> {
        self.session.command(Method::DELETE, "/cookie", None).await?;
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, Error> {
        let value = self.session.command(Method::GET, "/screenshot", None).await?;
        let encoded = value
            .as_str()
            .ok_or_else(|| Error::internal("Screenshot response was not a string"))?;
        BASE64
            .decode(encoded)
            .map_err(|e| Error::internal(format!("Failed to decode screenshot: {}", e)))
    }

    async fn quit(&self) -> Result<(), Error> {
        info!("Closing WebDriver session {}", self.session.session_id);
        self.session.command(Method::DELETE, "", None).await?;
        Ok(())
    }
}

/// Element handle over the W3C protocol
#[derive(Debug)]
pub struct HttpWebElement {
    id: String,
    session: Arc<HttpSession>,
}

impl HttpWebElement {
    async fn element_command(&self, method: Method, suffix: &str, body: Option<Value>) -> Result<Value, Error> {
        let path = format!("/element/{}{}", self.id, suffix);
        self.session.command(method, &path, body).await
    }
}

#[async_trait]
impl WebElement for HttpWebElement {
    fn id(&self) -> &str {
        &self.id
    }

    async fn click(&self) -> Result<(), Error> {
        self.element_command(Method::POST, "/click", Some(json!({}))).await?;
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.element_command(Method::POST, "/clear", Some(json!({}))).await?;
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), Error> {
        self.element_command(Method::POST, "/value", Some(json!({ "text": text })))
            .await?;
        Ok(())
    }

    async fn text(&self) -> Result<String, Error> {
        let value = self.element_command(Method::GET, "/text", None).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, Error> {
        let suffix = format!("/attribute/{}", urlencoding::encode(name));
        let value = self.element_command(Method::GET, &suffix, None).await?;
        Ok(match value {
            Value::Null => None,
            Value::String(s) => Some(s),
            other => Some(other.to_string()),
        })
    }

    async fn is_displayed(&self) -> Result<bool, Error> {
        let value = self.element_command(Method::GET, "/displayed", None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn is_enabled(&self) -> Result<bool, Error> {
        let value = self.element_command(Method::GET, "/enabled", None).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn find_child(&self, by: &By) -> Result<Arc<dyn WebElement>, Error> {
        let value = self
            .element_command(Method::POST, "/element", Some(locator_body(by)))
            .await?;
        self.session.element_from(&value)
    }

    async fn find_children(&self, by: &By) -> Result<Vec<Arc<dyn WebElement>>, Error> {
        let value = self
            .element_command(Method::POST, "/elements", Some(locator_body(by)))
            .await?;
        self.session.elements_from(&value)
    }
}

/// Factory that opens W3C sessions against one remote end
#[derive(Debug, Clone)]
pub struct HttpDriverFactory {
    endpoint: String,
    client: reqwest::Client,
    request_timeout: Duration,
}

impl HttpDriverFactory {
    /// Factory whose commands give up after [`DEFAULT_REQUEST_TIMEOUT`]
    pub fn new(endpoint: impl Into<String>) -> Result<Self, Error> {
        Self::with_request_timeout(endpoint, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Factory whose every WebDriver command is bounded by `timeout`
    pub fn with_request_timeout(
        endpoint: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: endpoint.into(),
            client,
            request_timeout: timeout,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, Error> {
        Self::with_request_timeout(config.webdriver_url.clone(), config.request_timeout())
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

#[async_trait]
impl DriverFactory for HttpDriverFactory {
    async fn create(
        &self,
        browser: BrowserType,
        headless: bool,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn WebDriver>, Error> {
        let always_match = capabilities.to_w3c(browser, headless);
        let driver = HttpWebDriver::connect(self.client.clone(), &self.endpoint, always_match).await?;
        Ok(Arc::new(driver))
    }
}
