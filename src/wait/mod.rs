//! # Condition waits
//!
//! Timeout-bounded polling over driver state. Every wait either returns the
//! value its condition produced or fails with [`Error::Timeout`]; none of them
//! poll forever, and a single check is cut off when the wait runs out.
//! Errors raised by a check count as "not yet".

use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

use crate::config::Config;
use crate::driver::{By, WebDriver, WebElement};
use crate::{Error, Result};

const READY_STATE_SCRIPT: &str = "return document.readyState;";

const AJAX_IDLE_SCRIPT: &str =
    "return (typeof window.jQuery === 'undefined') ? true : window.jQuery.active === 0;";

/// JavaScript truthiness of a script result
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0 && !f.is_nan()).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Polling wait bound to one driver session
#[derive(Debug, Clone)]
pub struct Wait {
    driver: Arc<dyn WebDriver>,
    timeout: Duration,
    poll_interval: Duration,
}

impl Wait {
    pub fn new(driver: Arc<dyn WebDriver>, timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            driver,
            timeout,
            poll_interval,
        }
    }

    pub fn from_config(driver: Arc<dyn WebDriver>, config: &Config) -> Self {
        Self::new(driver, config.explicit_wait(), config.poll_interval())
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Poll `condition` until it yields `Some`
    pub async fn until<T, F, Fut>(&self, description: &str, mut condition: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Option<T>>>,
    {
        let start = Instant::now();
        let mut polls = 0u32;

        loop {
            polls += 1;
            // A hung check must not outlive the wait itself
            let remaining = self.timeout.saturating_sub(start.elapsed());
            match tokio::time::timeout(remaining, condition()).await {
                Ok(Ok(Some(value))) => {
                    debug!("{} met after {} poll(s)", description, polls);
                    return Ok(value);
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => debug!("{} check failed on poll {}: {}", description, polls, e),
                Err(_) => debug!("{} check still pending when the wait ran out", description),
            }

            let elapsed = start.elapsed();
            if elapsed >= self.timeout {
                return Err(Error::timeout(format!(
                    "{} not met within {:.2}s ({} polls)",
                    description,
                    elapsed.as_secs_f64(),
                    polls
                )));
            }

            let remaining = self.timeout - elapsed;
            tokio::time::sleep(self.poll_interval.min(remaining)).await;
        }
    }

    /// Wait until `document.readyState` is `complete`
    #[instrument(skip(self))]
    pub async fn for_page_load(&self) -> Result<()> {
        let driver = self.driver.clone();
        self.until("page load", || {
            let driver = driver.clone();
            async move {
                let state = driver.execute_script(READY_STATE_SCRIPT, vec![]).await?;
                Ok((state.as_str() == Some("complete")).then_some(()))
            }
        })
        .await
    }

    /// Wait until no jQuery request is in flight
    #[instrument(skip(self))]
    pub async fn for_ajax_idle(&self) -> Result<()> {
        let driver = self.driver.clone();
        self.until("ajax idle", || {
            let driver = driver.clone();
            async move {
                let idle = driver.execute_script(AJAX_IDLE_SCRIPT, vec![]).await?;
                Ok(is_truthy(&idle).then_some(()))
            }
        })
        .await
    }

    /// Wait until `script` returns a truthy value, which is returned
    #[instrument(skip(self))]
    pub async fn for_js_condition(&self, script: &str) -> Result<Value> {
        let driver = self.driver.clone();
        let description = format!("script condition `{}`", script);
        self.until(&description, || {
            let driver = driver.clone();
            let script = script.to_string();
            async move {
                let value = driver.execute_script(&script, vec![]).await?;
                Ok(is_truthy(&value).then_some(value))
            }
        })
        .await
    }

    /// Wait until the current URL contains `fragment`
    pub async fn for_url_contains(&self, fragment: &str) -> Result<String> {
        let driver = self.driver.clone();
        let description = format!("url containing '{}'", fragment);
        self.until(&description, || {
            let driver = driver.clone();
            async move {
                let url = driver.current_url().await?;
                Ok(url.contains(fragment).then_some(url))
            }
        })
        .await
    }

    /// Wait until the title contains `fragment`
    pub async fn for_title_contains(&self, fragment: &str) -> Result<String> {
        let driver = self.driver.clone();
        let description = format!("title containing '{}'", fragment);
        self.until(&description, || {
            let driver = driver.clone();
            async move {
                let title = driver.title().await?;
                Ok(title.contains(fragment).then_some(title))
            }
        })
        .await
    }

    /// Wait until an element matching `by` is displayed
    pub async fn for_element_visible(&self, by: &By) -> Result<Arc<dyn WebElement>> {
        let driver = self.driver.clone();
        let description = format!("{} visible", by);
        self.until(&description, || {
            let driver = driver.clone();
            async move {
                let element = driver.find_element(by).await?;
                let displayed = element.is_displayed().await?;
                Ok(displayed.then_some(element))
            }
        })
        .await
    }

    /// Wait until no element matching `by` is displayed
    pub async fn for_element_invisible(&self, by: &By) -> Result<()> {
        let driver = self.driver.clone();
        let description = format!("{} invisible", by);
        self.until(&description, || {
            let driver = driver.clone();
            async move {
                for element in driver.find_elements(by).await? {
                    match element.is_displayed().await {
                        Ok(true) => return Ok(None),
                        Ok(false) => {}
                        Err(e) if e.is_stale() => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(Some(()))
            }
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockDom, MockWebDriver, MockWebElement};
    use serde_json::json;

    fn fast_wait(dom: Arc<MockDom>) -> Wait {
        Wait::new(
            MockWebDriver::new(dom),
            Duration::from_millis(200),
            Duration::from_millis(10),
        )
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&Value::Null));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("ok")));
        assert!(is_truthy(&json!(2)));
        assert!(is_truthy(&json!({})));
    }

    #[tokio::test]
    async fn test_page_load_polls_until_complete() {
        let dom = MockDom::new();
        dom.script_results(
            "readyState",
            vec![json!("loading"), json!("interactive"), json!("complete")],
        );
        let wait = fast_wait(dom.clone());

        wait.for_page_load().await.unwrap();
        assert_eq!(dom.executed_scripts().len(), 3);
    }

    #[tokio::test]
    async fn test_ajax_idle_timeout() {
        let dom = MockDom::new();
        dom.script_results("jQuery", vec![json!(false)]);
        let wait = fast_wait(dom);

        let result = wait.for_ajax_idle().await;
        match result {
            Err(Error::Timeout(message)) => assert!(message.contains("ajax idle")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_js_condition_returns_value() {
        let dom = MockDom::new();
        dom.script_results("window.appReady", vec![Value::Null, json!("v2")]);
        let wait = fast_wait(dom);

        let value = wait.for_js_condition("return window.appReady;").await.unwrap();
        assert_eq!(value, "v2");
    }

    #[tokio::test]
    async fn test_element_visible_after_toggle() {
        let dom = MockDom::new();
        let by = By::id("banner");
        let banner = MockWebElement::hidden("Saved");
        dom.add(by.clone(), banner.clone());
        let wait = fast_wait(dom).with_timeout(Duration::from_secs(2));

        let toggler = {
            let banner = banner.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                banner.set_displayed(true);
            })
        };

        let element = wait.for_element_visible(&by).await.unwrap();
        assert_eq!(element.id(), banner.id());
        toggler.await.unwrap();
    }

    #[tokio::test]
    async fn test_element_invisible_treats_missing_as_gone() {
        let wait = fast_wait(MockDom::new());
        wait.for_element_invisible(&By::css(".spinner")).await.unwrap();
    }

    #[tokio::test]
    async fn test_url_contains() {
        let dom = MockDom::new();
        let driver = MockWebDriver::new(dom);
        driver.navigate("https://shop.test/cart").await.unwrap();
        let wait = Wait::new(driver, Duration::from_millis(100), Duration::from_millis(10));

        let url = wait.for_url_contains("/cart").await.unwrap();
        assert_eq!(url, "https://shop.test/cart");
        assert!(wait.for_url_contains("/checkout").await.is_err());
    }

    #[tokio::test]
    async fn test_hung_condition_is_cut_off_at_timeout() {
        let wait = fast_wait(MockDom::new()).with_timeout(Duration::from_millis(100));

        let outcome = tokio::time::timeout(
            Duration::from_secs(2),
            wait.until("hung check", || async {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Ok(Some(()))
            }),
        )
        .await
        .expect("wait should give up on its own");

        match outcome {
            Err(Error::Timeout(message)) => assert!(message.contains("hung check")),
            other => panic!("expected timeout, got {:?}", other),
        }
    }
}
