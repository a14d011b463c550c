//! Retrying element wrapper
//!
//! An [`Element`] never trusts a handle across failures: any error drops the
//! held handle so the next attempt re-resolves through the self-healing
//! locator. Every error category is retried the same way.

use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::scripts;
use crate::config::RetryPolicy;
use crate::driver::{By, WebDriver, WebElement};
use crate::locator::{LocatorSpec, SelfHealingLocator};
use crate::report::StepReporter;
use crate::wait::Wait;
use crate::{Error, Result};

/// Everything an element needs besides its locator
#[derive(Clone)]
pub struct ElementScope {
    pub(crate) driver: Arc<dyn WebDriver>,
    pub(crate) locator: SelfHealingLocator,
    pub(crate) reporter: Arc<dyn StepReporter>,
    pub(crate) policy: RetryPolicy,
    pub(crate) highlight: bool,
}

impl ElementScope {
    pub fn new(
        driver: Arc<dyn WebDriver>,
        locator: SelfHealingLocator,
        reporter: Arc<dyn StepReporter>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            driver,
            locator,
            reporter,
            policy,
            highlight: false,
        }
    }

    pub fn with_highlight(mut self, highlight: bool) -> Self {
        self.highlight = highlight;
        self
    }

    /// Override the retry policy for elements built from this scope
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn driver(&self) -> &Arc<dyn WebDriver> {
        &self.driver
    }

    pub fn element(&self, spec: LocatorSpec) -> Element {
        Element::new(self.clone(), spec)
    }

    pub fn list(&self, spec: LocatorSpec) -> super::ElementList {
        super::ElementList::new(self.clone(), spec)
    }
}

impl std::fmt::Debug for ElementScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElementScope")
            .field("session", &self.driver.session_id())
            .field("policy", &self.policy)
            .field("highlight", &self.highlight)
            .finish()
    }
}

/// A logical page field with bounded-retry actions and reads
#[derive(Debug)]
pub struct Element {
    scope: ElementScope,
    spec: LocatorSpec,
    held: Mutex<Option<Arc<dyn WebElement>>>,
}

impl Element {
    pub fn new(scope: ElementScope, spec: LocatorSpec) -> Self {
        Self {
            scope,
            spec,
            held: Mutex::new(None),
        }
    }

    pub fn spec(&self) -> &LocatorSpec {
        &self.spec
    }

    pub fn description(&self) -> &str {
        self.spec.description()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.scope.policy
    }

    /// Held handle, resolving one if none is held
    pub async fn handle(&self) -> Result<Arc<dyn WebElement>> {
        if let Some(element) = self.held_handle() {
            return Ok(element);
        }

        let element = self
            .scope
            .locator
            .resolve_one(self.scope.driver.as_ref(), &self.spec)
            .await?;
        *self.held.lock().unwrap_or_else(|p| p.into_inner()) = Some(element.clone());
        Ok(element)
    }

    /// Forget the held handle so the next use re-resolves
    pub fn discard(&self) {
        self.held.lock().unwrap_or_else(|p| p.into_inner()).take();
    }

    fn held_handle(&self) -> Option<Arc<dyn WebElement>> {
        self.held.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Run `operation` with the configured retry policy
    pub async fn execute<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut(Arc<dyn WebElement>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry(self.scope.policy, false, operation).await
    }

    /// Run `operation` once, for callers that already retry at an outer level
    pub async fn execute_once<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut(Arc<dyn WebElement>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.retry(RetryPolicy::single_attempt(), false, operation).await
    }

    /// Reported mutating action
    async fn perform<F, Fut>(&self, name: &str, verb: &str, value: Option<&str>, operation: F) -> Result<()>
    where
        F: FnMut(Arc<dyn WebElement>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let description = format!("{} '{}'", verb, self.description());
        self.scope
            .reporter
            .log_action(name, &description, self.description(), value);

        match self.retry(self.scope.policy, true, operation).await {
            Ok(()) => {
                self.scope.reporter.pass(&description);
                Ok(())
            }
            Err(e) => {
                self.scope.reporter.fail(&format!("{}: {}", description, e));
                self.capture_failure(&description).await;
                Err(e)
            }
        }
    }

    async fn retry<T, F, Fut>(&self, policy: RetryPolicy, highlight: bool, mut operation: F) -> Result<T>
    where
        F: FnMut(Arc<dyn WebElement>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let attempts = policy.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            let outcome = match self.handle().await {
                Ok(element) => {
                    if highlight && self.scope.highlight {
                        self.highlight(&element).await;
                    }
                    operation(element).await
                }
                Err(e) => Err(e),
            };

            match outcome {
                Ok(value) => {
                    if attempt > 1 {
                        debug!("'{}' succeeded on attempt {}", self.description(), attempt);
                    }
                    return Ok(value);
                }
                Err(e) => {
                    debug!(
                        "'{}' attempt {}/{} failed: {}",
                        self.description(),
                        attempt,
                        attempts,
                        e
                    );
                    self.discard();
                    last_error = Some(e);
                    if attempt < attempts && !policy.retry_delay.is_zero() {
                        tokio::time::sleep(policy.retry_delay).await;
                    }
                }
            }
        }

        let elapsed = start.elapsed().as_secs_f64();
        warn!(
            "'{}' failed after {} attempt(s) in {:.2}s",
            self.description(),
            attempts,
            elapsed
        );

        Err(Error::ActionFailed {
            target: self.description().to_string(),
            attempts,
            elapsed_secs: elapsed,
            cause: Box::new(last_error.unwrap_or_else(|| Error::internal("no attempt was made"))),
        })
    }

    async fn highlight(&self, element: &Arc<dyn WebElement>) {
        if let Err(e) = self
            .scope
            .driver
            .execute_script(scripts::HIGHLIGHT_SCRIPT, vec![element.element_ref()])
            .await
        {
            debug!("Highlight of '{}' failed: {}", self.description(), e);
        }
    }

    async fn capture_failure(&self, label: &str) {
        match self.scope.driver.screenshot().await {
            Ok(png) => self.scope.reporter.attach_screenshot(label, &png),
            Err(e) => debug!("Failure screenshot unavailable: {}", e),
        }
    }

    #[instrument(skip(self), fields(field = %self.description()))]
    pub async fn click(&self) -> Result<()> {
        self.perform("click", "Click", None, |element| async move { element.click().await })
            .await
    }

    pub async fn clear(&self) -> Result<()> {
        self.perform("clear", "Clear", None, |element| async move { element.clear().await })
            .await
    }

    /// Replace the field content with `text`
    #[instrument(skip(self, text), fields(field = %self.description()))]
    pub async fn type_text(&self, text: &str) -> Result<()> {
        self.perform("type", "Type into", Some(text), |element| async move {
            element.clear().await?;
            element.send_keys(text).await
        })
        .await
    }

    /// Add `text` after the current content
    pub async fn append_text(&self, text: &str) -> Result<()> {
        self.perform("append", "Append to", Some(text), |element| async move {
            element.send_keys(text).await
        })
        .await
    }

    /// Pick the `<option>` whose trimmed text equals `text`
    pub async fn select_by_visible_text(&self, text: &str) -> Result<()> {
        self.perform("select", "Select option of", Some(text), |element| async move {
            for option in element.find_children(&By::tag_name("option")).await? {
                if option.text().await?.trim() == text.trim() {
                    return option.click().await;
                }
            }
            Err(Error::not_found(format!("option with text '{}'", text)))
        })
        .await
    }

    /// Pick the `<option>` whose value attribute equals `value`
    pub async fn select_by_value(&self, value: &str) -> Result<()> {
        let option_by = By::css(format!("option[value=\"{}\"]", value.replace('"', "\\\"")));
        self.perform("select", "Select value of", Some(value), |element| {
            let option_by = option_by.clone();
            async move { element.find_child(&option_by).await?.click().await }
        })
        .await
    }

    pub async fn hover(&self) -> Result<()> {
        let driver = self.scope.driver.clone();
        self.perform("hover", "Hover over", None, |element| {
            let driver = driver.clone();
            async move {
                driver
                    .execute_script(scripts::HOVER_SCRIPT, vec![element.element_ref()])
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    pub async fn scroll_into_view(&self) -> Result<()> {
        let driver = self.scope.driver.clone();
        self.execute(|element| {
            let driver = driver.clone();
            async move {
                driver
                    .execute_script(scripts::SCROLL_INTO_VIEW_SCRIPT, vec![element.element_ref()])
                    .await
                    .map(|_| ())
            }
        })
        .await
    }

    /// Drag this element onto `target`; both re-resolve on retry
    pub async fn drag_to(&self, target: &Element) -> Result<()> {
        let driver = self.scope.driver.clone();
        self.perform("drag", "Drag", Some(target.description()), |source| {
            let driver = driver.clone();
            async move {
                let destination = match target.handle().await {
                    Ok(destination) => destination,
                    Err(e) => {
                        target.discard();
                        return Err(e);
                    }
                };
                let result = driver
                    .execute_script(
                        scripts::DRAG_AND_DROP_SCRIPT,
                        vec![source.element_ref(), destination.element_ref()],
                    )
                    .await;
                if result.is_err() {
                    target.discard();
                }
                result.map(|_| ())
            }
        })
        .await
    }

    pub async fn text(&self) -> Result<String> {
        self.execute(|element| async move { element.text().await }).await
    }

    pub async fn text_once(&self) -> Result<String> {
        self.execute_once(|element| async move { element.text().await })
            .await
    }

    pub async fn attribute(&self, name: &str) -> Result<Option<String>> {
        self.execute(|element| async move { element.attribute(name).await })
            .await
    }

    pub async fn attribute_once(&self, name: &str) -> Result<Option<String>> {
        self.execute_once(|element| async move { element.attribute(name).await })
            .await
    }

    /// Current `value` attribute, empty when unset
    pub async fn value(&self) -> Result<String> {
        Ok(self.attribute("value").await?.unwrap_or_default())
    }

    pub async fn is_enabled(&self) -> Result<bool> {
        self.execute(|element| async move { element.is_enabled().await })
            .await
    }

    /// Single probe; any failure reads as not displayed
    pub async fn is_displayed(&self) -> bool {
        self.execute_once(|element| async move { element.is_displayed().await })
            .await
            .unwrap_or(false)
    }

    /// Whether any candidate locator currently resolves
    pub async fn is_present(&self) -> bool {
        self.discard();
        self.handle().await.is_ok()
    }

    /// Probe the held handle for staleness without re-resolving
    pub async fn is_stale(&self) -> bool {
        let Some(element) = self.held_handle() else {
            return false;
        };

        match element.is_enabled().await {
            Err(e) if e.is_stale() => {
                self.discard();
                true
            }
            _ => false,
        }
    }

    /// Wait until the field resolves to a displayed element
    pub async fn wait_for_visible(&self, timeout: Duration) -> Result<()> {
        let wait = Wait::new(self.scope.driver.clone(), timeout, Duration::from_millis(100));
        let description = format!("'{}' visible", self.description());
        wait.until(&description, || async move {
            self.discard();
            let element = self.handle().await?;
            Ok(element.is_displayed().await?.then_some(()))
        })
        .await
    }
}
