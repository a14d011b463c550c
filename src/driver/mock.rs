//! Mock driver implementation for testing
//!
//! A scriptable in-memory DOM: tests register elements per locator, toggle
//! visibility and staleness, inject failures, and inspect call counters.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::traits::*;
use crate::Error;

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock element
#[derive(Debug)]
pub struct MockWebElement {
    id: String,
    text: Mutex<String>,
    value: Mutex<String>,
    attributes: Mutex<HashMap<String, String>>,
    displayed: AtomicBool,
    enabled: AtomicBool,
    stale: AtomicBool,
    failures_left: AtomicU32,
    clicks: AtomicUsize,
    children: Mutex<HashMap<By, Vec<Arc<MockWebElement>>>>,
}

impl MockWebElement {
    /// Visible, enabled element with the given text
    pub fn new(text: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::build(text.into()))
    }

    fn build(text: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text: Mutex::new(text),
            value: Mutex::new(String::new()),
            attributes: Mutex::new(HashMap::new()),
            displayed: AtomicBool::new(true),
            enabled: AtomicBool::new(true),
            stale: AtomicBool::new(false),
            failures_left: AtomicU32::new(0),
            clicks: AtomicUsize::new(0),
            children: Mutex::new(HashMap::new()),
        }
    }

    /// Element present in the DOM but not rendered
    pub fn hidden(text: impl Into<String>) -> Arc<Self> {
        let element = Self::build(text.into());
        element.displayed.store(false, Ordering::SeqCst);
        Arc::new(element)
    }

    pub fn set_displayed(&self, displayed: bool) {
        self.displayed.store(displayed, Ordering::SeqCst);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn set_text(&self, text: impl Into<String>) {
        *lock(&self.text) = text.into();
    }

    pub fn set_attribute(&self, name: impl Into<String>, value: impl Into<String>) {
        lock(&self.attributes).insert(name.into(), value.into());
    }

    /// Invalidate this handle permanently
    pub fn make_stale(&self) {
        self.stale.store(true, Ordering::SeqCst);
    }

    /// Fail the next `n` interactions with a stale-reference error
    pub fn fail_times(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn add_child(&self, by: By, child: Arc<MockWebElement>) {
        lock(&self.children).entry(by).or_default().push(child);
    }

    pub fn click_count(&self) -> usize {
        self.clicks.load(Ordering::SeqCst)
    }

    /// Text typed into the element since the last clear
    pub fn typed_value(&self) -> String {
        lock(&self.value).clone()
    }

    fn check(&self) -> Result<(), Error> {
        if self.stale.load(Ordering::SeqCst) {
            return Err(Error::stale(format!("element {} is no longer attached", self.id)));
        }
        let consumed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed {
            return Err(Error::stale(format!("element {} was replaced", self.id)));
        }
        Ok(())
    }
}

#[async_trait]
impl WebElement for MockWebElement {
    fn id(&self) -> &str {
        &self.id
    }

    async fn click(&self) -> Result<(), Error> {
        self.check()?;
        self.clicks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn clear(&self) -> Result<(), Error> {
        self.check()?;
        lock(&self.value).clear();
        Ok(())
    }

    async fn send_keys(&self, text: &str) -> Result<(), Error> {
        self.check()?;
        lock(&self.value).push_str(text);
        Ok(())
    }

    async fn text(&self) -> Result<String, Error> {
        self.check()?;
        Ok(lock(&self.text).clone())
    }

    async fn attribute(&self, name: &str) -> Result<Option<String>, Error> {
        self.check()?;
        if name == "value" {
            let value = lock(&self.value).clone();
            if !value.is_empty() {
                return Ok(Some(value));
            }
        }
        Ok(lock(&self.attributes).get(name).cloned())
    }

    async fn is_displayed(&self) -> Result<bool, Error> {
        self.check()?;
        Ok(self.displayed.load(Ordering::SeqCst))
    }

    async fn is_enabled(&self) -> Result<bool, Error> {
        self.check()?;
        Ok(self.enabled.load(Ordering::SeqCst))
    }

    async fn find_child(&self, by: &By) -> Result<Arc<dyn WebElement>, Error> {
        self.check()?;
        lock(&self.children)
            .get(by)
            .and_then(|list| list.first().cloned())
            .map(|e| e as Arc<dyn WebElement>)
            .ok_or_else(|| Error::not_found(by.to_string()))
    }

    async fn find_children(&self, by: &By) -> Result<Vec<Arc<dyn WebElement>>, Error> {
        self.check()?;
        Ok(lock(&self.children)
            .get(by)
            .map(|list| list.iter().map(|e| e.clone() as Arc<dyn WebElement>).collect())
            .unwrap_or_default())
    }
}

/// In-memory DOM shared by one or more mock drivers
#[derive(Debug, Default)]
pub struct MockDom {
    elements: Mutex<HashMap<By, Vec<Arc<MockWebElement>>>>,
    find_calls: Mutex<HashMap<By, usize>>,
    scripts: Mutex<Vec<(String, VecDeque<Value>)>>,
    executed: Mutex<Vec<String>>,
}

impl MockDom {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register an element matched by `by`; repeated calls build a list
    pub fn add(&self, by: By, element: Arc<MockWebElement>) {
        lock(&self.elements).entry(by).or_default().push(element);
    }

    /// Drop every element matched by `by`
    pub fn remove(&self, by: &By) {
        lock(&self.elements).remove(by);
    }

    /// Number of find calls (single or list) issued for `by`
    pub fn find_count(&self, by: &By) -> usize {
        lock(&self.find_calls).get(by).copied().unwrap_or(0)
    }

    pub fn reset_find_counts(&self) {
        lock(&self.find_calls).clear();
    }

    /// Answer scripts containing `needle` with `values` in order; the last value repeats
    pub fn script_results(&self, needle: impl Into<String>, values: Vec<Value>) {
        lock(&self.scripts).push((needle.into(), values.into()));
    }

    /// Scripts executed so far
    pub fn executed_scripts(&self) -> Vec<String> {
        lock(&self.executed).clone()
    }

    fn lookup(&self, by: &By) -> Vec<Arc<MockWebElement>> {
        *lock(&self.find_calls).entry(by.clone()).or_insert(0) += 1;
        lock(&self.elements).get(by).cloned().unwrap_or_default()
    }

    fn run_script(&self, script: &str) -> Value {
        lock(&self.executed).push(script.to_string());
        let mut scripts = lock(&self.scripts);
        for (needle, values) in scripts.iter_mut() {
            if script.contains(needle.as_str()) {
                return if values.len() > 1 {
                    values.pop_front().unwrap_or(Value::Null)
                } else {
                    values.front().cloned().unwrap_or(Value::Null)
                };
            }
        }
        Value::Null
    }
}

/// Mock browser session
#[derive(Debug)]
pub struct MockWebDriver {
    session_id: String,
    browser: BrowserType,
    headless: bool,
    dom: Arc<MockDom>,
    alive: AtomicBool,
    quit_calls: AtomicUsize,
    fail_navigation: AtomicBool,
    fail_configuration: AtomicBool,
    cookies_cleared: AtomicUsize,
    maximized: AtomicBool,
    url: Mutex<String>,
    title: Mutex<String>,
    timeouts: Mutex<Option<Timeouts>>,
}

impl MockWebDriver {
    pub fn new(dom: Arc<MockDom>) -> Arc<Self> {
        Self::with_browser(dom, BrowserType::Chrome, true)
    }

    pub fn with_browser(dom: Arc<MockDom>, browser: BrowserType, headless: bool) -> Arc<Self> {
        Arc::new(Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            browser,
            headless,
            dom,
            alive: AtomicBool::new(true),
            quit_calls: AtomicUsize::new(0),
            fail_navigation: AtomicBool::new(false),
            fail_configuration: AtomicBool::new(false),
            cookies_cleared: AtomicUsize::new(0),
            maximized: AtomicBool::new(false),
            url: Mutex::new("about:blank".to_string()),
            title: Mutex::new(String::new()),
            timeouts: Mutex::new(None),
        })
    }

    pub fn dom(&self) -> &Arc<MockDom> {
        &self.dom
    }

    pub fn browser(&self) -> BrowserType {
        self.browser
    }

    pub fn is_headless(&self) -> bool {
        self.headless
    }

    /// Simulate a crashed or disconnected browser
    pub fn kill(&self) {
        self.alive.store(false, Ordering::SeqCst);
    }

    pub fn quit_count(&self) -> usize {
        self.quit_calls.load(Ordering::SeqCst)
    }

    pub fn set_fail_navigation(&self, fail: bool) {
        self.fail_navigation.store(fail, Ordering::SeqCst);
    }

    /// Make timeout and window configuration calls fail
    pub fn set_fail_configuration(&self, fail: bool) {
        self.fail_configuration.store(fail, Ordering::SeqCst);
    }

    pub fn set_title(&self, title: impl Into<String>) {
        *lock(&self.title) = title.into();
    }

    pub fn cookies_cleared(&self) -> usize {
        self.cookies_cleared.load(Ordering::SeqCst)
    }

    pub fn is_maximized(&self) -> bool {
        self.maximized.load(Ordering::SeqCst)
    }

    pub fn applied_timeouts(&self) -> Option<Timeouts> {
        *lock(&self.timeouts)
    }

    pub fn url(&self) -> String {
        lock(&self.url).clone()
    }

    fn check_configurable(&self) -> Result<(), Error> {
        self.check()?;
        if self.fail_configuration.load(Ordering::SeqCst) {
            return Err(Error::webdriver("unknown error", "window manager refused"));
        }
        Ok(())
    }

    fn check(&self) -> Result<(), Error> {
        if self.alive.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(Error::session_invalid(format!("session {} is gone", self.session_id)))
        }
    }
}

#[async_trait]
impl WebDriver for MockWebDriver {
    fn session_id(&self) -> &str {
        &self.session_id
    }

    async fn navigate(&self, url: &str) -> Result<(), Error> {
        self.check()?;
        if self.fail_navigation.load(Ordering::SeqCst) {
            return Err(Error::webdriver("unknown error", "navigation refused"));
        }
        *lock(&self.url) = url.to_string();
        Ok(())
    }

    async fn current_url(&self) -> Result<String, Error> {
        self.check()?;
        Ok(self.url())
    }

    async fn title(&self) -> Result<String, Error> {
        self.check()?;
        Ok(lock(&self.title).clone())
    }

    async fn find_element(&self, by: &By) -> Result<Arc<dyn WebElement>, Error> {
        self.check()?;
        self.dom
            .lookup(by)
            .first()
            .cloned()
            .map(|e| e as Arc<dyn WebElement>)
            .ok_or_else(|| Error::not_found(by.to_string()))
    }

    async fn find_elements(&self, by: &By) -> Result<Vec<Arc<dyn WebElement>>, Error> {
        self.check()?;
        Ok(self
            .dom
            .lookup(by)
            .into_iter()
            .map(|e| e as Arc<dyn WebElement>)
            .collect())
    }

    async fn execute_script(&self, script: &str, _args: Vec<Value>) -> Result<Value, Error> {
        self.check()?;
        Ok(self.dom.run_script(script))
    }

    async fn set_timeouts(&self, timeouts: Timeouts) -> Result<(), Error> {
        self.check_configurable()?;
        *lock(&self.timeouts) = Some(timeouts);
        Ok(())
    }

    async fn maximize_window(&self) -> Result<(), Error> {
        self.check_configurable()?;
        self.maximized.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn delete_all_cookies(&self) -> Result<(), Error> {
        self.check()?;
        self.cookies_cleared.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn screenshot(&self) -> Result<Vec<u8>, Error> {
        self.check()?;
        // PNG signature is enough for callers that only forward the bytes
        Ok(vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A])
    }

    async fn quit(&self) -> Result<(), Error> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        self.check()?;
        self.alive.store(false, Ordering::SeqCst);
        Ok(())
    }
}

/// Mock session factory
#[derive(Debug, Default)]
pub struct MockDriverFactory {
    dom: Option<Arc<MockDom>>,
    failures_left: AtomicUsize,
    configuration_failures_left: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    created: Mutex<Vec<Arc<MockWebDriver>>>,
}

impl MockDriverFactory {
    /// Each session gets its own empty DOM
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Every session shares `dom`
    pub fn with_dom(dom: Arc<MockDom>) -> Arc<Self> {
        Arc::new(Self {
            dom: Some(dom),
            ..Self::default()
        })
    }

    /// Fail the next `n` session constructions
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Hand out `n` sessions whose configuration calls fail
    pub fn fail_configuration_next(&self, n: usize) {
        self.configuration_failures_left.store(n, Ordering::SeqCst);
    }

    /// Sleep this long inside each construction
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    pub fn created(&self) -> Vec<Arc<MockWebDriver>> {
        lock(&self.created).clone()
    }

    pub fn created_count(&self) -> usize {
        lock(&self.created).len()
    }
}

#[async_trait]
impl DriverFactory for MockDriverFactory {
    async fn create(
        &self,
        browser: BrowserType,
        headless: bool,
        _capabilities: &Capabilities,
    ) -> Result<Arc<dyn WebDriver>, Error> {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(Error::session_creation("driver executable not found"));
        }

        let dom = self.dom.clone().unwrap_or_else(MockDom::new);
        let driver = MockWebDriver::with_browser(dom, browser, headless);
        let misconfigured = self
            .configuration_failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        driver.set_fail_configuration(misconfigured);
        lock(&self.created).push(driver.clone());
        Ok(driver)
    }
}
