//! Page object base
//!
//! Pages register their fields up front, by name, and hand out element
//! wrappers bound to the page's driver and shared locator cache.
//!
//! ```rust,no_run
//! use wd_harness::driver::By;
//! use wd_harness::locator::LocatorSpec;
//! use wd_harness::page::BasePage;
//! # use wd_harness::element::ElementScope;
//! # async fn example(scope: ElementScope, config: wd_harness::config::Config) -> wd_harness::Result<()> {
//! let mut login = BasePage::new("LoginPage", scope, &config);
//! login
//!     .register("username", LocatorSpec::new(By::id("user"), "Username field"))
//!     .register(
//!         "submit",
//!         LocatorSpec::new(By::id("login-btn"), "Login button")
//!             .with_alternative(By::css("button[type='submit']")),
//!     );
//! login.open("https://example.com/login").await?;
//! login.element("username")?.type_text("admin").await?;
//! login.element("submit")?.click().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::BTreeMap;

use tracing::{debug, instrument};

use crate::config::Config;
use crate::element::{Element, ElementList, ElementScope};
use crate::locator::LocatorSpec;
use crate::wait::Wait;
use crate::{Error, Result};

#[derive(Debug, Clone)]
pub struct BasePage {
    name: String,
    scope: ElementScope,
    wait: Wait,
    fields: BTreeMap<String, LocatorSpec>,
}

impl BasePage {
    pub fn new(name: impl Into<String>, scope: ElementScope, config: &Config) -> Self {
        let wait = Wait::from_config(scope.driver().clone(), config);
        Self {
            name: name.into(),
            scope,
            wait,
            fields: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a named field; re-registering a name replaces it
    pub fn register(&mut self, field: impl Into<String>, spec: LocatorSpec) -> &mut Self {
        let field = field.into();
        debug!("{}: registered '{}' as {}", self.name, field, spec.identity());
        self.fields.insert(field, spec);
        self
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn spec(&self, field: &str) -> Result<&LocatorSpec> {
        self.fields.get(field).ok_or_else(|| {
            Error::configuration(format!("page {} has no field '{}'", self.name, field))
        })
    }

    pub fn element(&self, field: &str) -> Result<Element> {
        Ok(self.scope.element(self.spec(field)?.clone()))
    }

    pub fn elements(&self, field: &str) -> Result<ElementList> {
        Ok(self.scope.list(self.spec(field)?.clone()))
    }

    pub fn scope(&self) -> &ElementScope {
        &self.scope
    }

    pub fn wait(&self) -> &Wait {
        &self.wait
    }

    /// Navigate to `url` and wait for the document to finish loading
    #[instrument(skip(self), fields(page = %self.name))]
    pub async fn open(&self, url: &str) -> Result<()> {
        self.scope.driver().navigate(url).await?;
        self.wait.for_page_load().await
    }

    pub async fn title(&self) -> Result<String> {
        self.scope.driver().title().await
    }

    pub async fn current_url(&self) -> Result<String> {
        self.scope.driver().current_url().await
    }

    /// Whether every registered field can be located right now
    pub async fn is_loaded(&self) -> bool {
        for spec in self.fields.values() {
            if !self.scope.element(spec.clone()).is_present().await {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::driver::mock::{MockDom, MockWebDriver, MockWebElement};
    use crate::driver::By;
    use crate::locator::SelfHealingLocator;
    use crate::report::RecordingReporter;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    fn login_page(dom: Arc<MockDom>) -> (BasePage, Arc<MockWebDriver>) {
        let driver = MockWebDriver::new(dom);
        let scope = ElementScope::new(
            driver.clone(),
            SelfHealingLocator::default(),
            Arc::new(RecordingReporter::new()),
            RetryPolicy {
                max_retries: 2,
                retry_delay: Duration::from_millis(1),
            },
        );
        let config = Config {
            explicit_wait_ms: 200,
            poll_interval_ms: 10,
            ..Config::default()
        };
        let mut page = BasePage::new("LoginPage", scope, &config);
        page.register("username", LocatorSpec::new(By::id("user"), "Username field"))
            .register(
                "submit",
                LocatorSpec::new(By::id("login-btn"), "Login button")
                    .with_alternative(By::css("button[type='submit']")),
            );
        (page, driver)
    }

    #[tokio::test]
    async fn test_registered_fields_resolve() {
        let dom = MockDom::new();
        let user = MockWebElement::new("");
        let submit = MockWebElement::new("Log in");
        dom.add(By::id("user"), user.clone());
        dom.add(By::css("button[type='submit']"), submit.clone());
        let (page, _driver) = login_page(dom);

        assert!(page.is_loaded().await);
        page.element("username").unwrap().type_text("admin").await.unwrap();
        page.element("submit").unwrap().click().await.unwrap();

        assert_eq!(user.typed_value(), "admin");
        assert_eq!(submit.click_count(), 1);
        assert_eq!(page.fields().collect::<Vec<_>>(), vec!["submit", "username"]);
    }

    #[tokio::test]
    async fn test_unknown_field_is_configuration_error() {
        let (page, _driver) = login_page(MockDom::new());
        assert!(matches!(page.element("password"), Err(Error::Configuration(_))));
        assert!(!page.is_loaded().await);
    }

    #[tokio::test]
    async fn test_open_waits_for_page_load() {
        let dom = MockDom::new();
        dom.script_results("readyState", vec![json!("loading"), json!("complete")]);
        let (page, driver) = login_page(dom.clone());
        driver.set_title("Sign in");

        page.open("https://example.com/login").await.unwrap();
        assert_eq!(page.current_url().await.unwrap(), "https://example.com/login");
        assert_eq!(page.title().await.unwrap(), "Sign in");
        assert!(dom.executed_scripts().len() >= 2);
    }
}
