//! Common test utilities
//!
//! Shared fixtures for the integration tests: a login page DOM and a run
//! configuration with short delays.

#![allow(dead_code)]

use std::sync::Arc;

use wd_harness::config::Config;
use wd_harness::driver::mock::{MockDom, MockWebElement};
use wd_harness::driver::By;
use wd_harness::element::ElementScope;
use wd_harness::locator::LocatorSpec;
use wd_harness::page::BasePage;

/// Configuration tuned for mock sessions
pub fn fast_config(max_browsers: usize, pool_size: usize) -> Config {
    Config {
        max_browsers_allowed: max_browsers,
        pool_size,
        max_retries: 3,
        retry_delay_ms: 2,
        explicit_wait_ms: 200,
        poll_interval_ms: 5,
        ..Config::default()
    }
}

/// Login page whose submit button lost its id in a redesign
pub struct LoginDom {
    pub dom: Arc<MockDom>,
    pub username: Arc<MockWebElement>,
    pub submit: Arc<MockWebElement>,
}

pub fn redesigned_login_dom() -> LoginDom {
    let dom = MockDom::new();
    let username = MockWebElement::new("");
    let submit = MockWebElement::new("Log in");
    dom.add(By::id("user"), username.clone());
    dom.add(By::css("button[type='submit']"), submit.clone());
    dom.script_results("readyState", vec![serde_json::json!("complete")]);
    LoginDom { dom, username, submit }
}

/// Login page object over `scope`
pub fn login_page(scope: ElementScope, config: &Config) -> BasePage {
    let mut page = BasePage::new("LoginPage", scope, config);
    page.register("username", LocatorSpec::new(By::id("user"), "Username field"))
        .register(
            "submit",
            LocatorSpec::new(By::id("login-btn"), "Login button")
                .with_alternative(By::name("login"))
                .with_alternative(By::css("button[type='submit']")),
        );
    page
}
