//! Locator resolution tests

use super::*;
use crate::driver::mock::{MockDom, MockWebDriver, MockWebElement};
use crate::driver::{By, WebElement};
use crate::Error;

fn login_spec() -> LocatorSpec {
    LocatorSpec::new(By::id("login"), "Login button")
        .with_alternative(By::css("button.login"))
        .with_alternative(By::xpath("//button[text()='Log in']"))
}

#[test]
fn test_indexed_xpath() {
    let by = indexed_locator(&By::xpath("//div[@class='row']"), 3);
    assert_eq!(by, By::xpath("(//div[@class='row'])[3]"));
}

#[test]
fn test_indexed_css_family() {
    assert_eq!(
        indexed_locator(&By::css("ul > li"), 2),
        By::css("ul > li:nth-of-type(2)")
    );
    assert_eq!(
        indexed_locator(&By::class_name("row"), 1),
        By::css(".row:nth-of-type(1)")
    );
    assert_eq!(
        indexed_locator(&By::tag_name("tr"), 4),
        By::css("tr:nth-of-type(4)")
    );
}

#[test]
fn test_indexed_css_selector_list_indexes_every_selector() {
    assert_eq!(
        indexed_locator(&By::css("li.a, li.b"), 2),
        By::css("li.a:nth-of-type(2), li.b:nth-of-type(2)")
    );
    // Commas inside attribute values and pseudo-class arguments do not split
    assert_eq!(
        indexed_locator(&By::css("a[title='x,y']"), 1),
        By::css("a[title='x,y']:nth-of-type(1)")
    );
    assert_eq!(
        indexed_locator(&By::css(":is(h1, h2) > span"), 3),
        By::css(":is(h1, h2) > span:nth-of-type(3)")
    );
}

#[test]
fn test_indexed_link_text_becomes_xpath() {
    assert_eq!(
        indexed_locator(&By::link_text("Next"), 2),
        By::xpath("(//a[normalize-space(.)='Next'])[2]")
    );
}

#[test]
fn test_xpath_literal_quoting() {
    assert_eq!(xpath_literal("plain"), "'plain'");
    assert_eq!(xpath_literal("it's"), "\"it's\"");
    assert_eq!(
        xpath_literal("it's \"x\""),
        "concat('it', \"'\", 's \"x\"')"
    );
}

#[test]
fn test_indexed_locator_spec_carries_alternatives() {
    let spec = LocatorSpec::new(By::xpath("//tr"), "Rows").with_alternative(By::css("tr"));
    let third = spec.indexed(3);

    assert_eq!(third.primary(), &By::xpath("(//tr)[3]"));
    assert_eq!(third.alternatives(), &[By::css("tr:nth-of-type(3)")]);
    assert_eq!(third.description(), "Rows [3]");
}

#[tokio::test]
async fn test_primary_wins_when_present() {
    let dom = MockDom::new();
    let button = MockWebElement::new("Log in");
    dom.add(By::id("login"), button.clone());
    let driver = MockWebDriver::new(dom.clone());
    let locator = SelfHealingLocator::default();

    let element = locator.resolve_one(&*driver, &login_spec()).await.unwrap();
    assert_eq!(element.id(), button.id());
    assert_eq!(locator.cache().get("By.id: login"), Some(By::id("login")));
}

#[tokio::test]
async fn test_fallback_skips_hidden_alternative() {
    let dom = MockDom::new();
    let hidden = MockWebElement::hidden("Log in");
    let visible = MockWebElement::new("Log in");
    dom.add(By::css("button.login"), hidden);
    dom.add(By::xpath("//button[text()='Log in']"), visible.clone());
    let driver = MockWebDriver::new(dom);
    let locator = SelfHealingLocator::default();

    let element = locator.resolve_one(&*driver, &login_spec()).await.unwrap();
    assert_eq!(element.id(), visible.id());
}

#[tokio::test]
async fn test_cache_short_circuits_until_failure() {
    let dom = MockDom::new();
    let alt2 = By::xpath("//button[text()='Log in']");
    let visible = MockWebElement::new("Log in");
    dom.add(alt2.clone(), visible.clone());
    let driver = MockWebDriver::new(dom.clone());
    let locator = SelfHealingLocator::default();
    let spec = login_spec();

    locator.resolve_one(&*driver, &spec).await.unwrap();
    assert_eq!(dom.find_count(spec.primary()), 1);
    assert_eq!(locator.cache().get(&spec.identity()), Some(alt2.clone()));

    // Second resolution goes straight to the cached alternative
    locator.resolve_one(&*driver, &spec).await.unwrap();
    assert_eq!(dom.find_count(spec.primary()), 1);
    assert_eq!(dom.find_count(&By::css("button.login")), 1);
    assert_eq!(dom.find_count(&alt2), 2);

    // Cached locator breaks: evict and run the full chain again
    dom.remove(&alt2);
    let result = locator.resolve_one(&*driver, &spec).await;
    assert!(matches!(result, Err(Error::NotFound(_))));
    assert_eq!(dom.find_count(spec.primary()), 2);
    assert!(locator.cache().is_empty());
}

#[tokio::test]
async fn test_cache_size_tracks_fields_not_calls() {
    let dom = MockDom::new();
    dom.add(By::id("login"), MockWebElement::new("a"));
    dom.add(By::id("user"), MockWebElement::new("b"));
    let driver = MockWebDriver::new(dom);
    let locator = SelfHealingLocator::default();
    let user = LocatorSpec::new(By::id("user"), "Username");

    for _ in 0..10 {
        locator.resolve_one(&*driver, &login_spec()).await.unwrap();
        locator.resolve_one(&*driver, &user).await.unwrap();
    }

    assert_eq!(locator.cache().len(), 2);
}

#[tokio::test]
async fn test_not_found_names_field() {
    let driver = MockWebDriver::new(MockDom::new());
    let locator = SelfHealingLocator::default();

    match locator.resolve_one(&*driver, &login_spec()).await {
        Err(Error::NotFound(message)) => {
            assert!(message.contains("Login button"));
            assert!(message.contains("3 locator(s)"));
        }
        other => panic!("expected NotFound, got {:?}", other.map(|e| e.id().to_string())),
    }
}

#[tokio::test]
async fn test_resolve_list_prefers_non_empty_primary() {
    let dom = MockDom::new();
    for text in ["a", "b"] {
        dom.add(By::css("li.item"), MockWebElement::new(text));
    }
    dom.add(By::css("li"), MockWebElement::new("other"));
    let driver = MockWebDriver::new(dom);
    let spec = LocatorSpec::new(By::css("li.item"), "Items").with_alternative(By::css("li"));

    let resolved = SelfHealingLocator::default()
        .resolve_list(&*driver, &spec)
        .await
        .unwrap();
    assert_eq!(resolved.locator, By::css("li.item"));
    assert_eq!(resolved.elements.len(), 2);
}

#[tokio::test]
async fn test_resolve_list_falls_back_and_accepts_hidden() {
    let dom = MockDom::new();
    dom.add(By::css("li"), MockWebElement::hidden("x"));
    let driver = MockWebDriver::new(dom);
    let spec = LocatorSpec::new(By::css("li.item"), "Items").with_alternative(By::css("li"));
    let locator = SelfHealingLocator::default();

    let resolved = locator.resolve_list(&*driver, &spec).await.unwrap();
    assert_eq!(resolved.locator, By::css("li"));
    assert_eq!(resolved.elements.len(), 1);
    assert!(locator.cache().is_empty());
}

#[tokio::test]
async fn test_resolve_list_empty_is_not_an_error() {
    let driver = MockWebDriver::new(MockDom::new());
    let spec = LocatorSpec::from(By::css("li"));

    let resolved = SelfHealingLocator::default()
        .resolve_list(&*driver, &spec)
        .await
        .unwrap();
    assert!(resolved.elements.is_empty());
}

#[tokio::test]
async fn test_shared_cache_across_tasks() {
    let dom = MockDom::new();
    dom.add(By::css("button.login"), MockWebElement::new("Log in"));
    let cache = LocatorCache::new();
    let mut handles = Vec::new();

    for _ in 0..8 {
        let locator = SelfHealingLocator::new(cache.clone());
        let driver = MockWebDriver::new(dom.clone());
        handles.push(tokio::spawn(async move {
            locator.resolve_one(&*driver, &login_spec()).await.map(|_| ())
        }));
    }

    for result in futures_util::future::join_all(handles).await {
        result.unwrap().unwrap();
    }
    assert_eq!(cache.len(), 1);
    assert_eq!(cache.get("By.id: login"), Some(By::css("button.login")));
}

#[tokio::test]
async fn test_resolve_one_propagates_dead_session() {
    let dom = MockDom::new();
    dom.add(By::css("button.login"), MockWebElement::new("Log in"));
    let driver = MockWebDriver::new(dom);
    driver.kill();

    let result = SelfHealingLocator::default()
        .resolve_one(&*driver, &login_spec())
        .await;
    assert!(matches!(result, Err(Error::SessionInvalid(_))));
}
