//! Self-healing element resolution
//!
//! Resolution is single-shot: every candidate is tried once, in order. Retry
//! belongs to the element wrapper.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, instrument, warn};

use super::spec::LocatorSpec;
use crate::driver::{By, WebDriver, WebElement};
use crate::{Error, Result};

/// Most recently successful locator per logical field
///
/// Shared across workers. Grows with the number of distinct fields, never
/// with usage; entries leave only when they fail.
#[derive(Debug, Clone, Default)]
pub struct LocatorCache {
    entries: Arc<RwLock<HashMap<String, By>>>,
}

impl LocatorCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, identity: &str) -> Option<By> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(identity)
            .cloned()
    }

    pub fn insert(&self, identity: String, by: By) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(identity, by);
    }

    pub fn remove(&self, identity: &str) -> Option<By> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(identity)
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .map(|e| e.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

/// Winning locator and its matches
#[derive(Debug, Clone)]
pub struct ResolvedList {
    pub locator: By,
    pub elements: Vec<Arc<dyn WebElement>>,
}

/// Resolves a [`LocatorSpec`] against the live DOM, falling back to alternatives
#[derive(Debug, Clone, Default)]
pub struct SelfHealingLocator {
    cache: LocatorCache,
}

impl SelfHealingLocator {
    pub fn new(cache: LocatorCache) -> Self {
        Self { cache }
    }

    pub fn cache(&self) -> &LocatorCache {
        &self.cache
    }

    /// Resolve one element
    ///
    /// The primary only has to be present. Alternatives must be present and
    /// displayed, so a hidden match never shadows a visible one further down
    /// the list. The cached winner is checked by the rule it won under.
    #[instrument(skip(self, driver, spec), fields(field = %spec.description()))]
    pub async fn resolve_one(
        &self,
        driver: &dyn WebDriver,
        spec: &LocatorSpec,
    ) -> Result<Arc<dyn WebElement>> {
        let identity = spec.identity();

        if let Some(cached) = self.cache.get(&identity) {
            let needs_visibility = &cached != spec.primary();
            match try_locator(driver, &cached, needs_visibility).await? {
                Some(element) => {
                    debug!("Resolved {} from cache via {}", identity, cached);
                    return Ok(element);
                }
                None => {
                    debug!("Cached locator {} failed, evicting", cached);
                    self.cache.remove(&identity);
                }
            }
        }

        if let Some(element) = try_locator(driver, spec.primary(), false).await? {
            self.cache.insert(identity, spec.primary().clone());
            return Ok(element);
        }

        for (rank, alternative) in spec.alternatives().iter().enumerate() {
            if let Some(element) = try_locator(driver, alternative, true).await? {
                warn!(
                    "Self-healed '{}': primary {} failed, using alternative #{} {}",
                    spec.description(),
                    spec.primary(),
                    rank + 1,
                    alternative
                );
                self.cache.insert(identity, alternative.clone());
                return Ok(element);
            }
        }

        Err(Error::not_found(format!(
            "'{}' ({}) after trying {} locator(s)",
            spec.description(),
            identity,
            spec.alternatives().len() + 1
        )))
    }

    /// Resolve every match of the first candidate with a non-empty result
    ///
    /// Presence suffices and nothing is cached. No match at all yields an
    /// empty list under the primary locator.
    #[instrument(skip(self, driver, spec), fields(field = %spec.description()))]
    pub async fn resolve_list(&self, driver: &dyn WebDriver, spec: &LocatorSpec) -> Result<ResolvedList> {
        for by in spec.candidates() {
            match driver.find_elements(by).await {
                Ok(elements) if !elements.is_empty() => {
                    debug!("{} matched {} element(s)", by, elements.len());
                    return Ok(ResolvedList {
                        locator: by.clone(),
                        elements,
                    });
                }
                Ok(_) => {}
                Err(Error::SessionInvalid(message)) => return Err(Error::SessionInvalid(message)),
                Err(e) => debug!("{} failed: {}", by, e),
            }
        }

        Ok(ResolvedList {
            locator: spec.primary().clone(),
            elements: Vec::new(),
        })
    }
}

/// One candidate; a dead session ends the whole resolution
async fn try_locator(
    driver: &dyn WebDriver,
    by: &By,
    needs_visibility: bool,
) -> Result<Option<Arc<dyn WebElement>>> {
    let element = match driver.find_element(by).await {
        Ok(element) => element,
        Err(Error::SessionInvalid(message)) => return Err(Error::SessionInvalid(message)),
        Err(e) => {
            debug!("{} failed: {}", by, e);
            return Ok(None);
        }
    };

    if !needs_visibility {
        return Ok(Some(element));
    }

    match element.is_displayed().await {
        Ok(true) => Ok(Some(element)),
        Ok(false) => {
            debug!("{} matched a hidden element", by);
            Ok(None)
        }
        Err(Error::SessionInvalid(message)) => Err(Error::SessionInvalid(message)),
        Err(e) => {
            debug!("{} visibility check failed: {}", by, e);
            Ok(None)
        }
    }
}
