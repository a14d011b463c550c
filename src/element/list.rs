//! Lists of matching elements

use std::time::Instant;
use tracing::debug;

use super::wrapper::{Element, ElementScope};
use crate::locator::{indexed_locator, LocatorSpec, ResolvedList};
use crate::{Error, Result};

/// All matches of one logical field
///
/// Items are handed out as [`Element`]s bound to an indexed sub-locator of
/// the winning candidate, so each item re-resolves on its own.
#[derive(Debug, Clone)]
pub struct ElementList {
    scope: ElementScope,
    spec: LocatorSpec,
}

impl ElementList {
    pub fn new(scope: ElementScope, spec: LocatorSpec) -> Self {
        Self { scope, spec }
    }

    pub fn spec(&self) -> &LocatorSpec {
        &self.spec
    }

    pub async fn resolve(&self) -> Result<ResolvedList> {
        self.scope
            .locator
            .resolve_list(self.scope.driver.as_ref(), &self.spec)
            .await
    }

    pub async fn len(&self) -> Result<usize> {
        Ok(self.resolve().await?.elements.len())
    }

    pub async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }

    /// Text of every match, re-listing when an item goes stale mid-read
    pub async fn texts(&self) -> Result<Vec<String>> {
        let start = Instant::now();
        let attempts = self.scope.policy.max_retries.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            match self.read_texts().await {
                Ok(texts) => return Ok(texts),
                Err(e) => {
                    debug!(
                        "Listing '{}' attempt {}/{} failed: {}",
                        self.spec.description(),
                        attempt,
                        attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        tokio::time::sleep(self.scope.policy.retry_delay).await;
                    }
                }
            }
        }

        Err(Error::ActionFailed {
            target: self.spec.description().to_string(),
            attempts,
            elapsed_secs: start.elapsed().as_secs_f64(),
            cause: Box::new(last_error.unwrap_or_else(|| Error::internal("no attempt was made"))),
        })
    }

    async fn read_texts(&self) -> Result<Vec<String>> {
        let resolved = self.resolve().await?;
        let mut texts = Vec::with_capacity(resolved.elements.len());
        for element in &resolved.elements {
            texts.push(element.text().await?);
        }
        Ok(texts)
    }

    /// Item at `position` (1-based)
    pub async fn get(&self, position: usize) -> Result<Element> {
        let resolved = self.resolve().await?;
        if position == 0 || position > resolved.elements.len() {
            return Err(Error::not_found(format!(
                "'{}' item {} of {}",
                self.spec.description(),
                position,
                resolved.elements.len()
            )));
        }
        Ok(self.item(&resolved, position))
    }

    /// Every item, in document order
    pub async fn elements(&self) -> Result<Vec<Element>> {
        let resolved = self.resolve().await?;
        Ok((1..=resolved.elements.len())
            .map(|position| self.item(&resolved, position))
            .collect())
    }

    fn item(&self, resolved: &ResolvedList, position: usize) -> Element {
        let spec = LocatorSpec::new(
            indexed_locator(&resolved.locator, position),
            format!("{} [{}]", self.spec.description(), position),
        );
        Element::new(self.scope.clone(), spec)
    }
}
