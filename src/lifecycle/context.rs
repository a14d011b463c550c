//! Run-wide context
//!
//! Owns the driver manager, the browser pool and the shared locator cache
//! for one test run, and guarantees teardown when the run ends.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde::Serialize;
use tracing::{info, warn};

use super::manager::DriverManager;
use super::pool::{BrowserPool, PoolStats};
use super::worker::WorkerId;
use crate::config::Config;
use crate::driver::{Capabilities, DriverFactory, WebDriver};
use crate::element::ElementScope;
use crate::locator::{LocatorCache, SelfHealingLocator};
use crate::report::{StepReporter, TracingReporter};
use crate::Result;

/// What `shutdown` cleaned up
#[derive(Debug, Clone, Default, Serialize)]
pub struct ShutdownSummary {
    pub drivers_quit: usize,
    pub pool: PoolStats,
}

pub struct RunContext {
    config: Config,
    capabilities: Capabilities,
    drivers: DriverManager,
    pool: BrowserPool,
    cache: LocatorCache,
    reporter: Arc<dyn StepReporter>,
}

impl RunContext {
    pub fn new(config: Config, factory: Arc<dyn DriverFactory>) -> Self {
        Self {
            drivers: DriverManager::from_config(factory.clone(), &config),
            pool: BrowserPool::from_config(factory, &config),
            capabilities: Capabilities::default(),
            cache: LocatorCache::default(),
            reporter: Arc::new(TracingReporter),
            config,
        }
    }

    pub fn with_reporter(mut self, reporter: Arc<dyn StepReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Extra capabilities for drivers created through [`Self::with_driver`]
    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn drivers(&self) -> &DriverManager {
        &self.drivers
    }

    pub fn pool(&self) -> &BrowserPool {
        &self.pool
    }

    pub fn locator_cache(&self) -> &LocatorCache {
        &self.cache
    }

    pub fn reporter(&self) -> &Arc<dyn StepReporter> {
        &self.reporter
    }

    /// Element scope over `driver` sharing this run's locator cache
    pub fn element_scope(&self, driver: Arc<dyn WebDriver>) -> ElementScope {
        ElementScope::new(
            driver,
            SelfHealingLocator::new(self.cache.clone()),
            self.reporter.clone(),
            self.config.retry_policy(),
        )
        .with_highlight(self.config.highlight_on_action)
    }

    /// Run `body` and shut everything down afterwards
    ///
    /// Teardown runs whether `body` returns an error or panics; a panic is
    /// resumed once every browser is closed.
    pub async fn scope<T, F, Fut>(self, body: F) -> Result<T>
    where
        F: FnOnce(Arc<RunContext>) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let ctx = Arc::new(self);
        let outcome = AssertUnwindSafe(body(ctx.clone())).catch_unwind().await;
        ctx.shutdown().await;
        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// One test on a dedicated driver
    ///
    /// Creates the worker's driver, runs `body`, reports the outcome and
    /// quits the driver, including when `body` fails or panics.
    pub async fn with_driver<T, F, Fut>(&self, worker: &WorkerId, body: F) -> Result<T>
    where
        F: FnOnce(ElementScope) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let driver = self
            .drivers
            .create_driver(
                worker,
                self.config.browser,
                self.config.headless,
                &self.capabilities,
            )
            .await?;

        let outcome = AssertUnwindSafe(body(self.element_scope(driver)))
            .catch_unwind()
            .await;

        match &outcome {
            Ok(Ok(_)) => self.reporter.pass(&format!("Test on {} passed", worker)),
            Ok(Err(e)) => self.reporter.fail(&format!("Test on {} failed: {}", worker, e)),
            Err(_) => self.reporter.fail(&format!("Test on {} panicked", worker)),
        }

        self.drivers.quit_driver(worker).await;

        match outcome {
            Ok(result) => result,
            Err(panic) => std::panic::resume_unwind(panic),
        }
    }

    /// Quit every driver and close the pool; safe to call more than once
    pub async fn shutdown(&self) -> ShutdownSummary {
        let drivers_quit = self.drivers.quit_all_drivers().await;
        let pool = self.pool.close_all_browsers().await;
        info!(
            "Run shut down: {} driver(s) quit, {} pooled browser(s) created",
            drivers_quit, pool.total_created
        );
        ShutdownSummary { drivers_quit, pool }
    }
}

impl Drop for RunContext {
    fn drop(&mut self) {
        let active = self.drivers.active_driver_count();
        if active > 0 {
            warn!("Run context dropped with {} active driver(s) never quit", active);
        }
    }
}

impl std::fmt::Debug for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunContext")
            .field("browser", &self.config.browser)
            .field("drivers", &self.drivers)
            .field("pool", &self.pool)
            .field("cached_locators", &self.cache.len())
            .finish()
    }
}
