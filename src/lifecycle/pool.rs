//! Bounded browser pool
//!
//! Browsers are created lazily up to the pool capacity, checked out by one
//! worker at a time and reset on return. When every browser is checked out
//! and capacity is reached, `acquire_browser` waits for a return.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, instrument, warn};

use super::manager::SessionSettings;
use super::worker::WorkerId;
use crate::config::Config;
use crate::driver::{BrowserType, Capabilities, DriverFactory, WebDriver};
use crate::{Error, Result};

const BLANK_PAGE: &str = "about:blank";

/// One pooled browser
#[derive(Debug)]
struct PooledBrowser {
    id: String,
    driver: Arc<dyn WebDriver>,
    checkouts: u64,
    _permit: OwnedSemaphorePermit,
}

#[derive(Debug, Default)]
struct PoolState {
    idle: VecDeque<PooledBrowser>,
    in_use: HashMap<WorkerId, PooledBrowser>,
    closed: bool,
    total_created: u64,
    total_acquisitions: u64,
    per_worker: HashMap<WorkerId, u64>,
}

/// Pool usage snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub capacity: usize,
    pub total_created: u64,
    pub total_acquisitions: u64,
    pub idle: usize,
    pub in_use: usize,
    pub per_worker: HashMap<String, u64>,
}

pub struct BrowserPool {
    factory: Arc<dyn DriverFactory>,
    browser: BrowserType,
    headless: bool,
    capabilities: Capabilities,
    settings: SessionSettings,
    capacity: usize,
    /// One permit per browser that may still be created
    creation: Arc<Semaphore>,
    /// One permit per idle browser; waiters queue here in FIFO order
    idle_signal: Semaphore,
    state: Mutex<PoolState>,
}

impl BrowserPool {
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        capacity: usize,
        browser: BrowserType,
        headless: bool,
        settings: SessionSettings,
    ) -> Self {
        Self {
            factory,
            browser,
            headless,
            capabilities: Capabilities::default(),
            settings,
            capacity,
            creation: Arc::new(Semaphore::new(capacity)),
            idle_signal: Semaphore::new(0),
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn from_config(factory: Arc<dyn DriverFactory>, config: &Config) -> Self {
        Self::new(
            factory,
            config.pool_size,
            config.browser,
            config.headless,
            SessionSettings::from_config(config),
        )
    }

    pub fn with_capabilities(mut self, capabilities: Capabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    fn state(&self) -> MutexGuard<'_, PoolState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Check out a browser for `worker`
    ///
    /// Prefers an idle browser, then creates one while under capacity, and
    /// otherwise waits until a browser is returned or capacity frees up.
    /// Fails with [`Error::PoolClosed`] once the pool is shut down.
    #[instrument(skip(self))]
    pub async fn acquire_browser(&self, worker: &WorkerId) -> Result<Arc<dyn WebDriver>> {
        {
            let state = self.state();
            if state.closed {
                return Err(Error::PoolClosed);
            }
            if let Some(held) = state.in_use.get(worker) {
                warn!("Worker {} already holds pooled browser {}", worker, held.id);
                return Ok(held.driver.clone());
            }
        }

        if let Ok(ticket) = self.idle_signal.try_acquire() {
            ticket.forget();
            return self.check_out_idle(worker);
        }

        if let Ok(permit) = self.creation.clone().try_acquire_owned() {
            return self.create_for(worker, permit).await;
        }

        debug!("Pool exhausted; {} waiting for a browser", worker);
        tokio::select! {
            biased;
            ticket = self.idle_signal.acquire() => {
                ticket.map_err(|_| Error::PoolClosed)?.forget();
                self.check_out_idle(worker)
            }
            permit = self.creation.clone().acquire_owned() => {
                let permit = permit.map_err(|_| Error::PoolClosed)?;
                self.create_for(worker, permit).await
            }
        }
    }

    fn check_out_idle(&self, worker: &WorkerId) -> Result<Arc<dyn WebDriver>> {
        let mut state = self.state();
        let browser = state.idle.pop_front().ok_or(Error::PoolClosed)?;
        debug!("Reusing pooled browser {} for {}", browser.id, worker);
        Ok(self.check_out(&mut state, worker, browser))
    }

    async fn create_for(
        &self,
        worker: &WorkerId,
        permit: OwnedSemaphorePermit,
    ) -> Result<Arc<dyn WebDriver>> {
        let driver = self
            .factory
            .create(self.browser, self.headless, &self.capabilities)
            .await?;
        if let Err(e) = self.settings.apply(driver.as_ref()).await {
            let _ = driver.quit().await;
            return Err(Error::session_creation(format!("session configuration failed: {}", e)));
        }

        let browser = PooledBrowser {
            id: uuid::Uuid::new_v4().to_string(),
            driver,
            checkouts: 0,
            _permit: permit,
        };

        let accepted = {
            let mut state = self.state();
            if state.closed {
                Err(browser)
            } else {
                state.total_created += 1;
                info!(
                    "Created pooled browser {} ({}/{})",
                    browser.id, state.total_created, self.capacity
                );
                Ok(self.check_out(&mut state, worker, browser))
            }
        };

        match accepted {
            Ok(driver) => Ok(driver),
            Err(browser) => {
                let _ = browser.driver.quit().await;
                Err(Error::PoolClosed)
            }
        }
    }

    /// Hand `browser` to `worker` under the pool lock
    ///
    /// A concurrent checkout may already have given `worker` a browser; the
    /// spare one then goes back to the idle queue instead of replacing it.
    fn check_out(
        &self,
        state: &mut PoolState,
        worker: &WorkerId,
        mut browser: PooledBrowser,
    ) -> Arc<dyn WebDriver> {
        if let Some(held) = state.in_use.get(worker) {
            warn!(
                "Worker {} already holds pooled browser {}; returning {} to idle",
                worker, held.id, browser.id
            );
            let driver = held.driver.clone();
            state.idle.push_back(browser);
            self.idle_signal.add_permits(1);
            return driver;
        }

        browser.checkouts += 1;
        let driver = browser.driver.clone();
        state.total_acquisitions += 1;
        *state.per_worker.entry(worker.clone()).or_insert(0) += 1;
        state.in_use.insert(worker.clone(), browser);
        driver
    }

    /// Return the browser held by `worker`
    ///
    /// The browser is reset (cookies cleared, blank page) before it becomes
    /// idle again. A browser that fails to reset is closed and its capacity
    /// freed.
    #[instrument(skip(self))]
    pub async fn release_browser(&self, worker: &WorkerId) -> Result<()> {
        let (browser, closed) = {
            let mut state = self.state();
            (state.in_use.remove(worker), state.closed)
        };
        let Some(browser) = browser else {
            debug!("Worker {} holds no pooled browser", worker);
            return Ok(());
        };

        if closed {
            let _ = browser.driver.quit().await;
            return Ok(());
        }

        match Self::reset(browser.driver.as_ref()).await {
            Ok(()) => {
                debug!(
                    "Returned browser {} after {} checkout(s)",
                    browser.id, browser.checkouts
                );
                let requeued = {
                    let mut state = self.state();
                    if state.closed {
                        Err(browser)
                    } else {
                        state.idle.push_back(browser);
                        Ok(())
                    }
                };
                match requeued {
                    Ok(()) => self.idle_signal.add_permits(1),
                    Err(browser) => {
                        let _ = browser.driver.quit().await;
                    }
                }
                Ok(())
            }
            Err(e) => {
                warn!("Resetting browser {} failed, closing it: {}", browser.id, e);
                if let Err(quit_err) = browser.driver.quit().await {
                    debug!("Quit after failed reset also failed: {}", quit_err);
                }
                Ok(())
            }
        }
    }

    async fn reset(driver: &dyn WebDriver) -> Result<()> {
        driver.delete_all_cookies().await?;
        driver.navigate(BLANK_PAGE).await
    }

    /// Close every browser, idle or checked out, and refuse further checkouts
    pub async fn close_all_browsers(&self) -> PoolStats {
        let (browsers, stats) = {
            let mut state = self.state();
            state.closed = true;
            let stats = self.snapshot(&state);
            let mut browsers: Vec<PooledBrowser> = state.idle.drain(..).collect();
            browsers.extend(state.in_use.drain().map(|(_, browser)| browser));
            (browsers, stats)
        };
        self.idle_signal.close();
        self.creation.close();

        for browser in &browsers {
            if let Err(e) = browser.driver.quit().await {
                debug!("Closing pooled browser {} failed: {}", browser.id, e);
            }
        }

        info!(
            "Browser pool closed: {} created, {} checkout(s), per worker {:?}",
            stats.total_created, stats.total_acquisitions, stats.per_worker
        );
        stats
    }

    pub fn stats(&self) -> PoolStats {
        self.snapshot(&self.state())
    }

    pub fn is_closed(&self) -> bool {
        self.state().closed
    }

    fn snapshot(&self, state: &PoolState) -> PoolStats {
        PoolStats {
            capacity: self.capacity,
            total_created: state.total_created,
            total_acquisitions: state.total_acquisitions,
            idle: state.idle.len(),
            in_use: state.in_use.len(),
            per_worker: state
                .per_worker
                .iter()
                .map(|(worker, count)| (worker.to_string(), *count))
                .collect(),
        }
    }
}

impl std::fmt::Debug for BrowserPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BrowserPool")
            .field("capacity", &self.capacity)
            .field("browser", &self.browser)
            .field("stats", &self.stats())
            .finish()
    }
}
