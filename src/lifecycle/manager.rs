//! Driver lifecycle manager
//!
//! One driver per worker, at most `max_browsers_allowed` drivers process-wide.
//! Every live driver owns exactly one semaphore permit, so the permit goes
//! back the moment its slot is dropped, whichever path drops it.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore, TryAcquireError};
use tracing::{debug, error, info, instrument, warn};

use super::worker::WorkerId;
use crate::config::Config;
use crate::driver::{BrowserType, Capabilities, DriverFactory, Timeouts, WebDriver};
use crate::{Error, Result};

/// Configuration applied to every new session
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub timeouts: Timeouts,
    pub maximize_window: bool,
    pub clear_cookies: bool,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            timeouts: Timeouts::default(),
            maximize_window: true,
            clear_cookies: true,
        }
    }
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            timeouts: Timeouts {
                implicit: std::time::Duration::from_millis(config.implicit_wait_ms),
                page_load: std::time::Duration::from_millis(config.page_load_timeout_ms),
                script: std::time::Duration::from_millis(config.script_timeout_ms),
            },
            maximize_window: config.maximize_window,
            clear_cookies: true,
        }
    }

    /// Apply standard configuration to a fresh session
    pub async fn apply(&self, driver: &dyn WebDriver) -> Result<()> {
        driver.set_timeouts(self.timeouts).await?;
        if self.maximize_window {
            driver.maximize_window().await?;
        }
        if self.clear_cookies {
            driver.delete_all_cookies().await?;
        }
        Ok(())
    }
}

#[derive(Debug)]
struct PermitPool {
    semaphore: Arc<Semaphore>,
    max: usize,
}

impl PermitPool {
    fn new(max: usize) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max)),
            max,
        }
    }
}

#[derive(Debug)]
struct DriverSlot {
    driver: Arc<dyn WebDriver>,
    _permit: OwnedSemaphorePermit,
    created_at: chrono::DateTime<chrono::Utc>,
}

/// Fast-fail, per-worker driver manager
pub struct DriverManager {
    factory: Arc<dyn DriverFactory>,
    settings: SessionSettings,
    permits: RwLock<PermitPool>,
    drivers: RwLock<HashMap<WorkerId, DriverSlot>>,
    /// Serializes `create_driver` per worker
    creation_locks: Mutex<HashMap<WorkerId, Arc<AsyncMutex<()>>>>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DriverManager {
    pub fn new(factory: Arc<dyn DriverFactory>, max_browsers_allowed: usize, settings: SessionSettings) -> Self {
        Self {
            factory,
            settings,
            permits: RwLock::new(PermitPool::new(max_browsers_allowed)),
            drivers: RwLock::new(HashMap::new()),
            creation_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(factory: Arc<dyn DriverFactory>, config: &Config) -> Self {
        Self::new(
            factory,
            config.max_browsers_allowed,
            SessionSettings::from_config(config),
        )
    }

    /// Driver for `worker`, creating one if the worker has none
    ///
    /// An active driver is returned unchanged. A dead one is purged first.
    /// When every permit is taken this fails fast with
    /// [`Error::ResourceExhausted`] instead of waiting. Concurrent calls for
    /// the same worker run one after the other, so the later call sees the
    /// driver the earlier one registered.
    #[instrument(skip(self, capabilities))]
    pub async fn create_driver(
        &self,
        worker: &WorkerId,
        browser: BrowserType,
        headless: bool,
        capabilities: &Capabilities,
    ) -> Result<Arc<dyn WebDriver>> {
        let _creating = self.creation_lock(worker).lock_owned().await;

        if let Some(existing) = self.get_driver(worker) {
            if existing.is_alive().await {
                warn!("Worker {} already owns an active driver; returning it", worker);
                return Ok(existing);
            }
            self.purge_stale(worker, &existing);
        }

        let (semaphore, max) = {
            let pool = read(&self.permits);
            (pool.semaphore.clone(), pool.max)
        };

        let permit = match semaphore.try_acquire_owned() {
            Ok(permit) => permit,
            Err(TryAcquireError::NoPermits) => {
                info!("No browser permit left for {} (max {})", worker, max);
                return Err(Error::resource_exhausted(format!(
                    "all {} browser permits are in use",
                    max
                )));
            }
            Err(TryAcquireError::Closed) => {
                return Err(Error::internal("browser permit pool is closed"));
            }
        };

        // From here on, every early return drops `permit` and releases it
        let driver = match self.factory.create(browser, headless, capabilities).await {
            Ok(driver) => driver,
            Err(e) => {
                error!("Failed to start {} for {}: {}", browser, worker, e);
                return Err(match e {
                    Error::SessionCreation(_) => e,
                    other => Error::session_creation(other.to_string()),
                });
            }
        };

        if let Err(e) = self.settings.apply(driver.as_ref()).await {
            error!("Failed to configure session for {}: {}", worker, e);
            if let Err(quit_err) = driver.quit().await {
                debug!("Quit after failed configuration also failed: {}", quit_err);
            }
            return Err(Error::session_creation(format!("session configuration failed: {}", e)));
        }

        info!(
            "Created {} driver {} for {}",
            browser,
            driver.session_id(),
            worker
        );

        write(&self.drivers).insert(
            worker.clone(),
            DriverSlot {
                driver: driver.clone(),
                _permit: permit,
                created_at: chrono::Utc::now(),
            },
        );

        Ok(driver)
    }

    fn creation_lock(&self, worker: &WorkerId) -> Arc<AsyncMutex<()>> {
        let mut locks = self
            .creation_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks
            .entry(worker.clone())
            .or_insert_with(|| Arc::new(AsyncMutex::new(())))
            .clone()
    }

    /// Driver currently registered for `worker`
    pub fn get_driver(&self, worker: &WorkerId) -> Option<Arc<dyn WebDriver>> {
        read(&self.drivers).get(worker).map(|slot| slot.driver.clone())
    }

    /// Whether `worker` has a registered driver
    pub fn has_driver(&self, worker: &WorkerId) -> bool {
        read(&self.drivers).contains_key(worker)
    }

    fn purge_stale(&self, worker: &WorkerId, stale: &Arc<dyn WebDriver>) {
        let mut drivers = write(&self.drivers);
        let same = drivers
            .get(worker)
            .map(|slot| Arc::ptr_eq(&slot.driver, stale))
            .unwrap_or(false);
        if same {
            debug!("Purging unresponsive driver {} of {}", stale.session_id(), worker);
            drivers.remove(worker);
        }
    }

    /// Quit the driver of `worker`; returns whether one was registered
    #[instrument(skip(self))]
    pub async fn quit_driver(&self, worker: &WorkerId) -> bool {
        let slot = write(&self.drivers).remove(worker);
        let Some(slot) = slot else {
            debug!("No driver registered for {}", worker);
            return false;
        };

        if let Err(e) = slot.driver.quit().await {
            warn!("Quitting driver of {} failed: {}", worker, e);
        }
        info!(
            "Released driver of {} after {}s",
            worker,
            (chrono::Utc::now() - slot.created_at).num_seconds()
        );
        true
    }

    /// Quit every registered driver; returns how many permits went back
    ///
    /// Unresponsive sessions are not quit, but their permit is still
    /// returned, once.
    pub async fn quit_all_drivers(&self) -> usize {
        let slots: Vec<(WorkerId, DriverSlot)> = write(&self.drivers).drain().collect();
        let released = slots.len();

        for (worker, slot) in slots {
            if slot.driver.is_alive().await {
                if let Err(e) = slot.driver.quit().await {
                    warn!("Quitting driver of {} failed: {}", worker, e);
                }
            } else {
                debug!("Driver of {} already unresponsive", worker);
            }
        }

        if released > 0 {
            info!("Quit {} driver(s)", released);
        }
        released
    }

    /// Replace the permit pool
    ///
    /// Only meaningful before the first driver of a run is created; drivers
    /// created earlier return their permits to the old pool.
    pub fn set_max_browsers_allowed(&self, max: usize) {
        let active = self.active_driver_count();
        if active > 0 {
            warn!(
                "Resizing browser permits to {} with {} driver(s) still active",
                max, active
            );
        }
        *write(&self.permits) = PermitPool::new(max);
    }

    pub fn max_browsers_allowed(&self) -> usize {
        read(&self.permits).max
    }

    pub fn permits_available(&self) -> usize {
        read(&self.permits).semaphore.available_permits()
    }

    pub fn permits_in_use(&self) -> usize {
        let pool = read(&self.permits);
        pool.max.saturating_sub(pool.semaphore.available_permits())
    }

    pub fn active_driver_count(&self) -> usize {
        read(&self.drivers).len()
    }

    pub fn active_workers(&self) -> Vec<WorkerId> {
        let mut workers: Vec<WorkerId> = read(&self.drivers).keys().cloned().collect();
        workers.sort();
        workers
    }
}

impl std::fmt::Debug for DriverManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverManager")
            .field("max_browsers_allowed", &self.max_browsers_allowed())
            .field("permits_available", &self.permits_available())
            .field("active_drivers", &self.active_driver_count())
            .finish()
    }
}
