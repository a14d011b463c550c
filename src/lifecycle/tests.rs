//! Lifecycle tests

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio_test::{assert_err, assert_ok};

use super::*;
use crate::config::Config;
use crate::driver::mock::MockDriverFactory;
use crate::driver::{BrowserType, Capabilities, WebDriver};
use crate::report::{RecordingReporter, StepKind};
use crate::Error;

fn manager(factory: &Arc<MockDriverFactory>, max: usize) -> DriverManager {
    DriverManager::new(factory.clone(), max, SessionSettings::default())
}

fn pool(factory: &Arc<MockDriverFactory>, capacity: usize) -> BrowserPool {
    BrowserPool::new(
        factory.clone(),
        capacity,
        BrowserType::Chrome,
        true,
        SessionSettings::default(),
    )
}

async fn create(manager: &DriverManager, worker: &str) -> crate::Result<Arc<dyn WebDriver>> {
    manager
        .create_driver(&WorkerId::from(worker), BrowserType::Chrome, true, &Capabilities::default())
        .await
}

fn assert_conserved(manager: &DriverManager) {
    assert_eq!(
        manager.permits_available() + manager.permits_in_use(),
        manager.max_browsers_allowed()
    );
    assert_eq!(manager.permits_in_use(), manager.active_driver_count());
}

#[tokio::test]
async fn test_create_driver_is_idempotent_per_worker() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 3);

    let first = create(&manager, "w1").await.unwrap();
    let second = create(&manager, "w1").await.unwrap();

    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(factory.created_count(), 1);
    assert_eq!(manager.active_driver_count(), 1);
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_new_session_gets_standard_configuration() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 1);
    create(&manager, "w1").await.unwrap();

    let driver = &factory.created()[0];
    assert_eq!(driver.applied_timeouts(), Some(Default::default()));
    assert!(driver.is_maximized());
    assert_eq!(driver.cookies_cleared(), 1);
}

#[tokio::test]
async fn test_admission_control_fails_fast() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 1);

    create(&manager, "w1").await.unwrap();
    let denied = create(&manager, "w2").await;
    assert!(matches!(denied, Err(Error::ResourceExhausted(_))));
    assert!(denied.err().map(|e| e.is_exhausted()).unwrap_or(false));

    assert!(manager.quit_driver(&WorkerId::from("w1")).await);
    create(&manager, "w2").await.unwrap();
    assert_eq!(manager.active_workers(), vec![WorkerId::from("w2")]);
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_failed_construction_releases_permit() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 2);
    factory.fail_next(1);

    let failed = create(&manager, "w1").await;
    assert!(matches!(failed, Err(Error::SessionCreation(_))));
    assert_eq!(manager.permits_available(), 2);
    assert!(manager.get_driver(&WorkerId::from("w1")).is_none());

    create(&manager, "w1").await.unwrap();
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_dead_driver_is_purged_and_replaced() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 1);

    create(&manager, "w1").await.unwrap();
    factory.created()[0].kill();

    // The dead driver's permit is returned before the new one is taken
    let replacement = create(&manager, "w1").await.unwrap();
    assert_eq!(factory.created_count(), 2);
    assert_eq!(replacement.session_id(), factory.created()[1].session_id());
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_permits_conserved_across_mixed_sequence() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 3);

    create(&manager, "a").await.unwrap();
    create(&manager, "b").await.unwrap();
    factory.fail_next(1);
    assert_err!(create(&manager, "c").await);
    assert_conserved(&manager);

    create(&manager, "c").await.unwrap();
    assert_err!(create(&manager, "d").await);
    assert!(!manager.quit_driver(&WorkerId::from("d")).await);
    assert!(manager.quit_driver(&WorkerId::from("b")).await);
    assert!(!manager.quit_driver(&WorkerId::from("b")).await);
    assert_conserved(&manager);

    create(&manager, "d").await.unwrap();
    assert_eq!(manager.permits_available(), 0);
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_quit_all_releases_every_permit_once() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 3);

    create(&manager, "a").await.unwrap();
    create(&manager, "b").await.unwrap();
    let created = factory.created();
    created[1].kill();

    assert_eq!(manager.quit_all_drivers().await, 2);
    assert_eq!(manager.permits_available(), 3);
    assert_eq!(manager.active_driver_count(), 0);
    assert_eq!(created[0].quit_count(), 1);
    // Unresponsive sessions are not asked to quit
    assert_eq!(created[1].quit_count(), 0);

    assert_eq!(manager.quit_all_drivers().await, 0);
    assert_eq!(manager.permits_available(), 3);
}

#[tokio::test]
async fn test_concurrent_creation_respects_cap() {
    let factory = MockDriverFactory::new();
    factory.set_delay(Duration::from_millis(20));
    let manager = Arc::new(manager(&factory, 3));

    let tasks: Vec<_> = (0..10)
        .map(|i| {
            let manager = manager.clone();
            tokio::spawn(async move { create(&manager, &format!("worker-{}", i)).await })
        })
        .collect();

    let mut created = 0;
    let mut exhausted = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(Error::ResourceExhausted(_)) => exhausted += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(created, 3);
    assert_eq!(exhausted, 7);
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_concurrent_create_for_same_worker_shares_one_driver() {
    let factory = MockDriverFactory::new();
    factory.set_delay(Duration::from_millis(50));
    let manager = manager(&factory, 2);

    let (first, second) = tokio::join!(create(&manager, "w1"), create(&manager, "w1"));
    let (first, second) = (first.unwrap(), second.unwrap());

    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(factory.created_count(), 1);
    assert_eq!(manager.permits_in_use(), 1);
    assert_conserved(&manager);

    assert_eq!(manager.quit_all_drivers().await, 1);
    assert!(factory.created().iter().all(|driver| driver.quit_count() == 1));
    assert_eq!(manager.permits_available(), 2);
}

#[tokio::test]
async fn test_failed_configuration_quits_session_and_releases_permit() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 1);
    factory.fail_configuration_next(1);

    let failed = create(&manager, "w1").await;
    assert!(matches!(failed, Err(Error::SessionCreation(_))));
    assert_eq!(manager.permits_available(), 1);
    assert!(!manager.has_driver(&WorkerId::from("w1")));
    assert_eq!(factory.created()[0].quit_count(), 1);

    let replacement = create(&manager, "w1").await.unwrap();
    assert_eq!(replacement.session_id(), factory.created()[1].session_id());
    assert_conserved(&manager);
}

#[tokio::test]
async fn test_set_max_browsers_allowed() {
    let factory = MockDriverFactory::new();
    let manager = manager(&factory, 1);
    manager.set_max_browsers_allowed(4);

    assert_eq!(manager.max_browsers_allowed(), 4);
    assert_eq!(manager.permits_available(), 4);
    for worker in ["a", "b", "c", "d"] {
        create(&manager, worker).await.unwrap();
    }
    assert_err!(create(&manager, "e").await);
}

#[tokio::test]
async fn test_pool_reuses_and_resets_browsers() {
    let factory = MockDriverFactory::new();
    let pool = pool(&factory, 2);
    let (w1, w2) = (WorkerId::from("w1"), WorkerId::from("w2"));

    let first = pool.acquire_browser(&w1).await.unwrap();
    first.navigate("https://example.com/cart").await.unwrap();
    assert_ok!(pool.release_browser(&w1).await);

    let second = pool.acquire_browser(&w2).await.unwrap();
    assert_eq!(first.session_id(), second.session_id());
    assert_eq!(factory.created_count(), 1);

    let mock = &factory.created()[0];
    assert_eq!(mock.url(), "about:blank");
    assert_eq!(mock.cookies_cleared(), 2);

    let stats = pool.stats();
    assert_eq!(stats.total_created, 1);
    assert_eq!(stats.total_acquisitions, 2);
    assert_eq!(stats.in_use, 1);
    assert_eq!(stats.idle, 0);
    assert_eq!(stats.per_worker.get("w1"), Some(&1));
    assert_eq!(stats.per_worker.get("w2"), Some(&1));
}

#[tokio::test]
async fn test_pool_blocks_until_browser_returned() {
    let factory = MockDriverFactory::new();
    let pool = Arc::new(pool(&factory, 1));
    let holder = WorkerId::from("holder");

    pool.acquire_browser(&holder).await.unwrap();

    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_browser(&WorkerId::from("waiter")).await })
    };
    let mut waiter = waiter;

    let still_waiting = tokio::time::timeout(Duration::from_millis(50), &mut waiter).await;
    assert!(still_waiting.is_err());

    pool.release_browser(&holder).await.unwrap();
    let acquired = tokio::time::timeout(Duration::from_secs(1), &mut waiter)
        .await
        .expect("waiter should wake after release")
        .unwrap();
    assert_ok!(acquired);
    assert_eq!(factory.created_count(), 1);
    assert_eq!(pool.stats().total_acquisitions, 2);
}

#[tokio::test]
async fn test_pool_closes_browser_that_fails_reset() {
    let factory = MockDriverFactory::new();
    let pool = pool(&factory, 1);
    let worker = WorkerId::from("w1");

    pool.acquire_browser(&worker).await.unwrap();
    let broken = factory.created()[0].clone();
    broken.set_fail_navigation(true);
    pool.release_browser(&worker).await.unwrap();

    assert_eq!(broken.quit_count(), 1);
    assert_eq!(pool.stats().idle, 0);

    // Capacity freed by the closed browser is reusable
    let fresh = pool.acquire_browser(&worker).await.unwrap();
    assert_ne!(fresh.session_id(), broken.session_id());
    assert_eq!(factory.created_count(), 2);
}

#[tokio::test]
async fn test_pool_close_wakes_waiters() {
    let factory = MockDriverFactory::new();
    let pool = Arc::new(pool(&factory, 1));

    pool.acquire_browser(&WorkerId::from("holder")).await.unwrap();
    let waiter = {
        let pool = pool.clone();
        tokio::spawn(async move { pool.acquire_browser(&WorkerId::from("waiter")).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let stats = pool.close_all_browsers().await;
    assert_eq!(stats.total_created, 1);
    assert_eq!(stats.in_use, 1);

    let woke = tokio::time::timeout(Duration::from_secs(1), waiter)
        .await
        .expect("waiter should wake on close")
        .unwrap();
    assert!(matches!(woke, Err(Error::PoolClosed)));
    assert_eq!(factory.created()[0].quit_count(), 1);
    assert!(pool.is_closed());
    assert!(matches!(
        pool.acquire_browser(&WorkerId::from("late")).await,
        Err(Error::PoolClosed)
    ));
}

#[tokio::test]
async fn test_pool_concurrent_checkout_for_same_worker_keeps_one_browser() {
    let factory = MockDriverFactory::new();
    factory.set_delay(Duration::from_millis(20));
    let pool = pool(&factory, 2);
    let worker = WorkerId::from("w1");

    let (first, second) = tokio::join!(pool.acquire_browser(&worker), pool.acquire_browser(&worker));
    assert_eq!(first.unwrap().session_id(), second.unwrap().session_id());

    let stats = pool.stats();
    assert_eq!(stats.total_created, 2);
    assert_eq!(stats.total_acquisitions, 1);
    assert_eq!(stats.in_use, 1);
    assert_eq!(stats.idle, 1);

    // The spare browser is handed to the next worker without a new session
    pool.acquire_browser(&WorkerId::from("w2")).await.unwrap();
    assert_eq!(factory.created_count(), 2);

    let stats = pool.close_all_browsers().await;
    assert_eq!(stats.in_use, 2);
    assert!(factory.created().iter().all(|driver| driver.quit_count() == 1));
}

#[tokio::test]
async fn test_pool_failed_configuration_frees_capacity() {
    let factory = MockDriverFactory::new();
    let pool = pool(&factory, 1);
    let worker = WorkerId::from("w1");
    factory.fail_configuration_next(1);

    let failed = pool.acquire_browser(&worker).await;
    assert!(matches!(failed, Err(Error::SessionCreation(_))));
    assert_eq!(factory.created()[0].quit_count(), 1);
    assert_eq!(pool.stats().total_created, 0);

    let fresh = tokio::time::timeout(Duration::from_secs(1), pool.acquire_browser(&worker))
        .await
        .expect("capacity should be free again")
        .unwrap();
    assert_eq!(fresh.session_id(), factory.created()[1].session_id());
    assert_eq!(pool.stats().in_use, 1);
}

fn test_config() -> Config {
    Config {
        max_browsers_allowed: 2,
        pool_size: 1,
        retry_delay_ms: 1,
        ..Config::default()
    }
}

#[tokio::test]
async fn test_scope_shuts_down_after_error() {
    let factory = MockDriverFactory::new();
    let result: crate::Result<()> = RunContext::new(test_config(), factory.clone())
        .scope(|ctx| async move {
            create(ctx.drivers(), "w1").await?;
            ctx.pool().acquire_browser(&WorkerId::from("w2")).await?;
            Err(Error::internal("test body failed"))
        })
        .await;

    assert!(matches!(result, Err(Error::Internal(_))));
    let created = factory.created();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|driver| driver.quit_count() == 1));
}

#[tokio::test]
async fn test_scope_shuts_down_after_panic() {
    let factory = MockDriverFactory::new();
    let run = RunContext::new(test_config(), factory.clone()).scope(|ctx| async move {
        create(ctx.drivers(), "w1").await?;
        if ctx.drivers().active_driver_count() == 1 {
            panic!("test body exploded");
        }
        Ok::<(), Error>(())
    });

    let outcome = AssertUnwindSafe(run).catch_unwind().await;
    assert!(outcome.is_err());
    assert_eq!(factory.created()[0].quit_count(), 1);
}

#[tokio::test]
async fn test_with_driver_reports_and_quits() {
    let factory = MockDriverFactory::new();
    let reporter = Arc::new(RecordingReporter::new());
    let ctx = RunContext::new(test_config(), factory.clone()).with_reporter(reporter.clone());
    let worker = WorkerId::from("w1");

    let title = ctx
        .with_driver(&worker, |scope| async move { scope.driver().title().await })
        .await
        .unwrap();
    assert_eq!(title, "");

    let failed: crate::Result<()> = ctx
        .with_driver(&worker, |_| async { Err(Error::timeout("page never settled")) })
        .await;
    assert!(matches!(failed, Err(Error::Timeout(_))));

    assert_eq!(reporter.count(StepKind::Pass), 1);
    assert_eq!(reporter.count(StepKind::Fail), 1);
    assert_eq!(ctx.drivers().active_driver_count(), 0);
    assert_eq!(ctx.drivers().permits_available(), 2);
    assert!(factory.created().iter().all(|driver| driver.quit_count() == 1));

    let summary = ctx.shutdown().await;
    assert_eq!(summary.drivers_quit, 0);
}
