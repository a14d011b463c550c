//! # wd-harness smoke runner
//!
//! Opens one page against a running WebDriver endpoint and reports its title.
//! Useful to check that the endpoint, browser and configuration line up
//! before launching a suite.
//!
//! ## Usage
//! ```text
//! wd-harness [URL]
//! ```
//!
//! ## Environment
//! - `WDH_WEBDRIVER_URL`: WebDriver endpoint (default: http://localhost:4444)
//! - `WDH_BROWSER`: chrome, firefox, edge or safari (default: chrome)
//! - `WDH_REQUEST_TIMEOUT_MS`: upper bound on one WebDriver command (default: 60000)
//! - `WDH_CONFIG`: optional TOML file read instead of the environment
//! - `RUST_LOG`: log level, overriding `WDH_LOG_LEVEL`

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

use wd_harness::config::Config;
use wd_harness::driver::HttpDriverFactory;
use wd_harness::lifecycle::{RunContext, WorkerId};
use wd_harness::page::BasePage;

fn load_config() -> anyhow::Result<Config> {
    let config = match std::env::var("WDH_CONFIG") {
        Ok(path) => Config::from_file(&path).with_context(|| format!("reading {}", path))?,
        Err(_) => Config::from_env().context("reading WDH_* environment")?,
    };
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = load_config()?;

    // RUST_LOG wins over the configured level
    let log_level = std::env::var("RUST_LOG")
        .ok()
        .and_then(|v| v.parse::<Level>().ok())
        .or_else(|| config.log_level.parse::<Level>().ok())
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    info!("wd-harness v{}", wd_harness::VERSION);
    info!(
        "Configuration loaded: browser={}, headless={}, endpoint={}",
        config.browser, config.headless, config.webdriver_url
    );

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "about:blank".to_string());

    let factory =
        Arc::new(HttpDriverFactory::from_config(&config).context("building WebDriver client")?);
    let ctx = RunContext::new(config, factory);

    let outcome = ctx
        .scope(|ctx| async move {
            let worker = WorkerId::from("main");
            let config = ctx.config().clone();
            let run = ctx.with_driver(&worker, |scope| async move {
                let page = BasePage::new("SmokePage", scope, &config);
                page.open(&url).await?;
                page.title().await
            });

            tokio::select! {
                result = run => result,
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C signal");
                    Err(wd_harness::Error::internal("interrupted"))
                }
            }
        })
        .await;

    match outcome {
        Ok(title) => {
            info!("Page title: {:?}", title);
            Ok(())
        }
        Err(e) => {
            error!("Smoke run failed: {}", e);
            Err(e.into())
        }
    }
}
