//! Worker daemon: registers, forks N concurrent scraper slots, and drains the
//! task queue until shut down.

use clap::Parser;
use crawl_fleet::cli::CommonArgs;
use crawl_fleet::collaborators::{CaptchaResolver, CardParser, Driver, DriverFactory, PageDetector};
use crawl_fleet::config::Config;
use crawl_fleet::domain::{CardData, PageState, ProxyTriple};
use crawl_fleet::logging::setup_logging;
use crawl_fleet::shutdown::ShutdownCoordinator;
use crawl_fleet::store::StoreContext;
use crawl_fleet::worker::WorkerPool;
use gethostname::gethostname;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Placeholder collaborators: the browser driver, page-state detector, card
/// parser, and CAPTCHA resolver are supplied by a site-automation package at
/// deployment time. These no-op stand-ins let the worker daemon build and run
/// end to end against the coordination fabric alone.
struct UnimplementedDriver;

#[async_trait::async_trait]
impl Driver for UnimplementedDriver {
    async fn goto(&self, _url: &str, _timeout: Duration) -> anyhow::Result<()> {
        Err(anyhow::anyhow!("no Driver collaborator configured for this deployment"))
    }
    async fn content(&self) -> anyhow::Result<String> {
        Err(anyhow::anyhow!("no Driver collaborator configured for this deployment"))
    }
    async fn close(&self) {}
}

struct UnimplementedDriverFactory;

#[async_trait::async_trait]
impl DriverFactory for UnimplementedDriverFactory {
    async fn build(&self, _proxy: &ProxyTriple, _display: u32) -> anyhow::Result<Box<dyn Driver>> {
        Ok(Box::new(UnimplementedDriver))
    }
}

struct UnimplementedDetector;

#[async_trait::async_trait]
impl PageDetector for UnimplementedDetector {
    async fn detect(&self, _page: &dyn Driver, _priority: &[PageState]) -> anyhow::Result<PageState> {
        Err(anyhow::anyhow!("no PageDetector collaborator configured for this deployment"))
    }
}

struct UnimplementedParser;

impl CardParser for UnimplementedParser {
    fn parse(&self, _html: &str, _fields: &[&str]) -> anyhow::Result<CardData> {
        Err(anyhow::anyhow!("no CardParser collaborator configured for this deployment"))
    }
}

struct UnimplementedCaptchaResolver;

#[async_trait::async_trait]
impl CaptchaResolver for UnimplementedCaptchaResolver {
    async fn resolve(&self, _page: &dyn Driver, _max_attempts: u32) -> (Option<PageState>, bool) {
        (None, false)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = CommonArgs::parse();
    let config = Config::load()?;
    setup_logging(&config, args.log_format);

    info!(event = "app_start", program_id = %config.program_id, workers_count = config.workers_count);

    let pool = PgPoolOptions::new()
        .min_connections(5)
        .max_connections(20)
        .acquire_timeout(config.db_connect_timeout)
        .connect(&config.database_url())
        .await?;

    let store = StoreContext::new(pool, config.db_retry_attempts, config.retry_delay);
    let base_worker_id = format!("{}:{}:{}", config.program_id, gethostname().to_string_lossy(), std::process::id());

    let shutdown = ShutdownCoordinator::new();
    let shutdown_tx = shutdown.shutdown_tx();

    let pool_for_run = WorkerPool::new(
        store,
        Arc::new(UnimplementedDriverFactory),
        Arc::new(UnimplementedDetector),
        Arc::new(UnimplementedParser),
        Arc::new(UnimplementedCaptchaResolver),
        base_worker_id,
        config.workers_count,
        config.heartbeat_interval,
    );

    let mut run_handle = tokio::spawn(pool_for_run.run(shutdown_tx));

    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
        info!(event = "shutdown_signal", signal = "sigint");
    };

    #[cfg(unix)]
    let sigterm = async {
        let mut stream = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler");
        stream.recv().await;
        info!(event = "shutdown_signal", signal = "sigterm");
    };
    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    // Every slot draining the queue on its own also ends the select, so a
    // worker that runs out of work exits without waiting for a signal.
    tokio::select! {
        _ = ctrl_c => shutdown.shutdown(),
        _ = sigterm => shutdown.shutdown(),
        res = &mut run_handle => {
            res?;
            return Ok(());
        }
    }

    run_handle.await?;
    Ok(())
}
