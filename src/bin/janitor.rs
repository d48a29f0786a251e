//! Janitor daemon: a fixed-period sweep that reclaims expired leases and
//! finalizes hopeless tasks.

use clap::Parser;
use crawl_fleet::cli::CommonArgs;
use crawl_fleet::config::Config;
use crawl_fleet::janitor::{JanitorConfig, run_cycle};
use crawl_fleet::logging::setup_logging;
use crawl_fleet::shutdown::ShutdownCoordinator;
use crawl_fleet::store::StoreContext;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = CommonArgs::parse();
    let config = Config::load()?;
    setup_logging(&config, args.log_format);

    info!(event = "app_start", program_id = %config.program_id, cleanup_interval = ?config.cleanup_interval);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(config.db_connect_timeout)
        .connect(&config.database_url())
        .await?;
    let store = StoreContext::new(pool, config.db_retry_attempts, config.retry_delay);

    let janitor_config = JanitorConfig {
        task_timeout: config.task_timeout,
        proxy_timeout: config.proxy_timeout,
        worker_timeout: config.worker_timeout,
        cleanup_interval: config.cleanup_interval,
    };

    let shutdown = ShutdownCoordinator::new();
    let mut shutdown_rx = shutdown.subscribe();

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

    tokio::spawn(async move {
        tokio::select! {
            _ = ctrl_c => {}
            _ = sigterm => {}
        }
        shutdown.shutdown();
    });

    let mut interval = tokio::time::interval(janitor_config.cleanup_interval);
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = run_cycle(&store, &janitor_config).await {
                    error!(event = "cleanup_cycle_failed", error = %e);
                }
            }
            _ = shutdown_rx.recv() => {
                info!(event = "app_shutdown");
                break;
            }
        }
    }

    Ok(())
}
