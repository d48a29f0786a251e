//! Bulk loader for the item queue: one decimal `item_id` per line.

use clap::Parser;
use crawl_fleet::cli::LoaderArgs;
use crawl_fleet::config::Config;
use crawl_fleet::loader::{load_tasks, resolve_mode};
use crawl_fleet::logging::setup_logging;
use crawl_fleet::store::StoreContext;
use sqlx::postgres::PgPoolOptions;
use std::fs::File;
use std::io::{BufRead, BufReader};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = LoaderArgs::parse();
    let config = Config::load()?;
    setup_logging(&config, args.common.log_format);

    let mode = resolve_mode(args.mode)?;
    let file = File::open(&args.path)?;
    let lines = BufReader::new(file).lines().map_while(Result::ok);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .acquire_timeout(config.db_connect_timeout)
        .connect(&config.database_url())
        .await?;
    let store = StoreContext::new(pool, config.db_retry_attempts, config.retry_delay);

    let summary = load_tasks(&store, lines, mode, config.max_task_attempts).await?;
    info!(event = "tasks_loaded", added = summary.added, skipped = summary.skipped);
    println!("added={} skipped={}", summary.added, summary.skipped);
    Ok(())
}
