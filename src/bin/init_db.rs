//! Idempotent schema bootstrap: `CREATE TABLE IF NOT EXISTS` plus supporting
//! indexes. No flags; exits 0 on success.

use clap::Parser;
use crawl_fleet::cli::CommonArgs;
use crawl_fleet::config::Config;
use crawl_fleet::logging::setup_logging;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

const SCHEMA: &str = include_str!("../../migrations/001_init.sql");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = CommonArgs::parse();
    let config = Config::load()?;
    setup_logging(&config, args.log_format);

    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(1)
        .acquire_timeout(config.db_connect_timeout)
        .connect(&config.database_url())
        .await?;

    // `raw_sql` runs via the simple query protocol, which allows a single
    // call to execute the whole multi-statement DDL file, `DO $$ ... $$`
    // blocks included, without prepared-statement restrictions.
    sqlx::raw_sql(SCHEMA).execute(&pool).await?;

    info!(event = "schema_initialized");
    Ok(())
}
