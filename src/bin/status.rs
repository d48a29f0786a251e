//! One-shot fleet status report; exits non-zero only on connection/SQL
//! failure.

use clap::Parser;
use crawl_fleet::cli::CommonArgs;
use crawl_fleet::config::Config;
use crawl_fleet::logging::setup_logging;
use crawl_fleet::status::gather;
use crawl_fleet::store::StoreContext;
use sqlx::postgres::PgPoolOptions;

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
    let store = StoreContext::new(pool, config.db_retry_attempts, config.retry_delay);

    let report = gather(&store, &config).await?;
    print!("{}", report.format());
    Ok(())
}
