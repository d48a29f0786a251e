//! Transactional gateway over Postgres.

mod proxies;
mod results;
pub mod retry;
mod tasks;
mod workers;

pub use proxies::ProxyOps;
pub use results::ResultOps;
pub use tasks::TaskOps;
pub use workers::WorkerOps;

use sqlx::PgPool;
use std::time::Duration;

/// Thin wrapper around the pool, exposing per-entity operation groups the way
/// `DbContext` exposes `scrape_jobs()`/`courses()`.
#[derive(Clone)]
pub struct StoreContext {
    pool: PgPool,
    retry_attempts: u32,
    retry_delay: Duration,
}

impl StoreContext {
    pub fn new(pool: PgPool, retry_attempts: u32, retry_delay: Duration) -> Self {
        Self { pool, retry_attempts, retry_delay }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn tasks(&self) -> TaskOps<'_> {
        TaskOps::new(self)
    }

    pub fn proxies(&self) -> ProxyOps<'_> {
        ProxyOps::new(self)
    }

    pub fn workers(&self) -> WorkerOps<'_> {
        WorkerOps::new(self)
    }

    pub fn results(&self) -> ResultOps<'_> {
        ResultOps::new(self)
    }
}
