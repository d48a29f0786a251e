//! Worker liveness operations.

use super::StoreContext;
use crate::domain::WorkerStatus;
use crate::error::Result;
use crate::store::retry::with_retry;
use std::time::Duration;
use tracing::warn;

pub struct WorkerOps<'a> {
    ctx: &'a StoreContext,
}

impl<'a> WorkerOps<'a> {
    pub(crate) fn new(ctx: &'a StoreContext) -> Self {
        Self { ctx }
    }

    /// Upserts a worker row: inserts (as `active`) if absent, otherwise bumps
    /// `last_heartbeat` and reactivates it. Failures are
    /// logged and swallowed rather than propagated — a missed
    /// beat is recoverable next tick.
    pub async fn heartbeat(&self, worker_id: &str) {
        let result = with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                INSERT INTO workers (worker_id)
                VALUES ($1)
                ON CONFLICT (worker_id) DO UPDATE SET
                    last_heartbeat = NOW(),
                    status = 'active'
                "#,
            )
            .bind(worker_id)
            .execute(self.ctx.pool())
            .await
        })
        .await;

        if let Err(e) = result {
            warn!(event = "heartbeat_failed", worker_id, error = %e);
        }
    }

    /// Increments `tasks_processed` or `tasks_failed`.
    pub async fn increment_stats(&self, worker_id: &str, success: bool) -> Result<()> {
        let column = if success { "tasks_processed" } else { "tasks_failed" };
        let sql = format!("UPDATE workers SET {column} = {column} + 1 WHERE worker_id = $1");
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(&sql).bind(worker_id).execute(self.ctx.pool()).await
        })
        .await?;
        Ok(())
    }

    /// Janitor step 3: flips `active` workers with a stale
    /// heartbeat to `stopped`. Purely informational — their leases are
    /// reclaimed separately by the task/proxy sweeps. Returns the affected
    /// row count.
    pub async fn stop_dead(&self, timeout: Duration) -> Result<u64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                "UPDATE workers SET status = 'stopped' WHERE status = 'active' AND last_heartbeat < NOW() - ($1 * INTERVAL '1 second')",
            )
            .bind(timeout.as_secs_f64())
            .execute(self.ctx.pool())
            .await
        })
        .await
        .map(|r| r.rows_affected())
    }

    /// Per-status row counts for the status reporter.
    pub async fn status_counts(&self) -> Result<Vec<(WorkerStatus, i64)>> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_as("SELECT status, count(*) FROM workers GROUP BY status")
                .fetch_all(self.ctx.pool())
                .await
        })
        .await
    }

    /// Count of workers a janitor sweep would currently flip to `stopped`.
    pub async fn count_dead(&self, timeout: Duration) -> Result<i64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_scalar(
                "SELECT count(*) FROM workers WHERE status = 'active' AND last_heartbeat < NOW() - ($1 * INTERVAL '1 second')",
            )
            .bind(timeout.as_secs_f64())
            .fetch_one(self.ctx.pool())
            .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{Worker, WorkerStatus};
    use crate::store::StoreContext;
    use sqlx::PgPool;
    use std::time::Duration;

    fn store(pool: PgPool) -> StoreContext {
        StoreContext::new(pool, 3, Duration::from_millis(1))
    }

    #[sqlx::test]
    async fn heartbeat_creates_active_row(pool: PgPool) {
        let store = store(pool);
        store.workers().heartbeat("w:1").await;

        let row: Worker = sqlx::query_as("SELECT * FROM workers WHERE worker_id = $1")
            .bind("w:1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(row.status, WorkerStatus::Active));
    }

    #[sqlx::test]
    async fn heartbeat_reactivates_stopped_worker(pool: PgPool) {
        let store = store(pool);
        store.workers().heartbeat("w:1").await;
        sqlx::query("UPDATE workers SET status = 'stopped' WHERE worker_id = $1")
            .bind("w:1")
            .execute(store.pool())
            .await
            .unwrap();

        store.workers().heartbeat("w:1").await;

        let row: Worker = sqlx::query_as("SELECT * FROM workers WHERE worker_id = $1")
            .bind("w:1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(row.status, WorkerStatus::Active));
    }

    #[sqlx::test]
    async fn increment_stats_bumps_correct_counter(pool: PgPool) {
        let store = store(pool);
        store.workers().heartbeat("w:1").await;
        store.workers().increment_stats("w:1", true).await.unwrap();
        store.workers().increment_stats("w:1", false).await.unwrap();
        store.workers().increment_stats("w:1", true).await.unwrap();

        let row: Worker = sqlx::query_as("SELECT * FROM workers WHERE worker_id = $1")
            .bind("w:1")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(row.tasks_processed, 2);
        assert_eq!(row.tasks_failed, 1);
    }

    #[sqlx::test]
    async fn stop_dead_flips_stale_active_workers(pool: PgPool) {
        let store = store(pool);
        store.workers().heartbeat("w:1").await;
        sqlx::query("UPDATE workers SET last_heartbeat = NOW() - INTERVAL '1 hour' WHERE worker_id = 'w:1'")
            .execute(store.pool())
            .await
            .unwrap();

        let n = store.workers().stop_dead(Duration::from_secs(1)).await.unwrap();
        assert_eq!(n, 1);

        let row: Worker = sqlx::query_as("SELECT * FROM workers WHERE worker_id = 'w:1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(row.status, WorkerStatus::Stopped));
    }
}
