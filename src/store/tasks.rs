//! Task leasing operations.

use super::StoreContext;
use crate::domain::{Task, TaskStatus};
use crate::error::Result;
use crate::store::retry::with_retry;
use std::time::Duration;

pub struct TaskOps<'a> {
    ctx: &'a StoreContext,
}

impl<'a> TaskOps<'a> {
    pub(crate) fn new(ctx: &'a StoreContext) -> Self {
        Self { ctx }
    }

    /// Atomically leases the oldest pending task, FIFO by `created_at` then
    /// `task_id`. Bumps `attempts`, sets `worker_id` and
    /// `last_attempt_at`. Returns `None` when no pending task exists.
    pub async fn acquire(&self, worker_id: &str) -> Result<Option<Task>> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_as::<_, Task>(
                r#"
                UPDATE tasks
                SET status = 'processing',
                    worker_id = $1,
                    last_attempt_at = NOW(),
                    attempts = attempts + 1
                WHERE task_id = (
                    SELECT task_id FROM tasks
                    WHERE status = 'pending'
                    ORDER BY created_at ASC, task_id ASC
                    LIMIT 1
                    FOR UPDATE SKIP LOCKED
                )
                RETURNING *
                "#,
            )
            .bind(worker_id)
            .fetch_optional(self.ctx.pool())
            .await
        })
        .await
    }

    /// Marks a task completed.
    pub async fn mark_completed(&self, task_id: i64) -> Result<()> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                "UPDATE tasks SET status = 'completed', completed_at = NOW(), worker_id = NULL WHERE task_id = $1",
            )
            .bind(task_id)
            .execute(self.ctx.pool())
            .await
        })
        .await?;
        Ok(())
    }

    /// Releases a task lease, branching to `pending` or `failed` inside the
    /// single UPDATE depending on whether `attempts >= max_attempts`.
    pub async fn release(&self, task_id: i64) -> Result<()> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                UPDATE tasks
                SET status = CASE WHEN attempts >= max_attempts THEN 'failed' ELSE 'pending' END,
                    worker_id = NULL,
                    last_attempt_at = NULL
                WHERE task_id = $1
                "#,
            )
            .bind(task_id)
            .execute(self.ctx.pool())
            .await
        })
        .await?;
        Ok(())
    }

    /// Janitor step 1: returns stuck `processing` tasks to
    /// `pending`, leaving `attempts` untouched. Returns the affected row count.
    pub async fn reclaim_stuck(&self, timeout: Duration) -> Result<u64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                UPDATE tasks
                SET status = 'pending', worker_id = NULL, last_attempt_at = NULL
                WHERE status = 'processing'
                  AND last_attempt_at < NOW() - ($1 * INTERVAL '1 second')
                "#,
            )
            .bind(timeout.as_secs_f64())
            .execute(self.ctx.pool())
            .await
        })
        .await
        .map(|r| r.rows_affected())
    }

    /// Janitor step 4: fails `pending` tasks that already
    /// exhausted their attempt budget. Returns the affected row count.
    pub async fn fail_hopeless(&self) -> Result<u64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query("UPDATE tasks SET status = 'failed' WHERE status = 'pending' AND attempts >= max_attempts")
                .execute(self.ctx.pool())
                .await
        })
        .await
        .map(|r| r.rows_affected())
    }

    /// Per-status row counts for the status reporter.
    pub async fn status_counts(&self) -> Result<Vec<(TaskStatus, i64)>> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_as("SELECT status, count(*) FROM tasks GROUP BY status")
                .fetch_all(self.ctx.pool())
                .await
        })
        .await
    }

    /// Count of tasks a janitor sweep would currently reclaim, without
    /// mutating anything.
    pub async fn count_stuck(&self, timeout: Duration) -> Result<i64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_scalar(
                "SELECT count(*) FROM tasks WHERE status = 'processing' AND last_attempt_at < NOW() - ($1 * INTERVAL '1 second')",
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
    use crate::store::StoreContext;
    use sqlx::PgPool;
    use std::time::Duration;

    fn store(pool: PgPool) -> StoreContext {
        StoreContext::new(pool, 3, Duration::from_millis(1))
    }

    async fn insert_task(pool: &PgPool, item_id: i64, max_attempts: i32) -> i64 {
        sqlx::query_scalar(
            "INSERT INTO tasks (item_id, max_attempts) VALUES ($1, $2) RETURNING task_id",
        )
        .bind(item_id)
        .bind(max_attempts)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    #[sqlx::test]
    async fn acquire_returns_none_when_empty(pool: PgPool) {
        let store = store(pool);
        assert!(store.tasks().acquire("w:1").await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn acquire_leases_oldest_pending_first(pool: PgPool) {
        let first = insert_task(&pool, 100, 5).await;
        let _second = insert_task(&pool, 101, 5).await;

        let store = store(pool);
        let task = store.tasks().acquire("w:1").await.unwrap().unwrap();
        assert_eq!(task.task_id, first);
        assert_eq!(task.attempts, 1);
        assert_eq!(task.worker_id.as_deref(), Some("w:1"));
    }

    #[sqlx::test]
    async fn acquire_skips_already_leased_rows(pool: PgPool) {
        let _first = insert_task(&pool, 100, 5).await;
        let second = insert_task(&pool, 101, 5).await;

        let store = store(pool);
        store.tasks().acquire("w:1").await.unwrap();
        let task = store.tasks().acquire("w:2").await.unwrap().unwrap();
        assert_eq!(task.task_id, second);
    }

    #[sqlx::test]
    async fn release_goes_pending_below_max_attempts(pool: PgPool) {
        let task_id = insert_task(&pool, 100, 5).await;
        let store = store(pool);
        store.tasks().acquire("w:1").await.unwrap();
        store.tasks().release(task_id).await.unwrap();

        let task: crate::domain::Task = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(task.status, crate::domain::TaskStatus::Pending));
        assert!(task.worker_id.is_none());
        assert!(task.last_attempt_at.is_none());
    }

    #[sqlx::test]
    async fn release_fails_task_at_max_attempts(pool: PgPool) {
        let task_id = insert_task(&pool, 100, 1).await;
        let store = store(pool);
        store.tasks().acquire("w:1").await.unwrap();
        store.tasks().release(task_id).await.unwrap();

        let task: crate::domain::Task = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(task.status, crate::domain::TaskStatus::Failed));
    }

    #[sqlx::test]
    async fn mark_completed_sets_completed_at(pool: PgPool) {
        let task_id = insert_task(&pool, 100, 5).await;
        let store = store(pool);
        store.tasks().acquire("w:1").await.unwrap();
        store.tasks().mark_completed(task_id).await.unwrap();

        let task: crate::domain::Task = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(task.status, crate::domain::TaskStatus::Completed));
        assert!(task.completed_at.is_some());
        assert!(task.worker_id.is_none());
    }

    #[sqlx::test]
    async fn reclaim_stuck_returns_expired_processing_tasks_to_pending(pool: PgPool) {
        let task_id = insert_task(&pool, 100, 5).await;
        let store = store(pool);
        store.tasks().acquire("w:1").await.unwrap();
        sqlx::query("UPDATE tasks SET last_attempt_at = NOW() - INTERVAL '1 hour' WHERE task_id = $1")
            .bind(task_id)
            .execute(store.pool())
            .await
            .unwrap();

        let n = store.tasks().reclaim_stuck(Duration::from_secs(1)).await.unwrap();
        assert_eq!(n, 1);

        let task: crate::domain::Task = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(task.status, crate::domain::TaskStatus::Pending));
        assert!(task.worker_id.is_none());
        assert_eq!(task.attempts, 1);
    }

    #[sqlx::test]
    async fn fail_hopeless_fails_pending_tasks_at_max_attempts(pool: PgPool) {
        let task_id = insert_task(&pool, 100, 1).await;
        sqlx::query("UPDATE tasks SET attempts = 1 WHERE task_id = $1")
            .bind(task_id)
            .execute(&pool)
            .await
            .unwrap();

        let store = store(pool);
        let n = store.tasks().fail_hopeless().await.unwrap();
        assert_eq!(n, 1);

        let task: crate::domain::Task = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(task.status, crate::domain::TaskStatus::Failed));
    }
}
