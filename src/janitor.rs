//! Background reaper: reclaims expired leases and finalizes hopeless tasks.

use std::time::Duration;
use tracing::info;

use crate::store::StoreContext;

pub struct JanitorConfig {
    pub task_timeout: Duration,
    pub proxy_timeout: Duration,
    pub worker_timeout: Duration,
    pub cleanup_interval: Duration,
}

/// Runs the four-step sweep once, logging each step's count only when
/// nonzero, then a single summary line.
pub async fn run_cycle(store: &StoreContext, config: &JanitorConfig) -> crate::error::Result<()> {
    let tasks_released = store.tasks().reclaim_stuck(config.task_timeout).await?;
    if tasks_released > 0 {
        info!(event = "stuck_tasks_reclaimed", count = tasks_released);
    }

    let proxies_released = store.proxies().reclaim_stuck(config.proxy_timeout).await?;
    if proxies_released > 0 {
        info!(event = "stuck_proxies_reclaimed", count = proxies_released);
    }

    let workers_stopped = store.workers().stop_dead(config.worker_timeout).await?;
    if workers_stopped > 0 {
        info!(event = "dead_workers_stopped", count = workers_stopped);
    }

    let tasks_failed = store.tasks().fail_hopeless().await?;
    if tasks_failed > 0 {
        info!(event = "hopeless_tasks_failed", count = tasks_failed);
    }

    info!(
        event = "cleanup_cycle_completed",
        tasks_released,
        proxies_released,
        workers_stopped,
        tasks_failed
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::PgPool;

    fn store(pool: PgPool) -> StoreContext {
        StoreContext::new(pool, 3, Duration::from_millis(1))
    }

    fn config() -> JanitorConfig {
        JanitorConfig {
            task_timeout: Duration::from_secs(1),
            proxy_timeout: Duration::from_secs(1),
            worker_timeout: Duration::from_secs(1),
            cleanup_interval: Duration::from_secs(1),
        }
    }

    #[sqlx::test]
    async fn cycle_reclaims_every_expired_resource(pool: PgPool) {
        let store = store(pool);

        let task_id: i64 = sqlx::query_scalar("INSERT INTO tasks (item_id) VALUES (400) RETURNING task_id")
            .fetch_one(store.pool())
            .await
            .unwrap();
        store.tasks().acquire("w:1").await.unwrap();
        sqlx::query("UPDATE tasks SET last_attempt_at = NOW() - INTERVAL '1 hour' WHERE task_id = $1")
            .bind(task_id)
            .execute(store.pool())
            .await
            .unwrap();

        store.workers().heartbeat("w:1").await;
        sqlx::query("UPDATE workers SET last_heartbeat = NOW() - INTERVAL '1 hour' WHERE worker_id = 'w:1'")
            .execute(store.pool())
            .await
            .unwrap();

        run_cycle(&store, &config()).await.unwrap();

        let task: crate::domain::Task = sqlx::query_as("SELECT * FROM tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(task.status, crate::domain::TaskStatus::Pending));

        let worker: crate::domain::Worker = sqlx::query_as("SELECT * FROM workers WHERE worker_id = 'w:1'")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(worker.status, crate::domain::WorkerStatus::Stopped));
    }
}
