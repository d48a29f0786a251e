//! Proxy leasing operations.

use super::StoreContext;
use crate::domain::{Proxy, ProxyStatus};
use crate::error::Result;
use crate::store::retry::with_retry;
use std::time::Duration;

pub struct ProxyOps<'a> {
    ctx: &'a StoreContext,
}

impl<'a> ProxyOps<'a> {
    pub(crate) fn new(ctx: &'a StoreContext) -> Self {
        Self { ctx }
    }

    /// Atomically leases the least-used available proxy, ascending
    /// `uses_count` then `proxy_id`. Bumps
    /// `uses_count`. Returns `None` when no proxy is available.
    pub async fn acquire(&self, worker_id: &str) -> Result<Option<Proxy>> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_as::<_, Proxy>(
                r#"
                UPDATE proxies
                SET status = 'locked',
                    locked_by = $1,
                    locked_at = NOW(),
                    uses_count = uses_count + 1
                WHERE proxy_id = (
                    SELECT proxy_id FROM proxies
                    WHERE status = 'available'
                    ORDER BY uses_count ASC, proxy_id ASC
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

    /// Transitions `locked -> available`, a no-op in any other state.
    pub async fn release(&self, proxy: &str) -> Result<()> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                UPDATE proxies
                SET status = 'available', locked_by = NULL, locked_at = NULL, last_used_at = NOW()
                WHERE proxy = $1 AND status = 'locked'
                "#,
            )
            .bind(proxy)
            .execute(self.ctx.pool())
            .await
        })
        .await?;
        Ok(())
    }

    /// Transitions to the terminal `blocked` state from any state.
    pub async fn mark_blocked(&self, proxy: &str) -> Result<()> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                UPDATE proxies
                SET status = 'blocked',
                    blocks_count = blocks_count + 1,
                    locked_by = NULL,
                    locked_at = NULL
                WHERE proxy = $1
                "#,
            )
            .bind(proxy)
            .execute(self.ctx.pool())
            .await
        })
        .await?;
        Ok(())
    }

    /// Janitor step 2: returns stuck `locked` proxies to
    /// `available`. Returns the affected row count.
    pub async fn reclaim_stuck(&self, timeout: Duration) -> Result<u64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                UPDATE proxies
                SET status = 'available', locked_by = NULL, locked_at = NULL, last_used_at = NOW()
                WHERE status = 'locked'
                  AND locked_at < NOW() - ($1 * INTERVAL '1 second')
                "#,
            )
            .bind(timeout.as_secs_f64())
            .execute(self.ctx.pool())
            .await
        })
        .await
        .map(|r| r.rows_affected())
    }

    /// Per-status row counts for the status reporter.
    pub async fn status_counts(&self) -> Result<Vec<(ProxyStatus, i64)>> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_as("SELECT status, count(*) FROM proxies GROUP BY status")
                .fetch_all(self.ctx.pool())
                .await
        })
        .await
    }

    /// Count of proxies a janitor sweep would currently reclaim.
    pub async fn count_stuck(&self, timeout: Duration) -> Result<i64> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_scalar(
                "SELECT count(*) FROM proxies WHERE status = 'locked' AND locked_at < NOW() - ($1 * INTERVAL '1 second')",
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
    use crate::domain::ProxyStatus;
    use crate::store::StoreContext;
    use sqlx::PgPool;
    use std::time::Duration;

    fn store(pool: PgPool) -> StoreContext {
        StoreContext::new(pool, 3, Duration::from_millis(1))
    }

    async fn insert_proxy(pool: &PgPool, proxy: &str) -> i64 {
        sqlx::query_scalar("INSERT INTO proxies (proxy) VALUES ($1) RETURNING proxy_id")
            .bind(proxy)
            .fetch_one(pool)
            .await
            .unwrap()
    }

    #[sqlx::test]
    async fn acquire_returns_none_when_empty(pool: PgPool) {
        let store = store(pool);
        assert!(store.proxies().acquire("w:1").await.unwrap().is_none());
    }

    #[sqlx::test]
    async fn acquire_picks_least_used_first(pool: PgPool) {
        insert_proxy(&pool, "1.1.1.1:80:a:b").await;
        let p2 = insert_proxy(&pool, "2.2.2.2:80:a:b").await;

        // Bump p1's uses_count above p2's by leasing and releasing it once.
        let store = store(pool);
        let leased = store.proxies().acquire("w:1").await.unwrap().unwrap();
        store.proxies().release(&leased.proxy).await.unwrap();
        store.proxies().acquire("w:2").await.unwrap();

        let next = store.proxies().acquire("w:3").await.unwrap().unwrap();
        assert_eq!(next.proxy_id, p2);
    }

    #[sqlx::test]
    async fn mark_blocked_is_terminal_and_invisible_to_acquire(pool: PgPool) {
        insert_proxy(&pool, "1.1.1.1:80:a:b").await;
        let store = store(pool);
        let leased = store.proxies().acquire("w:1").await.unwrap().unwrap();
        store.proxies().mark_blocked(&leased.proxy).await.unwrap();

        assert!(store.proxies().acquire("w:2").await.unwrap().is_none());

        let row: crate::domain::Proxy = sqlx::query_as("SELECT * FROM proxies WHERE proxy_id = $1")
            .bind(leased.proxy_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(row.status, ProxyStatus::Blocked));
        assert_eq!(row.blocks_count, 1);
        assert!(row.locked_by.is_none());
    }

    #[sqlx::test]
    async fn release_is_noop_when_not_locked(pool: PgPool) {
        let id = insert_proxy(&pool, "1.1.1.1:80:a:b").await;
        let store = store(pool);
        store.proxies().release("1.1.1.1:80:a:b").await.unwrap();

        let row: crate::domain::Proxy = sqlx::query_as("SELECT * FROM proxies WHERE proxy_id = $1")
            .bind(id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(row.status, ProxyStatus::Available));
    }

    #[sqlx::test]
    async fn reclaim_stuck_returns_expired_locked_proxies(pool: PgPool) {
        insert_proxy(&pool, "1.1.1.1:80:a:b").await;
        let store = store(pool);
        let leased = store.proxies().acquire("w:1").await.unwrap().unwrap();
        sqlx::query("UPDATE proxies SET locked_at = NOW() - INTERVAL '1 hour' WHERE proxy_id = $1")
            .bind(leased.proxy_id)
            .execute(store.pool())
            .await
            .unwrap();

        let n = store.proxies().reclaim_stuck(Duration::from_secs(1)).await.unwrap();
        assert_eq!(n, 1);

        let row: crate::domain::Proxy = sqlx::query_as("SELECT * FROM proxies WHERE proxy_id = $1")
            .bind(leased.proxy_id)
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert!(matches!(row.status, ProxyStatus::Available));
        assert!(row.locked_by.is_none());
    }
}
