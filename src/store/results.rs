//! Parsed-listing upsert.

use super::StoreContext;
use crate::domain::{ResultStatus, ScrapeResult};
use crate::error::Result;
use crate::store::retry::with_retry;

pub struct ResultOps<'a> {
    ctx: &'a StoreContext,
}

impl<'a> ResultOps<'a> {
    pub(crate) fn new(ctx: &'a StoreContext) -> Self {
        Self { ctx }
    }

    /// Upsert keyed by `item_id`; on conflict, overwrites all content columns
    /// and bumps `updated_at`.
    pub async fn save(&self, result: &ScrapeResult) -> Result<()> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query(
                r#"
                INSERT INTO results (
                    item_id, title, description, characteristics, price,
                    published_at, seller_name, seller_profile_url,
                    location_address, location_metro, location_region,
                    views_total, status, failure_reason, worker_id, attempts
                ) VALUES (
                    $1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16
                )
                ON CONFLICT (item_id) DO UPDATE SET
                    title = EXCLUDED.title,
                    description = EXCLUDED.description,
                    characteristics = EXCLUDED.characteristics,
                    price = EXCLUDED.price,
                    published_at = EXCLUDED.published_at,
                    seller_name = EXCLUDED.seller_name,
                    seller_profile_url = EXCLUDED.seller_profile_url,
                    location_address = EXCLUDED.location_address,
                    location_metro = EXCLUDED.location_metro,
                    location_region = EXCLUDED.location_region,
                    views_total = EXCLUDED.views_total,
                    status = EXCLUDED.status,
                    failure_reason = EXCLUDED.failure_reason,
                    worker_id = EXCLUDED.worker_id,
                    attempts = EXCLUDED.attempts,
                    updated_at = NOW()
                "#,
            )
            .bind(result.item_id)
            .bind(&result.title)
            .bind(&result.description)
            .bind(&result.characteristics)
            .bind(result.price)
            .bind(result.published_at)
            .bind(&result.seller_name)
            .bind(&result.seller_profile_url)
            .bind(&result.location_address)
            .bind(&result.location_metro)
            .bind(&result.location_region)
            .bind(result.views_total)
            .bind(result.status)
            .bind(&result.failure_reason)
            .bind(&result.worker_id)
            .bind(result.attempts)
            .execute(self.ctx.pool())
            .await
        })
        .await?;
        Ok(())
    }

    /// Per-status row counts for the status reporter.
    pub async fn status_counts(&self) -> Result<Vec<(ResultStatus, i64)>> {
        with_retry(self.ctx.retry_attempts, self.ctx.retry_delay, || async {
            sqlx::query_as("SELECT status, count(*) FROM results WHERE status IS NOT NULL GROUP BY status")
                .fetch_all(self.ctx.pool())
                .await
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{ResultStatus, ScrapeResult};
    use crate::store::StoreContext;
    use rust_decimal::Decimal;
    use sqlx::PgPool;
    use std::str::FromStr;
    use std::time::Duration;

    fn store(pool: PgPool) -> StoreContext {
        StoreContext::new(pool, 3, Duration::from_millis(1))
    }

    fn result(item_id: i64, title: &str) -> ScrapeResult {
        ScrapeResult {
            item_id,
            title: Some(title.to_string()),
            price: Some(Decimal::from_str("1999.00").unwrap()),
            status: Some(ResultStatus::Success),
            worker_id: "w:1".to_string(),
            attempts: 1,
            ..Default::default()
        }
    }

    #[sqlx::test]
    async fn save_inserts_new_result(pool: PgPool) {
        let store = store(pool);
        store.results().save(&result(100, "first")).await.unwrap();

        let (title,): (Option<String>,) =
            sqlx::query_as("SELECT title FROM results WHERE item_id = $1")
                .bind(100i64)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(title.as_deref(), Some("first"));
    }

    #[sqlx::test]
    async fn save_is_idempotent_on_item_id(pool: PgPool) {
        let store = store(pool);
        store.results().save(&result(100, "first")).await.unwrap();
        store.results().save(&result(100, "second")).await.unwrap();

        let rows: Vec<(i64,)> = sqlx::query_as("SELECT item_id FROM results WHERE item_id = $1")
            .bind(100i64)
            .fetch_all(store.pool())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);

        let (title,): (Option<String>,) =
            sqlx::query_as("SELECT title FROM results WHERE item_id = $1")
                .bind(100i64)
                .fetch_one(store.pool())
                .await
                .unwrap();
        assert_eq!(title.as_deref(), Some("second"));
    }
}
