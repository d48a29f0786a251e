//! Worker runtime: N concurrent scraper slots sharing one pool and one
//! shutdown signal.

mod slot;

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::collaborators::{CaptchaResolver, CardParser, DriverFactory, PageDetector};
use crate::store::StoreContext;
use slot::Slot;

pub struct WorkerPool {
    store: StoreContext,
    driver_factory: Arc<dyn DriverFactory>,
    detector: Arc<dyn PageDetector>,
    parser: Arc<dyn CardParser>,
    captcha: Arc<dyn CaptchaResolver>,
    base_worker_id: String,
    slot_count: u32,
    heartbeat_interval: Duration,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: StoreContext,
        driver_factory: Arc<dyn DriverFactory>,
        detector: Arc<dyn PageDetector>,
        parser: Arc<dyn CardParser>,
        captcha: Arc<dyn CaptchaResolver>,
        base_worker_id: String,
        slot_count: u32,
        heartbeat_interval: Duration,
    ) -> Self {
        Self { store, driver_factory, detector, parser, captcha, base_worker_id, slot_count, heartbeat_interval }
    }

    /// Spawns all slots and waits for every one of them to finish before
    /// closing the pool.
    pub async fn run(self, shutdown_tx: broadcast::Sender<()>) {
        tracing::info!(event = "app_start", workers_count = self.slot_count);

        let handles: Vec<_> = (0..self.slot_count)
            .map(|i| {
                let slot = Slot::new(
                    i,
                    &self.base_worker_id,
                    self.store.clone(),
                    self.driver_factory.clone(),
                    self.detector.clone(),
                    self.parser.clone(),
                    self.captcha.clone(),
                    self.heartbeat_interval,
                );
                let rx = shutdown_tx.subscribe();
                tokio::spawn(slot.run(rx))
            })
            .collect();

        let results = futures::future::join_all(handles).await;
        let panicked = results.iter().filter(|r| r.is_err()).count();
        if panicked > 0 {
            tracing::warn!(event = "worker_slots_panicked", count = panicked);
        }

        tracing::info!(event = "app_shutdown");
    }
}
