//! One scraper slot: registration, heartbeat, task acquisition, proxy
//! rotation.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::collaborators::{CaptchaResolver, CardParser, Driver, DriverFactory, PageDetector};
use crate::domain::{ScrapeOutcome, parse_proxy};
use crate::statemachine::{LeaseContext, decide};
use crate::store::StoreContext;

/// Site-specific URL construction is out of scope; this is a
/// placeholder template, not part of the driver contract.
const LISTING_URL_TEMPLATE: &str = "https://listings.internal/items";
const GOTO_TIMEOUT: Duration = Duration::from_secs(30);

struct LeasedProxy {
    proxy: String,
    driver: Box<dyn Driver>,
}

pub struct Slot {
    pub worker_id: String,
    store: StoreContext,
    driver_factory: Arc<dyn DriverFactory>,
    detector: Arc<dyn PageDetector>,
    parser: Arc<dyn CardParser>,
    captcha: Arc<dyn CaptchaResolver>,
    heartbeat_interval: Duration,
    display: u32,
}

impl Slot {
    pub fn new(
        index: u32,
        base_worker_id: &str,
        store: StoreContext,
        driver_factory: Arc<dyn DriverFactory>,
        detector: Arc<dyn PageDetector>,
        parser: Arc<dyn CardParser>,
        captcha: Arc<dyn CaptchaResolver>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self {
            worker_id: format!("{base_worker_id}:{index}"),
            store,
            driver_factory,
            detector,
            parser,
            captcha,
            heartbeat_interval,
            display: index,
        }
    }

    /// Runs until drained, shut down, or a DB error exhausts its retry
    /// budget.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) {
        info!(event = "worker_start", worker_id = %self.worker_id);

        // Registration: the store's own heartbeat already retries internally
        // and never surfaces a failure, so there is no distinct registration-failed path
        // left to observe here.
        self.store.workers().heartbeat(&self.worker_id).await;
        info!(event = "worker_registered", worker_id = %self.worker_id);

        let mut leased = match self.acquire_proxy_and_driver().await {
            Some(p) => p,
            None => {
                warn!(event = "worker_start_aborted", worker_id = %self.worker_id);
                return;
            }
        };

        let mut last_beat = Instant::now();

        'main: loop {
            if shutdown.try_recv().is_ok() {
                break;
            }
            if last_beat.elapsed() > self.heartbeat_interval {
                self.store.workers().heartbeat(&self.worker_id).await;
                last_beat = Instant::now();
            }

            let task = match self.store.tasks().acquire(&self.worker_id).await {
                Ok(Some(task)) => task,
                Ok(None) => {
                    info!(event = "worker_no_tasks", worker_id = %self.worker_id);
                    break;
                }
                Err(e) => {
                    error!(event = "worker_fatal_error", worker_id = %self.worker_id, error = %e);
                    break;
                }
            };

            info!(
                event = "task_start",
                item_id = task.item_id,
                proxy = %leased.proxy,
                worker_id = %self.worker_id,
                attempt = task.attempts
            );

            let url = format!("{LISTING_URL_TEMPLATE}/{}", task.item_id);
            let outcome = match leased.driver.goto(&url, GOTO_TIMEOUT).await {
                Ok(()) => {
                    let ctx =
                        LeaseContext { item_id: task.item_id, attempts: task.attempts, worker_id: self.worker_id.clone() };
                    decide(leased.driver.as_ref(), self.detector.as_ref(), self.parser.as_ref(), self.captcha.as_ref(), &ctx)
                        .await
                }
                Err(e) => {
                    warn!(event = "worker_navigation_error", item_id = task.item_id, worker_id = %self.worker_id, error = %e);
                    ScrapeOutcome::Error {
                        reason: crate::domain::FailureReason::NavigationError,
                        rotate_proxy: true,
                    }
                }
            };

            if outcome.rotate_proxy() {
                if self.store.proxies().mark_blocked(&leased.proxy).await.is_err() {
                    error!(event = "worker_fatal_error", worker_id = %self.worker_id);
                    self.store.tasks().release(task.task_id).await.ok();
                    break 'main;
                }
                leased.driver.close().await;
                // releaseProxy is deliberately skipped: mark_blocked already
                // cleared the lease fields and blocked is terminal.
                leased = match self.acquire_proxy_and_driver().await {
                    Some(p) => p,
                    None => {
                        warn!(event = "worker_no_proxy_after_rotation", worker_id = %self.worker_id);
                        self.store.tasks().release(task.task_id).await.ok();
                        break;
                    }
                };
            }

            match outcome {
                ScrapeOutcome::Success(result) | ScrapeOutcome::Unavailable(result) => {
                    if let Err(e) = self.store.results().save(&result).await {
                        error!(event = "worker_fatal_error", worker_id = %self.worker_id, error = %e);
                        break;
                    }
                    if let Err(e) = self.store.tasks().mark_completed(task.task_id).await {
                        error!(event = "worker_fatal_error", worker_id = %self.worker_id, error = %e);
                        break;
                    }
                    self.store.workers().increment_stats(&self.worker_id, true).await.ok();
                    info!(event = "task_success", item_id = task.item_id, proxy = %leased.proxy, worker_id = %self.worker_id);
                }
                ScrapeOutcome::Error { reason, .. } => {
                    if let Err(e) = self.store.tasks().release(task.task_id).await {
                        error!(event = "worker_fatal_error", worker_id = %self.worker_id, error = %e);
                        break;
                    }
                    self.store.workers().increment_stats(&self.worker_id, false).await.ok();
                    warn!(event = "task_error", item_id = task.item_id, worker_id = %self.worker_id, reason = %reason);
                }
            }
        }

        leased.driver.close().await;
        self.store.proxies().release(&leased.proxy).await.ok();
        info!(event = "worker_shutdown", worker_id = %self.worker_id);
    }

    async fn acquire_proxy_and_driver(&self) -> Option<LeasedProxy> {
        let proxy = match self.store.proxies().acquire(&self.worker_id).await {
            Ok(Some(p)) => p,
            Ok(None) => return None,
            Err(e) => {
                error!(event = "worker_fatal_error", worker_id = %self.worker_id, error = %e);
                return None;
            }
        };

        let triple = parse_proxy(&proxy.proxy)?;
        let driver = self.driver_factory.build(&triple, self.display).await.ok()?;
        info!(event = "worker_page_ready", worker_id = %self.worker_id, proxy = %proxy.proxy, display = self.display);
        Some(LeasedProxy { proxy: proxy.proxy, driver })
    }
}
