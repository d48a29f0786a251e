//! Read-only fleet health aggregator: four grouped-count
//! queries plus three staleness queries, rendered as a single report.
//!
//! Grounded in the original `status.py`'s four-section layout (TASKS /
//! PROXIES / WORKERS / SYSTEM HEALTH), recovered from its retained
//! docstrings. Distinct from an in-process health registry
//! (`ServiceStatusRegistry`), which has no read-only-DB-report counterpart
//! here.

use crate::config::Config;
use crate::domain::{ProxyStatus, ResultStatus, TaskStatus, WorkerStatus};
use crate::error::Result;
use crate::store::StoreContext;

/// One snapshot of fleet health, gathered in a single pass.
#[derive(Debug, Default)]
pub struct StatusReport {
    pub task_counts: Vec<(TaskStatus, i64)>,
    pub proxy_counts: Vec<(ProxyStatus, i64)>,
    pub worker_counts: Vec<(WorkerStatus, i64)>,
    pub result_counts: Vec<(ResultStatus, i64)>,
    pub stuck_tasks: i64,
    pub stuck_proxies: i64,
    pub dead_workers: i64,
}

/// Gathers the report. Uses the same staleness thresholds as the janitor
///, sourced from `config`.
pub async fn gather(store: &StoreContext, config: &Config) -> Result<StatusReport> {
    Ok(StatusReport {
        task_counts: store.tasks().status_counts().await?,
        proxy_counts: store.proxies().status_counts().await?,
        worker_counts: store.workers().status_counts().await?,
        result_counts: store.results().status_counts().await?,
        stuck_tasks: store.tasks().count_stuck(config.task_timeout).await?,
        stuck_proxies: store.proxies().count_stuck(config.proxy_timeout).await?,
        dead_workers: store.workers().count_dead(config.worker_timeout).await?,
    })
}

fn task_status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Processing => "processing",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn proxy_status_label(status: ProxyStatus) -> &'static str {
    match status {
        ProxyStatus::Available => "available",
        ProxyStatus::Locked => "locked",
        ProxyStatus::Blocked => "blocked",
    }
}

fn worker_status_label(status: WorkerStatus) -> &'static str {
    match status {
        WorkerStatus::Active => "active",
        WorkerStatus::Stopped => "stopped",
    }
}

fn result_status_label(status: ResultStatus) -> &'static str {
    match status {
        ResultStatus::Success => "success",
        ResultStatus::Unavailable => "unavailable",
    }
}

impl StatusReport {
    /// Renders the four-section report the original `status.py` prints.
    pub fn format(&self) -> String {
        let mut out = String::new();

        out.push_str("=== TASKS ===\n");
        for (status, count) in &self.task_counts {
            out.push_str(&format!("  {:<12} {}\n", task_status_label(*status), count));
        }

        out.push_str("=== PROXIES ===\n");
        for (status, count) in &self.proxy_counts {
            out.push_str(&format!("  {:<12} {}\n", proxy_status_label(*status), count));
        }

        out.push_str("=== WORKERS ===\n");
        for (status, count) in &self.worker_counts {
            out.push_str(&format!("  {:<12} {}\n", worker_status_label(*status), count));
        }

        out.push_str("=== RESULTS ===\n");
        for (status, count) in &self.result_counts {
            out.push_str(&format!("  {:<12} {}\n", result_status_label(*status), count));
        }

        out.push_str("=== SYSTEM HEALTH ===\n");
        out.push_str(&format!("  stuck_tasks   {}\n", self.stuck_tasks));
        out.push_str(&format!("  stuck_proxies {}\n", self.stuck_proxies));
        out.push_str(&format!("  dead_workers  {}\n", self.dead_workers));

        out
    }
}
