//! Persisted entities and the scraper decision types.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value as Json;
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "task_status", rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "proxy_status", rename_all = "lowercase")]
pub enum ProxyStatus {
    Available,
    Locked,
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "worker_status", rename_all = "lowercase")]
pub enum WorkerStatus {
    Active,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "result_status", rename_all = "lowercase")]
pub enum ResultStatus {
    Success,
    Unavailable,
}

#[derive(Debug, Clone, FromRow)]
pub struct Task {
    pub task_id: i64,
    pub item_id: i64,
    pub status: TaskStatus,
    pub attempts: i32,
    pub max_attempts: i32,
    pub worker_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Proxy {
    pub proxy_id: i64,
    pub proxy: String,
    pub status: ProxyStatus,
    pub locked_by: Option<String>,
    pub locked_at: Option<DateTime<Utc>>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub uses_count: i64,
    pub blocks_count: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Worker {
    pub worker_id: String,
    pub status: WorkerStatus,
    pub last_heartbeat: DateTime<Utc>,
    pub tasks_processed: i64,
    pub tasks_failed: i64,
    pub started_at: DateTime<Utc>,
}

/// One parsed listing, keyed by `item_id`.
#[derive(Debug, Clone, Default)]
pub struct ScrapeResult {
    pub item_id: i64,
    pub title: Option<String>,
    pub description: Option<String>,
    pub characteristics: Option<Json>,
    pub price: Option<Decimal>,
    pub published_at: Option<DateTime<Utc>>,
    pub seller_name: Option<String>,
    pub seller_profile_url: Option<String>,
    pub location_address: Option<String>,
    pub location_metro: Option<String>,
    pub location_region: Option<String>,
    pub views_total: Option<i64>,
    pub status: Option<ResultStatus>,
    pub failure_reason: Option<String>,
    pub worker_id: String,
    pub attempts: i32,
}

/// Proxy connection triple handed to the driver collaborator.
#[derive(Debug, Clone)]
pub struct ProxyTriple {
    pub server: String,
    pub username: String,
    pub password: String,
}

/// Splits `host:port:user:pass` the way `upload-proxies` validates input and the
/// worker runtime prepares a driver's proxy argument.
pub fn parse_proxy(proxy: &str) -> Option<ProxyTriple> {
    let parts: Vec<&str> = proxy.split(':').collect();
    if parts.len() != 4 {
        return None;
    }
    Some(ProxyTriple {
        server: format!("{}:{}", parts[0], parts[1]),
        username: parts[2].to_string(),
        password: parts[3].to_string(),
    })
}

/// Page state labels returned by the detector collaborator, in priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    ProxyBlock403,
    ProxyAuth407,
    ProxyBlock429,
    Captcha,
    Removed,
    SellerProfile,
    Catalog,
    CardFound,
    ContinueButton,
}

pub const DETECTION_PRIORITY: [PageState; 9] = [
    PageState::ProxyBlock403,
    PageState::ProxyAuth407,
    PageState::ProxyBlock429,
    PageState::Captcha,
    PageState::Removed,
    PageState::SellerProfile,
    PageState::Catalog,
    PageState::CardFound,
    PageState::ContinueButton,
];

/// Fields the card parser collaborator is asked to extract.
pub const CARD_FIELDS: &[&str] = &[
    "title",
    "description",
    "characteristics",
    "price",
    "seller",
    "item_id",
    "published_at",
    "location",
    "views_total",
];

#[derive(Debug, Clone, Default)]
pub struct CardData {
    pub item_id: Option<i64>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub characteristics: Option<Json>,
    pub raw_price: Option<String>,
    pub seller_name: Option<String>,
    pub seller_profile_url: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub location_address: Option<String>,
    pub location_metro: Option<String>,
    pub location_region: Option<String>,
    pub raw_views_total: Option<String>,
}

/// The reason a task error occurred, replacing a plain string key with a
/// closed set of variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    ProxyBlockedHttp403,
    ProxyBlockedHttp407,
    CaptchaUnsolved,
    UnexpectedState(String),
    DetectionError,
    ParseCardError,
    NavigationError,
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::ProxyBlockedHttp403 => write!(f, "proxy_blocked_http_403"),
            FailureReason::ProxyBlockedHttp407 => write!(f, "proxy_blocked_http_407"),
            FailureReason::CaptchaUnsolved => write!(f, "captcha_unsolved"),
            FailureReason::UnexpectedState(label) => write!(f, "unexpected_state_{label}"),
            FailureReason::DetectionError => write!(f, "detection_error"),
            FailureReason::ParseCardError => write!(f, "parse_card_error"),
            FailureReason::NavigationError => write!(f, "navigation_error"),
        }
    }
}

/// The state machine's decision for one lease.
#[derive(Debug, Clone)]
pub enum ScrapeOutcome {
    Success(ScrapeResult),
    Unavailable(ScrapeResult),
    Error {
        reason: FailureReason,
        rotate_proxy: bool,
    },
}

impl ScrapeOutcome {
    pub fn is_terminal_success(&self) -> bool {
        matches!(self, ScrapeOutcome::Success(_) | ScrapeOutcome::Unavailable(_))
    }

    pub fn rotate_proxy(&self) -> bool {
        matches!(self, ScrapeOutcome::Error { rotate_proxy: true, .. })
    }
}
