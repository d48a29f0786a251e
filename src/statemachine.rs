//! Per-lease decision table: given a detected page state,
//! decide between save / retry / proxy-rotate.

use rust_decimal::Decimal;
use std::str::FromStr;
use tracing::warn;

use crate::collaborators::{CaptchaResolver, CardParser, Driver, PageDetector};
use crate::domain::{
    CARD_FIELDS, CardData, DETECTION_PRIORITY, FailureReason, PageState, ScrapeOutcome,
    ScrapeResult, ResultStatus,
};

/// Everything the state machine needs about the lease being processed, but
/// none of the store access — it is driven purely by what's passed in.
pub struct LeaseContext {
    pub item_id: i64,
    pub attempts: i32,
    pub worker_id: String,
}

/// Runs the full per-page decision table for one lease, including the
/// CAPTCHA-resolution recursion and card parsing.
pub async fn decide(
    page: &dyn Driver,
    detector: &dyn PageDetector,
    parser: &dyn CardParser,
    captcha: &dyn CaptchaResolver,
    ctx: &LeaseContext,
) -> ScrapeOutcome {
    let detected = match detector.detect(page, &DETECTION_PRIORITY).await {
        Ok(state) => state,
        Err(e) => {
            warn!(event = "detection_error", item_id = ctx.item_id, worker_id = %ctx.worker_id, error = %e);
            return ScrapeOutcome::Error {
                reason: FailureReason::DetectionError,
                rotate_proxy: true,
            };
        }
    };
    tracing::debug!(event = "worker_detect_state", item_id = ctx.item_id, worker_id = %ctx.worker_id, state = ?detected);
    dispatch(detected, page, detector, parser, captcha, ctx).await
}

async fn dispatch(
    detected: PageState,
    page: &dyn Driver,
    detector: &dyn PageDetector,
    parser: &dyn CardParser,
    captcha: &dyn CaptchaResolver,
    ctx: &LeaseContext,
) -> ScrapeOutcome {
    match detected {
        PageState::ProxyBlock403 => {
            warn!(event = "proxy_blocked", item_id = ctx.item_id, worker_id = %ctx.worker_id, reason = "http_403");
            ScrapeOutcome::Error { reason: FailureReason::ProxyBlockedHttp403, rotate_proxy: true }
        }
        PageState::ProxyAuth407 => {
            warn!(event = "proxy_blocked", item_id = ctx.item_id, worker_id = %ctx.worker_id, reason = "http_407");
            ScrapeOutcome::Error { reason: FailureReason::ProxyBlockedHttp407, rotate_proxy: true }
        }
        PageState::ProxyBlock429 | PageState::Captcha | PageState::ContinueButton => {
            handle_captcha(page, detector, parser, captcha, ctx).await
        }
        PageState::CardFound => handle_card_found(page, parser, ctx).await,
        PageState::Removed => handle_removed(ctx),
        PageState::SellerProfile => handle_unexpected("seller_profile", ctx),
        PageState::Catalog => handle_unexpected("catalog", ctx),
    }
}

/// Invokes the CAPTCHA resolver (at most 3 attempts); on success
/// re-detects once and dispatches the re-detected state. Resolver failure is
/// an error outcome with `rotate_proxy=true`.
async fn handle_captcha(
    page: &dyn Driver,
    detector: &dyn PageDetector,
    parser: &dyn CardParser,
    captcha: &dyn CaptchaResolver,
    ctx: &LeaseContext,
) -> ScrapeOutcome {
    const MAX_CAPTCHA_ATTEMPTS: u32 = 3;
    let (resolved_state, solved) = captcha.resolve(page, MAX_CAPTCHA_ATTEMPTS).await;
    if !solved {
        warn!(event = "captcha_failed", item_id = ctx.item_id, worker_id = %ctx.worker_id);
        return ScrapeOutcome::Error {
            reason: FailureReason::CaptchaUnsolved,
            rotate_proxy: true,
        };
    }

    let state = match resolved_state {
        Some(s) => s,
        None => match detector.detect(page, &DETECTION_PRIORITY).await {
            Ok(s) => s,
            Err(e) => {
                warn!(event = "detection_error", item_id = ctx.item_id, worker_id = %ctx.worker_id, error = %e);
                return ScrapeOutcome::Error {
                    reason: FailureReason::DetectionError,
                    rotate_proxy: true,
                };
            }
        },
    };
    tracing::info!(event = "captcha_resolved", item_id = ctx.item_id, worker_id = %ctx.worker_id, new_state = ?state);

    match state {
        PageState::CardFound => handle_card_found(page, parser, ctx).await,
        PageState::Removed => handle_removed(ctx),
        _ => ScrapeOutcome::Error {
            reason: FailureReason::CaptchaUnsolved,
            rotate_proxy: false,
        },
    }
}

async fn handle_card_found(page: &dyn Driver, parser: &dyn CardParser, ctx: &LeaseContext) -> ScrapeOutcome {
    let html = match page.content().await {
        Ok(html) => html,
        Err(_) => {
            warn!(event = "task_parse_error", item_id = ctx.item_id, worker_id = %ctx.worker_id, error = "content_unavailable");
            return ScrapeOutcome::Error {
                reason: FailureReason::ParseCardError,
                rotate_proxy: false,
            };
        }
    };

    let card = match parser.parse(&html, CARD_FIELDS) {
        Ok(card) => card,
        Err(e) => {
            warn!(event = "task_parse_error", item_id = ctx.item_id, worker_id = %ctx.worker_id, error = %e);
            return ScrapeOutcome::Error {
                reason: FailureReason::ParseCardError,
                rotate_proxy: false,
            };
        }
    };

    if let Some(parsed_id) = card.item_id {
        if parsed_id != ctx.item_id {
            warn!(event = "task_item_mismatch", item_id = ctx.item_id, card_item_id = parsed_id);
        }
    }

    ScrapeOutcome::Success(build_result(card, ctx, ResultStatus::Success))
}

fn handle_removed(ctx: &LeaseContext) -> ScrapeOutcome {
    tracing::info!(event = "task_missing", item_id = ctx.item_id, worker_id = %ctx.worker_id);
    ScrapeOutcome::Unavailable(build_result(CardData::default(), ctx, ResultStatus::Unavailable))
}

fn handle_unexpected(label: &str, ctx: &LeaseContext) -> ScrapeOutcome {
    warn!(event = "unexpected_state", item_id = ctx.item_id, worker_id = %ctx.worker_id, state = label);
    ScrapeOutcome::Error {
        reason: FailureReason::UnexpectedState(label.to_string()),
        rotate_proxy: false,
    }
}

fn build_result(card: CardData, ctx: &LeaseContext, status: ResultStatus) -> ScrapeResult {
    ScrapeResult {
        item_id: ctx.item_id,
        title: card.title,
        description: card.description,
        characteristics: card.characteristics,
        price: card.raw_price.as_deref().and_then(normalize_price),
        published_at: card.published_at,
        seller_name: card.seller_name,
        seller_profile_url: card.seller_profile_url,
        location_address: card.location_address,
        location_metro: card.location_metro,
        location_region: card.location_region,
        views_total: card.raw_views_total.as_deref().and_then(to_int),
        status: Some(status),
        failure_reason: None,
        worker_id: ctx.worker_id.clone(),
        attempts: ctx.attempts,
    }
}

/// Coerces a raw price string to fixed-point scale 2; `None` on any failure,
/// never an error outcome.
fn normalize_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-').collect();
    Decimal::from_str(&cleaned).ok().map(|d| d.round_dp(2))
}

/// Coerces a raw views-total string to an integer; `None` on failure.
fn to_int(raw: &str) -> Option<i64> {
    let cleaned: String = raw.chars().filter(|c| c.is_ascii_digit() || *c == '-').collect();
    cleaned.parse().ok()
}
