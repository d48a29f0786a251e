//! External collaborators this crate drives but does not implement: the
//! browser automation driver, the page-state detector, the card parser, and
//! the CAPTCHA resolver.

use async_trait::async_trait;
use std::time::Duration;

use crate::domain::{CardData, PageState, ProxyTriple};

#[async_trait]
pub trait Driver: Send + Sync {
    /// Navigates to `url`, bound to the proxy and display namespace this
    /// driver was constructed with. Times out per the configured navigation
    /// timeout (30s default).
    async fn goto(&self, url: &str, timeout: Duration) -> anyhow::Result<()>;

    /// Returns the current page HTML.
    async fn content(&self) -> anyhow::Result<String>;

    /// Tears the driver down. Errors are swallowed by the caller.
    async fn close(&self);
}

/// Constructs a `Driver` bound to one proxy and one isolated display slot.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn build(&self, proxy: &ProxyTriple, display: u32) -> anyhow::Result<Box<dyn Driver>>;
}

#[async_trait]
pub trait PageDetector: Send + Sync {
    /// Classifies the current page into one label from `priority`, highest
    /// priority first.
    async fn detect(&self, page: &dyn Driver, priority: &[PageState]) -> anyhow::Result<PageState>;
}

pub trait CardParser: Send + Sync {
    /// Extracts `fields` from `html`.
    fn parse(&self, html: &str, fields: &[&str]) -> anyhow::Result<CardData>;
}

#[async_trait]
pub trait CaptchaResolver: Send + Sync {
    /// Attempts to resolve a CAPTCHA/continue-button/soft-block state, up to
    /// `max_attempts` tries. Returns the page state after the last attempt
    /// (if re-detection happened) and whether resolution succeeded.
    async fn resolve(&self, page: &dyn Driver, max_attempts: u32) -> (Option<PageState>, bool);
}
