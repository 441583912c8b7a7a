//! Scroll-driven harvesting session.
//!
//! One session owns one page: navigate to the search URL, then repeat
//! scroll → settle → extract until the target is met, the scroll budget runs
//! out, the feed stalls, or the caller cancels. The page is closed on every
//! exit path.

use crate::extract::PostExtractor;
use crate::models::PostRecord;
use crate::nav::{navigate, NavKnobs};
use crate::surface::{PageSurface, SurfaceError};

use futures::FutureExt;
use indicatif::ProgressBar;
use std::any::Any;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};

/// How long to wait after a scroll before reading the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettleStrategy {
    Fixed(Duration),
    /// Poll the block count every `interval` until it grows or `timeout` passes.
    Poll { timeout: Duration, interval: Duration },
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Search URL with a `{query}` placeholder.
    pub search_url: String,
    pub settle: SettleStrategy,
    pub max_scrolls: usize,
    /// Consecutive passes without a new record before giving up.
    pub stall_limit: usize,
    pub nav: NavKnobs,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            search_url: "https://www.facebook.com/search/posts?q={query}".to_string(),
            settle: SettleStrategy::Fixed(Duration::from_secs(2)),
            max_scrolls: 100,
            stall_limit: 5,
            nav: NavKnobs::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Navigating,
    Scrolling,
    Waiting,
    Extracting,
    Done,
    Aborted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    TargetReached,
    ScrollBudgetExhausted,
    Stalled,
    Interrupted,
}

#[derive(Debug)]
pub struct Harvest {
    /// Admitted records in discovery order.
    pub posts: Vec<PostRecord>,
    pub stop: StopReason,
    pub scrolls: usize,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("could not open search page: {0}")]
    Navigation(#[source] SurfaceError),
    #[error("browser surface failed: {0}")]
    Surface(#[from] SurfaceError),
    #[error("session panicked: {0}")]
    Panicked(String),
}

pub fn search_url(template: &str, query: &str) -> String {
    let q: String = url::form_urlencoded::byte_serialize(query.as_bytes()).collect();
    template.replace("{query}", &q)
}

/// Stop conditions in precedence order: target, scroll budget, stall.
fn stop_condition(
    found: usize,
    max_posts: usize,
    scrolls: usize,
    max_scrolls: usize,
    idle: usize,
    stall_limit: usize,
) -> Option<StopReason> {
    if found >= max_posts {
        Some(StopReason::TargetReached)
    } else if scrolls >= max_scrolls {
        Some(StopReason::ScrollBudgetExhausted)
    } else if idle >= stall_limit.max(1) {
        Some(StopReason::Stalled)
    } else {
        None
    }
}

fn panic_message(p: &(dyn Any + Send)) -> String {
    if let Some(s) = p.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = p.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

pub struct ScrollSession {
    config: SessionConfig,
    span: Span,
    cancel: CancellationToken,
    progress: ProgressBar,
}

impl ScrollSession {
    pub fn new(config: SessionConfig, span: Span) -> Self {
        Self {
            config,
            span,
            cancel: CancellationToken::new(),
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn with_progress(mut self, pb: ProgressBar) -> Self {
        self.progress = pb;
        self
    }

    /// Runs one session on `page` and closes it afterwards, whatever happened.
    pub async fn run<P: PageSurface>(
        &self,
        page: P,
        query: &str,
        extractor: &PostExtractor,
        max_posts: usize,
    ) -> Result<Harvest, SessionError> {
        let body = AssertUnwindSafe(self.drive(&page, query, extractor, max_posts))
            .catch_unwind()
            .await;

        if let Err(e) = page.close().await {
            warn!(parent: &self.span, error = %e, "closing browser surface failed");
        }

        let res = match body {
            Ok(res) => res,
            Err(p) => Err(SessionError::Panicked(panic_message(p.as_ref()))),
        };
        match &res {
            Ok(h) => {
                self.enter(Phase::Done);
                info!(parent: &self.span, posts = h.posts.len(), scrolls = h.scrolls, stop = ?h.stop, "session finished");
            }
            Err(_) => self.enter(Phase::Aborted),
        }
        res
    }

    async fn drive<P: PageSurface>(
        &self,
        page: &P,
        query: &str,
        extractor: &PostExtractor,
        max_posts: usize,
    ) -> Result<Harvest, SessionError> {
        let cfg = &self.config;
        let url = search_url(&cfg.search_url, query);
        let block_sel = extractor.selectors().block;

        self.enter(Phase::Navigating);
        info!(parent: &self.span, %url, max_posts, "opening search");
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(Harvest { posts: vec![], stop: StopReason::Interrupted, scrolls: 0 }),
            r = navigate(page, &url, cfg.nav).instrument(self.span.clone()) => r.map_err(SessionError::Navigation)?,
        }

        if max_posts == 0 {
            return Ok(Harvest { posts: vec![], stop: StopReason::TargetReached, scrolls: 0 });
        }
        if cfg.max_scrolls == 0 {
            return Ok(Harvest { posts: vec![], stop: StopReason::ScrollBudgetExhausted, scrolls: 0 });
        }

        let mut seen: HashSet<String> = HashSet::new();
        let mut posts: Vec<PostRecord> = Vec::new();
        let mut scrolls = 0usize;
        let mut idle = 0usize;

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Harvest { posts, stop: StopReason::Interrupted, scrolls });
            }

            self.enter(Phase::Scrolling);
            let before = match cfg.settle {
                SettleStrategy::Poll { .. } => page.count(block_sel).await?,
                SettleStrategy::Fixed(_) => 0,
            };
            page.scroll().await?;
            scrolls += 1;

            self.enter(Phase::Waiting);
            if !self.settle(page, block_sel, before).await? {
                return Ok(Harvest { posts, stop: StopReason::Interrupted, scrolls });
            }

            self.enter(Phase::Extracting);
            let blocks = page.find_all(block_sel).await?;
            let pass = extractor
                .extract(&blocks, &mut seen, Some(max_posts - posts.len()))
                .await;
            let admitted = pass.records.len();
            posts.extend(pass.records);
            idle = if admitted == 0 { idle + 1 } else { 0 };

            debug!(parent: &self.span, scroll = scrolls, blocks = blocks.len(), admitted, total = posts.len(), idle, "pass done");
            self.progress.set_message(format!(
                "scroll {scrolls}/{} • {}/{max_posts} posts",
                cfg.max_scrolls,
                posts.len()
            ));

            if let Some(stop) = stop_condition(posts.len(), max_posts, scrolls, cfg.max_scrolls, idle, cfg.stall_limit) {
                return Ok(Harvest { posts, stop, scrolls });
            }
        }
    }

    /// `Ok(false)` when cancelled while waiting.
    async fn settle<P: PageSurface>(&self, page: &P, block_sel: &str, before: usize) -> Result<bool, SurfaceError> {
        match self.config.settle {
            SettleStrategy::Fixed(d) => {
                tokio::select! {
                    _ = self.cancel.cancelled() => Ok(false),
                    _ = tokio::time::sleep(d) => Ok(true),
                }
            }
            SettleStrategy::Poll { timeout, interval } => {
                let deadline = Instant::now() + timeout;
                loop {
                    tokio::select! {
                        _ = self.cancel.cancelled() => return Ok(false),
                        _ = tokio::time::sleep(interval) => {}
                    }
                    if page.count(block_sel).await? > before || Instant::now() >= deadline {
                        return Ok(true);
                    }
                }
            }
        }
    }

    fn enter(&self, phase: Phase) {
        debug!(parent: &self.span, phase = ?phase, "session phase");
    }
}
