//! Post extraction from the rendered search feed.
//!
//! Each feed block is read through prioritized selector lists: a field takes
//! the first selector in its list that yields a non-empty value. The lists
//! track the network's current markup and are best-effort; when the layout
//! changes they are the place to fix.

use crate::count::parse_count;
use crate::models::{BlockMeta, PostRecord};
use crate::surface::{ElementSurface, SurfaceError};

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, Span};

#[derive(Debug, Clone)]
pub struct Selectors {
    pub block: &'static str,
    pub meta_attr: &'static str,
    pub page_link: &'static [&'static str],
    pub post_link: &'static [&'static str],
    pub time_link: &'static [&'static str],
    pub body: &'static [&'static str],
    pub external_link: &'static [&'static str],
    pub thumbnail: &'static [&'static str],
    pub engagement: &'static [&'static str],
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            block: "div[role='article']",
            meta_attr: "data-ft",
            page_link: &["h3 a[href*='facebook.com/']", "strong a[href*='facebook.com/']"],
            // posts, photos and shared stories each carry a different token
            post_link: &[
                "a[href*='/posts/']",
                "a[href*='pfbid']",
                "a[href*='/permalink/']",
                "a[href*='story_fbid=']",
                "a[href*='/videos/']",
            ],
            time_link: &["a[aria-label*=' at ']", "a[role='link'] time", "abbr[data-utime]"],
            body: &[
                "div[data-ad-preview='message']",
                "div[dir='auto'] span",
                "div[dir='auto']",
            ],
            external_link: &["a[rel~='noopener']", "a[rel~='nofollow']"],
            thumbnail: &["img[src][referrerpolicy]"],
            engagement: &["span[dir='auto']", "div[dir='auto']"],
        }
    }
}

const POST_ID_KEYS: &[&str] = &["top_level_post_id", "mf_story_key"];
const PAGE_ID_KEYS: &[&str] = &["page_id"];

/// Longer fragments are post prose, not counters.
const MAX_FRAGMENT_CHARS: usize = 48;

/// Why one block produced no record.
#[derive(Debug, Error)]
pub enum BlockError {
    #[error("block read failed: {0}")]
    Surface(#[from] SurfaceError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockOutcome {
    Admitted,
    Duplicate,
    Unidentifiable,
    Failed,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    pub blocks: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub unidentifiable: usize,
    pub failed: usize,
}

impl PassReport {
    fn tally(&mut self, outcome: BlockOutcome) {
        self.blocks += 1;
        match outcome {
            BlockOutcome::Admitted => self.admitted += 1,
            BlockOutcome::Duplicate => self.duplicates += 1,
            BlockOutcome::Unidentifiable => self.unidentifiable += 1,
            BlockOutcome::Failed => self.failed += 1,
        }
    }
}

#[derive(Debug, Default)]
pub struct Pass {
    pub records: Vec<PostRecord>,
    pub report: PassReport,
}

/// A parsed block before identity resolution.
#[derive(Debug)]
struct Draft {
    meta_post_id: Option<String>,
    record: PostRecord,
}

pub struct PostExtractor {
    selectors: Selectors,
    span: Span,
    clock: fn() -> i64,
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

impl PostExtractor {
    pub fn new(span: Span) -> Self {
        Self { selectors: Selectors::default(), span, clock: now_secs }
    }

    pub fn with_clock(mut self, clock: fn() -> i64) -> Self {
        self.clock = clock;
        self
    }

    pub fn selectors(&self) -> &Selectors {
        &self.selectors
    }

    /// Parses `blocks` in document order, admitting records whose id is not in
    /// `seen` (and adding it). Stops touching blocks once `limit` records were
    /// admitted in this pass.
    pub async fn extract<E: ElementSurface>(
        &self,
        blocks: &[E],
        seen: &mut HashSet<String>,
        limit: Option<usize>,
    ) -> Pass {
        let mut pass = Pass::default();
        let now = (self.clock)();

        for block in blocks {
            if limit.is_some_and(|cap| pass.records.len() >= cap) {
                break;
            }
            let outcome = match self.parse_block(block, now).await {
                Err(e) => {
                    debug!(parent: &self.span, error = %e, "skipping unparseable block");
                    BlockOutcome::Failed
                }
                Ok(draft) => match resolve_identity(draft) {
                    None => BlockOutcome::Unidentifiable,
                    Some(rec) if seen.contains(&rec.post_id) => BlockOutcome::Duplicate,
                    Some(rec) => {
                        seen.insert(rec.post_id.clone());
                        pass.records.push(rec);
                        BlockOutcome::Admitted
                    }
                },
            };
            pass.report.tally(outcome);
        }

        debug!(
            parent: &self.span,
            blocks = pass.report.blocks,
            admitted = pass.report.admitted,
            duplicates = pass.report.duplicates,
            unidentifiable = pass.report.unidentifiable,
            failed = pass.report.failed,
            "extraction pass"
        );
        pass
    }

    async fn parse_block<E: ElementSurface>(&self, block: &E, now: i64) -> Result<Draft, BlockError> {
        let sel = &self.selectors;
        let mut rec = PostRecord::default();

        let meta = match block.attr(sel.meta_attr).await? {
            Some(raw) => parse_meta(&raw).unwrap_or_else(|| {
                debug!(parent: &self.span, "malformed {} metadata ignored", sel.meta_attr);
                BlockMeta::default()
            }),
            None => BlockMeta::default(),
        };
        rec.page_id = meta.page_id;

        if let Some((link, href)) = first_with_attr(block, sel.page_link, "href").await? {
            rec.source_url = Some(href);
            rec.page_name = non_empty(link.inner_text().await?);
        }

        if let Some((_, href)) = first_with_attr(block, sel.post_link, "href").await? {
            rec.canonical_url = Some(href.clone());
            rec.post_url = Some(href);
        }

        let (text, epoch) = self.timestamp(block).await?;
        rec.published_at_text = text;
        rec.published_at_epoch = epoch.unwrap_or(now);

        rec.body_text = first_text(block, sel.body).await?;
        rec.external_link = first_with_attr(block, sel.external_link, "href").await?.map(|(_, v)| v);
        rec.thumbnail_url = first_with_attr(block, sel.thumbnail, "src").await?.map(|(_, v)| v);

        let (likes, comments, shares) = self.engagement(block).await;
        rec.like_count = likes;
        rec.comment_count = comments;
        rec.share_count = shares;

        Ok(Draft { meta_post_id: meta.post_id, record: rec })
    }

    /// Display text (datetime attribute, else visible text) and a raw
    /// `data-utime` epoch when the time node carries one. A read that fails
    /// counts as absent.
    async fn timestamp<E: ElementSurface>(&self, block: &E) -> Result<(Option<String>, Option<i64>), BlockError> {
        let Some(node) = first_element(block, self.selectors.time_link).await? else {
            return Ok((None, None));
        };

        let mut text = self.readable("datetime", node.attr("datetime").await).flatten().and_then(non_empty);
        if text.is_none() {
            text = self.readable("time text", node.inner_text().await).and_then(non_empty);
        }

        let epoch = self
            .readable("data-utime", node.attr("data-utime").await)
            .flatten()
            .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse::<i64>().ok())
            .filter(|&t| t > 0);

        Ok((text, epoch))
    }

    /// Like/comment/share counters from every short text fragment matched by
    /// any engagement selector, in document order; a later match overwrites an
    /// earlier one.
    async fn engagement<E: ElementSurface>(&self, block: &E) -> (Option<u64>, Option<u64>, Option<u64>) {
        let (mut likes, mut comments, mut shares) = (None, None, None);

        let nodes = match block.find_all(&self.selectors.engagement.join(", ")).await {
            Ok(nodes) => nodes,
            Err(e) => {
                debug!(parent: &self.span, error = %e, "engagement fragments unavailable");
                return (None, None, None);
            }
        };

        for node in nodes {
            let Ok(raw) = node.inner_text().await else { continue };
            let txt = raw.trim();
            if txt.is_empty() || txt.chars().count() > MAX_FRAGMENT_CHARS {
                continue;
            }
            let lower = txt.to_lowercase();
            let slot = if lower.contains("like") {
                &mut likes
            } else if lower.contains("comment") {
                &mut comments
            } else if lower.contains("share") {
                &mut shares
            } else {
                continue;
            };
            if let Some(n) = parse_count(txt) {
                *slot = Some(n);
            }
        }
        (likes, comments, shares)
    }

    fn readable<T>(&self, what: &str, read: Result<T, SurfaceError>) -> Option<T> {
        read.map_err(|e| debug!(parent: &self.span, error = %e, "{what} unreadable")).ok()
    }
}

/// Reads page and post ids out of the `data-ft` JSON. `None` for anything
/// that isn't a JSON object.
pub fn parse_meta(raw: &str) -> Option<BlockMeta> {
    let v: Value = serde_json::from_str(raw).ok()?;
    let obj = v.as_object()?;
    let pick = |keys: &[&str]| {
        keys.iter().find_map(|k| match obj.get(*k)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    };
    Some(BlockMeta { page_id: pick(PAGE_ID_KEYS), post_id: pick(POST_ID_KEYS) })
}

/// Stable id for posts without metadata, derived from body text and post URL.
pub fn synthesize_id(body: &str, url: &str) -> String {
    let mut h = Sha256::new();
    h.update(body.as_bytes());
    h.update([0u8]);
    h.update(url.as_bytes());
    hex::encode(&h.finalize()[..8])
}

fn resolve_identity(draft: Draft) -> Option<PostRecord> {
    let Draft { meta_post_id, mut record } = draft;
    record.post_id = match meta_post_id {
        Some(id) => id,
        None => {
            let body = record.body_text.as_deref().unwrap_or("").trim();
            let url = record.post_url.as_deref().unwrap_or("").trim();
            if body.is_empty() && url.is_empty() {
                return None;
            }
            synthesize_id(body, url)
        }
    };
    Some(record)
}

fn non_empty(s: String) -> Option<String> {
    let t = s.trim();
    if t.is_empty() {
        None
    } else {
        Some(t.to_string())
    }
}

async fn first_element<E: ElementSurface>(block: &E, sels: &[&str]) -> Result<Option<E>, SurfaceError> {
    for sel in sels {
        if let Some(el) = block.find(sel).await? {
            return Ok(Some(el));
        }
    }
    Ok(None)
}

async fn first_with_attr<E: ElementSurface>(
    block: &E,
    sels: &[&str],
    attr: &str,
) -> Result<Option<(E, String)>, SurfaceError> {
    for sel in sels {
        if let Some(el) = block.find(sel).await? {
            if let Some(v) = el.attr(attr).await?.and_then(non_empty) {
                return Ok(Some((el, v)));
            }
        }
    }
    Ok(None)
}

async fn first_text<E: ElementSurface>(block: &E, sels: &[&str]) -> Result<Option<String>, SurfaceError> {
    for sel in sels {
        if let Some(el) = block.find(sel).await? {
            if let Some(t) = non_empty(el.inner_text().await?) {
                return Ok(Some(t));
            }
        }
    }
    Ok(None)
}
