//! In-memory page/element surfaces with scripted feeds, for unit tests.

use crate::surface::{ElementSurface, PageSurface, SurfaceError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// A DOM node whose children are keyed by the exact selector that finds them.
/// A grouped query (`a, b`) returns children matching any part, in insertion
/// order.
#[derive(Debug, Clone, Default)]
pub struct FakeElement {
    attrs: HashMap<String, String>,
    text: String,
    children: Vec<(String, FakeElement)>,
    broken: bool,
    reads: Arc<AtomicUsize>,
}

impl FakeElement {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, value: &str) -> Self {
        self.attrs.insert(name.to_string(), value.to_string());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.to_string();
        self
    }

    pub fn child(mut self, selector: &str, el: FakeElement) -> Self {
        self.children.push((selector.to_string(), el));
        self
    }

    /// Every attribute read on this node fails.
    pub fn broken(mut self) -> Self {
        self.broken = true;
        self
    }

    fn share_counter(&mut self, reads: &Arc<AtomicUsize>) {
        self.reads = reads.clone();
        for (_, c) in self.children.iter_mut() {
            c.share_counter(reads);
        }
    }

    fn touch(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ElementSurface for FakeElement {
    async fn attr(&self, name: &str) -> Result<Option<String>, SurfaceError> {
        self.touch();
        if self.broken {
            return Err(SurfaceError::Query(format!("stale element reading {name}")));
        }
        Ok(self.attrs.get(name).cloned())
    }

    async fn inner_text(&self) -> Result<String, SurfaceError> {
        self.touch();
        Ok(self.text.clone())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeElement>, SurfaceError> {
        self.touch();
        Ok(self
            .children
            .iter()
            .filter(|(s, _)| selector.split(',').any(|part| part.trim() == s))
            .map(|(_, c)| c.clone())
            .collect())
    }
}

/// Shared view into a `FakePage` that survives `close(self)`.
#[derive(Debug, Clone, Default)]
pub struct Probe {
    pub closed: Arc<AtomicBool>,
    pub scrolls: Arc<AtomicUsize>,
    pub reads: Arc<AtomicUsize>,
    pub visited: Arc<Mutex<Vec<String>>>,
}

impl Probe {
    pub fn closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn scrolls(&self) -> usize {
        self.scrolls.load(Ordering::SeqCst)
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn visited(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }
}

/// `feeds[i]` is what the block selector returns after scroll `i + 1`;
/// before the first scroll nothing is rendered, past the last feed the last
/// one stays on screen.
pub struct FakePage {
    block_selector: String,
    feeds: Vec<Vec<FakeElement>>,
    probe: Probe,
    title: String,
    goto_fails: usize,
    scroll_fails_at: Option<usize>,
    panic_at: Option<usize>,
}

impl FakePage {
    pub fn new(block_selector: &str, mut feeds: Vec<Vec<FakeElement>>) -> Self {
        let probe = Probe::default();
        for feed in feeds.iter_mut() {
            for el in feed.iter_mut() {
                el.share_counter(&probe.reads);
            }
        }
        Self {
            block_selector: block_selector.to_string(),
            feeds,
            probe,
            title: "Search results".to_string(),
            goto_fails: 0,
            scroll_fails_at: None,
            panic_at: None,
        }
    }

    pub fn probe(&self) -> Probe {
        self.probe.clone()
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    /// The first `n` navigations fail.
    pub fn failing_goto(mut self, n: usize) -> Self {
        self.goto_fails = n;
        self
    }

    /// Scroll number `n` (1-based) reports a dead session.
    pub fn failing_scroll_at(mut self, n: usize) -> Self {
        self.scroll_fails_at = Some(n);
        self
    }

    pub fn panicking_scroll_at(mut self, n: usize) -> Self {
        self.panic_at = Some(n);
        self
    }

    fn current_feed(&self) -> Vec<FakeElement> {
        let scrolls = self.probe.scrolls();
        if scrolls == 0 || self.feeds.is_empty() {
            return vec![];
        }
        let idx = (scrolls - 1).min(self.feeds.len() - 1);
        self.feeds[idx].clone()
    }
}

#[async_trait]
impl PageSurface for FakePage {
    type Element = FakeElement;

    async fn goto(&self, url: &str) -> Result<(), SurfaceError> {
        let attempt = {
            let mut visited = self.probe.visited.lock().unwrap();
            visited.push(url.to_string());
            visited.len()
        };
        if attempt <= self.goto_fails {
            return Err(SurfaceError::Navigation {
                url: url.to_string(),
                reason: "net::ERR_CONNECTION_RESET".into(),
            });
        }
        Ok(())
    }

    async fn title(&self) -> Result<String, SurfaceError> {
        Ok(self.title.clone())
    }

    async fn source(&self) -> Result<String, SurfaceError> {
        Ok(format!("<html><head><title>{}</title></head></html>", self.title))
    }

    async fn scroll(&self) -> Result<(), SurfaceError> {
        let n = self.probe.scrolls.fetch_add(1, Ordering::SeqCst) + 1;
        if self.panic_at == Some(n) {
            panic!("renderer crashed on scroll {n}");
        }
        if self.scroll_fails_at == Some(n) {
            return Err(SurfaceError::Closed("invalid session id".into()));
        }
        Ok(())
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<FakeElement>, SurfaceError> {
        if selector == self.block_selector {
            Ok(self.current_feed())
        } else {
            Ok(vec![])
        }
    }

    async fn close(self) -> Result<(), SurfaceError> {
        self.probe.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}
