//! Settings file + CLI overrides.

use crate::cli::Args;
use crate::crawler::{SessionConfig, SettleStrategy};
use crate::driver::BrowserOptions;
use crate::export::ExportFormat;
use crate::nav::NavKnobs;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub search: SearchSettings,
    pub browser: BrowserSettings,
    pub export: ExportSettings,
    pub logging: LogSettings,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SettleMode {
    Fixed,
    Poll,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    pub base_search_url: String,
    pub max_posts: usize,
    pub scroll_pause_secs: f64,
    pub max_scroll: usize,
    pub stall_limit: usize,
    pub settle: SettleMode,
    pub poll_interval_ms: u64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            base_search_url: "https://www.facebook.com/search/posts?q={query}".into(),
            max_posts: 100,
            scroll_pause_secs: 2.0,
            max_scroll: 100,
            stall_limit: 5,
            settle: SettleMode::Fixed,
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub user_agent: Option<String>,
    pub locale: String,
    pub webdriver_url: String,
    pub nav_attempts: u32,
    pub nav_backoff_ms: u64,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            user_agent: None,
            locale: "en-US".into(),
            webdriver_url: "http://127.0.0.1:9515".into(),
            nav_attempts: 3,
            nav_backoff_ms: 800,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExportSettings {
    pub default_format: ExportFormat,
    pub output_dir: PathBuf,
}

impl Default for ExportSettings {
    fn default() -> Self {
        Self { default_format: ExportFormat::Json, output_dir: PathBuf::from("data") }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self { level: "info".into(), json: false }
    }
}

/// A missing file means defaults; an unreadable or malformed one is an error.
pub fn load_settings(path: &Path) -> Result<Settings> {
    if !path.exists() {
        return Ok(Settings::default());
    }
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Everything one run needs, settings and CLI merged.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub query: String,
    pub max_posts: usize,
    pub format: ExportFormat,
    pub output: Option<PathBuf>,
    pub output_dir: PathBuf,
    pub session: SessionConfig,
    pub browser: BrowserOptions,
}

fn headless_override(args: &Args) -> Option<bool> {
    match (args.headless, args.no_headless) {
        (true, true) => {
            warn!("both --headless and --no-headless given, using settings value");
            None
        }
        (true, false) => Some(true),
        (false, true) => Some(false),
        (false, false) => None,
    }
}

pub fn resolve(settings: &Settings, args: &Args) -> Result<RunConfig> {
    let query = args.query.trim().to_string();
    if query.is_empty() {
        bail!("search query is empty");
    }

    let s = &settings.search;
    if !s.base_search_url.contains("{query}") {
        bail!("base_search_url has no {{query}} placeholder: {}", s.base_search_url);
    }

    let pause = args.scroll_pause.unwrap_or(s.scroll_pause_secs);
    if !pause.is_finite() || pause < 0.0 {
        bail!("scroll pause must be a non-negative number of seconds, got {pause}");
    }
    let pause = Duration::from_secs_f64(pause);
    let settle = match s.settle {
        SettleMode::Fixed => SettleStrategy::Fixed(pause),
        SettleMode::Poll => SettleStrategy::Poll {
            timeout: pause,
            interval: Duration::from_millis(s.poll_interval_ms.max(1)),
        },
    };

    let b = &settings.browser;
    let session = SessionConfig {
        search_url: s.base_search_url.clone(),
        settle,
        max_scrolls: args.max_scroll.unwrap_or(s.max_scroll),
        stall_limit: args.stall_limit.unwrap_or(s.stall_limit),
        nav: NavKnobs {
            attempts: b.nav_attempts,
            initial_ms: b.nav_backoff_ms,
            max_ms: NavKnobs::default().max_ms.max(b.nav_backoff_ms),
        },
    };

    let browser = BrowserOptions {
        headless: headless_override(args).unwrap_or(b.headless),
        locale: args.locale.clone().unwrap_or_else(|| b.locale.clone()),
        user_agent: args.user_agent.clone().or_else(|| b.user_agent.clone()),
        webdriver_url: args.webdriver_url.clone().unwrap_or_else(|| b.webdriver_url.clone()),
    };

    Ok(RunConfig {
        query,
        max_posts: args.max_posts.unwrap_or(s.max_posts),
        format: args.format.unwrap_or(settings.export.default_format),
        output: args.output.clone(),
        output_dir: settings.export.output_dir.clone(),
        session,
        browser,
    })
}
