use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn};

mod cli;
mod count;
mod crawler;
mod db;
mod driver;
mod export;
mod extract;
mod logging;
mod models;
mod nav;
mod settings;
mod surface;
#[cfg(test)]
mod testing;

use crate::cli::Args;
use crate::crawler::{ScrollSession, StopReason};
use crate::driver::make_driver;
use crate::export::{export_posts, resolve_output_path};
use crate::extract::{now_secs, PostExtractor};
use crate::settings::{load_settings, resolve};
use crate::surface::WebDriverPage;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = load_settings(&args.settings)?;
    logging::init(&settings.logging)?;
    let cfg = resolve(&settings, &args)?;
    let output = resolve_output_path(cfg.output.as_deref(), cfg.format, &cfg.output_dir)?;

    info!(query = %cfg.query, max_posts = cfg.max_posts, format = cfg.format.ext(), "starting search harvest");

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, wrapping up the session");
            on_signal.cancel();
        }
    });

    let drv = make_driver(&cfg.browser, now_secs() as u64)
        .await
        .with_context(|| format!("starting browser via {}", cfg.browser.webdriver_url))?;

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {wide_msg}")?
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message("Opening search...");

    let span = info_span!("session", query = %cfg.query);
    let extractor = PostExtractor::new(info_span!(parent: &span, "extract"));
    let session = ScrollSession::new(cfg.session.clone(), span)
        .with_cancel(cancel)
        .with_progress(pb.clone());

    let harvest = session
        .run(WebDriverPage::new(drv), &cfg.query, &extractor, cfg.max_posts)
        .await;
    pb.finish_and_clear();
    let harvest = harvest.context("search session aborted")?;

    if harvest.stop == StopReason::Interrupted {
        warn!(posts = harvest.posts.len(), "session interrupted, exporting partial results");
    }
    if harvest.posts.is_empty() {
        warn!(query = %cfg.query, "no posts were extracted");
    } else {
        info!(posts = harvest.posts.len(), scrolls = harvest.scrolls, "extraction finished");
    }

    export_posts(&harvest.posts, &output, cfg.format, &cfg.query)?;
    info!(path = %output.display(), "export complete");
    Ok(())
}
