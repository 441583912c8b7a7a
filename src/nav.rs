use crate::surface::{PageSurface, SurfaceError};

use backoff::{backoff::Backoff, ExponentialBackoff};
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy)]
pub struct NavKnobs {
    pub attempts: u32,
    pub initial_ms: u64,
    pub max_ms: u64,
}

impl Default for NavKnobs {
    fn default() -> Self {
        Self { attempts: 3, initial_ms: 800, max_ms: 5000 }
    }
}

const BLOCK_MARKERS: &[&str] = &["429", "too many requests", "temporarily blocked"];

/// Loads `url`, retrying with exponential backoff on driver errors and on
/// rate-limit interstitials. A lost session is not retried.
pub async fn navigate<P: PageSurface>(page: &P, url: &str, knobs: NavKnobs) -> Result<(), SurfaceError> {
    let mut eb = ExponentialBackoff {
        current_interval: Duration::from_millis(knobs.initial_ms),
        initial_interval: Duration::from_millis(knobs.initial_ms),
        max_interval: Duration::from_millis(knobs.max_ms),
        max_elapsed_time: None,
        ..ExponentialBackoff::default()
    };
    let attempts = knobs.attempts.max(1);
    let mut last = String::new();

    for i in 0..attempts {
        match page.goto(url).await {
            Ok(()) => match blocked(page).await {
                Ok(false) => {
                    if i > 0 {
                        debug!(url, attempt = i + 1, "navigation recovered");
                    }
                    return Ok(());
                }
                Ok(true) => last = "rate-limit page served".to_string(),
                Err(e) if e.is_session_gone() => return Err(e),
                Err(e) => last = e.to_string(),
            },
            Err(e) if e.is_session_gone() => return Err(e),
            Err(e) => last = e.to_string(),
        }
        if i + 1 == attempts {
            break;
        }
        let sleep = eb.next_backoff().unwrap_or(Duration::from_millis(knobs.max_ms));
        warn!(url, attempt = i + 1, attempts, backoff_ms = sleep.as_millis() as u64, reason = %last, "navigation retry");
        tokio::time::sleep(sleep).await;
    }

    Err(SurfaceError::Navigation { url: url.to_string(), reason: last })
}

async fn blocked<P: PageSurface>(page: &P) -> Result<bool, SurfaceError> {
    let title = page.title().await?.to_lowercase();
    if BLOCK_MARKERS.iter().any(|m| title.contains(m)) {
        return Ok(true);
    }
    let body = page.source().await?.to_lowercase();
    Ok(body.contains("too many requests") || body.contains("temporarily blocked"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakePage;

    const KNOBS: NavKnobs = NavKnobs { attempts: 3, initial_ms: 10, max_ms: 50 };

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let page = FakePage::new("div", vec![]).failing_goto(2);
        let probe = page.probe();
        navigate(&page, "https://example.test/", KNOBS).await.unwrap();
        assert_eq!(probe.visited().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_last_attempt() {
        let page = FakePage::new("div", vec![]).failing_goto(5);
        let probe = page.probe();
        let err = navigate(&page, "https://example.test/", KNOBS).await.unwrap_err();
        assert!(matches!(err, SurfaceError::Navigation { .. }));
        assert_eq!(probe.visited().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn rate_limit_pages_count_as_failures() {
        let page = FakePage::new("div", vec![]).with_title("429 Too Many Requests");
        let err = navigate(&page, "https://example.test/", KNOBS).await.unwrap_err();
        match err {
            SurfaceError::Navigation { reason, .. } => assert!(reason.contains("rate-limit")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
