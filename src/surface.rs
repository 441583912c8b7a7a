//! Browser automation surface.
//!
//! The crawler only needs a small capability set from the browser: navigate,
//! scroll, query the rendered DOM, and read attributes/text off element
//! handles. `PageSurface`/`ElementSurface` are that set; `WebDriverPage` backs
//! it with a thirtyfour session.

use async_trait::async_trait;
use thirtyfour::prelude::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SurfaceError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },
    #[error("script failed: {0}")]
    Script(String),
    #[error("DOM query failed: {0}")]
    Query(String),
    #[error("browser session is gone: {0}")]
    Closed(String),
}

impl SurfaceError {
    /// The browser itself is unusable, as opposed to one read having failed.
    pub fn is_session_gone(&self) -> bool {
        matches!(self, SurfaceError::Closed(_))
    }
}

#[async_trait]
pub trait ElementSurface: Send + Sync + Sized {
    async fn attr(&self, name: &str) -> Result<Option<String>, SurfaceError>;

    async fn inner_text(&self) -> Result<String, SurfaceError>;

    /// All descendants matching `selector`, in document order.
    async fn find_all(&self, selector: &str) -> Result<Vec<Self>, SurfaceError>;

    /// First descendant matching `selector`. A miss is `Ok(None)`, not an error.
    async fn find(&self, selector: &str) -> Result<Option<Self>, SurfaceError> {
        Ok(self.find_all(selector).await?.into_iter().next())
    }
}

#[async_trait]
pub trait PageSurface: Send + Sync {
    type Element: ElementSurface;

    async fn goto(&self, url: &str) -> Result<(), SurfaceError>;

    async fn title(&self) -> Result<String, SurfaceError>;

    async fn source(&self) -> Result<String, SurfaceError>;

    /// One scroll step towards the end of the feed.
    async fn scroll(&self) -> Result<(), SurfaceError>;

    async fn find_all(&self, selector: &str) -> Result<Vec<Self::Element>, SurfaceError>;

    async fn count(&self, selector: &str) -> Result<usize, SurfaceError> {
        Ok(self.find_all(selector).await?.len())
    }

    /// Releases the browsing context. Consumes the surface.
    async fn close(self) -> Result<(), SurfaceError>
    where
        Self: Sized;
}

const SCROLL_JS: &str = "window.scrollTo(0, document.body.scrollHeight); return document.body.scrollHeight;";

fn session_gone<E: std::fmt::Display>(e: &E) -> bool {
    let s = e.to_string().to_lowercase();
    s.contains("invalid session id")
        || s.contains("session deleted")
        || s.contains("not connected to devtools")
}

fn query_err(e: WebDriverError) -> SurfaceError {
    if session_gone(&e) {
        SurfaceError::Closed(e.to_string())
    } else {
        SurfaceError::Query(e.to_string())
    }
}

pub struct WebDriverPage {
    drv: WebDriver,
}

impl WebDriverPage {
    pub fn new(drv: WebDriver) -> Self {
        Self { drv }
    }
}

#[async_trait]
impl PageSurface for WebDriverPage {
    type Element = WebElement;

    async fn goto(&self, url: &str) -> Result<(), SurfaceError> {
        self.drv.goto(url).await.map_err(|e| {
            if session_gone(&e) {
                SurfaceError::Closed(e.to_string())
            } else {
                SurfaceError::Navigation { url: url.to_string(), reason: e.to_string() }
            }
        })
    }

    async fn title(&self) -> Result<String, SurfaceError> {
        self.drv.title().await.map_err(query_err)
    }

    async fn source(&self) -> Result<String, SurfaceError> {
        self.drv.source().await.map_err(query_err)
    }

    async fn scroll(&self) -> Result<(), SurfaceError> {
        self.drv
            .execute(SCROLL_JS, vec![])
            .await
            .map(|_| ())
            .map_err(|e| {
                if session_gone(&e) {
                    SurfaceError::Closed(e.to_string())
                } else {
                    SurfaceError::Script(e.to_string())
                }
            })
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<WebElement>, SurfaceError> {
        self.drv.find_all(By::Css(selector)).await.map_err(query_err)
    }

    async fn close(self) -> Result<(), SurfaceError> {
        self.drv.quit().await.map_err(|e| SurfaceError::Closed(e.to_string()))
    }
}

#[async_trait]
impl ElementSurface for WebElement {
    async fn attr(&self, name: &str) -> Result<Option<String>, SurfaceError> {
        WebElement::attr(self, name).await.map_err(query_err)
    }

    async fn inner_text(&self) -> Result<String, SurfaceError> {
        self.text().await.map_err(query_err)
    }

    async fn find_all(&self, selector: &str) -> Result<Vec<WebElement>, SurfaceError> {
        WebElement::find_all(self, By::Css(selector)).await.map_err(query_err)
    }
}
