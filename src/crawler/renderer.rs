//! Page rendering collaborators
//!
//! The scheduler talks to pages only through these traits:
//! - `PageRenderer` is shared by the whole run and hands out contexts
//! - `RenderContext` is owned by one task; cookies and other state never leak
//!   between contexts
//!
//! `HttpRenderer` is the shipped implementation. It fetches static HTML with a
//! dedicated reqwest client (and cookie jar) per context.

use crate::crawler::retry::with_timeout;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors raised while opening a context or loading a page
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Navigation to {url} timed out after {timeout:?}")]
    Timeout { url: String, timeout: Duration },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("HTTP status {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Failed to open render context: {0}")]
    Context(String),
}

impl RenderError {
    /// Whether another attempt could succeed
    ///
    /// Timeouts and transport failures are transient. Of the HTTP statuses only
    /// server errors and 429 are.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Navigation { .. } => true,
            Self::Http { status, .. } => *status >= 500 || *status == 429,
            Self::Context(_) => false,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// A loaded page
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Final URL after redirects
    pub url: String,
    /// HTTP status code
    pub status: u16,
    /// Document markup
    pub html: String,
}

/// Process-wide renderer
#[async_trait]
pub trait PageRenderer: Send + Sync {
    /// Opens an isolated context for one extraction task
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, RenderError>;
}

/// Per-task rendering context
#[async_trait]
pub trait RenderContext: Send {
    /// Loads `url`, failing with `RenderError::Timeout` once `timeout` passes
    async fn navigate(&mut self, url: &str, timeout: Duration)
        -> Result<RenderedPage, RenderError>;

    /// Waits for page content to settle, returning after at most `max_wait`
    async fn wait_until_ready(&mut self, max_wait: Duration);

    /// Releases the context's resources
    async fn close(&mut self);
}

/// Static-HTML renderer backed by reqwest
pub struct HttpRenderer {
    user_agent: String,
    connect_timeout: Duration,
}

impl HttpRenderer {
    /// Creates a renderer
    ///
    /// # Arguments
    ///
    /// * `user_agent` - Sent with every request
    pub fn new(user_agent: impl Into<String>) -> Self {
        Self {
            user_agent: user_agent.into(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

#[async_trait]
impl PageRenderer for HttpRenderer {
    async fn open_context(&self) -> Result<Box<dyn RenderContext>, RenderError> {
        let client = Client::builder()
            .user_agent(self.user_agent.as_str())
            .connect_timeout(self.connect_timeout)
            .cookie_store(true)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| RenderError::Context(e.to_string()))?;

        Ok(Box::new(HttpContext { client }))
    }
}

struct HttpContext {
    client: Client,
}

#[async_trait]
impl RenderContext for HttpContext {
    async fn navigate(
        &mut self,
        url: &str,
        timeout: Duration,
    ) -> Result<RenderedPage, RenderError> {
        let client = &self.client;
        let load = async {
            let response = client
                .get(url)
                .send()
                .await
                .map_err(|e| navigation_error(url, e))?;

            let status = response.status();
            let final_url = response.url().to_string();
            if !status.is_success() {
                return Err(RenderError::Http {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }

            let html = response
                .text()
                .await
                .map_err(|e| navigation_error(url, e))?;

            Ok(RenderedPage {
                url: final_url,
                status: status.as_u16(),
                html,
            })
        };

        with_timeout(timeout, load, || RenderError::Timeout {
            url: url.to_string(),
            timeout,
        })
        .await
    }

    async fn wait_until_ready(&mut self, _max_wait: Duration) {
        // Static HTML is complete once the body has been read
    }

    async fn close(&mut self) {}
}

fn navigation_error(url: &str, err: reqwest::Error) -> RenderError {
    let message = if err.is_connect() {
        "connection refused".to_string()
    } else {
        err.to_string()
    };
    RenderError::Navigation {
        url: url.to_string(),
        message,
    }
}
