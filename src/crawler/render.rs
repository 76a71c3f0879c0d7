//! Rendering engine seam
//!
//! The crawler and the article fetcher never talk to the network directly.
//! They open a [`RenderSession`] from a [`Renderer`], navigate it to a URL with
//! a timeout, optionally scroll it to trigger lazy loading, and read back the
//! markup. Every session is owned by exactly one worker.
//!
//! [`HttpRenderer`] is the shipped implementation: a plain HTTP client with no
//! script execution, whose scroll reports a constant document height so the
//! scroll loop settles after one iteration.

use crate::config::UserAgentConfig;
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a rendering session
#[derive(Debug, Clone, Error)]
pub enum RenderError {
    #[error("Navigation timeout for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    #[error("Network error for {url}: {message}")]
    Network { url: String, message: String },

    #[error("No page loaded in session")]
    NothingLoaded,

    #[error("Failed to start rendering session: {0}")]
    Session(String),
}

impl RenderError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Factory for rendering sessions
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Opens a fresh, isolated session
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, RenderError>;
}

/// A single browsing context
#[async_trait]
pub trait RenderSession: Send {
    /// Navigates to `url` and returns the rendered markup
    async fn render(&mut self, url: &str, timeout: Duration) -> Result<String, RenderError>;

    /// Scrolls the current page once and returns the document height afterwards
    async fn scroll(&mut self) -> Result<u64, RenderError>;

    /// Returns the markup of the current page as it is now
    async fn content(&mut self) -> Result<String, RenderError>;

    /// Releases the session
    async fn close(self: Box<Self>);
}

/// Builds an HTTP client with proper configuration
///
/// # Example
///
/// ```no_run
/// use paper_harvest::config::UserAgentConfig;
/// use paper_harvest::crawler::build_http_client;
///
/// let config = UserAgentConfig {
///     crawler_name: "PaperHarvest".to_string(),
///     crawler_version: "1.0".to_string(),
///     contact_url: "https://example.com/about".to_string(),
///     contact_email: "admin@example.com".to_string(),
/// };
///
/// let client = build_http_client(&config).unwrap();
/// ```
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.header_value())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Renderer backed by a shared HTTP client
#[derive(Clone)]
pub struct HttpRenderer {
    client: Client,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    pub fn from_config(config: &UserAgentConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    async fn open_session(&self) -> Result<Box<dyn RenderSession>, RenderError> {
        Ok(Box::new(HttpSession {
            client: self.client.clone(),
            current: None,
        }))
    }
}

struct HttpSession {
    client: Client,
    current: Option<String>,
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn render(&mut self, url: &str, timeout: Duration) -> Result<String, RenderError> {
        self.current = None;

        let response = self
            .client
            .get(url)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RenderError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_reqwest_error(url, e))?;

        self.current = Some(body.clone());
        Ok(body)
    }

    async fn scroll(&mut self) -> Result<u64, RenderError> {
        self.current
            .as_ref()
            .map(|body| body.len() as u64)
            .ok_or(RenderError::NothingLoaded)
    }

    async fn content(&mut self) -> Result<String, RenderError> {
        self.current.clone().ok_or(RenderError::NothingLoaded)
    }

    async fn close(self: Box<Self>) {}
}

fn classify_reqwest_error(url: &str, error: reqwest::Error) -> RenderError {
    if error.is_timeout() {
        RenderError::Timeout {
            url: url.to_string(),
        }
    } else {
        RenderError::Network {
            url: url.to_string(),
            message: error.to_string(),
        }
    }
}
