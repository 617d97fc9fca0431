use crate::direct::DirectFetcher;
use crate::error::{Result, ScanError};
use crate::render_proxy::RenderProxyFetcher;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_DIRECT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RENDER_TIMEOUT: Duration = Duration::from_secs(60);

/// Per-request knobs for a single logical fetch.
#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub timeout: Duration,
    /// Additional attempts after the first one. Ignored by strategies that
    /// only ever make one attempt.
    pub max_retries: u32,
    pub follow_redirects: bool,
    /// Extra request headers. These override the strategy's defaults.
    pub headers: Vec<(String, String)>,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_DIRECT_TIMEOUT,
            max_retries: 2,
            follow_redirects: true,
            headers: Vec::new(),
        }
    }
}

impl FetchOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follow_redirects = follow;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A response that made it back over the wire, whatever its status code.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub status_code: u16,
    pub body: String,
    pub final_url: String,
    pub was_redirected: bool,
    pub response_time_ms: u64,
    pub content_type: Option<String>,
}

impl FetchedPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }

    /// Missing content types are treated as HTML; plenty of servers omit the header.
    pub fn is_html(&self) -> bool {
        self.content_type
            .as_deref()
            .map(|ct| {
                let ct = ct.to_ascii_lowercase();
                ct.contains("text/html") || ct.contains("application/xhtml")
            })
            .unwrap_or(true)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The attempt's deadline passed. Never retried.
    Timeout,
    /// Connection, DNS, TLS, body decoding or renderer failures.
    Transport,
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}")]
pub struct FetchFailure {
    pub kind: FailureKind,
    pub message: String,
    pub response_time_ms: u64,
}

impl FetchFailure {
    pub fn timeout(limit: Duration, response_time_ms: u64) -> Self {
        Self {
            kind: FailureKind::Timeout,
            message: format!("Request timed out after {}ms", limit.as_millis()),
            response_time_ms,
        }
    }

    pub fn transport(message: impl Into<String>, response_time_ms: u64) -> Self {
        Self {
            kind: FailureKind::Transport,
            message: message.into(),
            response_time_ms,
        }
    }

    pub fn is_timeout(&self) -> bool {
        self.kind == FailureKind::Timeout
    }
}

/// Result of one attempt sequence: either a complete response or a failure
/// carrying the last error. Status codes of 4xx/5xx are still `Ok`.
pub type FetchOutcome = std::result::Result<FetchedPage, FetchFailure>;

pub trait FetchOutcomeExt {
    /// HTTP status, or 0 when nothing came back.
    fn status_code(&self) -> u16;
    fn response_time_ms(&self) -> u64;
}

impl FetchOutcomeExt for FetchOutcome {
    fn status_code(&self) -> u16 {
        match self {
            Ok(page) => page.status_code,
            Err(_) => 0,
        }
    }

    fn response_time_ms(&self) -> u64 {
        match self {
            Ok(page) => page.response_time_ms,
            Err(failure) => failure.response_time_ms,
        }
    }
}

/// One logical "get this URL" operation. Implementations hide retries,
/// deadlines and rendering behind the same contract.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome;

    /// Timeout used when the caller has no preference of its own.
    fn default_timeout(&self) -> Duration;

    fn name(&self) -> &'static str;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RendererKind {
    #[default]
    Direct,
    RenderProxy,
}

impl RendererKind {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "direct" => Some(RendererKind::Direct),
            "render-proxy" | "proxy" | "browser" => Some(RendererKind::RenderProxy),
            _ => None,
        }
    }
}

impl fmt::Display for RendererKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RendererKind::Direct => write!(f, "direct"),
            RendererKind::RenderProxy => write!(f, "render-proxy"),
        }
    }
}

/// Build the fetch strategy for `kind`. The render proxy needs an endpoint.
pub fn build_fetcher(kind: RendererKind, endpoint: Option<&str>) -> Result<Arc<dyn PageFetcher>> {
    match kind {
        RendererKind::Direct => Ok(Arc::new(DirectFetcher::new()?)),
        RendererKind::RenderProxy => {
            let endpoint = endpoint.ok_or_else(|| {
                ScanError::InvalidUrl("render-proxy renderer requires an endpoint".to_string())
            })?;
            Ok(Arc::new(RenderProxyFetcher::new(endpoint)?))
        }
    }
}
