use crate::error::Result;
use crate::fetch::{DEFAULT_DIRECT_TIMEOUT, FetchFailure, FetchOptions, FetchOutcome, FetchedPage, PageFetcher};
use async_trait::async_trait;
use reqwest::Client;
use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CACHE_CONTROL, HeaderMap, HeaderValue, USER_AGENT};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

const MAX_REDIRECTS: usize = 10;
const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
     (KHTML, like Gecko) Chrome/124.0.0.0 Safari/537.36";

/// Linear backoff between attempts, capped at three seconds.
pub fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_millis((1000 * u64::from(attempt)).min(3000))
}

fn default_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"),
    );
    headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers
}

/// Talks HTTP itself. Transport failures are retried with backoff, timeouts
/// are not.
pub struct DirectFetcher {
    following: Client,
    manual: Client,
}

impl DirectFetcher {
    pub fn new() -> Result<Self> {
        Ok(Self {
            following: Self::client(reqwest::redirect::Policy::limited(MAX_REDIRECTS))?,
            manual: Self::client(reqwest::redirect::Policy::none())?,
        })
    }

    fn client(policy: reqwest::redirect::Policy) -> Result<Client> {
        let client = Client::builder()
            .default_headers(default_headers())
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Duration::from_secs(60))
            .redirect(policy)
            .build()?;
        Ok(client)
    }

    async fn attempt(&self, url: &Url, options: &FetchOptions) -> FetchOutcome {
        let client = if options.follow_redirects {
            &self.following
        } else {
            &self.manual
        };

        let mut request = client.get(url.clone());
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let start = Instant::now();
        let exchange = async {
            let response = request.send().await?;
            let status_code = response.status().as_u16();
            let final_url = response.url().clone();
            let content_type = response
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .map(|s| s.to_string());
            let body = response.text().await?;
            Ok::<_, reqwest::Error>((status_code, final_url, content_type, body))
        };

        let result = tokio::time::timeout(options.timeout, exchange).await;
        let elapsed = start.elapsed().as_millis() as u64;

        match result {
            Err(_) => Err(FetchFailure::timeout(options.timeout, elapsed)),
            Ok(Err(e)) if e.is_timeout() => Err(FetchFailure::timeout(options.timeout, elapsed)),
            Ok(Err(e)) => Err(FetchFailure::transport(describe(&e), elapsed)),
            Ok(Ok((status_code, final_url, content_type, body))) => Ok(FetchedPage {
                status_code,
                was_redirected: final_url != *url,
                final_url: final_url.to_string(),
                body,
                response_time_ms: elapsed,
                content_type,
            }),
        }
    }
}

#[async_trait]
impl PageFetcher for DirectFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome {
        let started = Instant::now();
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(e) => return Err(FetchFailure::transport(format!("Invalid URL {}: {}", url, e), 0)),
        };

        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            debug!("Fetching {} (attempt {})", url, attempt);

            match self.attempt(&parsed, options).await {
                Ok(page) => return Ok(page),
                Err(failure) if failure.is_timeout() => {
                    warn!("{}: {}", url, failure);
                    return Err(failure);
                }
                Err(mut failure) if attempt > options.max_retries => {
                    warn!("Giving up on {} after {} attempt(s): {}", url, attempt, failure);
                    failure.response_time_ms = started.elapsed().as_millis() as u64;
                    return Err(failure);
                }
                Err(failure) => {
                    let delay = backoff_delay(attempt);
                    debug!(
                        "Attempt {} for {} failed ({}), retrying in {}ms",
                        attempt,
                        url,
                        failure,
                        delay.as_millis()
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    fn default_timeout(&self) -> Duration {
        DEFAULT_DIRECT_TIMEOUT
    }

    fn name(&self) -> &'static str {
        "direct"
    }
}

/// reqwest's Display stops at the outermost error; walk the chain so DNS and
/// connection-refused details survive into reports.
fn describe(error: &reqwest::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);
    while let Some(inner) = source {
        message.push_str(": ");
        message.push_str(&inner.to_string());
        source = std::error::Error::source(inner);
    }
    message
}
