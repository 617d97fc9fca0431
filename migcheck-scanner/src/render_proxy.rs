use crate::error::{Result, ScanError};
use crate::fetch::{DEFAULT_RENDER_TIMEOUT, FetchFailure, FetchOptions, FetchOutcome, FetchedPage, PageFetcher};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Time kept back from the proxy's own deadline so its error envelope can
/// still arrive before the local timeout fires.
const RENDER_DEADLINE_MARGIN: Duration = Duration::from_secs(2);

/// Deadline handed to the proxy for a local timeout of `timeout`. Never less
/// than half of it.
fn proxy_deadline(timeout: Duration) -> Duration {
    timeout.saturating_sub(RENDER_DEADLINE_MARGIN).max(timeout / 2)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RenderRequest<'a> {
    url: &'a str,
    timeout_ms: u64,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    headers: BTreeMap<&'a str, &'a str>,
}

/// What the rendering proxy answers with.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenderEnvelope {
    status_code: Option<u16>,
    #[serde(default)]
    content: String,
    final_url: Option<String>,
    content_type: Option<String>,
    error: Option<String>,
}

/// Hands the page to a headless-browser proxy so client-side rendered
/// markup is visible. One attempt only; rendering is already slow.
pub struct RenderProxyFetcher {
    client: Client,
    endpoint: Url,
}

impl RenderProxyFetcher {
    pub fn new(endpoint: &str) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|e| ScanError::InvalidUrl(format!("Invalid render endpoint {}: {}", endpoint, e)))?;

        let client = Client::builder()
            .user_agent(concat!("migcheck/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .pool_idle_timeout(Duration::from_secs(90))
            .build()?;

        Ok(Self { client, endpoint })
    }

    async fn render(&self, url: &str, options: &FetchOptions) -> std::result::Result<RenderEnvelope, String> {
        let payload = RenderRequest {
            url,
            timeout_ms: proxy_deadline(options.timeout).as_millis() as u64,
            headers: options
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str()))
                .collect(),
        };

        let response = self
            .client
            .post(self.endpoint.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| format!("Render proxy request failed: {}", e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("Render proxy returned HTTP {}", status.as_u16()));
        }

        response
            .json::<RenderEnvelope>()
            .await
            .map_err(|e| format!("Malformed render proxy response: {}", e))
    }
}

#[async_trait]
impl PageFetcher for RenderProxyFetcher {
    async fn fetch(&self, url: &str, options: &FetchOptions) -> FetchOutcome {
        debug!("Rendering {} via {}", url, self.endpoint);
        let start = Instant::now();

        let result = tokio::time::timeout(options.timeout, self.render(url, options)).await;
        let elapsed = start.elapsed().as_millis() as u64;

        let envelope = match result {
            Err(_) => return Err(FetchFailure::timeout(options.timeout, elapsed)),
            Ok(Err(message)) => {
                warn!("{}: {}", url, message);
                return Err(FetchFailure::transport(message, elapsed));
            }
            Ok(Ok(envelope)) => envelope,
        };

        if let Some(error) = envelope.error {
            return Err(FetchFailure::transport(format!("Renderer error: {}", error), elapsed));
        }
        let Some(status_code) = envelope.status_code else {
            return Err(FetchFailure::transport(
                "Render proxy response is missing statusCode",
                elapsed,
            ));
        };

        let final_url = envelope.final_url.unwrap_or_else(|| url.to_string());
        Ok(FetchedPage {
            status_code,
            was_redirected: !same_url(url, &final_url),
            final_url,
            body: envelope.content,
            response_time_ms: elapsed,
            content_type: envelope.content_type.or_else(|| Some("text/html".to_string())),
        })
    }

    fn default_timeout(&self) -> Duration {
        DEFAULT_RENDER_TIMEOUT
    }

    fn name(&self) -> &'static str {
        "render-proxy"
    }
}

fn same_url(a: &str, b: &str) -> bool {
    match (Url::parse(a), Url::parse(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}
