// Run configuration and the checks that reject it before any network activity

use migcheck_scanner::RendererKind;
use migcheck_scanner::crawler::compile_patterns;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be a whole number, got '{value}'")]
    NotANumber { field: &'static str, value: String },

    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: i64 },

    #[error("concurrency must be at least 1, got {0}")]
    ConcurrencyTooLow(i64),

    #[error("invalid {field} URL '{value}': {reason}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid exclude pattern: {0}")]
    InvalidPattern(String),

    #[error("unknown renderer '{0}' (expected 'direct' or 'render-proxy')")]
    UnknownRenderer(String),

    #[error("the render-proxy renderer requires a render endpoint")]
    MissingRenderEndpoint,

    #[error("unknown redirect policy '{0}' (expected 'warn' or 'allow')")]
    UnknownRedirectPolicy(String),
}

fn parse_integer(field: &'static str, value: &str) -> Result<i64, ConfigError> {
    value.trim().parse::<i64>().map_err(|_| ConfigError::NotANumber {
        field,
        value: value.to_string(),
    })
}

fn parse_non_negative(field: &'static str, value: &str) -> Result<u64, ConfigError> {
    let n = parse_integer(field, value)?;
    if n < 0 {
        return Err(ConfigError::Negative { field, value: n });
    }
    Ok(n as u64)
}

pub fn parse_depth(value: &str) -> Result<usize, ConfigError> {
    parse_non_negative("depth", value).map(|n| n as usize)
}

pub fn parse_concurrency(value: &str) -> Result<usize, ConfigError> {
    let n = parse_integer("concurrency", value)?;
    if n < 1 {
        return Err(ConfigError::ConcurrencyTooLow(n));
    }
    Ok(n as usize)
}

/// Milliseconds.
pub fn parse_timeout(value: &str) -> Result<u64, ConfigError> {
    parse_non_negative("timeout", value)
}

/// Milliseconds.
pub fn parse_delay(value: &str) -> Result<u64, ConfigError> {
    parse_non_negative("delay", value)
}

pub fn parse_renderer(value: &str) -> Result<RendererKind, ConfigError> {
    RendererKind::from_str(value).ok_or_else(|| ConfigError::UnknownRenderer(value.to_string()))
}

pub fn parse_redirect_policy(value: &str) -> Result<RedirectPolicy, ConfigError> {
    RedirectPolicy::from_str(value)
        .ok_or_else(|| ConfigError::UnknownRedirectPolicy(value.to_string()))
}

/// An absolute http(s) URL.
pub fn check_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(value).map_err(|e| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            field,
            value: value.to_string(),
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    Ok(url)
}

/// How a destination that redirects to a different path is graded.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedirectPolicy {
    /// Record the redirect and downgrade the page to a warning.
    #[default]
    Warn,
    /// Record the redirect but leave the status alone.
    Allow,
}

impl RedirectPolicy {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "warn" | "warning" => Some(RedirectPolicy::Warn),
            "allow" | "ok" => Some(RedirectPolicy::Allow),
            _ => None,
        }
    }
}

/// Settings shared by crawling and validation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FetchSettings {
    pub concurrency: usize,
    /// `None` uses the renderer's own default.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub delay_ms: u64,
    #[serde(default)]
    pub renderer: RendererKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub render_endpoint: Option<String>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            concurrency: 5,
            timeout_ms: None,
            delay_ms: 0,
            renderer: RendererKind::Direct,
            render_endpoint: None,
        }
    }
}

impl FetchSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency < 1 {
            return Err(ConfigError::ConcurrencyTooLow(self.concurrency as i64));
        }
        if self.renderer == RendererKind::RenderProxy {
            let endpoint = self
                .render_endpoint
                .as_deref()
                .ok_or(ConfigError::MissingRenderEndpoint)?;
            check_url("render endpoint", endpoint)?;
        }
        Ok(())
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlConfig {
    pub source_url: String,
    pub max_depth: usize,
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(flatten)]
    pub fetch: FetchSettings,
}

impl CrawlConfig {
    pub fn new(source_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            max_depth: 3,
            exclude: Vec::new(),
            fetch: FetchSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("source", &self.source_url)?;
        compile_patterns(&self.exclude).map_err(|e| ConfigError::InvalidPattern(e.to_string()))?;
        self.fetch.validate()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationConfig {
    pub source_url: String,
    pub destination_url: String,
    #[serde(default)]
    pub redirect_policy: RedirectPolicy,
    #[serde(flatten)]
    pub fetch: FetchSettings,
}

impl ValidationConfig {
    pub fn new(source_url: impl Into<String>, destination_url: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            destination_url: destination_url.into(),
            redirect_policy: RedirectPolicy::default(),
            fetch: FetchSettings::default(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("source", &self.source_url)?;
        check_url("destination", &self.destination_url)?;
        self.fetch.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_parsing() {
        assert_eq!(parse_depth("0"), Ok(0));
        assert_eq!(parse_depth(" 4 "), Ok(4));
        assert_eq!(
            parse_depth("-1"),
            Err(ConfigError::Negative {
                field: "depth",
                value: -1
            })
        );
        assert!(matches!(parse_depth("deep"), Err(ConfigError::NotANumber { .. })));
        assert!(matches!(parse_depth("2.5"), Err(ConfigError::NotANumber { .. })));
    }

    #[test]
    fn test_concurrency_parsing() {
        assert_eq!(parse_concurrency("8"), Ok(8));
        assert_eq!(parse_concurrency("0"), Err(ConfigError::ConcurrencyTooLow(0)));
        assert_eq!(parse_concurrency("-3"), Err(ConfigError::ConcurrencyTooLow(-3)));
    }

    #[test]
    fn test_timeout_and_delay_parsing() {
        assert_eq!(parse_timeout("15000"), Ok(15000));
        assert!(matches!(parse_timeout("-5"), Err(ConfigError::Negative { field: "timeout", .. })));
        assert!(matches!(parse_delay("soon"), Err(ConfigError::NotANumber { field: "delay", .. })));
    }

    #[test]
    fn test_crawl_config_validation() {
        let mut config = CrawlConfig::new("https://example.com");
        assert!(config.validate().is_ok());

        config.exclude = vec!["[".to_string()];
        assert!(matches!(config.validate(), Err(ConfigError::InvalidPattern(_))));

        config.exclude.clear();
        config.fetch.concurrency = 0;
        assert_eq!(config.validate(), Err(ConfigError::ConcurrencyTooLow(0)));

        let bad_url = CrawlConfig::new("example.com");
        assert!(matches!(bad_url.validate(), Err(ConfigError::InvalidUrl { .. })));

        let ftp = CrawlConfig::new("ftp://example.com");
        assert!(matches!(ftp.validate(), Err(ConfigError::InvalidUrl { .. })));
    }

    #[test]
    fn test_render_proxy_needs_endpoint() {
        let mut config = CrawlConfig::new("https://example.com");
        config.fetch.renderer = RendererKind::RenderProxy;
        assert_eq!(config.validate(), Err(ConfigError::MissingRenderEndpoint));

        config.fetch.render_endpoint = Some("http://localhost:3000/render".to_string());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_redirect_policy_parsing() {
        assert_eq!(parse_redirect_policy("warn"), Ok(RedirectPolicy::Warn));
        assert_eq!(parse_redirect_policy("ALLOW"), Ok(RedirectPolicy::Allow));
        assert!(parse_redirect_policy("ignore").is_err());
    }

    #[test]
    fn test_config_serializes_flat_camel_case() {
        let mut config = CrawlConfig::new("https://example.com");
        config.exclude = vec!["/admin".to_string()];
        config.fetch.timeout_ms = Some(5000);

        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(json["sourceUrl"], "https://example.com");
        assert_eq!(json["maxDepth"], 3);
        assert_eq!(json["concurrency"], 5);
        assert_eq!(json["timeoutMs"], 5000);
        assert_eq!(json["renderer"], "direct");
        assert!(json.get("renderEndpoint").is_none());

        let back: CrawlConfig = serde_json::from_value(json).unwrap();
        assert_eq!(back, config);
    }
}
