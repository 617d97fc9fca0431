// Destination checks: compose fetch results and heuristics into a verdict per page

use crate::config::{ConfigError, RedirectPolicy, ValidationConfig, check_url};
use crate::error::Result;
use crate::report::{ValidationReport, ValidationSummary};
use crate::similarity::titles_match;
use crate::soft404::SoftNotFoundRules;
use indicatif::{ProgressBar, ProgressStyle};
use migcheck_scanner::extract::extract_page;
use migcheck_scanner::{
    CrawlRecord, FailureKind, FetchOptions, FetchOutcome, FetchOutcomeExt, PageFetcher, ProgressFn,
    build_fetcher, run_bounded,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

/// A page from the old site that should still exist on the new one.
#[derive(Debug, Clone, PartialEq)]
pub struct SourcePage {
    pub path: String,
    pub title: Option<String>,
}

impl SourcePage {
    pub fn new(path: impl Into<String>, title: Option<&str>) -> Self {
        Self {
            path: path.into(),
            title: title.map(str::to_string),
        }
    }
}

/// Pages worth checking: successful crawl records, one per path.
pub fn pages_from_crawl(records: &[CrawlRecord]) -> Vec<SourcePage> {
    let mut seen = HashSet::new();
    records
        .iter()
        .filter(|r| r.is_success())
        .filter(|r| seen.insert(r.path.clone()))
        .map(|r| SourcePage {
            path: r.path.clone(),
            title: r.title.clone(),
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Ok,
    Warning,
    Error,
}

impl Status {
    /// Raise to `to` if that is more severe. Never lowers.
    pub fn escalate(&mut self, to: Status) {
        if to > *self {
            *self = to;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    NotFound,
    #[serde(rename = "soft_404")]
    Soft404,
    ServerError,
    TitleMismatch,
    Redirect,
    Timeout,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    #[serde(rename = "type")]
    pub kind: IssueKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl Issue {
    pub fn new(kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationRecord {
    pub source_path: String,
    pub source_title: Option<String>,
    pub destination_url: String,
    pub destination_status_code: u16,
    pub destination_title: Option<String>,
    pub status: Status,
    pub issues: Vec<Issue>,
    pub response_time_ms: u64,
}

impl ValidationRecord {
    pub fn has_issue(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }
}

/// Grade one destination response. Checks run in a fixed order and status
/// only ever escalates.
pub fn evaluate(
    page: &SourcePage,
    destination_url: &Url,
    outcome: &FetchOutcome,
    redirect_policy: RedirectPolicy,
    rules: &SoftNotFoundRules,
) -> ValidationRecord {
    let mut record = ValidationRecord {
        source_path: page.path.clone(),
        source_title: page.title.clone(),
        destination_url: destination_url.to_string(),
        destination_status_code: outcome.status_code(),
        destination_title: None,
        status: Status::Ok,
        issues: Vec::new(),
        response_time_ms: outcome.response_time_ms(),
    };

    let fetched = match outcome {
        Ok(page) => page,
        Err(failure) => {
            let kind = match failure.kind {
                FailureKind::Timeout => IssueKind::Timeout,
                FailureKind::Transport => IssueKind::Error,
            };
            record.issues.push(Issue::new(kind, failure.message.clone()));
            record.status = Status::Error;
            return record;
        }
    };

    let content = if fetched.is_html() {
        extract_page(&fetched.body)
    } else {
        Default::default()
    };
    record.destination_title = content.title.clone();

    let status_code = fetched.status_code;
    if status_code == 404 {
        record
            .issues
            .push(Issue::new(IssueKind::NotFound, "Page not found (404)"));
        record.status.escalate(Status::Error);
    }

    if (500..600).contains(&status_code) {
        record.issues.push(Issue::new(
            IssueKind::ServerError,
            format!("Server error ({})", status_code),
        ));
        record.status.escalate(Status::Error);
    }

    let final_path = Url::parse(&fetched.final_url)
        .map(|u| u.path().to_string())
        .unwrap_or_else(|_| fetched.final_url.clone());
    if final_path != destination_url.path() {
        record.issues.push(
            Issue::new(IssueKind::Redirect, format!("Redirected to {}", final_path))
                .with_details(json!({ "from": destination_url.path(), "to": final_path })),
        );
        if redirect_policy == RedirectPolicy::Warn {
            record.status.escalate(Status::Warning);
        }
    }

    if fetched.is_success() {
        let verdict = rules.check(
            status_code,
            content.title.as_deref(),
            &content.body_text,
            &fetched.body,
        );
        if verdict.is_soft_404 {
            record.issues.push(
                Issue::new(
                    IssueKind::Soft404,
                    format!(
                        "Likely soft 404 ({}% confidence)",
                        verdict.confidence_percent()
                    ),
                )
                .with_details(json!({
                    "confidence": verdict.confidence,
                    "reasons": verdict.reasons,
                })),
            );
            record.status.escalate(Status::Error);
        }
    }

    if let (Some(expected), Some(actual)) = (&page.title, &record.destination_title)
        && record.status != Status::Error
        && !titles_match(Some(expected.as_str()), Some(actual.as_str()))
    {
        record.issues.push(
            Issue::new(
                IssueKind::TitleMismatch,
                format!("Title changed: \"{}\" -> \"{}\"", expected, actual),
            )
            .with_details(json!({ "expected": expected, "actual": actual })),
        );
        record.status.escalate(Status::Warning);
    }

    record
}

/// Error first, then warnings, then ok. Stable within a status.
pub fn sort_by_severity(results: &mut [ValidationRecord]) {
    results.sort_by_key(|r| std::cmp::Reverse(r.status));
}

/// Checks source paths against a destination site.
pub struct Validator {
    fetcher: Arc<dyn PageFetcher>,
    destination: Url,
    fetch_options: FetchOptions,
    concurrency: usize,
    delay: Duration,
    redirect_policy: RedirectPolicy,
    rules: SoftNotFoundRules,
    progress: Option<ProgressFn>,
}

impl Validator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, destination_url: &str) -> std::result::Result<Self, ConfigError> {
        let destination = check_url("destination", destination_url)?;
        let fetch_options = FetchOptions::default()
            .with_timeout(fetcher.default_timeout())
            .with_max_retries(1)
            .with_follow_redirects(true);

        Ok(Self {
            fetcher,
            destination,
            fetch_options,
            concurrency: 5,
            delay: Duration::ZERO,
            redirect_policy: RedirectPolicy::default(),
            rules: SoftNotFoundRules::default(),
            progress: None,
        })
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_options.timeout = timeout;
        self
    }

    pub fn with_redirect_policy(mut self, policy: RedirectPolicy) -> Self {
        self.redirect_policy = policy;
        self
    }

    pub fn with_rules(mut self, rules: SoftNotFoundRules) -> Self {
        self.rules = rules;
        self
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Destination URL for a source path.
    pub fn destination_for(&self, path: &str) -> Url {
        self.destination
            .join(path)
            .unwrap_or_else(|_| self.destination.clone())
    }

    pub async fn validate_page(&self, page: SourcePage) -> ValidationRecord {
        let url = self.destination_for(&page.path);
        debug!("Validating {} -> {}", page.path, url);

        let outcome = self.fetcher.fetch(url.as_str(), &self.fetch_options).await;
        let record = evaluate(&page, &url, &outcome, self.redirect_policy, &self.rules);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        record
    }

    /// Validate every page and return the results sorted by severity.
    pub async fn validate_all(&self, pages: Vec<SourcePage>) -> Vec<ValidationRecord> {
        let mut results = run_bounded(
            pages,
            self.concurrency,
            |page| self.validate_page(page),
            self.progress.clone(),
        )
        .await;
        sort_by_severity(&mut results);
        results
    }
}

/// Validate `pages` against the configured destination and build the report.
pub async fn execute_validation(
    config: &ValidationConfig,
    pages: Vec<SourcePage>,
    show_progress_bars: bool,
) -> Result<ValidationReport> {
    config.validate()?;

    let fetcher = build_fetcher(config.fetch.renderer, config.fetch.render_endpoint.as_deref())?;
    let mut validator = Validator::new(fetcher, &config.destination_url)?
        .with_concurrency(config.fetch.concurrency)
        .with_delay(config.fetch.delay())
        .with_redirect_policy(config.redirect_policy);
    if let Some(timeout) = config.fetch.timeout() {
        validator = validator.with_timeout(timeout);
    }

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new(pages.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{bar:40.cyan/blue}] {pos}/{len} validated ({elapsed})")
                .unwrap()
                .progress_chars("=>-"),
        );
        let pb = Arc::new(pb);
        let pb_clone = pb.clone();
        validator = validator.with_progress(Arc::new(move |done, _total| {
            pb_clone.set_position(done as u64);
        }));
        Some(pb)
    } else {
        None
    };

    info!(
        "Validating {} page(s) against {}",
        pages.len(),
        config.destination_url
    );
    let started = Instant::now();
    let results = validator.validate_all(pages).await;
    let duration_ms = started.elapsed().as_millis() as u64;

    if let Some(pb) = progress_bar {
        pb.finish_and_clear();
    }

    let summary = ValidationSummary::from_results(&results, duration_ms);
    info!(
        "Validation complete: {} ok, {} warning, {} error",
        summary.ok_urls, summary.warning_urls, summary.error_urls
    );

    Ok(ValidationReport {
        source_url: config.source_url.clone(),
        destination_url: config.destination_url.clone(),
        summary,
        results,
        validated_at: chrono::Utc::now().to_rfc3339(),
        config: config.clone(),
    })
}
