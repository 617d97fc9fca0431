// Crawl and validation artifacts, plus the console summaries printed after a run

use crate::config::{CrawlConfig, ValidationConfig};
use crate::error::{CoreError, Result};
use crate::validate::{IssueKind, Status, ValidationRecord};
use chrono::{DateTime, Local};
use colored::Colorize;
use migcheck_scanner::{CrawlOutput, CrawlRecord, CrawlStats};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use url::Url;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlReport {
    pub source_url: String,
    pub urls: Vec<CrawlRecord>,
    pub stats: CrawlStats,
    pub crawled_at: String,
    pub config: CrawlConfig,
}

impl CrawlReport {
    pub fn new(config: &CrawlConfig, output: CrawlOutput) -> Self {
        Self {
            source_url: config.source_url.clone(),
            urls: output.records,
            stats: output.stats,
            crawled_at: chrono::Utc::now().to_rfc3339(),
            config: config.clone(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_urls: usize,
    pub ok_urls: usize,
    pub warning_urls: usize,
    pub error_urls: usize,
    #[serde(rename = "soft404Count")]
    pub soft404_count: usize,
    pub not_found_count: usize,
    pub server_error_count: usize,
    pub title_mismatch_count: usize,
    pub redirect_count: usize,
    pub duration_ms: u64,
}

impl ValidationSummary {
    /// Per-kind counts are pages carrying at least one issue of that kind.
    pub fn from_results(results: &[ValidationRecord], duration_ms: u64) -> Self {
        let count_status = |status: Status| results.iter().filter(|r| r.status == status).count();
        let count_issue = |kind: IssueKind| results.iter().filter(|r| r.has_issue(kind)).count();

        Self {
            total_urls: results.len(),
            ok_urls: count_status(Status::Ok),
            warning_urls: count_status(Status::Warning),
            error_urls: count_status(Status::Error),
            soft404_count: count_issue(IssueKind::Soft404),
            not_found_count: count_issue(IssueKind::NotFound),
            server_error_count: count_issue(IssueKind::ServerError),
            title_mismatch_count: count_issue(IssueKind::TitleMismatch),
            redirect_count: count_issue(IssueKind::Redirect),
            duration_ms,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub source_url: String,
    pub destination_url: String,
    pub summary: ValidationSummary,
    pub results: Vec<ValidationRecord>,
    pub validated_at: String,
    pub config: ValidationConfig,
}

/// Pretty-printed JSON, creating parent directories as needed.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let io_err = |source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    };

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(io_err)?;
    }

    let json = serde_json::to_string_pretty(value).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(io_err)
}

pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path).map_err(|source| CoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CoreError::Json {
        path: path.to_path_buf(),
        source,
    })
}

pub fn read_crawl_report(path: &Path) -> Result<CrawlReport> {
    read_json(path)
}

/// `{kind}-{host}-{YYYYmmdd-HHMMSS}.json`
pub fn default_output_name(kind: &str, url: &str, now: &DateTime<Local>) -> PathBuf {
    let host = Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "site".to_string());
    PathBuf::from(format!(
        "{}-{}-{}.json",
        kind,
        host,
        now.format("%Y%m%d-%H%M%S")
    ))
}

fn colored_status_code(code: u16) -> String {
    match code {
        0 => "ERR".red().to_string(),
        200..=299 => code.to_string().green().to_string(),
        300..=399 => code.to_string().cyan().to_string(),
        400..=499 => code.to_string().yellow().to_string(),
        500..=599 => code.to_string().red().to_string(),
        _ => code.to_string(),
    }
}

fn colored_status(status: Status) -> String {
    match status {
        Status::Ok => "OK".green().to_string(),
        Status::Warning => "WARN".yellow().to_string(),
        Status::Error => "ERROR".red().to_string(),
    }
}

pub fn generate_crawl_summary(report: &CrawlReport) -> String {
    let stats = &report.stats;
    let mut out = String::new();

    out.push_str(RULE);
    out.push_str("\n\n# Crawl summary\n");
    out.push_str(&format!("  Source:           {}\n", report.source_url));
    out.push_str(&format!("  URLs crawled:     {}\n", stats.total_urls));
    out.push_str(&format!("  Successful:       {}\n", stats.successful_crawls));
    out.push_str(&format!("  Failed:           {}\n", stats.failed_crawls));
    out.push_str(&format!("  Skipped (depth):  {}\n", stats.skipped_due_to_depth));
    out.push_str(&format!("  Skipped (exclude): {}\n", stats.skipped_due_to_exclude));
    out.push_str(&format!("  Duration:         {}ms\n", stats.duration_ms));
    out.push('\n');
    out.push_str(RULE);
    out.push_str("\n\n");

    for record in &report.urls {
        let mut line = format!("  {} {}", colored_status_code(record.status_code), record.path);
        if let Some(ref title) = record.title {
            line.push_str(&format!(" {}", title.dimmed()));
        }
        out.push_str(&line);
        out.push('\n');
    }

    out
}

pub fn generate_validation_summary(report: &ValidationReport) -> String {
    let summary = &report.summary;
    let mut out = String::new();

    out.push_str(RULE);
    out.push_str("\n\n# Validation summary\n");
    out.push_str(&format!(
        "  {} -> {}\n",
        report.source_url, report.destination_url
    ));
    out.push_str(&format!("  Pages checked:  {}\n", summary.total_urls));
    out.push_str(&format!("  {}             {}\n", "OK".green(), summary.ok_urls));
    out.push_str(&format!("  {}           {}\n", "WARN".yellow(), summary.warning_urls));
    out.push_str(&format!("  {}          {}\n", "ERROR".red(), summary.error_urls));
    out.push('\n');
    out.push_str(&format!("  Not found:      {}\n", summary.not_found_count));
    out.push_str(&format!("  Soft 404:       {}\n", summary.soft404_count));
    out.push_str(&format!("  Server errors:  {}\n", summary.server_error_count));
    out.push_str(&format!("  Title changes:  {}\n", summary.title_mismatch_count));
    out.push_str(&format!("  Redirects:      {}\n", summary.redirect_count));
    out.push_str(&format!("  Duration:       {}ms\n", summary.duration_ms));

    let flagged: Vec<&ValidationRecord> = report
        .results
        .iter()
        .filter(|r| r.status != Status::Ok)
        .collect();
    if !flagged.is_empty() {
        out.push('\n');
        out.push_str(RULE);
        out.push_str("\n\n");
        for record in flagged {
            out.push_str(&format!(
                "  [{}] {} {}\n",
                colored_status(record.status),
                colored_status_code(record.destination_status_code),
                record.source_path
            ));
            for issue in &record.issues {
                out.push_str(&format!("      - {}\n", issue.message));
            }
        }
    }

    out
}
