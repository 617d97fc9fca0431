use anyhow::{Context, Result};
use clap::ArgMatches;
use colored::Colorize;
use migcheck_core::config::{CrawlConfig, FetchSettings, RedirectPolicy, ValidationConfig};
use migcheck_core::report::{
    CrawlReport, ValidationReport, default_output_name, generate_crawl_summary,
    generate_validation_summary, read_crawl_report, write_json,
};
use migcheck_core::{CoreError, execute_crawl, execute_validation, pages_from_crawl};
use migcheck_scanner::RendererKind;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use url::Url;

pub const EXIT_IO: i32 = 1;
pub const EXIT_CONFIG: i32 = 2;

/// Logs go to stderr so stdout only carries summaries.
pub fn init_logging(verbose: bool, quiet: bool) {
    let level = if verbose {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    };

    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Configuration errors exit with 2, everything else with 1.
pub fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<CoreError>() {
        Some(e) if e.is_config() => EXIT_CONFIG,
        _ => EXIT_IO,
    }
}

pub fn fetch_settings_from(args: &ArgMatches) -> FetchSettings {
    FetchSettings {
        concurrency: args.get_one::<usize>("concurrency").copied().unwrap_or(5),
        timeout_ms: args.get_one::<u64>("timeout").copied(),
        delay_ms: args.get_one::<u64>("delay").copied().unwrap_or(0),
        renderer: args
            .get_one::<RendererKind>("renderer")
            .copied()
            .unwrap_or_default(),
        render_endpoint: args
            .get_one::<Url>("render-endpoint")
            .map(|u| u.to_string()),
    }
}

pub fn crawl_config_from(args: &ArgMatches) -> Result<CrawlConfig> {
    let url = args
        .get_one::<Url>("url")
        .context("--url is required")?;

    Ok(CrawlConfig {
        source_url: url.to_string(),
        max_depth: args.get_one::<usize>("depth").copied().unwrap_or(3),
        exclude: args
            .get_many::<String>("exclude")
            .map(|values| values.cloned().collect())
            .unwrap_or_default(),
        fetch: fetch_settings_from(args),
    })
}

pub fn validation_config_from(args: &ArgMatches, source_url: &str) -> Result<ValidationConfig> {
    let destination = args
        .get_one::<Url>("destination")
        .context("--destination is required")?;

    Ok(ValidationConfig {
        source_url: source_url.to_string(),
        destination_url: destination.to_string(),
        redirect_policy: args
            .get_one::<RedirectPolicy>("redirects")
            .copied()
            .unwrap_or_default(),
        fetch: fetch_settings_from(args),
    })
}

fn output_path(args: &ArgMatches, id: &str, kind: &str, url: &str) -> PathBuf {
    args.get_one::<PathBuf>(id)
        .cloned()
        .unwrap_or_else(|| default_output_name(kind, url, &chrono::Local::now()))
}

fn print_written(what: &str, path: &Path) {
    println!(
        "{} {} written to {}",
        "✓".green().bold(),
        what,
        path.display().to_string().bright_white()
    );
}

async fn run_crawl(config: &CrawlConfig, path: &Path, quiet: bool) -> Result<CrawlReport> {
    let report = execute_crawl(config, !quiet, None).await?;

    write_json(path, &report)?;
    if !quiet {
        println!("{}", generate_crawl_summary(&report));
        print_written("Crawl results", path);
    }
    Ok(report)
}

async fn run_validation(
    config: &ValidationConfig,
    report: &CrawlReport,
    path: &Path,
    quiet: bool,
) -> Result<ValidationReport> {
    let pages = pages_from_crawl(&report.urls);
    if pages.is_empty() {
        warn!("No successfully crawled pages to validate");
    }

    let validation = execute_validation(config, pages, !quiet).await?;

    write_json(path, &validation)?;
    if !quiet {
        println!("{}", generate_validation_summary(&validation));
        print_written("Validation report", path);
    }
    Ok(validation)
}

pub async fn handle_crawl(args: &ArgMatches, quiet: bool) -> Result<CrawlReport> {
    let config = crawl_config_from(args)?;
    config.validate().map_err(CoreError::from)?;

    let path = output_path(args, "output", "crawl", &config.source_url);
    run_crawl(&config, &path, quiet).await
}

pub async fn handle_validate(args: &ArgMatches, quiet: bool) -> Result<ValidationReport> {
    let input = args
        .get_one::<PathBuf>("input")
        .context("--input is required")?;
    let crawl = read_crawl_report(input)
        .with_context(|| format!("Could not load crawl results from {}", input.display()))?;
    info!(
        "Loaded {} crawl record(s) for {}",
        crawl.urls.len(),
        crawl.source_url
    );

    let config = validation_config_from(args, &crawl.source_url)?;
    config.validate().map_err(CoreError::from)?;

    let path = output_path(args, "output", "validation", &config.destination_url);
    run_validation(&config, &crawl, &path, quiet).await
}

pub async fn handle_check(args: &ArgMatches, quiet: bool) -> Result<ValidationReport> {
    let crawl_config = crawl_config_from(args)?;
    let validation_config = validation_config_from(args, &crawl_config.source_url)?;
    // Reject both before fetching anything.
    crawl_config.validate().map_err(CoreError::from)?;
    validation_config.validate().map_err(CoreError::from)?;

    let crawl_path = output_path(args, "crawl-output", "crawl", &crawl_config.source_url);
    let crawl = run_crawl(&crawl_config, &crawl_path, quiet).await?;

    let path = output_path(args, "output", "validation", &validation_config.destination_url);
    run_validation(&validation_config, &crawl, &path, quiet).await
}
