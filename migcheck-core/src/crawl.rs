use crate::config::CrawlConfig;
use crate::error::Result;
use crate::report::CrawlReport;
use indicatif::{ProgressBar, ProgressStyle};
use migcheck_scanner::{CrawlRecord, Crawler, ProgressCallback, build_fetcher};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

/// Callback for reporting individual crawl records as they come in
pub type CrawlRecordCallback = Arc<dyn Fn(&CrawlRecord) + Send + Sync>;

/// Build a crawler from the configuration.
pub fn build_crawler(config: &CrawlConfig) -> Result<Crawler> {
    let fetcher = build_fetcher(config.fetch.renderer, config.fetch.render_endpoint.as_deref())?;
    let mut crawler = Crawler::new(fetcher)
        .with_max_depth(config.max_depth)
        .with_concurrency(config.fetch.concurrency)
        .with_delay(config.fetch.delay())
        .with_exclude_patterns(&config.exclude)?;
    if let Some(timeout) = config.fetch.timeout() {
        crawler = crawler.with_timeout(timeout);
    }
    Ok(crawler)
}

/// Execute a crawl of the configured source site.
///
/// The configuration is checked before anything is fetched. Per-URL failures
/// end up as records in the report, never as an error here.
pub async fn execute_crawl(
    config: &CrawlConfig,
    show_progress_bars: bool,
    record_callback: Option<CrawlRecordCallback>,
) -> Result<CrawlReport> {
    config.validate()?;

    let progress_bar = if show_progress_bars {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.cyan} {msg}")
                .unwrap(),
        );
        pb.set_message("Starting crawl...");
        Some(Arc::new(pb))
    } else {
        None
    };

    let processed = Arc::new(AtomicUsize::new(0));
    let pb_clone = progress_bar.clone();
    let count_clone = processed.clone();
    let callback: ProgressCallback = Arc::new(move |record: &CrawlRecord| {
        let count = count_clone.fetch_add(1, Ordering::Relaxed) + 1;
        if let Some(ref pb) = pb_clone {
            pb.set_message(format!("Crawling... {} URLs processed ({})", count, record.path));
            pb.tick();
        }
        if let Some(ref cb) = record_callback {
            cb(record);
        }
    });

    let crawler = build_crawler(config)?.with_progress_callback(callback);

    info!(
        "Crawling {} (depth {}, concurrency {})",
        config.source_url, config.max_depth, config.fetch.concurrency
    );
    let output = crawler.crawl(&config.source_url).await?;

    if let Some(ref pb) = progress_bar {
        pb.finish_with_message(format!(
            "Crawl complete! {} URLs processed",
            processed.load(Ordering::Relaxed)
        ));
    }
    info!(
        "Crawl finished: {} ok, {} failed in {}ms",
        output.stats.successful_crawls, output.stats.failed_crawls, output.stats.duration_ms
    );

    Ok(CrawlReport::new(config, output))
}
