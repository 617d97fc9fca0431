use crate::error::{Result, ScanError};
use crate::extract::extract_page;
use crate::fetch::{FetchOptions, PageFetcher};
use crate::normalize::{extract_url_path, is_same_site, normalize_url, resolve_link};
use crate::result::{CrawlOutput, CrawlRecord, CrawlStats};
use crate::scheduler::run_bounded;
use regex::{Regex, RegexBuilder};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use url::Url;

/// Called once per fetched page, as soon as its record exists.
pub type ProgressCallback = Arc<dyn Fn(&CrawlRecord) + Send + Sync>;

/// Compile exclusion patterns. Matching is case-insensitive against the
/// normalized URL.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ScanError::InvalidPattern {
                    pattern: pattern.clone(),
                    source,
                })
        })
        .collect()
}

#[derive(Debug, Clone)]
struct FrontierItem {
    url: String,
    depth: usize,
    discovered_from: Option<String>,
}

/// What one fetch contributes back to the run.
struct Visit {
    /// Position in fetch completion order within the run.
    finished: usize,
    record: CrawlRecord,
    /// Final URL of the response; hrefs are resolved against it.
    base: Option<Url>,
    links: Vec<String>,
}

/// State of a single `crawl()` call. Only the traversal loop touches it, and
/// only between scheduler rounds.
struct CrawlRun {
    frontier: VecDeque<FrontierItem>,
    visited: HashSet<String>,
    discovered: HashSet<String>,
    records: Vec<CrawlRecord>,
    stats: CrawlStats,
}

impl CrawlRun {
    fn new(root: String) -> Self {
        let mut discovered = HashSet::new();
        discovered.insert(root.clone());

        let mut frontier = VecDeque::new();
        frontier.push_back(FrontierItem {
            url: root,
            depth: 0,
            discovered_from: None,
        });

        Self {
            frontier,
            visited: HashSet::new(),
            discovered,
            records: Vec::new(),
            stats: CrawlStats::default(),
        }
    }

    /// Pop up to `size` items and keep the ones that should be fetched.
    /// Survivors are marked visited before anything is fetched.
    fn next_batch(&mut self, size: usize, max_depth: usize, exclude: &[Regex]) -> Vec<FrontierItem> {
        let mut batch = Vec::new();
        let take = size.min(self.frontier.len());

        for item in self.frontier.drain(..take) {
            if self.visited.contains(&item.url) {
                continue;
            }
            if item.depth > max_depth {
                debug!("Skipping {} (depth {} > {})", item.url, item.depth, max_depth);
                self.stats.skipped_due_to_depth += 1;
                continue;
            }
            if exclude.iter().any(|re| re.is_match(&item.url)) {
                debug!("Skipping {} (excluded)", item.url);
                self.stats.skipped_due_to_exclude += 1;
                continue;
            }
            self.visited.insert(item.url.clone());
            batch.push(item);
        }

        batch
    }

    fn absorb(&mut self, visit: Visit, site: &Url) {
        let Visit {
            record,
            base,
            links,
            ..
        } = visit;

        if record.is_success() {
            self.stats.successful_crawls += 1;
        } else {
            self.stats.failed_crawls += 1;
        }

        if let Some(base) = base {
            let mut queued = 0;
            for href in links {
                let Some(resolved) = resolve_link(&base, &href) else {
                    continue;
                };
                if !is_same_site(&resolved, site) {
                    continue;
                }
                let Some(normalized) = normalize_url(resolved.as_str()) else {
                    continue;
                };
                if self.visited.contains(&normalized) || !self.discovered.insert(normalized.clone()) {
                    continue;
                }
                self.frontier.push_back(FrontierItem {
                    url: normalized,
                    depth: record.depth + 1,
                    discovered_from: Some(record.url.clone()),
                });
                queued += 1;
            }
            debug!("{} queued {} new link(s)", record.url, queued);
        }

        self.records.push(record);
    }
}

/// Breadth-first, same-site link discovery.
pub struct Crawler {
    fetcher: Arc<dyn PageFetcher>,
    fetch_options: FetchOptions,
    max_depth: usize,
    concurrency: usize,
    delay: Duration,
    exclude: Vec<Regex>,
    progress_callback: Option<ProgressCallback>,
}

impl Crawler {
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        let fetch_options = FetchOptions::default().with_timeout(fetcher.default_timeout());
        Self {
            fetcher,
            fetch_options,
            max_depth: 3,
            concurrency: 5,
            delay: Duration::ZERO,
            exclude: Vec::new(),
            progress_callback: None,
        }
    }

    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Pause after each fetch, inside the fetching slot.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_options.timeout = timeout;
        self
    }

    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.fetch_options.max_retries = retries;
        self
    }

    pub fn with_exclude_patterns(mut self, patterns: &[String]) -> Result<Self> {
        self.exclude = compile_patterns(patterns)?;
        Ok(self)
    }

    pub fn with_progress_callback(mut self, callback: ProgressCallback) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    pub async fn crawl(&self, start_url: &str) -> Result<CrawlOutput> {
        let parsed = Url::parse(start_url)
            .map_err(|e| ScanError::InvalidUrl(format!("{}: {}", start_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ScanError::InvalidUrl(format!(
                "{}: only http and https are supported",
                start_url
            )));
        }
        let root = normalize_url(parsed.as_str())
            .ok_or_else(|| ScanError::InvalidUrl(start_url.to_string()))?;

        info!(
            "Starting crawl of {} (max depth {}, concurrency {}, fetcher {})",
            root,
            self.max_depth,
            self.concurrency,
            self.fetcher.name()
        );

        let started = Instant::now();
        let mut run = CrawlRun::new(root);
        let batch_size = self.concurrency * 2;
        let completions = AtomicUsize::new(0);

        while !run.frontier.is_empty() {
            let batch = run.next_batch(batch_size, self.max_depth, &self.exclude);
            if batch.is_empty() {
                continue;
            }

            debug!(
                "Fetching batch of {} ({} left in frontier)",
                batch.len(),
                run.frontier.len()
            );
            let mut visits = run_bounded(
                batch,
                self.concurrency,
                |item| self.visit(item, &completions),
                None,
            )
            .await;
            visits.sort_by_key(|visit| visit.finished);
            for visit in visits {
                run.absorb(visit, &parsed);
            }
        }

        let CrawlRun {
            records, mut stats, ..
        } = run;
        stats.total_urls = records.len();
        stats.duration_ms = started.elapsed().as_millis() as u64;

        info!(
            "Crawl complete. {} URLs ({} ok, {} failed) in {}ms",
            stats.total_urls, stats.successful_crawls, stats.failed_crawls, stats.duration_ms
        );

        Ok(CrawlOutput { records, stats })
    }

    async fn visit(&self, item: FrontierItem, completions: &AtomicUsize) -> Visit {
        let outcome = self.fetcher.fetch(&item.url, &self.fetch_options).await;
        let finished = completions.fetch_add(1, Ordering::Relaxed);

        let mut record = CrawlRecord {
            path: extract_url_path(&item.url),
            url: item.url,
            title: None,
            status_code: 0,
            depth: item.depth,
            discovered_from: item.discovered_from,
        };
        let mut base = None;
        let mut links = Vec::new();

        match outcome {
            Ok(page) => {
                record.status_code = page.status_code;
                if page.is_success() && page.is_html() {
                    let content = extract_page(&page.body);
                    record.title = content.title;
                    links = content.links;
                    base = Url::parse(&page.final_url).ok();
                } else if !page.is_success() {
                    debug!("{} returned {}", record.url, page.status_code);
                }
            }
            Err(failure) => {
                warn!("Crawl error for {}: {}", record.url, failure);
            }
        }

        if let Some(ref callback) = self.progress_callback {
            callback(&record);
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        Visit {
            finished,
            record,
            base,
            links,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::direct::DirectFetcher;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use wiremock::{
        Mock, MockServer, ResponseTemplate,
        matchers::{method, path},
    };

    async fn mount_page(server: &MockServer, at: &str, title: &str, links: &[&str]) {
        let anchors: String = links
            .iter()
            .map(|href| format!(r#"<a href="{}">link</a>"#, href))
            .collect();
        let html = format!(
            "<html><head><title>{}</title></head><body>{}</body></html>",
            title, anchors
        );
        Mock::given(method("GET"))
            .and(path(at))
            .respond_with(ResponseTemplate::new(200).set_body_raw(html, "text/html"))
            .mount(server)
            .await;
    }

    fn crawler() -> Crawler {
        Crawler::new(Arc::new(DirectFetcher::new().unwrap())).with_max_retries(0)
    }

    #[tokio::test]
    async fn test_excluded_page_is_skipped() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Home", &["/a"]).await;
        mount_page(&mock_server, "/a", "A", &["/b", "/"]).await;
        mount_page(&mock_server, "/b", "B", &[]).await;

        let output = crawler()
            .with_max_depth(5)
            .with_exclude_patterns(&["/b".to_string()])
            .unwrap()
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.stats.skipped_due_to_exclude, 1);
        assert_eq!(output.stats.total_urls, 2);
        assert_eq!(output.stats.successful_crawls, 2);
        assert!(output.records.iter().all(|r| !r.url.ends_with("/b")));
    }

    #[tokio::test]
    async fn test_exclusion_is_case_insensitive() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Home", &["/Admin/panel", "/docs"]).await;
        mount_page(&mock_server, "/docs", "Docs", &[]).await;

        let output = crawler()
            .with_exclude_patterns(&["/admin".to_string()])
            .unwrap()
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.stats.skipped_due_to_exclude, 1);
    }

    #[tokio::test]
    async fn test_depth_limit() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Root", &["/one"]).await;
        mount_page(&mock_server, "/one", "One", &["/two"]).await;
        mount_page(&mock_server, "/two", "Two", &["/three"]).await;

        let output = crawler()
            .with_max_depth(1)
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        let paths: Vec<&str> = output.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/one"]);
        assert_eq!(output.stats.skipped_due_to_depth, 1);
    }

    #[tokio::test]
    async fn test_depths_follow_parents_and_urls_are_unique() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Root", &["/a", "/b", "/a/#top", "/b/"]).await;
        mount_page(&mock_server, "/a", "A", &["/c", "/b", "/"]).await;
        mount_page(&mock_server, "/b", "B", &["/c?y=2&x=1", "/c?x=1&y=2"]).await;
        mount_page(&mock_server, "/c", "C", &["/a"]).await;

        let output = crawler()
            .with_max_depth(5)
            .with_concurrency(3)
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        let by_url: HashMap<&str, &CrawlRecord> =
            output.records.iter().map(|r| (r.url.as_str(), r)).collect();
        assert_eq!(by_url.len(), output.records.len(), "duplicate records");

        for record in &output.records {
            match &record.discovered_from {
                None => assert_eq!(record.depth, 0),
                Some(parent) => {
                    let parent = by_url.get(parent.as_str()).expect("parent was crawled");
                    assert_eq!(record.depth, parent.depth + 1);
                }
            }
        }

        // "/", "/a", "/b", "/c" and "/c?x=1&y=2"
        assert_eq!(output.records.len(), 5);
    }

    #[tokio::test]
    async fn test_breadth_first_order_with_single_slot() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Root", &["/a", "/b", "/c"]).await;
        mount_page(&mock_server, "/a", "A", &["/a1", "/a2"]).await;
        mount_page(&mock_server, "/b", "B", &["/b1"]).await;
        mount_page(&mock_server, "/c", "C", &[]).await;
        for leaf in ["/a1", "/a2", "/b1"] {
            mount_page(&mock_server, leaf, "Leaf", &[]).await;
        }

        let output = crawler()
            .with_concurrency(1)
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        let depths: Vec<usize> = output.records.iter().map(|r| r.depth).collect();
        assert_eq!(depths, vec![0, 1, 1, 1, 2, 2, 2]);
        let paths: Vec<&str> = output.records.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["/", "/a", "/b", "/c", "/a1", "/a2", "/b1"]);
    }

    #[tokio::test]
    async fn test_failed_pages_are_recorded_but_not_expanded() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Root", &["/gone", "/ok"]).await;
        mount_page(&mock_server, "/ok", "Fine", &[]).await;
        Mock::given(method("GET"))
            .and(path("/gone"))
            .respond_with(ResponseTemplate::new(404).set_body_raw(
                r#"<html><title>Missing</title><a href="/hidden">x</a></html>"#,
                "text/html",
            ))
            .mount(&mock_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/hidden"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&mock_server)
            .await;

        let output = crawler().crawl(&mock_server.uri()).await.unwrap();

        let gone = output
            .records
            .iter()
            .find(|r| r.path == "/gone")
            .expect("404 page recorded");
        assert_eq!(gone.status_code, 404);
        assert_eq!(gone.title, None);
        assert_eq!(output.stats.failed_crawls, 1);
        assert_eq!(output.stats.successful_crawls, 2);
        assert_eq!(output.records.len(), 3);
    }

    #[tokio::test]
    async fn test_transport_failure_records_status_zero() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let output = crawler()
            .crawl(&format!("http://127.0.0.1:{}/", port))
            .await
            .unwrap();

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].status_code, 0);
        assert_eq!(output.records[0].title, None);
        assert_eq!(output.stats.failed_crawls, 1);
    }

    #[tokio::test]
    async fn test_other_sites_are_not_followed() {
        let mock_server = MockServer::start().await;
        mount_page(
            &mock_server,
            "/",
            "Root",
            &["https://elsewhere.invalid/page", "mailto:me@example.com", "/local"],
        )
        .await;
        mount_page(&mock_server, "/local", "Local", &[]).await;

        let output = crawler().crawl(&mock_server.uri()).await.unwrap();

        assert_eq!(output.records.len(), 2);
        assert!(output.records.iter().all(|r| r.url.starts_with(&mock_server.uri())));
    }

    #[tokio::test]
    async fn test_progress_callback_sees_every_record() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Root", &["/x", "/y"]).await;
        mount_page(&mock_server, "/x", "X", &[]).await;
        mount_page(&mock_server, "/y", "Y", &[]).await;

        let seen: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let output = crawler()
            .with_progress_callback(Arc::new(move |record: &CrawlRecord| {
                seen_clone.lock().unwrap().push(record.path.clone());
            }))
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        let mut seen = seen.lock().unwrap().clone();
        seen.sort();
        assert_eq!(seen, vec!["/", "/x", "/y"]);
        assert_eq!(output.records.len(), 3);
    }

    #[tokio::test]
    async fn test_titles_are_captured() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Welcome Home", &[]).await;

        let output = crawler().crawl(&mock_server.uri()).await.unwrap();
        assert_eq!(output.records[0].title.as_deref(), Some("Welcome Home"));
        assert_eq!(output.records[0].path, "/");
        assert_eq!(output.records[0].discovered_from, None);
    }

    #[tokio::test]
    async fn test_delay_applies_per_fetch() {
        let mock_server = MockServer::start().await;
        mount_page(&mock_server, "/", "Root", &["/p1", "/p2"]).await;
        mount_page(&mock_server, "/p1", "P1", &[]).await;
        mount_page(&mock_server, "/p2", "P2", &[]).await;

        let started = Instant::now();
        crawler()
            .with_concurrency(1)
            .with_delay(Duration::from_millis(50))
            .crawl(&mock_server.uri())
            .await
            .unwrap();

        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_rejects_invalid_start_url() {
        assert!(crawler().crawl("not a url").await.is_err());
        assert!(crawler().crawl("ftp://example.com/").await.is_err());
    }

    #[test]
    fn test_invalid_exclude_pattern() {
        let result = compile_patterns(&["(unclosed".to_string()]);
        assert!(matches!(result, Err(ScanError::InvalidPattern { .. })));
    }
}
