// Tests for crawl execution and the crawl artifact

use migcheck_core::config::CrawlConfig;
use migcheck_core::crawl::{CrawlRecordCallback, execute_crawl};
use migcheck_core::report::{read_crawl_report, write_json};
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn page(title: &str, links: &[&str]) -> String {
    let anchors: String = links
        .iter()
        .map(|href| format!("<a href=\"{}\">{}</a>", href, href))
        .collect();
    format!(
        "<html><head><title>{}</title></head><body><p>{}</p>{}</body></html>",
        title,
        "Archived content that has to survive the move to the new platform. ".repeat(10),
        anchors
    )
}

fn closed_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn mount(server: &MockServer, at: &str, title: &str, links: &[&str]) {
    Mock::given(method("GET"))
        .and(path(at))
        .respond_with(ResponseTemplate::new(200).set_body_raw(page(title, links), "text/html"))
        .mount(server)
        .await;
}

// ============================================================================
// Crawl Execution Tests
// ============================================================================

#[tokio::test]
async fn test_exclude_pattern_skips_matching_page() {
    let server = MockServer::start().await;
    mount(&server, "/", "Home", &["/a"]).await;
    mount(&server, "/a", "A", &["/b"]).await;
    Mock::given(method("GET"))
        .and(path("/b"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let mut config = CrawlConfig::new(server.uri());
    config.max_depth = 5;
    config.exclude = vec!["/b".to_string()];

    let report = execute_crawl(&config, false, None).await.unwrap();

    assert_eq!(report.urls.len(), 2);
    assert_eq!(report.stats.skipped_due_to_exclude, 1);
    assert_eq!(report.stats.total_urls, 2);
    assert_eq!(report.stats.successful_crawls, 2);
    assert_eq!(report.source_url, server.uri());
    assert_eq!(report.config, config);
}

#[tokio::test]
async fn test_record_callback_sees_every_record() {
    let server = MockServer::start().await;
    mount(&server, "/", "Home", &["/one", "/two"]).await;
    mount(&server, "/one", "One", &[]).await;
    mount(&server, "/two", "Two", &[]).await;

    let seen = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let callback: CrawlRecordCallback = Arc::new(move |record| {
        seen_clone.lock().unwrap().push(record.path.clone());
    });

    let config = CrawlConfig::new(server.uri());
    let report = execute_crawl(&config, false, Some(callback)).await.unwrap();

    let mut seen = seen.lock().unwrap().clone();
    seen.sort();
    assert_eq!(seen, vec!["/", "/one", "/two"]);
    assert_eq!(report.urls.len(), 3);
}

#[tokio::test]
async fn test_unreachable_site_still_produces_report() {
    let mut config = CrawlConfig::new(format!("http://127.0.0.1:{}/", closed_port()));
    config.fetch.timeout_ms = Some(2000);

    let report = execute_crawl(&config, false, None).await.unwrap();

    assert_eq!(report.urls.len(), 1);
    assert_eq!(report.urls[0].status_code, 0);
    assert_eq!(report.stats.failed_crawls, 1);
}

// ============================================================================
// Crawl Artifact Tests
// ============================================================================

#[tokio::test]
async fn test_crawl_artifact_shape() {
    let server = MockServer::start().await;
    mount(&server, "/", "Home", &["/about"]).await;
    Mock::given(method("GET"))
        .and(path("/about"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(
            format!("<html><body>{}</body></html>", "No title on this one. ".repeat(30)),
            "text/html",
        ))
        .mount(&server)
        .await;

    let config = CrawlConfig::new(server.uri());
    let report = execute_crawl(&config, false, None).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("out").join("crawl.json");
    write_json(&file, &report).unwrap();

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&file).unwrap()).unwrap();
    for key in ["sourceUrl", "urls", "stats", "crawledAt", "config"] {
        assert!(raw.get(key).is_some(), "missing {}", key);
    }
    for key in [
        "totalUrls",
        "successfulCrawls",
        "failedCrawls",
        "skippedDueToDepth",
        "skippedDueToExclude",
        "durationMs",
    ] {
        assert!(raw["stats"].get(key).is_some(), "missing stats.{}", key);
    }

    let root = &raw["urls"][0];
    assert_eq!(root["path"], "/");
    assert_eq!(root["statusCode"], 200);
    assert_eq!(root["depth"], 0);
    assert!(root.get("discoveredFrom").is_none());

    let about = &raw["urls"][1];
    assert!(about["title"].is_null());
    assert_eq!(about["discoveredFrom"], root["url"]);

    assert!(chrono::DateTime::parse_from_rfc3339(raw["crawledAt"].as_str().unwrap()).is_ok());

    let back = read_crawl_report(&file).unwrap();
    assert_eq!(back, report);
}
