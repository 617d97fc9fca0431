use serde::{Deserialize, Serialize};

/// One visited URL. `status_code` is 0 when nothing came back at all.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlRecord {
    pub url: String,
    pub path: String,
    pub title: Option<String>,
    pub status_code: u16,
    pub depth: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovered_from: Option<String>,
}

impl CrawlRecord {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrawlStats {
    pub total_urls: usize,
    pub successful_crawls: usize,
    pub failed_crawls: usize,
    pub skipped_due_to_depth: usize,
    pub skipped_due_to_exclude: usize,
    pub duration_ms: u64,
}

/// Everything a finished crawl produced, in fetch completion order.
#[derive(Debug, Clone, Default)]
pub struct CrawlOutput {
    pub records: Vec<CrawlRecord>,
    pub stats: CrawlStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serializes_camel_case() {
        let record = CrawlRecord {
            url: "https://example.com/a".to_string(),
            path: "/a".to_string(),
            title: None,
            status_code: 0,
            depth: 1,
            discovered_from: Some("https://example.com/".to_string()),
        };

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["statusCode"], 0);
        assert_eq!(json["discoveredFrom"], "https://example.com/");
        assert!(json["title"].is_null());
    }

    #[test]
    fn test_root_record_omits_discovered_from() {
        let record = CrawlRecord {
            url: "https://example.com/".to_string(),
            path: "/".to_string(),
            title: Some("Home".to_string()),
            status_code: 200,
            depth: 0,
            discovered_from: None,
        };

        let json = serde_json::to_string(&record).unwrap();
        assert!(!json.contains("discoveredFrom"));
        let back: CrawlRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn test_stats_field_names() {
        let json = serde_json::to_value(CrawlStats::default()).unwrap();
        for key in [
            "totalUrls",
            "successfulCrawls",
            "failedCrawls",
            "skippedDueToDepth",
            "skippedDueToExclude",
            "durationMs",
        ] {
            assert!(json.get(key).is_some(), "missing {}", key);
        }
    }
}
