// Soft-404 detection: 200 responses whose content says the page is gone

use migcheck_scanner::extract::strip_tags;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Title fragments that suggest an error page.
pub const ERROR_TITLE_PATTERNS: &[&str] = &[
    r"\b404\b",
    r"not\s+found",
    r"\berror\b",
    r"\bmissing\b",
    r"\boops\b",
    r"page\s+unavailable",
];

/// Body phrases, matched against case-folded body text.
pub const ERROR_BODY_PATTERNS: &[&str] = &[
    r"page not found",
    r"page (could|can) ?not be found",
    r"could not be found",
    r"doesn'?t exist",
    r"does not exist",
    r"no longer available",
    r"cannot be found",
    r"404 error",
    r"error 404",
    r"we couldn'?t find",
    r"nothing (was )?found",
];

static DEFAULT_RULES: LazyLock<SoftNotFoundRules> = LazyLock::new(SoftNotFoundRules::default);

/// Scoring table for soft-404 detection. Weights are in percentage points so
/// sums and thresholds stay exact.
#[derive(Debug, Clone)]
pub struct SoftNotFoundRules {
    pub title_patterns: Vec<Regex>,
    pub body_patterns: Vec<Regex>,
    pub title_points: u32,
    /// Body score is `min(body_base + body_step * matches, body_cap)`.
    pub body_base: u32,
    pub body_step: u32,
    pub body_cap: u32,
    pub short_body_chars: usize,
    pub short_body_points: u32,
    pub minimal_text_chars: usize,
    pub minimal_text_points: u32,
    pub threshold: u32,
}

fn compile(patterns: &[&str]) -> Result<Vec<Regex>, regex::Error> {
    patterns
        .iter()
        .map(|p| RegexBuilder::new(p).case_insensitive(true).build())
        .collect()
}

impl Default for SoftNotFoundRules {
    fn default() -> Self {
        // The built-in lists are constants and covered by tests.
        Self::with_patterns(ERROR_TITLE_PATTERNS, ERROR_BODY_PATTERNS)
            .expect("built-in soft-404 patterns compile")
    }
}

impl SoftNotFoundRules {
    /// Default weights with caller-supplied pattern lists.
    pub fn with_patterns(title: &[&str], body: &[&str]) -> Result<Self, regex::Error> {
        Ok(Self {
            title_patterns: compile(title)?,
            body_patterns: compile(body)?,
            title_points: 40,
            body_base: 30,
            body_step: 10,
            body_cap: 50,
            short_body_chars: 500,
            short_body_points: 20,
            minimal_text_chars: 100,
            minimal_text_points: 30,
            threshold: 50,
        })
    }

    /// Score a response. `body_text` is the extracted page text, `raw_body`
    /// the response body as received.
    pub fn check(
        &self,
        status_code: u16,
        title: Option<&str>,
        body_text: &str,
        raw_body: &str,
    ) -> SoftNotFoundVerdict {
        // A real 404 (or anything else) is not a soft one.
        if status_code != 200 {
            return SoftNotFoundVerdict::default();
        }

        let mut points = 0;
        let mut reasons = Vec::new();

        if let Some(title) = title
            && self.title_patterns.iter().any(|re| re.is_match(title))
        {
            points += self.title_points;
            reasons.push(format!("Title contains error indicator: \"{}\"", title));
        }

        let folded = body_text.to_lowercase();
        let matches = self
            .body_patterns
            .iter()
            .filter(|re| re.is_match(&folded))
            .count() as u32;
        if matches > 0 {
            points += (self.body_base + self.body_step * matches).min(self.body_cap);
            reasons.push(format!("Body contains {} error phrase(s)", matches));
        }

        let raw_len = raw_body.chars().count();
        if raw_len < self.short_body_chars {
            points += self.short_body_points;
            reasons.push(format!("Very short response ({} chars)", raw_len));
        }

        let text_len = strip_tags(raw_body).chars().count();
        if text_len < self.minimal_text_chars {
            points += self.minimal_text_points;
            reasons.push(format!("Minimal text content ({} chars)", text_len));
        }

        let points = points.min(100);
        SoftNotFoundVerdict {
            is_soft_404: points >= self.threshold,
            confidence: f64::from(points) / 100.0,
            reasons,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SoftNotFoundVerdict {
    #[serde(rename = "isSoft404")]
    pub is_soft_404: bool,
    /// 0.0 to 1.0.
    pub confidence: f64,
    pub reasons: Vec<String>,
}

impl SoftNotFoundVerdict {
    pub fn confidence_percent(&self) -> u32 {
        (self.confidence * 100.0).round() as u32
    }
}

/// Check against the built-in rules.
pub fn detect_soft_404(
    status_code: u16,
    title: Option<&str>,
    body_text: &str,
    raw_body: &str,
) -> SoftNotFoundVerdict {
    DEFAULT_RULES.check(status_code, title, body_text, raw_body)
}
