use regex::Regex;
use scraper::{Html, Selector};
use std::sync::LazyLock;

static TITLE: LazyLock<Selector> = LazyLock::new(|| Selector::parse("title").unwrap());
static LINKS: LazyLock<Selector> = LazyLock::new(|| Selector::parse("a[href]").unwrap());
static BODY: LazyLock<Selector> = LazyLock::new(|| Selector::parse("body").unwrap());

static SCRIPT_OR_STYLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>").unwrap());
static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?s)<[^>]*>").unwrap());
static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// The three things the rest of the pipeline needs from a page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageContent {
    pub title: Option<String>,
    /// Raw `href` values in document order, unresolved.
    pub links: Vec<String>,
    pub body_text: String,
}

pub fn extract_page(html: &str) -> PageContent {
    let document = Html::parse_document(html);

    let title = document
        .select(&TITLE)
        .next()
        .map(|el| collapse_whitespace(&el.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    let links = document
        .select(&LINKS)
        .filter_map(|el| el.value().attr("href"))
        .map(|href| href.to_string())
        .collect();

    let body_text = document
        .select(&BODY)
        .next()
        .map(|body| collapse_whitespace(&body.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default();

    PageContent {
        title,
        links,
        body_text,
    }
}

/// Text left after dropping scripts, styles and tags, with whitespace runs
/// collapsed to single spaces.
pub fn strip_tags(html: &str) -> String {
    let without_code = SCRIPT_OR_STYLE.replace_all(html, " ");
    let without_tags = TAG.replace_all(&without_code, " ");
    collapse_whitespace(&without_tags)
}

pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
