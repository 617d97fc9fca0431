use url::Url;

/// Canonical form of a URL for graph identity: no fragment, no trailing
/// slash on non-root paths, query parameters sorted without re-encoding.
///
/// Returns `None` for strings that do not parse as absolute URLs.
pub fn normalize_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);

    // All trailing slashes go, otherwise "/a//" would need two passes.
    let path = parsed.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed = path.trim_end_matches('/');
        parsed.set_path(if trimmed.is_empty() { "/" } else { trimmed });
    }

    // Segments are reordered as written; decoding and re-encoding them
    // would request a URL the page never linked.
    if let Some(query) = parsed.query() {
        let mut segments: Vec<&str> = query.split('&').filter(|s| !s.is_empty()).collect();
        segments.sort_by(|a, b| query_key(a).cmp(&query_key(b)));
        let sorted = segments.join("&");
        parsed.set_query(if sorted.is_empty() { None } else { Some(&sorted) });
    }

    Some(parsed.to_string())
}

fn query_key(segment: &str) -> (&str, &str) {
    segment.split_once('=').unwrap_or((segment, ""))
}

/// Resolve an href found on `base` into an absolute http(s) URL.
pub fn resolve_link(base: &Url, href: &str) -> Option<Url> {
    let href = href.trim();
    if href.is_empty()
        || href.starts_with('#')
        || href.starts_with("javascript:")
        || href.starts_with("mailto:")
        || href.starts_with("tel:")
        || href.starts_with("data:")
    {
        return None;
    }

    let resolved = base.join(href).ok()?;
    match resolved.scheme() {
        "http" | "https" => Some(resolved),
        _ => None,
    }
}

/// Host with a leading `www.` removed, lowercased.
pub fn site_host(url: &Url) -> Option<String> {
    url.host_str().map(|host| {
        let host = host.to_ascii_lowercase();
        host.strip_prefix("www.").map(str::to_string).unwrap_or(host)
    })
}

/// Same site means the same host once a leading `www.` is ignored.
pub fn is_same_site(url: &Url, base: &Url) -> bool {
    match (site_host(url), site_host(base)) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

/// Path component of a URL, `/` for the root.
pub fn extract_url_path(url: &str) -> String {
    Url::parse(url)
        .ok()
        .map(|u| {
            let path = u.path().to_string();
            if path.is_empty() || path == "/" {
                "/".to_string()
            } else {
                path
            }
        })
        .unwrap_or_else(|| url.to_string())
}
