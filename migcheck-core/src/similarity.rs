// Title comparison between source and destination pages

use std::collections::HashMap;

/// Above this Dice coefficient two normalized titles count as the same.
pub const SIMILARITY_THRESHOLD: f64 = 0.8;

/// Lowercase, drop anything that is not alphanumeric or whitespace, then
/// collapse whitespace runs.
pub fn normalize_title(title: &str) -> String {
    let kept: String = title
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Sørensen–Dice coefficient over character bigrams, counting repeated
/// bigrams as a multiset.
pub fn dice_coefficient(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.len() < 2 || b.len() < 2 {
        return 0.0;
    }

    let mut counts: HashMap<(char, char), usize> = HashMap::new();
    for pair in a.windows(2) {
        *counts.entry((pair[0], pair[1])).or_default() += 1;
    }

    let mut shared = 0;
    for pair in b.windows(2) {
        if let Some(count) = counts.get_mut(&(pair[0], pair[1]))
            && *count > 0
        {
            *count -= 1;
            shared += 1;
        }
    }

    (2 * shared) as f64 / (a.len() + b.len() - 2) as f64
}

/// Whether two page titles describe the same page.
///
/// Missing and blank titles are treated alike: two missing titles match,
/// one missing title does not. A title made only of punctuation matches
/// another such title and nothing else.
pub fn titles_match(source: Option<&str>, destination: Option<&str>) -> bool {
    let source = source.map(str::trim).filter(|t| !t.is_empty());
    let destination = destination.map(str::trim).filter(|t| !t.is_empty());

    let (source, destination) = match (source, destination) {
        (None, None) => return true,
        (Some(s), Some(d)) => (normalize_title(s), normalize_title(d)),
        _ => return false,
    };

    if source == destination {
        return true;
    }
    if source.is_empty() || destination.is_empty() {
        return false;
    }
    // Covers a site name appended or dropped during the move.
    if source.contains(&destination) || destination.contains(&source) {
        return true;
    }

    dice_coefficient(&source, &destination) > SIMILARITY_THRESHOLD
}
