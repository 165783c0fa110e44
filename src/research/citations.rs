//! Citation markers and source locators.
//!
//! In-text citations are bracketed source numbers: `[3]` or `[1, 2, 4]`.

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

static CITATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[(\d+(?:\s*,\s*\d+)*)\]").expect("citation pattern is valid")
});

static SOURCE_LINE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\[(\d+)\]\s*(.+?)\s*:\s*(\S+)\s*$").expect("source line pattern is valid")
});

/// All source numbers cited in `text`, in order of appearance, duplicates kept.
pub fn extract_citations(text: &str) -> Vec<usize> {
    CITATION_RE
        .captures_iter(text)
        .flat_map(|cap| {
            cap[1]
                .split(',')
                .filter_map(|n| n.trim().parse::<usize>().ok())
                .collect::<Vec<_>>()
        })
        .collect()
}

/// Removes citation markers and tidies the whitespace they leave behind.
pub fn strip_citations(text: &str) -> String {
    let stripped = CITATION_RE.replace_all(text, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .replace(" .", ".")
        .replace(" ,", ",")
        .replace(" ;", ";")
        .replace(" :", ":")
}

/// Rewrites every citation through `map`; numbers mapping to `None` are dropped.
///
/// A marker whose numbers all drop disappears entirely.
pub fn remap_citations<F>(text: &str, map: F) -> String
where
    F: Fn(usize) -> Option<usize>,
{
    CITATION_RE
        .replace_all(text, |cap: &regex::Captures<'_>| {
            let mapped: BTreeSet<usize> = cap[1]
                .split(',')
                .filter_map(|n| n.trim().parse::<usize>().ok())
                .filter_map(&map)
                .collect();
            format_citations(&mapped)
        })
        .into_owned()
}

/// `{1, 3}` renders as `[1][3]`.
pub fn format_citations(indices: &BTreeSet<usize>) -> String {
    indices.iter().map(|i| format!("[{}]", i)).collect()
}

/// Canonical form of a locator used to spot the same source twice.
pub fn normalize_locator(locator: &str) -> String {
    let lowered = locator.trim().to_lowercase();
    let without_scheme = lowered
        .strip_prefix("https://")
        .or_else(|| lowered.strip_prefix("http://"))
        .unwrap_or(&lowered);
    let without_www = without_scheme
        .strip_prefix("www.")
        .unwrap_or(without_scheme);
    let without_fragment = without_www.split('#').next().unwrap_or(without_www);
    without_fragment.trim_end_matches('/').to_string()
}

/// Parses a `[n] Title: locator` line.
pub fn parse_source_line(line: &str) -> Option<(usize, String, String)> {
    let cap = SOURCE_LINE_RE.captures(line)?;
    let index = cap[1].parse().ok()?;
    Some((index, cap[2].to_string(), cap[3].to_string()))
}

/// True for headings that open a source list.
pub fn is_sources_heading(heading: &str) -> bool {
    let h = heading
        .trim()
        .trim_start_matches('#')
        .trim()
        .trim_end_matches(':')
        .to_lowercase();
    matches!(
        h.as_str(),
        "sources" | "references" | "citations" | "bibliography" | "sources used"
    )
}
