//! Report synthesis: the `full` report and its `preview`.
//!
//! The model writes prose only (summary, one analysis per path, a
//! recommendation). Headings, path order, path titles, the diagram and the
//! source list are assembled here, so they hold whatever the model returns.

use crate::llm::json::parse_json_response;
use crate::llm::{with_timeout, LLMClient};
use crate::research::citations::{remap_citations, strip_citations};
use crate::research::prompts;
use crate::types::{
    AppError, CompressedFindings, PathFindings, ReportArtifacts, ResearchBrief, ResearchOutline,
    Result,
};
use regex::{Captures, Regex};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{info, instrument, warn};

static TIMELINE_RANGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:between\s+(\d+(?:\.\d+)?)\s+and\s+(\d+(?:\.\d+)?)|(?:from\s+)?(\d+(?:\.\d+)?)\s*(?:-|–|—|to)\s*(\d+(?:\.\d+)?))(\s*-?\s*)(days?|weeks?|months?|years?)\b",
    )
    .expect("timeline pattern is valid")
});

const UNLOCK_SECTION: &str = "## Unlock the Full Report

The full report includes:
- A detailed analysis of every career path listed above
- Salary ranges, demand outlook and automation risk for each path
- Entry requirements, progression routes and the employers hiring now
- A step-by-step learning plan with curated resources
- Every source we used, fully cited";

const FULL_REPORT_POINTER: &str =
    "_The full report contains the complete analysis for each path, with sources._";

const MISSING_PATH_NOTE: &str = "_No verified findings were collected for this path._";

/// Words after a duration range that make it a requirement or an age, not a timeline.
const NON_TIMELINE_AFTER: [&str; 12] = [
    "of experience",
    "experience",
    "of relevant",
    "of professional",
    "of work",
    "of industry",
    "of clinical",
    "of service",
    "of age",
    "old",
    "ago",
    "in post",
];

const NON_TIMELINE_BEFORE: [&str; 3] = ["aged", "ages", "age"];

/// Rewrites timeline ranges to their upper bound: "3-6 months" becomes "6 months".
///
/// Experience requirements ("5-10 years of experience") and ages
/// ("aged 25-34 years") keep their range.
pub fn collapse_timeline_ranges(text: &str) -> String {
    TIMELINE_RANGE_RE
        .replace_all(text, |cap: &Captures<'_>| {
            if let Some(kept) = cap.get(0).filter(|m| !is_timeline(text, m.start(), m.end())) {
                return kept.as_str().to_string();
            }
            let (low, high) = match (cap.get(1), cap.get(2)) {
                (Some(low), Some(high)) => (low.as_str(), high.as_str()),
                _ => (
                    cap.get(3).map_or("", |m| m.as_str()),
                    cap.get(4).map_or("", |m| m.as_str()),
                ),
            };
            let upper = match (low.parse::<f64>(), high.parse::<f64>()) {
                (Ok(l), Ok(h)) if l > h => low,
                _ => high,
            };
            format!("{}{}{}", upper, &cap[5], &cap[6])
        })
        .into_owned()
}

fn is_timeline(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].trim_end().to_lowercase();
    let after = text[end..]
        .trim_start_matches(['\'', '\u{2019}'])
        .trim_start()
        .to_lowercase();
    let ends_with_word = |word: &str| {
        before.ends_with(word)
            && !before[..before.len() - word.len()]
                .chars()
                .next_back()
                .is_some_and(char::is_alphanumeric)
    };
    !NON_TIMELINE_BEFORE.iter().any(|w| ends_with_word(w))
        && !NON_TIMELINE_AFTER.iter().any(|w| after.starts_with(w))
}

/// Makes an artifact safe to carry as one JSON string and to hand to a renderer.
///
/// Back-tick mermaid fences become `~~~mermaid` fences, line endings become
/// `\n`, and control characters other than `\n` and `\t` are removed.
pub fn sanitize_artifact(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = Vec::new();
    let mut in_mermaid = false;
    for line in normalized.lines() {
        let trimmed = line.trim();
        if !in_mermaid && trimmed.starts_with("```mermaid") {
            in_mermaid = true;
            out.push("~~~mermaid".to_string());
        } else if in_mermaid && trimmed == "```" {
            in_mermaid = false;
            out.push("~~~".to_string());
        } else {
            out.push(line.to_string());
        }
    }
    let mut joined = out.join("\n");
    if normalized.ends_with('\n') {
        joined.push('\n');
    }
    joined
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(default)]
    executive_summary: String,
    #[serde(default)]
    paths: Vec<PathAnalysis>,
    #[serde(default)]
    recommendation: String,
}

#[derive(Debug, Deserialize)]
struct PathAnalysis {
    path: usize,
    #[serde(default)]
    analysis: String,
}

pub struct ReportSynthesizer {
    llm: Arc<dyn LLMClient>,
    call_timeout: Duration,
    preview_summary_ratio: f32,
}

impl ReportSynthesizer {
    pub fn new(llm: Arc<dyn LLMClient>, call_timeout: Duration, preview_summary_ratio: f32) -> Self {
        Self {
            llm,
            call_timeout,
            preview_summary_ratio: preview_summary_ratio.clamp(0.05, 1.0),
        }
    }

    /// Produces both artifacts. Any failure here is terminal for the run.
    #[instrument(skip_all, fields(sources = findings.sources.len(), purchasable = purchasable))]
    pub async fn synthesize(
        &self,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        findings: &CompressedFindings,
        purchasable: bool,
    ) -> Result<ReportArtifacts> {
        let date = chrono::Utc::now().format("%B %-d, %Y").to_string();
        let prompt = prompts::report_prompt(brief, outline, findings, &date);

        let response: ReportResponse = with_timeout(
            self.call_timeout,
            self.llm.generate_with_system(prompts::REPORT_SYSTEM, &prompt),
        )
        .await
        .and_then(|raw| parse_json_response(&raw))
        .map_err(|e| AppError::Structural(format!("report synthesis failed: {}", e)))?;

        let summary = response.executive_summary.trim().to_string();
        if summary.is_empty() {
            return Err(AppError::Structural(
                "report synthesis returned no executive summary".to_string(),
            ));
        }

        let source_count = findings.sources.len();
        let in_range = |text: &str| {
            remap_citations(text.trim(), |n| (1..=source_count).contains(&n).then_some(n))
        };

        let mut analyses: HashMap<usize, String> = HashMap::new();
        for analysis in response.paths {
            let text = strip_leading_heading(&analysis.analysis);
            if !text.trim().is_empty() && outline.path(analysis.path).is_some() {
                analyses.entry(analysis.path).or_insert_with(|| in_range(&text));
            }
        }
        let missing: Vec<usize> = outline
            .paths
            .iter()
            .map(|p| p.index)
            .filter(|i| !analyses.contains_key(i))
            .collect();
        if !missing.is_empty() {
            warn!(?missing, "model omitted path analyses, rendering from findings");
        }

        let full = self.render_full(
            brief,
            outline,
            findings,
            &in_range(&summary),
            &analyses,
            &in_range(&response.recommendation),
            &date,
        );
        let full = sanitize_artifact(&collapse_timeline_ranges(&full));

        let preview = self.render_preview(brief, outline, &summary, purchasable);
        let preview = sanitize_artifact(&collapse_timeline_ranges(&preview));
        let preview = ensure_shorter(preview, &full, brief, outline, purchasable);

        info!(
            full_len = full.len(),
            preview_len = preview.len(),
            "report synthesized"
        );
        Ok(ReportArtifacts { preview, full })
    }

    #[allow(clippy::too_many_arguments)]
    fn render_full(
        &self,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        findings: &CompressedFindings,
        summary: &str,
        analyses: &HashMap<usize, String>,
        recommendation: &str,
        date: &str,
    ) -> String {
        let mut out = format!(
            "# Career Path Report: {}\n\n_Prepared {}_\n\n## Executive Summary\n\n{}\n\n",
            brief.headline(),
            date,
            summary
        );
        out.push_str("## Your Career Paths at a Glance\n\n");
        out.push_str(&path_diagram(brief, outline));
        out.push('\n');

        for path in &outline.paths {
            out.push_str(&format!("\n## Path {}: {}\n\n", path.index, path.title));
            if !path.rationale.trim().is_empty() {
                out.push_str(&format!("_{}_\n\n", path.rationale.trim()));
            }
            match analyses.get(&path.index) {
                Some(analysis) => out.push_str(analysis),
                None => out.push_str(&findings_section(findings.path(path.index))),
            }
            out.push('\n');
        }

        if !recommendation.trim().is_empty() {
            out.push_str(&format!("\n## Recommendation\n\n{}\n", recommendation.trim()));
        }

        if !findings.sources.is_empty() {
            out.push_str("\n## Sources\n\n");
            for source in &findings.sources {
                out.push_str(&format!("{}\n", source));
            }
        }
        out
    }

    fn render_preview(
        &self,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        summary: &str,
        purchasable: bool,
    ) -> String {
        let plain = strip_citations(summary);
        let excerpt = truncate_summary(&plain, self.preview_summary_ratio);
        let mut out = format!(
            "# Career Path Report Preview: {}\n\n## Executive Summary\n\n{}\n\n",
            brief.headline(),
            excerpt
        );
        out.push_str(&path_list(outline));
        out.push('\n');
        out.push_str(closing_section(purchasable));
        out.push('\n');
        out
    }
}

fn closing_section(purchasable: bool) -> &'static str {
    if purchasable {
        UNLOCK_SECTION
    } else {
        FULL_REPORT_POINTER
    }
}

fn path_list(outline: &ResearchOutline) -> String {
    let mut out = String::from("## Paths Analysed\n\n");
    for path in &outline.paths {
        out.push_str(&format!("{}. {}\n", path.index, path.title));
    }
    out
}

/// Drops a preview that is not strictly shorter than `full` down to the
/// path list, and as a last resort to a prefix of `full`.
fn ensure_shorter(
    preview: String,
    full: &str,
    brief: &ResearchBrief,
    outline: &ResearchOutline,
    purchasable: bool,
) -> String {
    if preview.len() < full.len() {
        return preview;
    }
    warn!("preview not shorter than full report, using minimal preview");
    let minimal = format!(
        "# Career Path Report Preview: {}\n\n{}\n{}\n",
        brief.headline(),
        path_list(outline),
        closing_section(purchasable)
    );
    if minimal.len() < full.len() {
        return minimal;
    }
    let limit = full.len() / 2;
    let cut = full
        .char_indices()
        .map(|(i, _)| i)
        .take_while(|i| *i <= limit)
        .last()
        .unwrap_or(0);
    full[..cut].to_string()
}

/// Keeps whole sentences up to `ratio` of the summary's length.
fn truncate_summary(summary: &str, ratio: f32) -> String {
    let summary = summary.trim();
    let target = ((summary.chars().count() as f32) * ratio).ceil() as usize;
    if target >= summary.chars().count() {
        return summary.to_string();
    }

    let mut taken = String::new();
    for sentence in summary.split_inclusive(['.', '!', '?']) {
        if taken.chars().count() + sentence.chars().count() > target {
            break;
        }
        taken.push_str(sentence);
    }
    let taken = taken.trim();
    if !taken.is_empty() {
        return format!("{} …", taken);
    }

    let mut words = String::new();
    for word in summary.split_whitespace() {
        if words.chars().count() + word.chars().count() + 1 > target {
            break;
        }
        if !words.is_empty() {
            words.push(' ');
        }
        words.push_str(word);
    }
    format!("{} …", words)
}

fn strip_leading_heading(analysis: &str) -> String {
    let trimmed = analysis.trim();
    match trimmed.split_once('\n') {
        Some((first, rest)) if first.trim_start().starts_with("# ") || first.trim_start().starts_with("## ") => {
            rest.trim().to_string()
        }
        _ => trimmed.to_string(),
    }
}

fn mermaid_label(text: &str) -> String {
    text.replace('"', "'").replace(['[', ']', '{', '}'], "")
}

fn path_diagram(brief: &ResearchBrief, outline: &ResearchOutline) -> String {
    let mut out = String::from("~~~mermaid\nflowchart LR\n");
    out.push_str(&format!("    profile[\"{}\"]\n", mermaid_label(&brief.headline())));
    for path in &outline.paths {
        out.push_str(&format!(
            "    profile --> p{}[\"{}\"]\n",
            path.index,
            mermaid_label(&path.title)
        ));
    }
    out.push_str("~~~\n");
    out
}

/// Path section rendered straight from compressed findings.
fn findings_section(path: Option<&PathFindings>) -> String {
    match path {
        Some(path) if !path.is_empty() => path
            .sections
            .iter()
            .filter(|s| !s.claims.is_empty())
            .map(|s| {
                let claims: Vec<String> = s.claims.iter().map(|c| format!("- {}", c.render())).collect();
                format!("### {}\n\n{}\n", s.dimension.title(), claims.join("\n"))
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => format!("{}\n", MISSING_PATH_NOTE),
    }
}
