//! Compression: every findings document in, one consolidated record out.
//!
//! Claims are regrouped by (path, dimension), merged when they state the same
//! fact, and trimmed to the token budget by dropping narrative only. Numeric
//! and actionable claims always survive. Sources get one global numbering,
//! assigned in order of first citation, with uncited sources dropped.

use crate::memory::estimate_tokens;
use crate::research::citations::{
    extract_citations, is_sources_heading, normalize_locator, strip_citations,
};
use crate::types::{
    ClaimKind, CompressedClaim, CompressedFindings, Dimension, DimensionFindings,
    FindingsDocument, PathFindings, ResearchBrief, ResearchOutline, SourceRef,
};
use regex::Regex;
use std::collections::{BTreeSet, HashMap};
use std::sync::LazyLock;
use tracing::{debug, info, instrument};

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d[\d,]*(?:\.\d+)?)(\s?[kK]\b)?").expect("number pattern is valid")
});

/// Phrases that mark filler prose; such claims are trimmed first.
const GENERIC_PHRASES: [&str; 14] = [
    "it is important",
    "it's important",
    "in conclusion",
    "in summary",
    "overall,",
    "generally",
    "a wide range",
    "there are many",
    "many opportunities",
    "various",
    "plays a key role",
    "rapidly evolving",
    "in today's",
    "it depends",
];

const STOP_WORDS: [&str; 16] = [
    "the", "and", "for", "are", "per", "was", "with", "from", "that", "this", "than", "into",
    "about", "around", "have", "has",
];

/// Prose overlap two numeric claims need before they count as one fact.
const SAME_FACT_OVERLAP: f32 = 0.8;

const ACTIONABLE_MARKERS: [&str; 5] = ["script", "template", "checklist", "step ", "action plan"];

const EMPTY_PATH_NOTE: &str = "_No verified findings were collected for this path._";

/// Which group a claim belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Slot {
    Cell(usize, Dimension),
    General,
}

#[derive(Debug, Clone)]
struct Claim {
    text: String,
    /// Provisional global source ids.
    citations: BTreeSet<usize>,
    kind: ClaimKind,
    numbers: BTreeSet<String>,
}

/// Source list shared by every finding, keyed by normalised locator.
#[derive(Debug, Default)]
struct SourceRegistry {
    sources: Vec<(String, String)>,
    keys: HashMap<String, usize>,
}

impl SourceRegistry {
    /// Returns the provisional id, starting at 0.
    fn intern(&mut self, source: &SourceRef) -> usize {
        let key = if source.locator.trim().is_empty() {
            source.title.trim().to_lowercase()
        } else {
            normalize_locator(&source.locator)
        };
        if let Some(id) = self.keys.get(&key) {
            return *id;
        }
        let id = self.sources.len();
        self.sources
            .push((source.title.clone(), source.locator.clone()));
        self.keys.insert(key, id);
        id
    }
}

/// Consolidates findings within `token_budget`.
#[derive(Debug, Clone)]
pub struct Compressor {
    token_budget: usize,
}

impl Compressor {
    pub fn new(token_budget: usize) -> Self {
        Self { token_budget }
    }

    #[instrument(skip_all, fields(findings = findings.len(), budget = self.token_budget))]
    pub fn compress(
        &self,
        brief: &ResearchBrief,
        outline: &ResearchOutline,
        findings: &[FindingsDocument],
    ) -> CompressedFindings {
        let mut registry = SourceRegistry::default();
        let mut groups: HashMap<Slot, Vec<Claim>> = HashMap::new();
        let mut parsed = 0;

        for doc in findings.iter().filter(|d| !d.degraded) {
            let local: HashMap<usize, usize> = doc
                .sources
                .iter()
                .map(|s| (s.index, registry.intern(s)))
                .collect();

            for (dimension, line) in parse_claim_lines(&doc.body) {
                let Some(claim) = build_claim(&line, &local) else {
                    continue;
                };
                parsed += 1;
                let dimension = dimension.or_else(|| match doc.assigned.as_slice() {
                    [only] => Some(*only),
                    _ => None,
                });
                let slot = match (doc.path_index, dimension) {
                    (Some(index), Some(dim)) if outline.path(index).is_some() => {
                        Slot::Cell(index, dim)
                    }
                    _ => Slot::General,
                };
                merge_into(groups.entry(slot).or_default(), claim);
            }
        }

        let merged: usize = groups.values().map(Vec::len).sum();
        debug!(parsed, merged, sources = registry.sources.len(), "claims grouped");

        let mut layout = Layout::from_groups(outline, groups);
        let dropped = layout.trim_to(self.token_budget, &registry, brief);
        let result = layout.finish(&registry, brief, dropped);

        info!(
            sources = result.sources.len(),
            tokens = result.estimated_tokens,
            dropped = result.dropped_claims,
            "findings compressed"
        );
        result
    }
}

/// Splits a findings body into (dimension, claim line) pairs.
///
/// A heading naming a dimension opens that dimension; deeper headings that
/// name none stay inside it. Parsing stops at a source list.
fn parse_claim_lines(body: &str) -> Vec<(Option<Dimension>, String)> {
    let mut out = Vec::new();
    let mut current: Option<(usize, Dimension)> = None;
    let mut paragraph: Vec<&str> = Vec::new();

    for raw in body.lines() {
        let line = raw.trim();
        let dim = current.map(|(_, d)| d);

        if line.starts_with('#') {
            flush_paragraph(&mut paragraph, dim, &mut out);
            if is_sources_heading(line) {
                break;
            }
            let level = line.chars().take_while(|c| *c == '#').count();
            let text = line.trim_start_matches('#').trim();
            current = match (Dimension::from_heading(text), current) {
                (Some(found), _) => Some((level, found)),
                (None, Some((open, d))) if level > open => Some((open, d)),
                (None, _) => None,
            };
            continue;
        }

        if line.is_empty() {
            flush_paragraph(&mut paragraph, dim, &mut out);
        } else if is_table_separator(line) {
            continue;
        } else if is_list_item(line) || line.starts_with('|') {
            flush_paragraph(&mut paragraph, dim, &mut out);
            out.push((dim, line.to_string()));
        } else {
            paragraph.push(line);
        }
    }
    let dim = current.map(|(_, d)| d);
    flush_paragraph(&mut paragraph, dim, &mut out);
    out
}

fn flush_paragraph(
    paragraph: &mut Vec<&str>,
    dimension: Option<Dimension>,
    out: &mut Vec<(Option<Dimension>, String)>,
) {
    if paragraph.is_empty() {
        return;
    }
    let text = paragraph.join(" ");
    paragraph.clear();
    for sentence in split_sentences(&text) {
        out.push((dimension, sentence));
    }
}

fn is_table_separator(line: &str) -> bool {
    line.starts_with('|')
        && line
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn ordered_marker_len(line: &str) -> Option<usize> {
    let digits = line.chars().take_while(char::is_ascii_digit).count();
    (digits > 0 && line[digits..].starts_with(". ")).then_some(digits + 2)
}

fn is_list_item(line: &str) -> bool {
    line.starts_with("- ") || line.starts_with("* ") || line.starts_with("+ ")
        || ordered_marker_len(line).is_some()
}

/// Splits prose at sentence ends; citation markers after a full stop stay
/// with the sentence they follow.
fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences: Vec<String> = Vec::new();
    let mut start = 0;
    let chars: Vec<(usize, char)> = text.char_indices().collect();

    for (i, (pos, c)) in chars.iter().enumerate() {
        if matches!(c, '.' | '!' | '?')
            && chars.get(i + 1).is_some_and(|(_, next)| next.is_whitespace())
        {
            let end = pos + c.len_utf8();
            sentences.push(text[start..end].trim().to_string());
            start = end;
        }
    }
    sentences.push(text[start..].trim().to_string());

    let mut out: Vec<String> = Vec::new();
    for sentence in sentences.into_iter().filter(|s| !s.is_empty()) {
        let (lead, rest) = split_leading_citations(&sentence);
        if !lead.is_empty() {
            if out.is_empty() {
                out.push(sentence.clone());
                continue;
            }
            if let Some(previous) = out.last_mut() {
                previous.push(' ');
                previous.push_str(lead);
            }
        }
        if !rest.is_empty() {
            out.push(rest.to_string());
        }
    }
    out
}

fn split_leading_citations(sentence: &str) -> (&str, &str) {
    let mut end = 0;
    loop {
        let remaining = &sentence[end..];
        let trimmed = remaining.trim_start();
        let skipped = remaining.len() - trimmed.len();
        let Some(inner_len) = trimmed.strip_prefix('[').and_then(|r| r.find(']')) else {
            break;
        };
        let inner = &trimmed[1..1 + inner_len];
        if inner.trim().is_empty()
            || !inner.chars().all(|c| c.is_ascii_digit() || c == ',' || c == ' ')
        {
            break;
        }
        end += skipped + inner_len + 2;
    }
    (sentence[..end].trim(), sentence[end..].trim())
}

fn classify(line: &str, text: &str) -> ClaimKind {
    let lowered = text.to_lowercase();
    let checkbox = line.starts_with("- [ ]") || line.starts_with("- [x]") || line.starts_with("* [ ]");
    if checkbox
        || ordered_marker_len(line).is_some()
        || ACTIONABLE_MARKERS.iter().any(|m| lowered.contains(m))
    {
        ClaimKind::Actionable
    } else if text.chars().any(|c| c.is_ascii_digit()) {
        ClaimKind::Numeric
    } else {
        ClaimKind::Narrative
    }
}

/// Numeric tokens with separators removed and a `k` suffix expanded.
fn numeric_signature(text: &str) -> BTreeSet<String> {
    NUMBER_RE
        .captures_iter(text)
        .filter_map(|cap| {
            let digits = cap[1].replace(',', "");
            let mut value: f64 = digits.trim_end_matches('.').parse().ok()?;
            if cap.get(2).is_some() {
                value *= 1000.0;
            }
            Some(if value.fract() == 0.0 {
                format!("{}", value as i64)
            } else {
                format!("{}", value)
            })
        })
        .collect()
}

fn normalized_text(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Words that carry meaning: no numbers, no filler.
fn prose_words(text: &str) -> BTreeSet<String> {
    normalized_text(text)
        .split(' ')
        .filter(|w| w.len() > 2)
        .filter(|w| !w.chars().any(|c| c.is_ascii_digit()))
        .filter(|w| !STOP_WORDS.contains(w))
        .map(str::to_string)
        .collect()
}

fn word_overlap(a: &BTreeSet<String>, b: &BTreeSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 1.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

fn build_claim(line: &str, local: &HashMap<usize, usize>) -> Option<Claim> {
    let content = if let Some(len) = ordered_marker_len(line) {
        &line[len..]
    } else if is_list_item(line) {
        &line[2..]
    } else {
        line
    };
    let citations = extract_citations(content)
        .into_iter()
        .filter_map(|n| local.get(&n).copied())
        .collect();
    let text = strip_citations(content);
    if !text.chars().any(char::is_alphanumeric) {
        return None;
    }
    let kind = classify(line, &text);
    let numbers = numeric_signature(&text);
    Some(Claim {
        text,
        citations,
        kind,
        numbers,
    })
}

/// Identical text always matches. Beyond that only numeric claims merge, and
/// only when they carry the same figures in near-identical wording.
fn same_fact(a: &Claim, b: &Claim) -> bool {
    if normalized_text(&a.text) == normalized_text(&b.text) {
        return true;
    }
    a.kind == ClaimKind::Numeric
        && b.kind == ClaimKind::Numeric
        && !a.numbers.is_empty()
        && a.numbers == b.numbers
        && word_overlap(&prose_words(&a.text), &prose_words(&b.text)) >= SAME_FACT_OVERLAP
}

fn kind_rank(kind: ClaimKind) -> u8 {
    match kind {
        ClaimKind::Actionable => 2,
        ClaimKind::Numeric => 1,
        ClaimKind::Narrative => 0,
    }
}

fn merge_into(group: &mut Vec<Claim>, claim: Claim) {
    match group.iter_mut().find(|existing| same_fact(existing, &claim)) {
        Some(existing) => {
            existing.citations.extend(claim.citations);
            if kind_rank(claim.kind) > kind_rank(existing.kind) {
                existing.kind = claim.kind;
            }
            // A newcomer with words the kept text lacks is kept alongside it.
            if !prose_words(&claim.text).is_subset(&prose_words(&existing.text)) {
                existing.text = format!("{}; {}", existing.text, claim.text);
            }
        }
        None => group.push(claim),
    }
}

fn is_generic(claim: &Claim) -> bool {
    let lowered = claim.text.to_lowercase();
    GENERIC_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Claims in render order: outline paths, then dimensions, then general.
struct Layout {
    paths: Vec<(usize, String, Vec<(Dimension, Vec<Claim>)>)>,
    general: Vec<Claim>,
}

impl Layout {
    fn from_groups(outline: &ResearchOutline, mut groups: HashMap<Slot, Vec<Claim>>) -> Self {
        let paths = outline
            .paths
            .iter()
            .map(|p| {
                let sections = Dimension::ALL
                    .into_iter()
                    .filter_map(|d| {
                        groups
                            .remove(&Slot::Cell(p.index, d))
                            .filter(|claims| !claims.is_empty())
                            .map(|claims| (d, claims))
                    })
                    .collect();
                (p.index, p.title.clone(), sections)
            })
            .collect();
        let general = groups.remove(&Slot::General).unwrap_or_default();
        Self { paths, general }
    }

    fn claims_mut(&mut self) -> Vec<&mut Vec<Claim>> {
        let mut out: Vec<&mut Vec<Claim>> = Vec::new();
        for (_, _, sections) in self.paths.iter_mut() {
            for (_, claims) in sections.iter_mut() {
                out.push(claims);
            }
        }
        out.push(&mut self.general);
        out
    }

    /// Removes the last narrative claim matching `pick`; false if none left.
    fn drop_last(&mut self, pick: fn(&Claim) -> bool) -> bool {
        for claims in self.claims_mut().into_iter().rev() {
            if let Some(pos) = claims
                .iter()
                .rposition(|c| c.kind == ClaimKind::Narrative && pick(c))
            {
                claims.remove(pos);
                return true;
            }
        }
        false
    }

    /// Drops narrative claims until the rendering fits; returns how many went.
    fn trim_to(&mut self, budget: usize, registry: &SourceRegistry, brief: &ResearchBrief) -> usize {
        let mut dropped = 0;
        while estimate_tokens(&self.render(registry, brief).0) > budget {
            if self.drop_last(is_generic) || self.drop_last(|_| true) {
                dropped += 1;
            } else {
                break;
            }
        }
        dropped
    }

    /// Renders markdown and returns it with the global numbering it used.
    fn render(&self, registry: &SourceRegistry, brief: &ResearchBrief) -> (String, Vec<usize>) {
        let order = self.citation_order();
        let renumber: HashMap<usize, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i + 1)).collect();
        let line = |claim: &Claim| {
            let cites: String = claim
                .citations
                .iter()
                .filter_map(|id| renumber.get(id))
                .collect::<BTreeSet<_>>()
                .iter()
                .map(|n| format!("[{}]", n))
                .collect();
            if cites.is_empty() {
                format!("- {}\n", claim.text)
            } else {
                format!("- {} {}\n", claim.text, cites)
            }
        };

        let mut out = format!(
            "# Compressed Research Findings\n\nProfile: {}\n",
            brief.headline()
        );
        for (index, title, sections) in &self.paths {
            out.push_str(&format!("\n## Path {}: {}\n", index, title));
            if sections.is_empty() {
                out.push_str(&format!("\n{}\n", EMPTY_PATH_NOTE));
            }
            for (dimension, claims) in sections {
                out.push_str(&format!("\n### {}\n", dimension.title()));
                for claim in claims {
                    out.push_str(&line(claim));
                }
            }
        }
        if !self.general.is_empty() {
            out.push_str("\n## General Findings\n");
            for claim in &self.general {
                out.push_str(&line(claim));
            }
        }
        if !order.is_empty() {
            out.push_str("\n## Sources\n");
            for (i, id) in order.iter().enumerate() {
                if let Some((title, locator)) = registry.sources.get(*id) {
                    out.push_str(&format!("[{}] {}: {}\n", i + 1, title, locator));
                }
            }
        }
        (out, order)
    }

    /// Provisional ids in order of first citation.
    fn citation_order(&self) -> Vec<usize> {
        let mut seen = BTreeSet::new();
        let mut order = Vec::new();
        let all = self
            .paths
            .iter()
            .flat_map(|(_, _, sections)| sections.iter().flat_map(|(_, claims)| claims.iter()))
            .chain(self.general.iter());
        for claim in all {
            for id in &claim.citations {
                if seen.insert(*id) {
                    order.push(*id);
                }
            }
        }
        order
    }

    fn finish(self, registry: &SourceRegistry, brief: &ResearchBrief, dropped: usize) -> CompressedFindings {
        let (content, order) = self.render(registry, brief);
        let renumber: HashMap<usize, usize> =
            order.iter().enumerate().map(|(i, id)| (*id, i + 1)).collect();
        let finalize = |claim: Claim| CompressedClaim {
            citations: claim
                .citations
                .iter()
                .filter_map(|id| renumber.get(id).copied())
                .collect::<BTreeSet<_>>()
                .into_iter()
                .collect(),
            text: claim.text,
            kind: claim.kind,
        };

        let sources = order
            .iter()
            .enumerate()
            .filter_map(|(i, id)| {
                registry.sources.get(*id).map(|(title, locator)| SourceRef {
                    index: i + 1,
                    title: title.clone(),
                    locator: locator.clone(),
                })
            })
            .collect();

        let paths = self
            .paths
            .into_iter()
            .map(|(index, title, sections)| PathFindings {
                index,
                title,
                sections: sections
                    .into_iter()
                    .map(|(dimension, claims)| DimensionFindings {
                        dimension,
                        claims: claims.into_iter().map(finalize).collect(),
                    })
                    .collect(),
            })
            .collect();

        CompressedFindings {
            paths,
            general: self.general.into_iter().map(finalize).collect(),
            sources,
            estimated_tokens: estimate_tokens(&content),
            content,
            dropped_claims: dropped,
        }
    }
}
