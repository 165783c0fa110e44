//! Prompt text for every model-backed stage.
//!
//! Each system prompt opens with a `Task:` line naming the stage, which keeps
//! provider logs readable and lets scripted clients route by stage.

use crate::research::citations::format_citations;
use crate::tools::LookupHit;
use crate::types::{
    CompressedFindings, Dimension, ProfileField, ResearchBrief, ResearchOutline, ResearchTask,
};
use std::collections::BTreeSet;

pub const CLARIFY_SYSTEM: &str = "Task: profile-extraction.
You read a career-coaching conversation and report which profile facts the user has stated.
Only record what the user actually said. Never guess or infer missing values.
Respond with a single JSON object and nothing else:
{\"role\": string|null, \"experience\": string|null, \"skills\": string|null, \"location\": string|null, \"target_salary\": string|null, \"goals\": string|null, \"acknowledgment\": string}
`acknowledgment` briefly confirms what you understood, in the second person.";

pub const BRIEF_SYSTEM: &str = "Task: research-brief.
Turn the conversation into a research brief for finding four automation-resistant career paths.
Record each profile field the user stated. Use null for anything the user did not state; do not invent values.
Respond with a single JSON object:
{\"role\": string|null, \"experience\": string|null, \"skills\": string|null, \"location\": string|null, \"target_salary\": string|null, \"goals\": string|null, \"brief\": string}
`brief` is a first-person research question of two to four paragraphs.";

pub const OUTLINE_SYSTEM: &str = "Task: research-outline.
Propose exactly four distinct, automation-resistant career paths that fit the brief, best fit first.
Respond with a single JSON object:
{\"paths\": [{\"title\": string, \"rationale\": string}]}";

pub const SUPERVISOR_SYSTEM: &str = "Task: supervisor-reflection.
You supervise parallel researchers investigating career paths along fixed analysis dimensions.
Assess coverage, then choose one decision: \"continue\", \"gap_fill\" or \"complete\".
Respond with a single JSON object:
{\"assessment\": string, \"decision\": string, \"priority\": [path numbers], \"focus\": [string]}";

pub const RESEARCHER_REFLECT_SYSTEM: &str = "Task: researcher-reflection.
You are researching one career path. Judge which assigned dimensions the evidence so far covers and what to search next.
Respond with a single JSON object:
{\"covered\": [dimension keys], \"next_query\": string|null, \"note\": string}";

pub const RESEARCHER_FINDINGS_SYSTEM: &str = "Task: researcher-findings.
Write research findings in markdown. Use one `###` heading per dimension, using the dimension titles given.
Cite every factual statement with the numbered sources provided, like [1] or [2][3]. Never cite a number that is not listed.
Keep every figure, salary range, checklist and step-by-step script. Do not add a source list.";

pub const REPORT_SYSTEM: &str = "Task: report-synthesis.
Write a personalised career path report from the consolidated findings.
Keep the [n] citations from the findings. State timelines as a single value, never a range.
Respond with a single JSON object:
{\"executive_summary\": string, \"paths\": [{\"path\": number, \"analysis\": markdown string}], \"recommendation\": string}
Write one `analysis` per path, covering every analysis dimension with `###` headings.";

pub const FAQ_SYSTEM: &str = "Task: report-faq.
You answer follow-up questions about a career path report the user already has.
Answer only from the report and profile below, in at most three short paragraphs.
If the report does not contain the answer, say so plainly.";

fn dimension_list(dimensions: &[Dimension]) -> String {
    dimensions
        .iter()
        .map(|d| format!("- {} (`{}`)", d.title(), d.key()))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn clarify_prompt(transcript: &str) -> String {
    format!(
        "Conversation so far:\n{}\n\nFields to extract, in order: {}.",
        transcript,
        ProfileField::ALL
            .iter()
            .map(|f| f.key())
            .collect::<Vec<_>>()
            .join(", ")
    )
}

pub fn brief_prompt(transcript: &str, date: &str) -> String {
    format!("Today's date is {}.\n\nConversation:\n{}", date, transcript)
}

pub fn outline_prompt(brief: &ResearchBrief) -> String {
    format!(
        "{}\nEvery path will later be analysed along these dimensions:\n{}",
        brief.render(),
        dimension_list(&Dimension::ALL)
    )
}

pub fn supervisor_prompt(
    brief: &ResearchBrief,
    outline: &ResearchOutline,
    coverage_summary: &str,
    reflections_remaining: usize,
    calls_remaining: usize,
) -> String {
    let paths = outline
        .paths
        .iter()
        .map(|p| format!("{}. {}: {}", p.index, p.title, p.rationale))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "{}\nResearch paths:\n{}\n\nCoverage so far:\n{}\n\nBudget: {} reflections and {} calls remain.",
        brief.render(),
        paths,
        coverage_summary,
        reflections_remaining,
        calls_remaining
    )
}

fn numbered_hits(hits: &[LookupHit]) -> String {
    if hits.is_empty() {
        return "(no sources yet)".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, hit)| {
            let snippet = if hit.snippet.is_empty() {
                String::new()
            } else {
                format!("\n    {}", hit.snippet)
            };
            format!("[{}] {}: {}{}", i + 1, hit.title, hit.locator, snippet)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn researcher_reflect_prompt(task: &ResearchTask, hits: &[LookupHit], notes: &[String]) -> String {
    format!(
        "Topic: {}\nAssigned dimensions:\n{}\n\nSources so far:\n{}\n\nEarlier notes:\n{}",
        task.topic,
        dimension_list(&task.dimensions),
        numbered_hits(hits),
        if notes.is_empty() {
            "(none)".to_string()
        } else {
            notes.join("\n")
        }
    )
}

pub fn researcher_findings_prompt(task: &ResearchTask, hits: &[LookupHit], notes: &[String]) -> String {
    let focus = if task.focus.is_empty() {
        String::new()
    } else {
        format!("\nSupervisor focus:\n- {}\n", task.focus.join("\n- "))
    };
    format!(
        "{}\nCareer path: {}\nTopic: {}\nDimensions to cover:\n{}\n{}\nNumbered sources:\n{}\n\nResearch notes:\n{}",
        task.context,
        task.path_title,
        task.topic,
        dimension_list(&task.dimensions),
        focus,
        numbered_hits(hits),
        if notes.is_empty() {
            "(none)".to_string()
        } else {
            notes.join("\n")
        }
    )
}

pub fn report_prompt(
    brief: &ResearchBrief,
    outline: &ResearchOutline,
    findings: &CompressedFindings,
    date: &str,
) -> String {
    let paths = outline
        .paths
        .iter()
        .map(|p| format!("{}. {}", p.index, p.title))
        .collect::<Vec<_>>()
        .join("\n");
    let cited: BTreeSet<usize> = findings.sources.iter().map(|s| s.index).collect();
    format!(
        "Today's date is {}.\n\n{}\nPaths, in this order:\n{}\n\nAnalysis dimensions:\n{}\n\nConsolidated findings (sources {}):\n{}",
        date,
        brief.render(),
        paths,
        dimension_list(&Dimension::ALL),
        format_citations(&cited),
        findings.content
    )
}

pub fn faq_prompt(question: &str, brief: &ResearchBrief, report: &str, gated: bool) -> String {
    let gate = if gated {
        "\nThe user has only the preview. If the answer needs detail beyond it, say the full report covers it.\n"
    } else {
        ""
    };
    format!(
        "{}\nReport:\n{}\n{}\nQuestion: {}",
        brief.render(),
        report,
        gate,
        question.trim()
    )
}
