mod common;

use common::mocks::MockLLMClient;
use common::{researcher_findings, sample_brief, sample_outline, REPORT_JSON};
use std::sync::Arc;
use std::time::Duration;
use wayfinder::research::compression::Compressor;
use wayfinder::research::report::{collapse_timeline_ranges, ReportSynthesizer};
use wayfinder::types::{AppError, CompressedFindings, Dimension, FindingsDocument, SourceRef};

fn compressed() -> CompressedFindings {
    let findings: Vec<FindingsDocument> = (1..=4)
        .map(|path| FindingsDocument {
            task_id: path,
            topic: format!("path {}", path),
            path_index: Some(path),
            assigned: Dimension::ALL.to_vec(),
            covered: Dimension::ALL.to_vec(),
            body: researcher_findings(),
            sources: (1..=2)
                .map(|i| SourceRef {
                    index: i,
                    title: format!("Source {}-{}", path, i),
                    locator: format!("https://example.org/{}/{}", path, i),
                })
                .collect(),
            lookups: 1,
            degraded: false,
        })
        .collect();
    Compressor::new(6_000).compress(&sample_brief(), &sample_outline(), &findings)
}

fn synthesizer(llm: MockLLMClient) -> ReportSynthesizer {
    ReportSynthesizer::new(Arc::new(llm), Duration::from_secs(5), 0.5)
}

#[test]
fn test_timeline_ranges_keep_the_upper_bound() {
    assert_eq!(collapse_timeline_ranges("ready in 3-6 months"), "ready in 6 months");
    assert_eq!(
        collapse_timeline_ranges("between 6 and 12 months of study"),
        "12 months of study"
    );
    assert_eq!(collapse_timeline_ranges("from 1 to 2 years"), "2 years");
    assert_eq!(collapse_timeline_ranges("about 6–9 weeks"), "about 9 weeks");
    assert_eq!(collapse_timeline_ranges("pays £30-40k"), "pays £30-40k");
}

#[test]
fn test_requirement_and_age_ranges_are_not_timelines() {
    assert_eq!(
        collapse_timeline_ranges("Most posts want 5-10 years of experience."),
        "Most posts want 5-10 years of experience."
    );
    assert_eq!(
        collapse_timeline_ranges("Most hires are aged 25-34 years; retraining takes 8-12 months."),
        "Most hires are aged 25-34 years; retraining takes 12 months."
    );
}

#[tokio::test]
async fn test_full_report_structure() {
    let findings = compressed();
    let artifacts = synthesizer(MockLLMClient::new().on("report-synthesis", REPORT_JSON))
        .synthesize(&sample_brief(), &sample_outline(), &findings, false)
        .await
        .unwrap();

    let full = &artifacts.full;
    assert!(full.starts_with("# Career Path Report: Staff nurse"));
    assert!(full.contains("## Executive Summary"));
    assert!(full.contains("~~~mermaid"));
    assert!(!full.contains("```"));

    // Paths appear in outline order.
    let positions: Vec<usize> = common::PATH_TITLES
        .iter()
        .enumerate()
        .map(|(i, title)| full.find(&format!("## Path {}: {}", i + 1, title)).unwrap())
        .collect();
    assert!(positions.windows(2).all(|w| w[0] < w[1]));

    // Timelines are single values.
    assert!(full.contains("transition in 6 months"));
    assert!(full.contains("job-ready in 12 months"));
    assert!(!full.contains("3-6 months"));

    // Citations outside the source list are removed.
    assert!(!full.contains("[99]"));
    assert!(full.contains("## Sources"));
    assert!(full.contains(&format!("[{}] ", findings.sources.len())));
}

#[tokio::test]
async fn test_preview_is_shorter_and_uncited() {
    let artifacts = synthesizer(MockLLMClient::new().on("report-synthesis", REPORT_JSON))
        .synthesize(&sample_brief(), &sample_outline(), &compressed(), false)
        .await
        .unwrap();

    let preview = &artifacts.preview;
    assert!(preview.len() < artifacts.full.len());
    assert!(preview.contains("## Paths Analysed"));
    assert!(preview.contains("1. Clinical Informatics Specialist"));
    assert!(!preview.contains("[1]"));
    assert!(preview.contains("The full report contains"));
    assert!(!preview.contains("Unlock the Full Report"));
}

#[tokio::test]
async fn test_purchasable_preview_ends_with_unlock_section() {
    let artifacts = synthesizer(MockLLMClient::new().on("report-synthesis", REPORT_JSON))
        .synthesize(&sample_brief(), &sample_outline(), &compressed(), true)
        .await
        .unwrap();

    assert!(artifacts.preview.contains("## Unlock the Full Report"));
    assert!(artifacts.preview.len() < artifacts.full.len());
}

#[tokio::test]
async fn test_missing_analyses_fall_back_to_findings() {
    let reply = r#"{"executive_summary": "Informatics is the strongest fit.", "paths": [], "recommendation": ""}"#;
    let artifacts = synthesizer(MockLLMClient::new().on("report-synthesis", reply))
        .synthesize(&sample_brief(), &sample_outline(), &compressed(), false)
        .await
        .unwrap();

    assert!(artifacts.full.contains("£37,338"));
    assert!(!artifacts.full.contains("## Recommendation"));
}

#[tokio::test]
async fn test_unusable_synthesis_is_structural() {
    for llm in [
        MockLLMClient::new().fail_on("report-synthesis"),
        MockLLMClient::new().on("report-synthesis", "I cannot write this report."),
        MockLLMClient::new().on("report-synthesis", r#"{"executive_summary": "  "}"#),
    ] {
        let result = synthesizer(llm)
            .synthesize(&sample_brief(), &sample_outline(), &compressed(), false)
            .await;
        assert!(matches!(result, Err(AppError::Structural(_))));
    }
}
