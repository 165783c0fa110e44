mod common;

use common::{sample_brief, sample_outline};
use wayfinder::research::compression::Compressor;
use wayfinder::types::{ClaimKind, Dimension, FindingsDocument, ResearchTask, SourceRef};

fn source(index: usize, locator: &str) -> SourceRef {
    SourceRef {
        index,
        title: format!("Source at {}", locator),
        locator: locator.to_string(),
    }
}

fn doc(task_id: usize, path_index: usize, body: &str, sources: Vec<SourceRef>) -> FindingsDocument {
    FindingsDocument {
        task_id,
        topic: format!("path {}", path_index),
        path_index: Some(path_index),
        assigned: Dimension::ALL.to_vec(),
        covered: vec![Dimension::Salary],
        body: body.to_string(),
        sources,
        lookups: 1,
        degraded: false,
    }
}

fn salary_claims(findings: &wayfinder::types::CompressedFindings, path: usize) -> Vec<wayfinder::types::CompressedClaim> {
    findings
        .path(path)
        .unwrap()
        .sections
        .iter()
        .find(|s| s.dimension == Dimension::Salary)
        .map(|s| s.claims.clone())
        .unwrap_or_default()
}

#[test]
fn test_same_figure_from_two_researchers_merges_and_keeps_both_sources() {
    let findings = vec![
        doc(
            1,
            1,
            "### Salary\nBand 6 nurses earn £37,338 to £44,962 a year [1].",
            vec![source(1, "https://nhs.example/pay")],
        ),
        doc(
            2,
            1,
            "### Salary\nBand 6 nurses earn £37,338 to £44,962 per year [1].",
            vec![source(1, "https://rcn.example/pay-scales")],
        ),
    ];

    let result = Compressor::new(6_000).compress(&sample_brief(), &sample_outline(), &findings);

    let claims = salary_claims(&result, 1);
    assert_eq!(claims.len(), 1);
    assert_eq!(claims[0].kind, ClaimKind::Numeric);
    assert_eq!(claims[0].citations, vec![1, 2]);
    assert!(result.content.contains("£37,338 to £44,962"));
    assert_eq!(result.sources.len(), 2);
}

#[test]
fn test_sources_are_renumbered_contiguously_and_uncited_ones_dropped() {
    let findings = vec![
        doc(
            1,
            2,
            "### Demand and Growth\nVacancies rose 12% in 2024 [3].\n\n### Employers\nLeeds Teaching Hospitals is hiring [1].",
            vec![
                source(1, "https://leeds.example/jobs"),
                source(2, "https://unused.example"),
                source(3, "https://ons.example/vacancies"),
            ],
        ),
        doc(
            2,
            3,
            "### Salary\nAdvisers earn about £41,000 [2].",
            vec![
                source(1, "https://unused-again.example"),
                source(2, "https://leeds.example/jobs/"),
            ],
        ),
    ];

    let result = Compressor::new(6_000).compress(&sample_brief(), &sample_outline(), &findings);

    let indices: Vec<usize> = result.sources.iter().map(|s| s.index).collect();
    assert_eq!(indices, vec![1, 2]);
    assert!(result.sources.iter().all(|s| !s.locator.contains("unused")));

    // Trailing slashes do not create a second source.
    let leeds = result
        .sources
        .iter()
        .find(|s| s.locator.starts_with("https://leeds.example"))
        .unwrap();
    let salary = salary_claims(&result, 3);
    assert_eq!(salary[0].citations, vec![leeds.index]);

    assert!(!result.content.contains("[3]"));
    assert!(result.content.contains("## Sources"));
}

#[test]
fn test_tight_budget_drops_narrative_but_keeps_figures_and_checklists() {
    let mut body = String::from("### Role Overview\n");
    for i in 0..12 {
        body.push_str(&format!(
            "It is important to remember that this kind of role suits people who like variety number {} [1]. ",
            ["one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten", "eleven", "twelve"][i]
        ));
    }
    body.push_str("\n\n### Salary\nSenior posts pay £52,000 [1].\n\n### Learning Resources\n- [ ] Enrol on the NHS Digital Academy course [1]\n");
    let findings = vec![doc(1, 1, &body, vec![source(1, "https://nhs.example")])];

    let result = Compressor::new(120).compress(&sample_brief(), &sample_outline(), &findings);

    assert!(result.dropped_claims > 0);
    assert!(result.content.contains("£52,000"));
    assert!(result.content.contains("NHS Digital Academy"));
    let learning = result
        .path(1)
        .unwrap()
        .sections
        .iter()
        .find(|s| s.dimension == Dimension::LearningResources)
        .unwrap();
    assert_eq!(learning.claims[0].kind, ClaimKind::Actionable);
}

#[test]
fn test_degraded_findings_contribute_nothing() {
    let task = ResearchTask {
        id: 9,
        topic: "Nurse Educator".to_string(),
        path_index: Some(2),
        path_title: "Nurse Educator".to_string(),
        dimensions: Dimension::ALL.to_vec(),
        context: String::new(),
        focus: vec![],
    };
    let findings = vec![FindingsDocument::degraded(&task)];

    let result = Compressor::new(6_000).compress(&sample_brief(), &sample_outline(), &findings);

    assert!(result.sources.is_empty());
    assert!(result.paths.iter().all(|p| p.is_empty()));
    assert!(!result.content.contains("No findings could be collected"));
    assert!(result.content.contains("## Path 2: Nurse Educator"));
    assert!(result.content.contains("No verified findings were collected for this path"));
}

#[test]
fn test_distinct_facts_with_equal_figures_all_survive() {
    let findings = vec![
        doc(
            1,
            1,
            "### Salary\nMedian salary in London is £45,000 [1].\n\n### Job Search\n1. Apply to 5 roles per week for 4 weeks [1]\n2. Attend 5 industry meetups over 4 weeks [1]\n",
            vec![source(1, "https://ons.example/london")],
        ),
        doc(
            2,
            1,
            "### Salary\nMedian salary in Manchester is £45,000 [1].",
            vec![source(1, "https://ons.example/manchester")],
        ),
    ];

    let result = Compressor::new(6_000).compress(&sample_brief(), &sample_outline(), &findings);

    assert_eq!(salary_claims(&result, 1).len(), 2);
    assert!(result.content.contains("Median salary in London is £45,000"));
    assert!(result.content.contains("Median salary in Manchester is £45,000"));
    assert!(result.content.contains("Apply to 5 roles per week for 4 weeks"));
    assert!(result.content.contains("Attend 5 industry meetups over 4 weeks"));
}
