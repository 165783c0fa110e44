//! Shared fixtures for integration tests.

#![allow(dead_code)]

pub mod mocks;

use mocks::{MockLLMClient, MockLookup};
use std::sync::Arc;
use wayfinder::research::{ResearchCoordinator, StageClients};
use wayfinder::types::{
    Dimension, ProfileField, ResearchBrief, ResearchOutline, ResearchPath, Turn, UserProfile,
};
use wayfinder::{ConfigManager, InMemoryRunStore, WayfinderConfig};

pub const PATH_TITLES: [&str; 4] = [
    "Clinical Informatics Specialist",
    "Nurse Educator",
    "Occupational Health Advisor",
    "Clinical Research Nurse",
];

pub const PROFILE_JSON: &str = r#"{
    "role": "Staff nurse",
    "experience": "6 years on NHS acute wards",
    "skills": "patient assessment, triage, team leadership",
    "location": "Leeds, UK",
    "target_salary": "£40,000 to £45,000",
    "goals": "a less physically demanding role with progression",
    "acknowledgment": "Thanks, I have your full profile and will start researching."
}"#;

pub const BRIEF_JSON: &str = r#"{
    "role": "Staff nurse",
    "experience": "6 years on NHS acute wards",
    "skills": "patient assessment, triage, team leadership",
    "location": "Leeds, UK",
    "target_salary": "£40,000 to £45,000",
    "goals": "a less physically demanding role with progression",
    "brief": "I am a staff nurse in Leeds looking for a role that uses my clinical judgement away from ward shifts."
}"#;

pub const OUTLINE_JSON: &str = r#"{"paths": [
    {"title": "Clinical Informatics Specialist", "rationale": "Combines clinical knowledge with digital systems."},
    {"title": "Nurse Educator", "rationale": "Builds on mentoring experience."},
    {"title": "Occupational Health Advisor", "rationale": "Daytime hours with assessment skills."},
    {"title": "Clinical Research Nurse", "rationale": "Structured trial work in NHS research units."}
]}"#;

pub const SUPERVISOR_CONTINUE: &str = r#"{
    "assessment": "Research has not started.",
    "decision": "continue",
    "priority": [1, 2, 3, 4],
    "focus": ["Prefer UK sources"]
}"#;

pub const REPORT_JSON: &str = r####"{
    "executive_summary": "You are well placed to move into clinical informatics [1]. Nurse education is a close second [2]. Both keep your clinical judgement at the centre of the work. Occupational health offers daytime hours. Clinical research is steady and well funded.",
    "paths": [
        {"path": 1, "analysis": "### Salary\nBand 6 informatics posts pay well [1].\n\n### Entry Requirements\nMost nurses transition in 3-6 months [2]."},
        {"path": 2, "analysis": "### Role Overview\nEducators teach on wards and in universities [3]."},
        {"path": 3, "analysis": "### Demand and Growth\nDemand is rising across employers [99]."},
        {"path": 4, "analysis": "### Employers\nNHS research units hire year-round [4]."}
    ],
    "recommendation": "Start with clinical informatics and expect to be job-ready in between 6 and 12 months."
}"####;

pub const FAQ_ANSWER: &str = "Clinical informatics pays the most of your four paths [1].";

/// Reflection that covers every dimension, ending each researcher after one lookup.
pub fn researcher_reflection_all() -> String {
    let keys: Vec<String> = Dimension::ALL
        .iter()
        .map(|d| format!("\"{}\"", d.key()))
        .collect();
    format!(
        r#"{{"covered": [{}], "next_query": null, "note": "UK sources cover everything."}}"#,
        keys.join(", ")
    )
}

/// Findings write-up with a cited line under every dimension heading.
pub fn researcher_findings() -> String {
    let mut body = String::new();
    for (i, dimension) in Dimension::ALL.iter().enumerate() {
        let source = i % 2 + 1;
        body.push_str(&format!("### {}\n", dimension.title()));
        match dimension {
            Dimension::Salary => {
                body.push_str("Band 6 posts pay £37,338 to £44,962 a year [1].\n\n")
            }
            Dimension::LearningResources => body.push_str(
                "- [ ] Complete the NHS Digital Academy foundations course [2].\n\n",
            ),
            _ => body.push_str(&format!(
                "Evidence on {} from NHS employers in Yorkshire [{}].\n\n",
                dimension.key(),
                source
            )),
        }
    }
    body.push_str("## Sources\n[1] NHS Careers: https://nhs.example/1\n");
    body
}

/// A client scripted for a complete run from a fully specified conversation.
pub fn happy_llm() -> MockLLMClient {
    MockLLMClient::new()
        .on("profile-extraction", PROFILE_JSON)
        .on("research-brief", BRIEF_JSON)
        .on("research-outline", OUTLINE_JSON)
        .on("supervisor-reflection", SUPERVISOR_CONTINUE)
        .on("researcher-reflection", researcher_reflection_all())
        .on("researcher-findings", researcher_findings())
        .on("report-synthesis", REPORT_JSON)
        .on("report-faq", FAQ_ANSWER)
}

/// Configuration with short timeouts for tests.
pub fn test_config() -> WayfinderConfig {
    let mut config = WayfinderConfig::default();
    config.research.call_timeout_secs = 5;
    config.research.stage_timeout_secs = 30;
    config
}

pub fn coordinator_with(
    llm: Arc<MockLLMClient>,
    lookup: Arc<MockLookup>,
    config: WayfinderConfig,
) -> ResearchCoordinator {
    ResearchCoordinator::new(
        StageClients::uniform(llm),
        lookup,
        Arc::new(InMemoryRunStore::new()),
        Arc::new(ConfigManager::from_config(config)),
    )
}

pub fn coordinator(llm: Arc<MockLLMClient>) -> ResearchCoordinator {
    coordinator_with(llm, Arc::new(MockLookup::new(2)), test_config())
}

/// One user turn stating every profile field.
pub fn full_conversation() -> Vec<Turn> {
    vec![Turn::user(
        "I'm a staff nurse in Leeds with 6 years on NHS acute wards. I'm good at patient \
         assessment, triage and leading a team. I'd like £40,000 to £45,000 and a less \
         physically demanding role with progression.",
    )]
}

pub fn sample_brief() -> ResearchBrief {
    let mut profile = UserProfile::new();
    profile.set(ProfileField::Role, "Staff nurse");
    profile.set(ProfileField::Experience, "6 years on NHS acute wards");
    profile.set(ProfileField::Location, "Leeds, UK");
    ResearchBrief::new(profile, "I want to leave ward shifts.")
}

pub fn sample_outline() -> ResearchOutline {
    ResearchOutline {
        paths: PATH_TITLES
            .iter()
            .enumerate()
            .map(|(i, title)| ResearchPath {
                index: i + 1,
                title: title.to_string(),
                rationale: format!("Why {} fits", title),
                dimensions: Dimension::ALL.to_vec(),
            })
            .collect(),
    }
}
