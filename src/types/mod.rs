use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============= Conversation Types =============

/// Who authored a conversation turn.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

impl TurnRole {
    /// Role string understood by chat-completion providers.
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Ordered, append-only record of the clarification dialogue.
///
/// The only way to change a conversation is [`ConversationState::append`];
/// turns are never edited or removed once recorded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(transparent)]
pub struct ConversationState {
    turns: Vec<Turn>,
}

impl ConversationState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_turns(turns: Vec<Turn>) -> Self {
        Self { turns }
    }

    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    /// Most recent question the assistant put to the user.
    pub fn last_assistant_turn(&self) -> Option<&Turn> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
    }

    /// True when at least one user turn carries non-whitespace content.
    pub fn has_user_content(&self) -> bool {
        self.turns
            .iter()
            .any(|t| t.role == TurnRole::User && !t.content.trim().is_empty())
    }
}

// ============= Profile Types =============

/// The six profile fields, declared in clarification priority order.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum ProfileField {
    Role,
    Experience,
    Skills,
    Location,
    TargetSalary,
    Goals,
}

impl ProfileField {
    pub const ALL: [ProfileField; 6] = [
        ProfileField::Role,
        ProfileField::Experience,
        ProfileField::Skills,
        ProfileField::Location,
        ProfileField::TargetSalary,
        ProfileField::Goals,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            ProfileField::Role => "role",
            ProfileField::Experience => "experience",
            ProfileField::Skills => "skills",
            ProfileField::Location => "location",
            ProfileField::TargetSalary => "target_salary",
            ProfileField::Goals => "goals",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ProfileField::Role => "Current or most recent job title",
            ProfileField::Experience => "Years of experience and industry",
            ProfileField::Skills => "Key skills",
            ProfileField::Location => "Location",
            ProfileField::TargetSalary => "Target salary range",
            ProfileField::Goals => "Career goals",
        }
    }

    /// The single question asked when this field is the first one missing.
    pub fn question(&self) -> &'static str {
        match self {
            ProfileField::Role => "What is your current or most recent job title?",
            ProfileField::Experience => {
                "How many years of experience do you have, and in which industry?"
            }
            ProfileField::Skills => "What are your strongest professional skills?",
            ProfileField::Location => {
                "Where are you located, and are you open to remote or relocation?"
            }
            ProfileField::TargetSalary => "What salary range are you targeting?",
            ProfileField::Goals => {
                "What are your main career goals for the next few years?"
            }
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.key() == key)
    }
}

impl fmt::Display for ProfileField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Profile values the user has stated so far.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct UserProfile {
    fields: BTreeMap<ProfileField, String>,
}

impl UserProfile {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a value; blank values are ignored.
    pub fn set(&mut self, field: ProfileField, value: impl Into<String>) {
        let value = value.into();
        let value = value.trim();
        if !value.is_empty() {
            self.fields.insert(field, value.to_string());
        }
    }

    pub fn get(&self, field: ProfileField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }

    pub fn has(&self, field: ProfileField) -> bool {
        self.fields.contains_key(&field)
    }

    pub fn missing(&self) -> Vec<ProfileField> {
        ProfileField::ALL
            .into_iter()
            .filter(|f| !self.has(*f))
            .collect()
    }

    /// First missing field in priority order.
    pub fn first_missing(&self) -> Option<ProfileField> {
        ProfileField::ALL.into_iter().find(|f| !self.has(*f))
    }

    pub fn is_complete(&self) -> bool {
        self.first_missing().is_none()
    }

    /// Fills fields this profile lacks from `other`.
    pub fn merge_missing(&mut self, other: &UserProfile) {
        for (field, value) in &other.fields {
            self.fields
                .entry(*field)
                .or_insert_with(|| value.clone());
        }
    }
}

/// A brief field is either what the user said or explicitly unconstrained.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Stated(String),
    Unconstrained,
}

/// Values models emit when they mean "not stated".
const PLACEHOLDER_VALUES: [&str; 9] = [
    "null",
    "none",
    "n/a",
    "na",
    "unknown",
    "unspecified",
    "unconstrained",
    "not provided",
    "not stated",
];

impl FieldValue {
    /// True when `value` carries content rather than a placeholder.
    pub fn is_stated(value: &str) -> bool {
        let v = value.trim().to_lowercase();
        !v.is_empty() && !PLACEHOLDER_VALUES.contains(&v.as_str())
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Stated(value) => f.write_str(value),
            FieldValue::Unconstrained => f.write_str("unconstrained"),
        }
    }
}

// ============= Research Types =============

/// Structured research brief derived once from the conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchBrief {
    pub profile: UserProfile,
    /// Model-written framing of the research question.
    pub narrative: String,
    pub created_at: DateTime<Utc>,
}

impl ResearchBrief {
    pub fn new(profile: UserProfile, narrative: impl Into<String>) -> Self {
        Self {
            profile,
            narrative: narrative.into(),
            created_at: Utc::now(),
        }
    }

    pub fn field(&self, field: ProfileField) -> FieldValue {
        match self.profile.get(field) {
            Some(value) => FieldValue::Stated(value.to_string()),
            None => FieldValue::Unconstrained,
        }
    }

    /// Short label for headings and logs.
    pub fn headline(&self) -> String {
        match self.profile.get(ProfileField::Role) {
            Some(role) => role.to_string(),
            None => "Career changer".to_string(),
        }
    }

    /// Full brief text, every field listed with its value or `unconstrained`.
    pub fn render(&self) -> String {
        let mut out = String::from("## Research Brief\n\n### Profile\n");
        for field in ProfileField::ALL {
            out.push_str(&format!("- {}: {}\n", field.label(), self.field(field)));
        }
        let narrative = self.narrative.trim();
        if !narrative.is_empty() {
            out.push_str("\n### Research Question\n");
            out.push_str(narrative);
            out.push('\n');
        }
        out
    }
}

/// The eight analysis dimensions every research path is examined along.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    RoleOverview,
    DemandGrowth,
    Salary,
    AutomationRisk,
    EntryRequirements,
    Progression,
    Employers,
    LearningResources,
}

impl Dimension {
    pub const ALL: [Dimension; 8] = [
        Dimension::RoleOverview,
        Dimension::DemandGrowth,
        Dimension::Salary,
        Dimension::AutomationRisk,
        Dimension::EntryRequirements,
        Dimension::Progression,
        Dimension::Employers,
        Dimension::LearningResources,
    ];

    pub fn key(&self) -> &'static str {
        match self {
            Dimension::RoleOverview => "role_overview",
            Dimension::DemandGrowth => "demand_growth",
            Dimension::Salary => "salary",
            Dimension::AutomationRisk => "automation_risk",
            Dimension::EntryRequirements => "entry_requirements",
            Dimension::Progression => "progression",
            Dimension::Employers => "employers",
            Dimension::LearningResources => "learning_resources",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Dimension::RoleOverview => "Role Overview",
            Dimension::DemandGrowth => "Demand and Growth",
            Dimension::Salary => "Salary",
            Dimension::AutomationRisk => "Automation Risk",
            Dimension::EntryRequirements => "Entry Requirements",
            Dimension::Progression => "Career Progression",
            Dimension::Employers => "Employers",
            Dimension::LearningResources => "Learning Resources",
        }
    }

    /// Accepts a key such as `automation_risk` or free text such as "AI risk".
    pub fn parse(text: &str) -> Option<Self> {
        let lowered = text.trim().to_lowercase();
        if let Some(dim) = Self::ALL.into_iter().find(|d| d.key() == lowered) {
            return Some(dim);
        }
        Self::from_heading(&lowered)
    }

    /// Maps a markdown heading onto the dimension it discusses.
    pub fn from_heading(heading: &str) -> Option<Self> {
        let h = heading.to_lowercase();
        // Checked most specific first: "salary growth" is a salary heading.
        const KEYWORDS: [(Dimension, &[&str]); 8] = [
            (Dimension::Salary, &["salary", "compensation", "pay range", "wage"]),
            (
                Dimension::AutomationRisk,
                &["automation", "ai risk", "ai-resist", "resilien"],
            ),
            (Dimension::DemandGrowth, &["demand", "growth", "job market", "outlook"]),
            (
                Dimension::EntryRequirements,
                &["entry", "requirement", "qualification", "transition"],
            ),
            (Dimension::Progression, &["progression", "advancement", "trajectory"]),
            (Dimension::Employers, &["employer", "companies", "hiring"]),
            (
                Dimension::LearningResources,
                &["learning", "resource", "course", "training"],
            ),
            (Dimension::RoleOverview, &["overview", "role", "what you"]),
        ];
        KEYWORDS
            .iter()
            .find(|(_, words)| words.iter().any(|w| h.contains(w)))
            .map(|(dim, _)| *dim)
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.title())
    }
}

/// One career path to investigate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResearchPath {
    /// 1-based position in the outline.
    pub index: usize,
    pub title: String,
    pub rationale: String,
    pub dimensions: Vec<Dimension>,
}

/// Ordered research plan: four paths, each with all eight dimensions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResearchOutline {
    pub paths: Vec<ResearchPath>,
}

impl ResearchOutline {
    pub const PATH_COUNT: usize = 4;

    pub fn path(&self, index: usize) -> Option<&ResearchPath> {
        self.paths.iter().find(|p| p.index == index)
    }

    pub fn titles(&self) -> Vec<&str> {
        self.paths.iter().map(|p| p.title.as_str()).collect()
    }

    /// Total number of (path, dimension) cells.
    pub fn cell_count(&self) -> usize {
        self.paths.iter().map(|p| p.dimensions.len()).sum()
    }
}

/// A delegated unit of research work, self-contained for one sub-agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResearchTask {
    pub id: usize,
    pub topic: String,
    pub path_index: Option<usize>,
    pub path_title: String,
    pub dimensions: Vec<Dimension>,
    /// Rendered research brief.
    pub context: String,
    /// Extra direction from the supervisor, e.g. known gaps.
    pub focus: Vec<String>,
}

/// One numbered source in a findings list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceRef {
    pub index: usize,
    pub title: String,
    pub locator: String,
}

impl fmt::Display for SourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.index, self.title, self.locator)
    }
}

/// Output of one researcher sub-agent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FindingsDocument {
    pub task_id: usize,
    pub topic: String,
    pub path_index: Option<usize>,
    /// Dimensions the task was asked to cover.
    pub assigned: Vec<Dimension>,
    /// Dimensions the body actually addresses.
    pub covered: Vec<Dimension>,
    /// Markdown with `[n]` citations into `sources`.
    pub body: String,
    /// Numbered 1..=n without gaps.
    pub sources: Vec<SourceRef>,
    pub lookups: usize,
    pub degraded: bool,
}

impl FindingsDocument {
    /// Placeholder for a task whose sub-agent failed or never finished.
    pub fn degraded(task: &ResearchTask) -> Self {
        Self {
            task_id: task.id,
            topic: task.topic.clone(),
            path_index: task.path_index,
            assigned: task.dimensions.clone(),
            covered: Vec::new(),
            body: format!("No findings could be collected for: {}", task.path_title),
            sources: Vec::new(),
            lookups: 0,
            degraded: true,
        }
    }
}

/// A consolidated statement with its global citations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CompressedClaim {
    /// Claim text without citation markers.
    pub text: String,
    /// Global source numbers, ascending.
    pub citations: Vec<usize>,
    pub kind: ClaimKind,
}

impl CompressedClaim {
    pub fn render(&self) -> String {
        let cites: String = self.citations.iter().map(|c| format!("[{}]", c)).collect();
        if cites.is_empty() {
            self.text.clone()
        } else {
            format!("{} {}", self.text, cites)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimKind {
    /// Checklists, steps, scripts and templates.
    Actionable,
    /// Carries at least one number.
    Numeric,
    Narrative,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionFindings {
    pub dimension: Dimension,
    pub claims: Vec<CompressedClaim>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PathFindings {
    pub index: usize,
    pub title: String,
    pub sections: Vec<DimensionFindings>,
}

impl PathFindings {
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|s| s.claims.is_empty())
    }
}

/// Consolidated findings: grouped claims plus one global source list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompressedFindings {
    pub paths: Vec<PathFindings>,
    /// Claims not tied to a single path or dimension.
    pub general: Vec<CompressedClaim>,
    /// Numbered 1..=n without gaps.
    pub sources: Vec<SourceRef>,
    /// Rendered markdown of everything above.
    pub content: String,
    pub estimated_tokens: usize,
    pub dropped_claims: usize,
}

impl CompressedFindings {
    pub fn path(&self, index: usize) -> Option<&PathFindings> {
        self.paths.iter().find(|p| p.index == index)
    }
}

/// The two terminal documents of a run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReportArtifacts {
    pub preview: String,
    pub full: String,
}

// ============= Run Types =============

/// Per-run overrides of the configured research settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RunOptions {
    #[serde(default)]
    pub max_parallel_workers: Option<usize>,
    #[serde(default)]
    pub total_calls_budget: Option<usize>,
    #[serde(default)]
    pub compression_token_budget: Option<usize>,
    #[serde(default)]
    pub purchasable: Option<bool>,
}

/// Inbound request to advance a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRequest {
    #[serde(default)]
    pub run_id: Option<String>,
    pub conversation: Vec<Turn>,
    #[serde(default)]
    pub options: RunOptions,
}

/// Everything the controller knows about a run, passed in and out explicitly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunState {
    pub run_id: String,
    pub conversation: ConversationState,
    #[serde(default)]
    pub brief: Option<ResearchBrief>,
    #[serde(default)]
    pub outline: Option<ResearchOutline>,
    #[serde(default)]
    pub purchasable: bool,
}

impl RunState {
    pub fn new(run_id: impl Into<String>, conversation: ConversationState) -> Self {
        Self {
            run_id: run_id.into(),
            conversation,
            brief: None,
            outline: None,
            purchasable: false,
        }
    }
}

/// Result of advancing a run once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    AwaitingUser {
        run_id: String,
        question: String,
        conversation: ConversationState,
    },
    Completed {
        run_id: String,
        artifacts: ReportArtifacts,
        path_titles: Vec<String>,
    },
    Failed {
        run_id: String,
        reason: String,
    },
}

impl RunOutcome {
    pub fn run_id(&self) -> &str {
        match self {
            RunOutcome::AwaitingUser { run_id, .. }
            | RunOutcome::Completed { run_id, .. }
            | RunOutcome::Failed { run_id, .. } => run_id,
        }
    }
}

// ============= API Types =============

#[derive(Debug, Deserialize)]
pub struct FaqRequest {
    pub question: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct FaqResponse {
    pub answer: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

// ============= Error Types =============

/// Generic text shown to users when a run fails terminally.
pub const GENERIC_FAILURE_MESSAGE: &str =
    "We could not complete your career report right now. Please try again shortly.";

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("LLM error: {0}")]
    LLM(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A stage could not produce its required structured output.
    #[error("Structural failure: {0}")]
    Structural(String),

    #[error("Run cancelled: {0}")]
    Cancelled(String),

    #[error("Timed out: {0}")]
    Timeout(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Text safe to show an end user. Internal detail stays in the logs.
    pub fn user_message(&self) -> String {
        match self {
            AppError::InvalidInput(msg) | AppError::NotFound(msg) => msg.clone(),
            AppError::Cancelled(_) => "The run was cancelled.".to_string(),
            _ => GENERIC_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl axum::response::IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        use axum::http::StatusCode;

        let status = match &self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::LLM(_) => StatusCode::BAD_GATEWAY,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            AppError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Structural(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Cancelled(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.user_message()
        });

        (status, axum::Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
