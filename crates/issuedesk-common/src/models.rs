use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Repositories ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repository {
    pub owner: String,
    pub name: String,
    pub branch: String,
}

impl Repository {
    /// Parse `owner/name` or `owner/name@branch`, falling back to `default_branch`.
    pub fn parse(slug: &str, default_branch: &str) -> Option<Self> {
        let (path, branch) = match slug.split_once('@') {
            Some((path, branch)) if !branch.is_empty() => (path, branch),
            Some(_) => return None,
            None => (slug, default_branch),
        };
        let (owner, name) = path.trim().trim_end_matches(".git").split_once('/')?;
        if owner.is_empty() || name.is_empty() || name.contains('/') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            branch: branch.to_string(),
        })
    }

    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for Repository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}@{}", self.owner, self.name, self.branch)
    }
}

/// A repository as listed by the backend (subset of GitHub fields).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoSummary {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub description: Option<String>,
    pub default_branch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Branch {
    pub name: String,
    #[serde(default)]
    pub protected: bool,
}

// ── Auth ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUrl {
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthToken {
    pub token: String,
    #[serde(default)]
    pub user: Option<UserProfile>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

// ── Sessions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Statistics {
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub token_count: u64,
    #[serde(default)]
    pub total_cost: f64,
    #[serde(default)]
    pub context_card_count: u64,
}

impl Statistics {
    pub fn apply(&mut self, patch: &StatisticsPatch) {
        if let Some(v) = patch.message_count {
            self.message_count = v;
        }
        if let Some(v) = patch.token_count {
            self.token_count = v;
        }
        if let Some(v) = patch.total_cost {
            self.total_cost = v;
        }
        if let Some(v) = patch.context_card_count {
            self.context_card_count = v;
        }
    }
}

/// Partial statistics update. Absent keys leave the current value alone.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatisticsPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_count: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_cost: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_card_count: Option<u64>,
}

impl StatisticsPatch {
    /// Overlay `later` on top of `self`; keys present in `later` win.
    pub fn merge(&mut self, later: StatisticsPatch) {
        self.message_count = later.message_count.or(self.message_count);
        self.token_count = later.token_count.or(self.token_count);
        self.total_cost = later.total_cost.or(self.total_cost);
        self.context_card_count = later.context_card_count.or(self.context_card_count);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub repository: Repository,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub embedded_files: Vec<String>,
    #[serde(default)]
    pub statistics: Statistics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial session update pushed over the realtime channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository: Option<Repository>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedded_files: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub statistics: Option<StatisticsPatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ── Messages ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    User,
    Assistant,
    System,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Sending,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub session_id: String,
    pub role: MessageRole,
    pub content: String,
    #[serde(default)]
    pub is_code: bool,
    #[serde(default)]
    pub token_count: u64,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub status: MessageStatus,
    /// Correlation id chosen by the client and echoed back by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
}

// ── Context cards ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardSource {
    Chat,
    File,
    Github,
    Manual,
}

impl CardSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::File => "file",
            Self::Github => "github",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for CardSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "chat" => Ok(Self::Chat),
            "file" => Ok(Self::File),
            "github" => Ok(Self::Github),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid card source: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextCard {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub content: String,
    #[serde(default)]
    pub token_count: u64,
    pub source: CardSource,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewContextCard {
    pub title: String,
    pub description: String,
    pub content: String,
    pub source: CardSource,
}

// ── Agent status ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    #[default]
    Idle,
    Thinking,
    Generating,
    Error,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStatus {
    #[serde(default)]
    pub state: AgentState,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub progress: Option<f32>,
}

impl AgentStatus {
    pub fn apply(&mut self, patch: &AgentStatusPatch) {
        if let Some(state) = patch.state {
            self.state = state;
        }
        if let Some(detail) = &patch.detail {
            self.detail = Some(detail.clone());
        }
        if let Some(progress) = patch.progress {
            self.progress = Some(progress);
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentStatusPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<AgentState>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<f32>,
}

// ── File dependencies and issues ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDependency {
    pub path: String,
    #[serde(default)]
    pub imports: Vec<String>,
    #[serde(default)]
    pub imported_by: Vec<String>,
    #[serde(default)]
    pub token_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatedIssue {
    pub title: String,
    pub body: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub github_issue_number: Option<i64>,
    #[serde(default)]
    pub html_url: Option<String>,
}

// ── Solve runs and trajectories ──────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }
}

impl FromStr for RunStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(format!("Invalid run status: {}", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrajectoryEntry {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryInfo {
    #[serde(default)]
    pub cost: Option<f64>,
    #[serde(default)]
    pub exit_status: Option<String>,
    #[serde(default)]
    pub submission: Option<String>,
}

impl TrajectoryInfo {
    pub fn apply(&mut self, later: &TrajectoryInfo) {
        if later.cost.is_some() {
            self.cost = later.cost;
        }
        if later.exit_status.is_some() {
            self.exit_status = later.exit_status.clone();
        }
        if later.submission.is_some() {
            self.submission = later.submission.clone();
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryData {
    #[serde(default)]
    pub entries: Vec<TrajectoryEntry>,
    #[serde(default)]
    pub info: TrajectoryInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveRun {
    pub id: String,
    pub model: String,
    #[serde(default)]
    pub strategy: Option<String>,
    pub status: RunStatus,
    #[serde(default)]
    pub trajectory: TrajectoryData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StartSolveRequest {
    pub issue_title: String,
    pub issue_body: String,
    pub repository: Repository,
    pub models: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolveSession {
    pub id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub runs: Vec<SolveRun>,
}

/// Full trajectory of one run as returned by the polling endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrajectory {
    pub run_id: String,
    pub status: RunStatus,
    #[serde(default)]
    pub trajectory: Vec<TrajectoryEntry>,
    #[serde(default)]
    pub info: TrajectoryInfo,
}
