use chrono::{DateTime, Utc};
use serde::Deserialize;

/// A repository on the forge, e.g. `geneontology/go-ontology`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    /// `owner_name`, used for per-repository store directories.
    pub fn dir_name(&self) -> String {
        format!("{}_{}", self.owner, self.name)
    }

    pub fn web_url(&self) -> String {
        format!("https://github.com/{}/{}", self.owner, self.name)
    }
}

impl std::fmt::Display for RepoId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Which pull requests to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum PrState {
    Open,
    Closed,
    /// Closed PRs confirmed merged by an explicit merge check.
    Merged,
}

impl PrState {
    /// State filter understood by the listing endpoint.
    pub fn api_state(&self) -> &'static str {
        match self {
            PrState::Open => "open",
            PrState::Closed | PrState::Merged => "closed",
        }
    }

    pub fn requires_merge_check(&self) -> bool {
        matches!(self, PrState::Merged)
    }
}

/// Quota snapshot taken from the forge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
    /// Local clock when the snapshot was taken.
    pub now: DateTime<Utc>,
}

/// One entry of a pull-request listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestSummary {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    /// Commit the PR was opened against.
    pub base_sha: String,
    pub head_sha: String,
}

/// An issue, or a pull request seen through the issues endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub labels: Vec<String>,
    pub is_pull_request: bool,
}

// Wire shapes of the REST API. Only the fields we read.

#[derive(Debug, Deserialize)]
pub(crate) struct ApiLabel {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiCommitRef {
    pub sha: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiPull {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<ApiLabel>,
    pub base: ApiCommitRef,
    pub head: ApiCommitRef,
}

impl From<ApiPull> for PullRequestSummary {
    fn from(pull: ApiPull) -> Self {
        Self {
            number: pull.number,
            title: pull.title,
            body: pull.body,
            labels: pull.labels.into_iter().map(|l| l.name).collect(),
            base_sha: pull.base.sha,
            head_sha: pull.head.sha,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiIssue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<ApiLabel>,
    /// Present only when the issue is really a pull request.
    pub pull_request: Option<serde_json::Value>,
}

impl From<ApiIssue> for Issue {
    fn from(issue: ApiIssue) -> Self {
        Self {
            number: issue.number,
            title: issue.title,
            body: issue.body,
            labels: issue.labels.into_iter().map(|l| l.name).collect(),
            is_pull_request: issue.pull_request.is_some(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiComment {
    pub body: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiFile {
    pub filename: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateWindow {
    pub remaining: u64,
    pub reset: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateResources {
    pub core: ApiRateWindow,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiRateLimit {
    pub resources: ApiRateResources,
}
