use serde::{Deserialize, Serialize};

/// Key prefix shared by both stores; the full key is `pull_request_<number>`.
pub const RECORD_KEY_PREFIX: &str = "pull_request_";
/// Key of the run metadata entry heading a fresh final store.
pub const METADATA_KEY: &str = "run_metadata";

pub fn record_key(number: u64) -> String {
    format!("{RECORD_KEY_PREFIX}{number}")
}

/// PR number encoded in a store key, if it is a record key.
pub fn parse_record_key(key: &str) -> Option<u64> {
    key.strip_prefix(RECORD_KEY_PREFIX)?.parse().ok()
}

/// An issue a pull request closes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
}

/// The tracked resource file as changed by a pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFileRef {
    pub filename: String,
    /// Raw content at the base commit (pre-merge).
    pub url_on_main: String,
    /// Raw content at the head commit (post-merge).
    pub url_in_pr: String,
}

/// One harvested pull request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullRequestRecord {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub issue_closed: Vec<IssueRecord>,
    #[serde(default)]
    pub changed_files: Vec<ChangedFileRef>,
}

impl PullRequestRecord {
    /// Whether the record qualifies for the intermediate store.
    pub fn is_complete(&self) -> bool {
        !self.issue_closed.is_empty() && !self.changed_files.is_empty()
    }
}

/// A pull request's narrative paired with the change operations it made.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedRecord {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub comments: Vec<String>,
    #[serde(default)]
    pub issue_closed: Vec<IssueRecord>,
    /// One line per change operation, in emission order.
    #[serde(default)]
    pub changes: Vec<String>,
}

impl AnalyzedRecord {
    /// Carry the narrative of `record` over unchanged, replacing its changed files with `changes`.
    pub fn from_record(record: &PullRequestRecord, changes: Vec<String>) -> Self {
        Self {
            number: record.number,
            title: record.title.clone(),
            body: record.body.clone(),
            labels: record.labels.clone(),
            comments: record.comments.clone(),
            issue_closed: record.issue_closed.clone(),
            changes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunMetadata {
    pub date_executed: String,
    pub code_version: String,
    pub github_url: String,
}

impl RunMetadata {
    pub fn now(github_url: String) -> Self {
        Self {
            date_executed: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            code_version: env!("CARGO_PKG_VERSION").to_string(),
            github_url,
        }
    }
}
