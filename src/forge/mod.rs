pub mod github;
pub mod types;

pub use github::GitHubClient;
pub use types::{Issue, PrState, PullRequestSummary, RateLimitStatus, RepoId};

use async_trait::async_trait;
use thiserror::Error;

use crate::http::TransportError;

#[derive(Debug, Error)]
pub enum ForgeError {
    #[error("API rate limit exceeded")]
    RateLimited,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("API returned HTTP {status}: {message}")]
    Api { status: u16, message: String },

    #[error("failed to decode API response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("Invalid repository: {0}")]
    InvalidRepo(String),
}

/// Read access to one repository's pull requests and issues.
///
/// Issues and pull requests share one numbering namespace.
#[async_trait]
pub trait Forge: Send + Sync {
    /// Current core quota. Does not consume quota.
    async fn rate_limit(&self) -> Result<RateLimitStatus, ForgeError>;

    /// One page (1-based) of pull requests, newest first. An empty page ends the listing.
    async fn list_pull_requests(
        &self,
        state: PrState,
        page: u32,
    ) -> Result<Vec<PullRequestSummary>, ForgeError>;

    async fn is_merged(&self, number: u64) -> Result<bool, ForgeError>;

    async fn issue(&self, number: u64) -> Result<Issue, ForgeError>;

    /// Conversation comment bodies of an issue or pull request, oldest first.
    async fn comments(&self, number: u64) -> Result<Vec<String>, ForgeError>;

    /// Review comment bodies left on a pull request's diff, oldest first.
    async fn review_comments(&self, number: u64) -> Result<Vec<String>, ForgeError>;

    /// Paths of every file a pull request touches.
    async fn changed_files(&self, number: u64) -> Result<Vec<String>, ForgeError>;
}

/// Parse a repository identifier.
///
/// Accepts `owner/name` or a web URL such as
/// `https://github.com/owner/name` (extra path segments are ignored).
pub fn parse_repo(input: &str) -> Result<RepoId, ForgeError> {
    let invalid = || ForgeError::InvalidRepo(input.to_string());
    let trimmed = input.trim();

    let segments: Vec<String> = if trimmed.contains("://") {
        let parsed = reqwest::Url::parse(trimmed).map_err(|_| invalid())?;
        if parsed.host_str() != Some("github.com") {
            return Err(invalid());
        }
        parsed
            .path_segments()
            .ok_or_else(invalid)?
            .filter(|segment| !segment.is_empty())
            .take(2)
            .map(str::to_string)
            .collect()
    } else {
        trimmed.split('/').map(str::to_string).collect()
    };

    if segments.len() != 2 || segments.iter().any(|s| s.is_empty() || s.contains(char::is_whitespace)) {
        return Err(invalid());
    }

    let name = segments[1].trim_end_matches(".git").to_string();
    Ok(RepoId {
        owner: segments[0].clone(),
        name,
    })
}
