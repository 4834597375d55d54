use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, instrument};

use super::types::{
    ApiComment, ApiFile, ApiIssue, ApiPull, ApiRateLimit, Issue, PrState, PullRequestSummary,
    RateLimitStatus, RepoId,
};
use super::{Forge, ForgeError};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};

const PER_PAGE: usize = 100;
const ACCEPT: &str = "application/vnd.github+json";
const API_VERSION: &str = "2022-11-28";

/// GitHub REST client bound to one repository.
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    api_url: String,
    repo: RepoId,
    token: Option<String>,
}

impl GitHubClient {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        api_url: &str,
        repo: RepoId,
        token: Option<String>,
    ) -> Self {
        Self {
            transport,
            api_url: api_url.trim_end_matches('/').to_string(),
            repo,
            token,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn repo_url(&self, path: &str) -> String {
        format!("{}/repos/{}/{}/{}", self.api_url, self.repo.owner, self.repo.name, path)
    }

    fn request(&self, url: String) -> HttpRequest {
        let mut request = HttpRequest::get(url)
            .header("Accept", ACCEPT)
            .header("X-GitHub-Api-Version", API_VERSION);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {token}"));
        }
        request
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, ForgeError> {
        let response = self.transport.get(&request).await?;
        check_status(&request.url, response)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ForgeError> {
        let response = self.send(self.request(url)).await?;
        Ok(serde_json::from_slice(&response.body)?)
    }

    /// Follow `page=` until a short page comes back.
    async fn get_all_pages<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ForgeError> {
        let mut items = Vec::new();
        for page in 1.. {
            let url = self.repo_url(&format!("{path}?per_page={PER_PAGE}&page={page}"));
            let batch: Vec<T> = self.get_json(url).await?;
            let len = batch.len();
            items.extend(batch);
            if len < PER_PAGE {
                break;
            }
        }
        Ok(items)
    }
}

/// Map a raw response to the forge error taxonomy.
fn check_status(url: &str, response: HttpResponse) -> Result<HttpResponse, ForgeError> {
    if response.is_success() {
        return Ok(response);
    }

    let message = api_message(&response);
    match response.status {
        403 | 429 if is_quota_response(&response, &message) => Err(ForgeError::RateLimited),
        404 => Err(ForgeError::NotFound(url.to_string())),
        status => Err(ForgeError::Api { status, message }),
    }
}

fn is_quota_response(response: &HttpResponse, message: &str) -> bool {
    response.header("x-ratelimit-remaining") == Some("0")
        || response.header("retry-after").is_some()
        || message.to_ascii_lowercase().contains("rate limit")
}

fn api_message(response: &HttpResponse) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_slice::<ErrorBody>(&response.body)
        .map(|body| body.message)
        .unwrap_or_else(|_| response.text())
}

#[async_trait]
impl Forge for GitHubClient {
    async fn rate_limit(&self) -> Result<RateLimitStatus, ForgeError> {
        let request = self
            .request(format!("{}/rate_limit", self.api_url))
            .bypass_cache();
        let response = self.send(request).await?;
        let limit: ApiRateLimit = serde_json::from_slice(&response.body)?;
        let reset_at = DateTime::<Utc>::from_timestamp(limit.resources.core.reset, 0)
            .unwrap_or_else(Utc::now);
        Ok(RateLimitStatus {
            remaining: limit.resources.core.remaining,
            reset_at,
            now: Utc::now(),
        })
    }

    #[instrument(skip(self), fields(repo = %self.repo))]
    async fn list_pull_requests(
        &self,
        state: PrState,
        page: u32,
    ) -> Result<Vec<PullRequestSummary>, ForgeError> {
        let url = self.repo_url(&format!(
            "pulls?state={}&sort=created&direction=desc&per_page={PER_PAGE}&page={page}",
            state.api_state()
        ));
        let pulls: Vec<ApiPull> = self.get_json(url).await?;
        debug!(count = pulls.len(), "listed pull requests");
        Ok(pulls.into_iter().map(PullRequestSummary::from).collect())
    }

    async fn is_merged(&self, number: u64) -> Result<bool, ForgeError> {
        // 204 when merged, 404 when not
        match self.send(self.request(self.repo_url(&format!("pulls/{number}/merge")))).await {
            Ok(_) => Ok(true),
            Err(ForgeError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn issue(&self, number: u64) -> Result<Issue, ForgeError> {
        let issue: ApiIssue = self.get_json(self.repo_url(&format!("issues/{number}"))).await?;
        Ok(issue.into())
    }

    async fn comments(&self, number: u64) -> Result<Vec<String>, ForgeError> {
        let comments: Vec<ApiComment> =
            self.get_all_pages(&format!("issues/{number}/comments")).await?;
        Ok(comments
            .into_iter()
            .map(|c| c.body.unwrap_or_default())
            .collect())
    }

    async fn review_comments(&self, number: u64) -> Result<Vec<String>, ForgeError> {
        let comments: Vec<ApiComment> =
            self.get_all_pages(&format!("pulls/{number}/comments")).await?;
        Ok(comments
            .into_iter()
            .map(|c| c.body.unwrap_or_default())
            .collect())
    }

    async fn changed_files(&self, number: u64) -> Result<Vec<String>, ForgeError> {
        let files: Vec<ApiFile> = self.get_all_pages(&format!("pulls/{number}/files")).await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }
}
