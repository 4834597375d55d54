pub mod links;

use std::collections::HashSet;
use thiserror::Error;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

use crate::forge::{Forge, ForgeError, PrState, PullRequestSummary, RepoId};
use crate::governor::RateLimitGovernor;
use crate::report::{RunSummary, SkipReason, Stage};
use crate::store::{ChangedFileRef, IssueRecord, PullRequestRecord, StoreError, YamlStore};

#[derive(Debug, Error)]
pub enum HarvestError {
    #[error(transparent)]
    Forge(#[from] ForgeError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// What to harvest.
#[derive(Debug, Clone)]
pub struct HarvestOptions {
    pub repo: RepoId,
    /// Tracked resource filename. `None` means the repository is unknown.
    pub resource: Option<String>,
    pub state: PrState,
    /// Inclusive PR number bounds.
    pub min_number: Option<u64>,
    pub max_number: Option<u64>,
    /// Host serving raw file revisions.
    pub raw_url: String,
}

impl HarvestOptions {
    fn in_range(&self, number: u64) -> bool {
        self.min_number.map_or(true, |min| number >= min)
            && self.max_number.map_or(true, |max| number <= max)
    }
}

enum Outcome {
    Written,
    Skipped(SkipReason),
}

/// Scrape stage: turns merged pull requests into intermediate records.
pub struct Harvester<'a> {
    forge: &'a dyn Forge,
    governor: &'a RateLimitGovernor,
    options: HarvestOptions,
}

impl<'a> Harvester<'a> {
    pub fn new(forge: &'a dyn Forge, governor: &'a RateLimitGovernor, options: HarvestOptions) -> Self {
        Self {
            forge,
            governor,
            options,
        }
    }

    /// Walk every pull request in range and append qualifying ones to `store`.
    ///
    /// Per-PR failures are logged and skipped. Listing failures and store
    /// write failures abort the run.
    #[instrument(skip_all, fields(repo = %self.options.repo, state = ?self.options.state))]
    pub async fn run(&self, store: &YamlStore) -> Result<RunSummary, HarvestError> {
        let mut summary = RunSummary::new(Stage::Scrape, self.options.repo.to_string());
        let Some(resource) = self.options.resource.as_deref() else {
            warn!("no resource file is mapped for this repository, nothing to harvest");
            return Ok(summary);
        };
        info!(resource, "starting scrape");

        let mut written = HashSet::new();
        let mut page = 1;
        loop {
            let pulls = match self.list_page(page).await {
                Ok(pulls) => pulls,
                Err(ForgeError::RateLimited) => {
                    self.governor.cool_down().await;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if pulls.is_empty() {
                break;
            }

            // newest first, and numbers grow with creation time
            let past_min = match (self.options.min_number, pulls.last()) {
                (Some(min), Some(last)) => last.number < min,
                _ => false,
            };

            for pull in pulls.iter().filter(|p| self.options.in_range(p.number)) {
                self.harvest_with_retry(pull, resource, store, &mut written, &mut summary)
                    .instrument(info_span!("harvest_pr", pr = pull.number))
                    .await?;
                self.pace_after_pr().await;
            }

            if past_min {
                debug!(page, "listing passed the minimum PR number");
                break;
            }
            page += 1;
        }

        info!(
            processed = summary.processed,
            written = summary.written.len(),
            "scrape completed"
        );
        Ok(summary)
    }

    async fn list_page(&self, page: u32) -> Result<Vec<PullRequestSummary>, ForgeError> {
        self.governor.pace(self.forge).await?;
        self.forge.list_pull_requests(self.options.state, page).await
    }

    /// Process one PR, retrying it after a cool-down whenever quota runs out.
    async fn harvest_with_retry(
        &self,
        pull: &PullRequestSummary,
        resource: &str,
        store: &YamlStore,
        written: &mut HashSet<u64>,
        summary: &mut RunSummary,
    ) -> Result<(), HarvestError> {
        loop {
            match self.harvest_one(pull, resource, store, written).await {
                Ok(Outcome::Written) => {
                    info!(path = %store.path().display(), "record written");
                    summary.record_written(pull.number);
                }
                Ok(Outcome::Skipped(reason)) => {
                    info!(%reason, "pull request skipped");
                    summary.record_skipped(pull.number, reason);
                }
                Err(HarvestError::Forge(ForgeError::RateLimited)) => {
                    self.governor.cool_down().await;
                    continue;
                }
                Err(HarvestError::Forge(e)) => {
                    error!(error = %e, "failed to fetch issues or files");
                    summary.record_skipped(pull.number, SkipReason::HarvestFailed(e.to_string()));
                }
                Err(e) => return Err(e),
            }
            return Ok(());
        }
    }

    async fn harvest_one(
        &self,
        pull: &PullRequestSummary,
        resource: &str,
        store: &YamlStore,
        written: &mut HashSet<u64>,
    ) -> Result<Outcome, HarvestError> {
        if written.contains(&pull.number) {
            return Ok(Outcome::Skipped(SkipReason::AlreadyWritten));
        }

        if self.options.state.requires_merge_check() {
            self.governor.pace(self.forge).await?;
            if !self.forge.is_merged(pull.number).await? {
                return Ok(Outcome::Skipped(SkipReason::NotMerged));
            }
        }

        let Some(body) = pull.body.as_deref().filter(|b| !b.trim().is_empty()) else {
            warn!("no issues linked");
            return Ok(Outcome::Skipped(SkipReason::NoBody));
        };

        let issue_closed = self.closed_issues(body).await?;
        if issue_closed.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoClosedIssues));
        }

        self.governor.pace(self.forge).await?;
        let changed_files: Vec<ChangedFileRef> = self
            .forge
            .changed_files(pull.number)
            .await?
            .into_iter()
            .filter(|path| links::matches_resource(path, resource))
            .map(|path| self.file_ref(pull, path))
            .collect();
        if changed_files.is_empty() {
            return Ok(Outcome::Skipped(SkipReason::NoMatchingFile));
        }

        self.governor.pace(self.forge).await?;
        let comments = self.forge.review_comments(pull.number).await?;

        let record = PullRequestRecord {
            number: pull.number,
            title: pull.title.clone(),
            body: pull.body.clone(),
            labels: pull.labels.clone(),
            comments,
            issue_closed,
            changed_files,
        };
        debug_assert!(record.is_complete());
        store.append_record(&record)?;
        written.insert(pull.number);
        Ok(Outcome::Written)
    }

    /// Fetch every true issue referenced in `body`. Referenced pull requests
    /// and numbers that do not resolve are dropped.
    async fn closed_issues(&self, body: &str) -> Result<Vec<IssueRecord>, HarvestError> {
        let mut issues = Vec::new();
        for number in links::extract_issue_refs(body) {
            self.governor.pace(self.forge).await?;
            let issue = match self.forge.issue(number).await {
                Ok(issue) => issue,
                Err(ForgeError::NotFound(_)) => {
                    warn!(issue = number, "linked issue does not resolve");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if issue.is_pull_request {
                debug!(issue = number, "reference is a pull request, ignored");
                continue;
            }

            self.governor.pace(self.forge).await?;
            let comments = self.forge.comments(number).await?;
            issues.push(IssueRecord {
                number: issue.number,
                title: issue.title,
                body: issue.body,
                labels: issue.labels,
                comments,
            });
        }
        Ok(issues)
    }

    fn file_ref(&self, pull: &PullRequestSummary, filename: String) -> ChangedFileRef {
        let raw = |sha: &str| links::raw_file_url(&self.options.raw_url, &self.options.repo, sha, &filename);
        ChangedFileRef {
            url_on_main: raw(&pull.base_sha),
            url_in_pr: raw(&pull.head_sha),
            filename,
        }
    }

    async fn pace_after_pr(&self) {
        match self.governor.pace(self.forge).await {
            Ok(()) => {}
            Err(ForgeError::RateLimited) => self.governor.cool_down().await,
            Err(e) => warn!(error = %e, "rate limit check failed"),
        }
    }
}
