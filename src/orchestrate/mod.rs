pub mod workspace;

pub use workspace::TempWorkspace;

use std::collections::BTreeSet;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{debug, info, info_span, instrument, warn, Instrument};

use crate::config::FileSelection;
use crate::fetch::{FetchError, RateLimitContext, ResilientFetcher};
use crate::forge::{ForgeError, RepoId};
use crate::normalize::{FormatNormalizer, NormalizeError, Normalized};
use crate::ontology::{ChangeScriptWriter, LoadError, OntologyAdapter, Serialization};
use crate::reconcile;
use crate::report::{RunSummary, SkipReason, Stage};
use crate::store::{
    self, AnalyzedRecord, ChangedFileRef, PullRequestRecord, RunMetadata, StoreError, YamlStore,
};

/// Diff engine artifact with no meaning.
const JUNK_CHANGE: &str = "create None";

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("temporary directory {path} unusable: {source}")]
    Workspace {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Normalize(#[from] NormalizeError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("failed to serialize change script: {0}")]
    Serialize(std::io::Error),
}

#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub repo: RepoId,
    /// Intermediate store written by the scrape stage.
    pub input: PathBuf,
    /// Final store.
    pub output: PathBuf,
    pub tmp_dir: PathBuf,
    /// Only analyze PRs numbered at least this.
    pub resume_from: Option<u64>,
    /// Truncate the final store. Otherwise append, skipping PRs it already holds.
    pub overwrite: bool,
    pub file_selection: FileSelection,
    pub write_empty: bool,
    pub drop_junk_lines: bool,
}

enum Analysis {
    Changes(Vec<String>),
    Skipped(SkipReason),
}

/// Analyze stage: diffs each harvested PR's revision pair into the final store.
pub struct DiffOrchestrator<'a> {
    fetcher: &'a ResilientFetcher,
    normalizer: &'a FormatNormalizer,
    adapter: &'a dyn OntologyAdapter,
    rate_limit: Option<RateLimitContext<'a>>,
    options: AnalyzeOptions,
}

impl<'a> DiffOrchestrator<'a> {
    pub fn new(
        fetcher: &'a ResilientFetcher,
        normalizer: &'a FormatNormalizer,
        adapter: &'a dyn OntologyAdapter,
        options: AnalyzeOptions,
    ) -> Self {
        Self {
            fetcher,
            normalizer,
            adapter,
            rate_limit: None,
            options,
        }
    }

    /// Consult the quota governor before every download.
    pub fn with_rate_limit(mut self, rate_limit: RateLimitContext<'a>) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// PR numbers still to analyze, in intermediate store order.
    fn pending(&self, records: &[PullRequestRecord]) -> Result<BTreeSet<u64>, StoreError> {
        let harvested: BTreeSet<u64> = records.iter().map(|r| r.number).collect();
        let mut pending = if self.options.overwrite {
            harvested
        } else {
            let analyzed = store::record_numbers(&self.options.output)?;
            debug!(already = analyzed.len(), "reconciling with existing final store");
            reconcile::remaining(&harvested, &analyzed)
        };
        if let Some(from) = self.options.resume_from {
            pending.retain(|number| *number >= from);
        }
        Ok(pending)
    }

    /// Analyze every pending record.
    ///
    /// Record-level problems are skipped and logged; a broken environment
    /// (tools, loader, disk) aborts with records written so far intact.
    #[instrument(skip_all, fields(repo = %self.options.repo))]
    pub async fn run(&self) -> Result<RunSummary, AnalyzeError> {
        let mut summary = RunSummary::new(Stage::Analyze, self.options.repo.to_string());
        let records = store::read_pull_requests(&self.options.input)?;
        let pending = self.pending(&records)?;
        info!(harvested = records.len(), pending = pending.len(), "analyzing");
        if pending.is_empty() {
            info!("every harvested pull request is already analyzed");
            return Ok(summary);
        }

        let output = YamlStore::create(&self.options.output, self.options.overwrite)?;
        if output.is_empty() {
            output.write_metadata(&RunMetadata::now(self.options.repo.web_url()))?;
        }
        let workspace = TempWorkspace::new(&self.options.tmp_dir).map_err(|source| {
            AnalyzeError::Workspace {
                path: self.options.tmp_dir.clone(),
                source,
            }
        })?;

        for record in records.iter().filter(|r| pending.contains(&r.number)) {
            let analysis = self.analyze_with_retry(record, &workspace).await?;
            match analysis {
                Analysis::Changes(changes) if changes.is_empty() && !self.options.write_empty => {
                    info!(pr = record.number, "no change operations, not written");
                    summary.record_skipped(record.number, SkipReason::NoChanges);
                }
                Analysis::Changes(changes) => {
                    info!(pr = record.number, changes = changes.len(), "record written");
                    output.append_analyzed(&AnalyzedRecord::from_record(record, changes))?;
                    summary.record_written(record.number);
                }
                Analysis::Skipped(reason) => {
                    warn!(pr = record.number, %reason, "record skipped");
                    summary.record_skipped(record.number, reason);
                }
            }
        }

        info!(
            written = summary.written.len(),
            skipped = summary.skipped.len(),
            "analysis completed"
        );
        Ok(summary)
    }

    /// Analyze one record, starting it over after a cool-down whenever the
    /// quota check before a download reports exhaustion.
    async fn analyze_with_retry(
        &self,
        record: &PullRequestRecord,
        workspace: &TempWorkspace,
    ) -> Result<Analysis, AnalyzeError> {
        loop {
            let span = info_span!("analyze_pr", pr = record.number);
            match self.analyze_guarded(record, workspace).instrument(span).await {
                Err(AnalyzeError::Fetch(e)) if is_quota_exhausted(&e) => {
                    if let Some(ctx) = &self.rate_limit {
                        ctx.governor.cool_down().await;
                    }
                }
                outcome => return outcome,
            }
        }
    }

    /// Analyze one record between two workspace resets. The trailing reset
    /// runs on every path; its own failure only surfaces if analysis succeeded.
    async fn analyze_guarded(
        &self,
        record: &PullRequestRecord,
        workspace: &TempWorkspace,
    ) -> Result<Analysis, AnalyzeError> {
        let reset = || {
            workspace.reset().map_err(|source| AnalyzeError::Workspace {
                path: workspace.dir().to_path_buf(),
                source,
            })
        };
        reset()?;
        let analysis = self.analyze_record(record, workspace).await;
        let cleanup = reset();
        let analysis = analysis?;
        cleanup?;
        Ok(analysis)
    }

    fn select_file<'r>(&self, record: &'r PullRequestRecord) -> Result<&'r ChangedFileRef, SkipReason> {
        match (record.changed_files.as_slice(), self.options.file_selection) {
            ([], _) => Err(SkipReason::NoChangedFile),
            ([only], _) => Ok(only),
            (files, FileSelection::ExactlyOne) => Err(SkipReason::AmbiguousChangedFile(files.len())),
            (files, FileSelection::FirstMatch) => {
                warn!(
                    matches = files.len(),
                    used = %files[0].filename,
                    "several matching changed files, using the first"
                );
                Ok(&files[0])
            }
        }
    }

    async fn analyze_record(
        &self,
        record: &PullRequestRecord,
        workspace: &TempWorkspace,
    ) -> Result<Analysis, AnalyzeError> {
        let file = match self.select_file(record) {
            Ok(file) => file,
            Err(reason) => return Ok(Analysis::Skipped(reason)),
        };

        let extension = url_extension(&file.url_in_pr).unwrap_or_default();
        let Some(serialization) = Serialization::from_extension(&extension) else {
            return Ok(Analysis::Skipped(SkipReason::UnsupportedFormat(extension)));
        };

        let mut new_path = workspace.new_revision(&extension);
        let mut old_path = workspace.old_revision(&extension);
        for (url, path) in [(&file.url_in_pr, &new_path), (&file.url_on_main, &old_path)] {
            match self.fetcher.fetch(url, path, self.rate_limit.as_ref()).await {
                Ok(()) => {}
                Err(e) if e.is_fatal() || is_quota_exhausted(&e) => return Err(e.into()),
                Err(e) => return Ok(Analysis::Skipped(SkipReason::FetchFailed(e.to_string()))),
            }
        }

        if serialization.needs_conversion() {
            for path in [&mut new_path, &mut old_path] {
                match self.normalizer.normalize(path.as_path()).await {
                    Ok(Normalized::Converted(converted)) => *path = converted,
                    Ok(Normalized::Invalid) => {
                        return Ok(Analysis::Skipped(SkipReason::InvalidOntology))
                    }
                    Err(e) if e.is_data_error() => {
                        return Ok(Analysis::Skipped(SkipReason::ConversionFailed(e.to_string())))
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }

        let loaded = async {
            let old = self.adapter.load(&old_path).await?;
            let new = self.adapter.load(&new_path).await?;
            self.adapter.diff(&old, &new).await
        };
        let changes = match loaded.await {
            Ok(changes) => changes,
            Err(e) if e.is_data_error() => {
                return Ok(Analysis::Skipped(SkipReason::LoadFailed(e.to_string())))
            }
            Err(e) => return Err(e.into()),
        };

        let mut writer = ChangeScriptWriter::new(Vec::new());
        for change in &changes {
            writer.emit(change).map_err(AnalyzeError::Serialize)?;
        }
        let emitted = writer.written();
        let script = String::from_utf8_lossy(&writer.into_inner()).into_owned();
        let lines: Vec<String> = script
            .lines()
            .filter(|line| !(self.options.drop_junk_lines && *line == JUNK_CHANGE))
            .map(str::to_string)
            .collect();
        debug!(emitted, kept = lines.len(), "change script serialized");
        Ok(Analysis::Changes(lines))
    }
}

fn is_quota_exhausted(error: &FetchError) -> bool {
    matches!(error, FetchError::RateLimit(ForgeError::RateLimited))
}

/// Extension of the last path segment of `url`, ignoring query and fragment.
fn url_extension(url: &str) -> Option<String> {
    let path = url.split(&['?', '#'][..]).next()?;
    let name = path.rsplit('/').next()?;
    let (stem, ext) = name.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}
