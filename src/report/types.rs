/// Pipeline stage a summary describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Scrape,
    Analyze,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Scrape => write!(f, "scrape"),
            Stage::Analyze => write!(f, "analyze"),
        }
    }
}

/// Why a pull request produced no record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotMerged,
    NoBody,
    NoClosedIssues,
    NoMatchingFile,
    AlreadyWritten,
    /// Unexpected forge failure while harvesting.
    HarvestFailed(String),
    NoChangedFile,
    AmbiguousChangedFile(usize),
    UnsupportedFormat(String),
    FetchFailed(String),
    InvalidOntology,
    /// Revision could not be prepared for conversion.
    ConversionFailed(String),
    LoadFailed(String),
    NoChanges,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NotMerged => write!(f, "closed without merging"),
            SkipReason::NoBody => write!(f, "empty body, no linked issues"),
            SkipReason::NoClosedIssues => write!(f, "no closed issues"),
            SkipReason::NoMatchingFile => write!(f, "resource file not changed"),
            SkipReason::AlreadyWritten => write!(f, "already written this run"),
            SkipReason::HarvestFailed(e) => write!(f, "harvest failed: {e}"),
            SkipReason::NoChangedFile => write!(f, "record has no changed file"),
            SkipReason::AmbiguousChangedFile(n) => write!(f, "{n} matching changed files"),
            SkipReason::UnsupportedFormat(ext) => write!(f, "unsupported extension .{ext}"),
            SkipReason::FetchFailed(e) => write!(f, "download failed: {e}"),
            SkipReason::InvalidOntology => write!(f, "invalid ontology revision"),
            SkipReason::ConversionFailed(e) => write!(f, "conversion failed: {e}"),
            SkipReason::LoadFailed(e) => write!(f, "load failed: {e}"),
            SkipReason::NoChanges => write!(f, "no change operations"),
        }
    }
}

/// Outcome counts for one stage run.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub stage: Stage,
    pub repo: String,
    /// Pull requests examined.
    pub processed: usize,
    /// PR numbers written to the store, in write order.
    pub written: Vec<u64>,
    pub skipped: Vec<(u64, SkipReason)>,
}

impl RunSummary {
    pub fn new(stage: Stage, repo: impl Into<String>) -> Self {
        Self {
            stage,
            repo: repo.into(),
            processed: 0,
            written: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn record_written(&mut self, number: u64) {
        self.processed += 1;
        self.written.push(number);
    }

    pub fn record_skipped(&mut self, number: u64, reason: SkipReason) {
        self.processed += 1;
        self.skipped.push((number, reason));
    }
}
