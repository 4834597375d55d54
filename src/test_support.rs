//! In-memory stand-ins for the forge, the HTTP transport and the ontology
//! adapter. Nothing here touches the network or spawns tools.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::forge::{Forge, ForgeError, Issue, PrState, PullRequestSummary, RateLimitStatus};
use crate::http::{HttpRequest, HttpResponse, HttpTransport, TransportError};
use crate::ontology::{Change, LoadError, LoadedOntology, OntologyAdapter};

pub fn fake_pull(number: u64, body: Option<&str>) -> PullRequestSummary {
    PullRequestSummary {
        number,
        title: format!("PR {number}"),
        body: body.map(str::to_string),
        labels: vec![],
        base_sha: format!("base{number}"),
        head_sha: format!("head{number}"),
    }
}

/// Scripted forge. Unknown issue numbers are not found, unknown comment and
/// file lists are empty.
pub struct FakeForge {
    pages: Vec<Vec<PullRequestSummary>>,
    merged: HashSet<u64>,
    issues: HashMap<u64, Issue>,
    comments: HashMap<u64, Vec<String>>,
    review_comments: HashMap<u64, Vec<String>>,
    files: HashMap<u64, Vec<String>>,
    failing_files: HashSet<u64>,
    rate_limited_issues: Mutex<HashSet<u64>>,
    quota_exhausted_once: AtomicBool,
    remaining: u64,
    calls: Mutex<Vec<String>>,
    rate_limit_checks: AtomicUsize,
}

impl FakeForge {
    pub fn new() -> Self {
        Self {
            pages: Vec::new(),
            merged: HashSet::new(),
            issues: HashMap::new(),
            comments: HashMap::new(),
            review_comments: HashMap::new(),
            files: HashMap::new(),
            failing_files: HashSet::new(),
            rate_limited_issues: Mutex::new(HashSet::new()),
            quota_exhausted_once: AtomicBool::new(false),
            remaining: 5000,
            calls: Mutex::new(Vec::new()),
            rate_limit_checks: AtomicUsize::new(0),
        }
    }

    /// All pull requests on a single listing page.
    pub fn with_pulls(self, pulls: Vec<PullRequestSummary>) -> Self {
        self.with_pages(vec![pulls])
    }

    pub fn with_pages(mut self, pages: Vec<Vec<PullRequestSummary>>) -> Self {
        self.pages = pages;
        self
    }

    pub fn merged(mut self, number: u64) -> Self {
        self.merged.insert(number);
        self
    }

    pub fn with_issue(mut self, number: u64, is_pull_request: bool) -> Self {
        self.issues.insert(
            number,
            Issue {
                number,
                title: format!("Issue {number}"),
                body: Some(format!("Body of {number}")),
                labels: vec!["new term request".to_string()],
                is_pull_request,
            },
        );
        self
    }

    pub fn with_comments(mut self, number: u64, comments: &[&str]) -> Self {
        self.comments
            .insert(number, comments.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_review_comments(mut self, number: u64, comments: &[&str]) -> Self {
        self.review_comments
            .insert(number, comments.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_files(mut self, number: u64, files: &[&str]) -> Self {
        self.files
            .insert(number, files.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn failing_files(mut self, number: u64) -> Self {
        self.failing_files.insert(number);
        self
    }

    /// First lookup of `number` reports quota exhaustion.
    pub fn rate_limit_issue_once(self, number: u64) -> Self {
        self.rate_limited_issues.lock().unwrap().insert(number);
        self
    }

    /// Next quota check reports exhaustion.
    pub fn exhaust_quota_once(self) -> Self {
        self.quota_exhausted_once.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_remaining(mut self, remaining: u64) -> Self {
        self.remaining = remaining;
        self
    }

    pub fn calls_to(&self, call: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|c| *c == call).count()
    }

    pub fn rate_limit_checks(&self) -> usize {
        self.rate_limit_checks.load(Ordering::SeqCst)
    }

    fn log(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }
}

#[async_trait]
impl Forge for FakeForge {
    async fn rate_limit(&self) -> Result<RateLimitStatus, ForgeError> {
        self.rate_limit_checks.fetch_add(1, Ordering::SeqCst);
        if self.quota_exhausted_once.swap(false, Ordering::SeqCst) {
            return Err(ForgeError::RateLimited);
        }
        let now = Utc::now();
        Ok(RateLimitStatus {
            remaining: self.remaining,
            reset_at: now,
            now,
        })
    }

    async fn list_pull_requests(
        &self,
        _state: PrState,
        page: u32,
    ) -> Result<Vec<PullRequestSummary>, ForgeError> {
        self.log(format!("list {page}"));
        Ok(self
            .pages
            .get(page as usize - 1)
            .cloned()
            .unwrap_or_default())
    }

    async fn is_merged(&self, number: u64) -> Result<bool, ForgeError> {
        self.log(format!("merged {number}"));
        Ok(self.merged.contains(&number))
    }

    async fn issue(&self, number: u64) -> Result<Issue, ForgeError> {
        self.log(format!("issue {number}"));
        if self.rate_limited_issues.lock().unwrap().remove(&number) {
            return Err(ForgeError::RateLimited);
        }
        self.issues
            .get(&number)
            .cloned()
            .ok_or_else(|| ForgeError::NotFound(format!("issues/{number}")))
    }

    async fn comments(&self, number: u64) -> Result<Vec<String>, ForgeError> {
        self.log(format!("comments {number}"));
        Ok(self.comments.get(&number).cloned().unwrap_or_default())
    }

    async fn review_comments(&self, number: u64) -> Result<Vec<String>, ForgeError> {
        self.log(format!("review comments {number}"));
        Ok(self.review_comments.get(&number).cloned().unwrap_or_default())
    }

    async fn changed_files(&self, number: u64) -> Result<Vec<String>, ForgeError> {
        self.log(format!("files {number}"));
        if self.failing_files.contains(&number) {
            return Err(ForgeError::Api {
                status: 502,
                message: "Server Error".to_string(),
            });
        }
        Ok(self.files.get(&number).cloned().unwrap_or_default())
    }
}

enum Route {
    Respond(HttpResponse),
    Fail,
}

/// Scripted transport. Unrouted URLs answer 404.
pub struct FakeTransport {
    routes: HashMap<String, Route>,
    timeouts: Mutex<HashMap<String, u32>>,
    requests: Mutex<Vec<HttpRequest>>,
    observed_dir: Option<PathBuf>,
    snapshots: Mutex<Vec<(String, Vec<String>)>>,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self {
            routes: HashMap::new(),
            timeouts: Mutex::new(HashMap::new()),
            requests: Mutex::new(Vec::new()),
            observed_dir: None,
            snapshots: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, url: &str, response: HttpResponse) -> Self {
        self.routes.insert(url.to_string(), Route::Respond(response));
        self
    }

    pub fn with_body(self, url: &str, body: &str) -> Self {
        self.with_response(
            url,
            HttpResponse {
                status: 200,
                headers: vec![],
                body: body.as_bytes().to_vec(),
            },
        )
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.with_response(
            url,
            HttpResponse {
                status,
                headers: vec![],
                body: Vec::new(),
            },
        )
    }

    /// Connection-level failure, not a timeout.
    pub fn with_request_error(mut self, url: &str) -> Self {
        self.routes.insert(url.to_string(), Route::Fail);
        self
    }

    /// Time out the first `count` requests for `url`.
    pub fn with_timeouts(self, url: &str, count: u32) -> Self {
        self.timeouts.lock().unwrap().insert(url.to_string(), count);
        self
    }

    /// Record the file names in `dir` at the moment of every request.
    pub fn observing(mut self, dir: &Path) -> Self {
        self.observed_dir = Some(dir.to_path_buf());
        self
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn request_count(&self, url: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.url == url)
            .count()
    }

    /// `(url, files present in the observed dir)` per request, in order.
    pub fn snapshots(&self) -> Vec<(String, Vec<String>)> {
        self.snapshots.lock().unwrap().clone()
    }

    fn snapshot(&self, url: &str) {
        let Some(dir) = &self.observed_dir else {
            return;
        };
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .map(|e| e.file_name().to_string_lossy().into_owned())
                    .collect()
            })
            .unwrap_or_default();
        names.sort();
        self.snapshots.lock().unwrap().push((url.to_string(), names));
    }
}

#[async_trait]
impl HttpTransport for FakeTransport {
    async fn get(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        self.snapshot(&request.url);

        if let Some(left) = self.timeouts.lock().unwrap().get_mut(&request.url) {
            if *left > 0 {
                *left -= 1;
                return Err(TransportError::Timeout(format!("{} read timed out", request.url)));
            }
        }

        match self.routes.get(&request.url) {
            Some(Route::Respond(response)) => Ok(response.clone()),
            Some(Route::Fail) => Err(TransportError::Request(format!(
                "error sending request for url ({})",
                request.url
            ))),
            None => Ok(HttpResponse {
                status: 404,
                headers: vec![],
                body: b"404: Not Found".to_vec(),
            }),
        }
    }
}

/// Line-set diff over plain text files.
///
/// A file whose content is `INVALID` fails to load as bad data, `BROKEN`
/// fails as an engine error. A line `emit-junk` in the new revision makes the
/// diff also yield the stray `create None` change.
pub struct FakeAdapter {
    loads: AtomicUsize,
}

impl FakeAdapter {
    pub fn new() -> Self {
        Self {
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

fn read_lossy(path: &Path) -> Result<String, LoadError> {
    let bytes = std::fs::read(path).map_err(|_| LoadError::MissingFile(path.to_path_buf()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

#[async_trait]
impl OntologyAdapter for FakeAdapter {
    async fn load(&self, path: &Path) -> Result<LoadedOntology, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let content = read_lossy(path)?;
        match content.trim() {
            "INVALID" => Err(LoadError::Format {
                path: path.to_path_buf(),
                reason: "not an ontology".to_string(),
            }),
            "BROKEN" => Err(LoadError::Engine("loader crashed".to_string())),
            _ => Ok(LoadedOntology {
                path: path.to_path_buf(),
                selector: format!("fake:{}", path.display()),
            }),
        }
    }

    async fn diff(
        &self,
        old: &LoadedOntology,
        new: &LoadedOntology,
    ) -> Result<Vec<Change>, LoadError> {
        let old_text = read_lossy(&old.path)?;
        let new_text = read_lossy(&new.path)?;
        let old_lines: Vec<&str> = old_text.lines().collect();
        let new_lines: Vec<&str> = new_text.lines().collect();

        let mut changes = Vec::new();
        for line in &old_lines {
            if !new_lines.contains(line) {
                changes.push(Change(format!("delete {line}")));
            }
        }
        for line in &new_lines {
            if *line == "emit-junk" {
                changes.push(Change("create None".to_string()));
            } else if !old_lines.contains(line) {
                changes.push(Change(format!("create {line}")));
            }
        }
        Ok(changes)
    }
}
