use async_trait::async_trait;
use std::path::Path;
use tokio::io::AsyncReadExt;
use tokio::process::Command;
use tracing::{debug, instrument};

use super::{Change, LoadError, LoadedOntology, OntologyAdapter};

const SCHEME: &str = "simpleobo";
/// Bytes inspected when checking that a file looks like OBO.
const SNIFF_BYTES: usize = 8 * 1024;

/// Adapter backed by the `runoak` command line.
pub struct RunoakAdapter {
    program: String,
}

impl RunoakAdapter {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

/// Check that `head` starts like an OBO document: after blank lines and
/// `!` comments, either a `[Stanza]` header or a `tag: value` header line.
pub(crate) fn sniff_obo(head: &str) -> Result<(), String> {
    let first = head
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty() && !line.starts_with('!'));

    match first {
        None => Err("file is empty".to_string()),
        Some(line) if line.starts_with('[') && line.ends_with(']') => Ok(()),
        Some(line) => match line.split_once(':') {
            Some((tag, _)) if is_tag(tag) => Ok(()),
            _ => Err(format!("unexpected leading line {:?}", truncate(line, 60))),
        },
    }
}

fn is_tag(tag: &str) -> bool {
    tag.starts_with(|c: char| c.is_ascii_alphabetic())
        && tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn truncate(line: &str, max: usize) -> &str {
    match line.char_indices().nth(max) {
        Some((idx, _)) => &line[..idx],
        None => line,
    }
}

#[async_trait]
impl OntologyAdapter for RunoakAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn load(&self, path: &Path) -> Result<LoadedOntology, LoadError> {
        let mut file = match tokio::fs::File::open(path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(LoadError::MissingFile(path.to_path_buf()));
            }
            Err(e) => return Err(LoadError::Engine(format!("cannot open {}: {e}", path.display()))),
        };

        let mut buf = vec![0u8; SNIFF_BYTES];
        let read = file
            .read(&mut buf)
            .await
            .map_err(|e| LoadError::Engine(format!("cannot read {}: {e}", path.display())))?;
        let head = String::from_utf8_lossy(&buf[..read]);
        sniff_obo(&head).map_err(|reason| LoadError::Format {
            path: path.to_path_buf(),
            reason,
        })?;

        Ok(LoadedOntology {
            path: path.to_path_buf(),
            selector: format!("{SCHEME}:{}", path.display()),
        })
    }

    #[instrument(skip(self, old, new), fields(old = %old.path.display(), new = %new.path.display()))]
    async fn diff(
        &self,
        old: &LoadedOntology,
        new: &LoadedOntology,
    ) -> Result<Vec<Change>, LoadError> {
        let output = Command::new(&self.program)
            .args([
                "-i",
                old.selector.as_str(),
                "diff",
                "-X",
                new.selector.as_str(),
                "--output-type",
                "kgcl",
            ])
            .output()
            .await
            .map_err(|source| LoadError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // parser errors surface as ValueError from the engine
            if stderr.contains("ValueError") {
                return Err(LoadError::Format {
                    path: new.path.clone(),
                    reason: stderr.trim().lines().last().unwrap_or_default().to_string(),
                });
            }
            return Err(LoadError::Engine(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let changes: Vec<Change> = stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| Change(line.to_string()))
            .collect();
        debug!(changes = changes.len(), "diff complete");
        Ok(changes)
    }
}
