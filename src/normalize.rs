use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Lines starting with this are cross-file import declarations.
const IMPORT_KEYWORD: &str = "Import";
/// Diagnostic robot prints for structurally broken input.
const INVALID_MARKER: &str = "INVALID ONTOLOGY FILE ERROR";
const TARGET_EXTENSION: &str = "obo";

#[derive(Debug, Error)]
pub enum NormalizeError {
    #[error("failed to strip imports from {path}: {source}")]
    Strip {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {output}")]
    ToolFailed {
        program: String,
        status: String,
        output: String,
    },
}

impl NormalizeError {
    /// Failure confined to the revision file itself rather than the tooling.
    pub fn is_data_error(&self) -> bool {
        matches!(self, NormalizeError::Strip { .. })
    }
}

/// Result of converting one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// Converted file, a sibling of the input with the `.obo` extension.
    Converted(PathBuf),
    /// The conversion tool rejected the input as an invalid ontology.
    Invalid,
}

/// Converts legacy OWL revisions to OBO with robot.
pub struct FormatNormalizer {
    program: String,
    catalog: Option<PathBuf>,
}

impl FormatNormalizer {
    pub fn new(program: impl Into<String>, catalog: Option<PathBuf>) -> Self {
        Self {
            program: program.into(),
            catalog,
        }
    }

    /// Strip imports in place, then convert.
    ///
    /// An invalid input yields `Normalized::Invalid`; any other tool failure
    /// is an error, since it means the tool or its environment is broken.
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn normalize(&self, path: &Path) -> Result<Normalized, NormalizeError> {
        let removed = strip_imports(path).await?;
        debug!(removed, "stripped import declarations");

        let target = path.with_extension(TARGET_EXTENSION);
        let output = Command::new(&self.program)
            .args(self.arguments(path, &target))
            .output()
            .await
            .map_err(|source| NormalizeError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        let combined = format!(
            "{}{}",
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        );
        if output.status.success() {
            info!(target = %target.display(), "converted to obo");
            return Ok(Normalized::Converted(target));
        }
        if combined.contains(INVALID_MARKER) {
            info!("conversion rejected the file as invalid");
            return Ok(Normalized::Invalid);
        }
        Err(NormalizeError::ToolFailed {
            program: self.program.clone(),
            status: output.status.to_string(),
            output: combined.trim().to_string(),
        })
    }

    /// `robot remove --select imports ... convert --check false -o <target>`
    fn arguments(&self, input: &Path, target: &Path) -> Vec<String> {
        let mut args = vec!["remove".to_string()];
        if let Some(catalog) = &self.catalog {
            args.push("--catalog".to_string());
            args.push(catalog.display().to_string());
        }
        args.push("-i".to_string());
        args.push(input.display().to_string());
        args.extend(
            ["--select", "imports", "--trim", "false", "convert", "--check", "false", "-o"]
                .map(String::from),
        );
        args.push(target.display().to_string());
        args
    }
}

/// Drop every line beginning with the import keyword. Returns how many were removed.
pub async fn strip_imports(path: &Path) -> Result<usize, NormalizeError> {
    let strip_err = |source| NormalizeError::Strip {
        path: path.display().to_string(),
        source,
    };
    // bytes, not text: revisions are not guaranteed to be UTF-8
    let content = tokio::fs::read(path).await.map_err(strip_err)?;

    let mut removed = 0;
    let mut kept = Vec::with_capacity(content.len());
    for line in content.split_inclusive(|b| *b == b'\n') {
        if line.starts_with(IMPORT_KEYWORD.as_bytes()) {
            removed += 1;
        } else {
            kept.extend_from_slice(line);
        }
    }

    if removed > 0 {
        tokio::fs::write(path, kept).await.map_err(strip_err)?;
    }
    Ok(removed)
}
