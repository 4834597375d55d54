pub mod runoak;

pub use runoak::RunoakAdapter;

use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("unreadable ontology content in {path}: {reason}")]
    Format { path: PathBuf, reason: String },

    #[error("ontology file not found: {0}")]
    MissingFile(PathBuf),

    #[error("ontology engine failed: {0}")]
    Engine(String),

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

impl LoadError {
    /// Bad or missing data for one record, as opposed to a broken environment.
    pub fn is_data_error(&self) -> bool {
        matches!(self, LoadError::Format { .. } | LoadError::MissingFile(_))
    }
}

/// On-disk serialization of a resource file, judged by extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Serialization {
    /// Simplified line-oriented format the loader reads directly.
    Obo,
    /// Legacy format that must be converted before loading.
    Owl,
}

impl Serialization {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "obo" => Some(Serialization::Obo),
            "owl" | "ofn" => Some(Serialization::Owl),
            _ => None,
        }
    }

    pub fn needs_conversion(&self) -> bool {
        matches!(self, Serialization::Owl)
    }
}

/// A revision accepted by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedOntology {
    pub path: PathBuf,
    /// Loader input selector, e.g. `simpleobo:tmp/new.obo`.
    pub selector: String,
}

/// One atomic edit, in the diff engine's textual change language.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change(pub String);

impl std::fmt::Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Loads revisions and computes change scripts between them.
#[async_trait]
pub trait OntologyAdapter: Send + Sync {
    async fn load(&self, path: &Path) -> Result<LoadedOntology, LoadError>;

    /// Changes turning `old` into `new`, in engine emission order.
    async fn diff(
        &self,
        old: &LoadedOntology,
        new: &LoadedOntology,
    ) -> Result<Vec<Change>, LoadError>;
}

/// Writes a change script as one line per change.
pub struct ChangeScriptWriter<W: Write> {
    out: W,
    written: usize,
}

impl<W: Write> ChangeScriptWriter<W> {
    pub fn new(out: W) -> Self {
        Self { out, written: 0 }
    }

    /// Emit one change. Embedded line breaks are folded to spaces so the
    /// record stays on a single line.
    pub fn emit(&mut self, change: &Change) -> std::io::Result<()> {
        let line = change.0.trim_end_matches(&['\r', '\n'][..]);
        if line.contains(&['\r', '\n'][..]) {
            let folded: String = line
                .chars()
                .map(|c| if c == '\n' || c == '\r' { ' ' } else { c })
                .collect();
            writeln!(self.out, "{folded}")?;
        } else {
            writeln!(self.out, "{line}")?;
        }
        self.written += 1;
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
