pub mod types;

pub use types::{
    parse_record_key, record_key, AnalyzedRecord, ChangedFileRef, IssueRecord, PullRequestRecord,
    RunMetadata, METADATA_KEY,
};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store {path} is not valid YAML: {source}")]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("store {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },

    #[error("failed to encode entry {key}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Append-only YAML document store.
///
/// Every append writes one `---` document holding a single-key mapping, so
/// the file can be extended without rewriting earlier entries. Readers accept
/// that form as well as a single aggregate mapping.
#[derive(Debug)]
pub struct YamlStore {
    path: PathBuf,
}

impl YamlStore {
    /// Open `path` for appending, creating parent directories.
    /// With `overwrite`, any existing file is removed first.
    pub fn create(path: &Path, overwrite: bool) -> Result<Self, StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        if overwrite && path.exists() {
            debug!(path = %path.display(), "truncating existing store");
            std::fs::remove_file(path).map_err(io_err)?;
        }
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether nothing has been written to the store yet.
    pub fn is_empty(&self) -> bool {
        std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true)
    }

    /// Serialize `value` under `key` and append it as one document.
    /// The document is fully encoded before the file is touched.
    pub fn append<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let mut entry = serde_yaml::Mapping::new();
        let encoded = serde_yaml::to_value(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        entry.insert(serde_yaml::Value::String(key.to_string()), encoded);
        let body = serde_yaml::to_string(&entry).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        let document = format!("---\n{body}");

        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(io_err)?;
        file.write_all(document.as_bytes()).map_err(io_err)?;
        file.sync_data().map_err(io_err)?;
        Ok(())
    }

    pub fn append_record(&self, record: &PullRequestRecord) -> Result<(), StoreError> {
        self.append(&record_key(record.number), record)
    }

    pub fn append_analyzed(&self, record: &AnalyzedRecord) -> Result<(), StoreError> {
        self.append(&record_key(record.number), record)
    }

    pub fn write_metadata(&self, metadata: &RunMetadata) -> Result<(), StoreError> {
        self.append(METADATA_KEY, metadata)
    }
}

/// All `(key, value)` entries in file order. Later duplicates of a key are dropped.
pub fn read_entries(path: &Path) -> Result<Vec<(String, serde_yaml::Value)>, StoreError> {
    let text = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut seen = HashSet::new();
    let mut entries = Vec::new();
    for document in serde_yaml::Deserializer::from_str(&text) {
        let value = serde_yaml::Value::deserialize(document).map_err(|source| StoreError::Yaml {
            path: path.to_path_buf(),
            source,
        })?;
        let mapping = match value {
            serde_yaml::Value::Null => continue,
            serde_yaml::Value::Mapping(mapping) => mapping,
            other => {
                return Err(StoreError::Malformed {
                    path: path.to_path_buf(),
                    reason: format!("expected a mapping document, found {other:?}"),
                })
            }
        };
        for (key, value) in mapping {
            let key = match key {
                serde_yaml::Value::String(key) => key,
                other => {
                    return Err(StoreError::Malformed {
                        path: path.to_path_buf(),
                        reason: format!("non-string key {other:?}"),
                    })
                }
            };
            if !seen.insert(key.clone()) {
                warn!(path = %path.display(), key = %key, "duplicate store entry ignored");
                continue;
            }
            entries.push((key, value));
        }
    }
    Ok(entries)
}

fn read_records<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, StoreError> {
    read_entries(path)?
        .into_iter()
        .filter(|(key, _)| parse_record_key(key).is_some())
        .map(|(key, value)| {
            serde_yaml::from_value(value).map_err(|e| StoreError::Malformed {
                path: path.to_path_buf(),
                reason: format!("{key}: {e}"),
            })
        })
        .collect()
}

/// Harvested records in store order.
pub fn read_pull_requests(path: &Path) -> Result<Vec<PullRequestRecord>, StoreError> {
    read_records(path)
}

/// Analyzed records in store order. Metadata entries are skipped.
pub fn read_analyzed(path: &Path) -> Result<Vec<AnalyzedRecord>, StoreError> {
    read_records(path)
}

/// Run metadata heading a final store, if present.
pub fn read_metadata(path: &Path) -> Result<Option<RunMetadata>, StoreError> {
    read_entries(path)?
        .into_iter()
        .find(|(key, _)| key == METADATA_KEY)
        .map(|(_, value)| {
            serde_yaml::from_value(value).map_err(|e| StoreError::Malformed {
                path: path.to_path_buf(),
                reason: format!("{METADATA_KEY}: {e}"),
            })
        })
        .transpose()
}

/// PR numbers with an entry in the store. A missing store holds none.
pub fn record_numbers(path: &Path) -> Result<BTreeSet<u64>, StoreError> {
    if !path.exists() {
        return Ok(BTreeSet::new());
    }
    Ok(read_entries(path)?
        .iter()
        .filter_map(|(key, _)| parse_record_key(key))
        .collect())
}
