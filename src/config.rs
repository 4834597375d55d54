use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Default config file looked up in the current directory.
pub const CONFIG_FILE_NAME: &str = ".ontodiff-curator.toml";

/// Repository → ontology resource file tracked for diffing.
const BUILTIN_RESOURCES: &[(&str, &str)] = &[
    ("monarch-initiative/mondo", "mondo-edit.obo"),
    ("pato-ontology/pato", "pato-edit.obo"),
    ("EnvironmentOntology/envo", "envo-edit.owl"),
    ("obophenotype/uberon", "uberon-edit.obo"),
    ("obophenotype/cell-ontology", "cl-edit.owl"),
    ("geneontology/go-ontology", "go-edit.obo"),
];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .ontodiff-curator.toml.
///
/// All sections are optional; the tool works with zero config.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,

    /// Extra repository → resource filename entries. Override the built-in table.
    #[serde(default)]
    pub resources: BTreeMap<String, String>,

    #[serde(default)]
    pub pacing: PacingConfig,

    #[serde(default)]
    pub fetch: FetchConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub tools: ToolsConfig,

    #[serde(default)]
    pub analyze: AnalyzeConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token. If None, falls back to GITHUB_TOKEN env var.
    pub token: Option<String>,
    pub api_url: String,
    /// Host serving raw file revisions.
    pub raw_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: "https://api.github.com".to_string(),
            raw_url: "https://github.com".to_string(),
        }
    }
}

/// Rate-limit pacing knobs consumed by the governor.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Below this many remaining calls, wait for the quota reset.
    pub low_water_mark: u64,
    pub reset_buffer_secs: u64,
    /// Fixed pause between calls while quota is healthy.
    pub interval_ms: u64,
    /// Pause after the forge reports quota exhaustion anyway.
    pub cooldown_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            low_water_mark: 10,
            reset_buffer_secs: 10,
            interval_ms: 720,
            cooldown_secs: 60,
        }
    }
}

impl PacingConfig {
    pub fn reset_buffer(&self) -> Duration {
        Duration::from_secs(self.reset_buffer_secs)
    }

    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    pub timeout_secs: u64,
    pub retry_delay_secs: u64,
    /// Attempts per download before giving up on timeouts. Unset retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 10,
            retry_delay_secs: 300,
            max_attempts: None,
        }
    }
}

impl FetchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub max_entries: usize,
    /// Responses larger than this are never cached (raw ontology files are huge).
    pub max_body_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 512,
            max_body_bytes: 1024 * 1024,
        }
    }
}

/// External programs the analyze stage shells out to.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub robot: String,
    pub runoak: String,
    /// XML catalog handed to robot, if any.
    pub catalog: Option<PathBuf>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            robot: "robot".to_string(),
            runoak: "runoak".to_string(),
            catalog: None,
        }
    }
}

/// Which changed-file entry of a PR gets diffed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileSelection {
    /// Use the first matching entry, warning when there are several.
    #[default]
    FirstMatch,
    /// Skip PRs touching more than one matching file.
    ExactlyOne,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AnalyzeConfig {
    pub file_selection: FileSelection,
    /// Write records whose diff produced no change operations.
    pub write_empty: bool,
    /// Drop the stray `create None` line some diff engine versions emit.
    pub drop_junk_lines: bool,
}

impl Default for AnalyzeConfig {
    fn default() -> Self {
        Self {
            file_selection: FileSelection::FirstMatch,
            write_empty: false,
            drop_junk_lines: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Root under which per-repository store directories are created.
    pub data_dir: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// Load configuration from .ontodiff-curator.toml in the current directory.
    /// Returns default config if the file doesn't exist.
    pub fn load() -> Result<Config, ConfigError> {
        let path = Path::new(CONFIG_FILE_NAME);
        let mut config = if path.exists() {
            Self::load_from(path)?
        } else {
            Config::default()
        };

        if config.github.token.is_none() {
            if let Ok(token) = std::env::var("GITHUB_TOKEN") {
                config.github.token = Some(token);
            }
        }

        Ok(config)
    }

    /// Load from a specific path.
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: explicit override, then config file value,
    /// then GITHUB_TOKEN env var. Empty strings count as unset.
    pub fn github_token(&self, cli_token: Option<&str>) -> Option<String> {
        cli_token
            .map(str::to_string)
            .or_else(|| self.github.token.clone())
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|token| !token.trim().is_empty())
    }

    /// Resource filename tracked for `repo` (`org/name`), if the repository is known.
    pub fn resource_for(&self, repo: &str) -> Option<String> {
        if let Some(file) = self.resources.get(repo) {
            return Some(file.clone());
        }
        BUILTIN_RESOURCES
            .iter()
            .find(|(name, _)| *name == repo)
            .map(|(_, file)| file.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.pacing.low_water_mark, 10);
        assert_eq!(config.pacing.interval(), Duration::from_millis(720));
        assert_eq!(config.fetch.timeout(), Duration::from_secs(10));
        assert_eq!(config.fetch.retry_delay(), Duration::from_secs(300));
        assert!(config.fetch.max_attempts.is_none());
        assert_eq!(config.analyze.file_selection, FileSelection::FirstMatch);
        assert!(!config.analyze.write_empty);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[resources]
"obophenotype/hp" = "hp-edit.owl"

[pacing]
interval_ms = 0
cooldown_secs = 5

[fetch]
max_attempts = 3

[analyze]
file_selection = "exactly-one"
write_empty = true
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.resource_for("obophenotype/hp").as_deref(), Some("hp-edit.owl"));
        assert_eq!(config.pacing.interval(), Duration::ZERO);
        assert_eq!(config.pacing.cooldown(), Duration::from_secs(5));
        // untouched keys in a present section keep their defaults
        assert_eq!(config.pacing.low_water_mark, 10);
        assert_eq!(config.fetch.max_attempts, Some(3));
        assert_eq!(config.analyze.file_selection, FileSelection::ExactlyOne);
        assert!(config.analyze.write_empty);
        assert!(config.analyze.drop_junk_lines);
    }

    #[test]
    fn test_builtin_resource_table() {
        let config = Config::default();
        assert_eq!(
            config.resource_for("geneontology/go-ontology").as_deref(),
            Some("go-edit.obo")
        );
        assert_eq!(
            config.resource_for("obophenotype/cell-ontology").as_deref(),
            Some("cl-edit.owl")
        );
        assert!(config.resource_for("someone/unknown").is_none());
    }

    #[test]
    fn test_resource_override_wins() {
        let mut config = Config::default();
        config
            .resources
            .insert("pato-ontology/pato".to_string(), "pato-edit.owl".to_string());
        assert_eq!(config.resource_for("pato-ontology/pato").as_deref(), Some("pato-edit.owl"));
    }

    #[test]
    fn test_cli_token_takes_precedence() {
        let mut config = Config::default();
        config.github.token = Some("from-file".to_string());
        assert_eq!(config.github_token(Some("from-cli")).as_deref(), Some("from-cli"));
        assert_eq!(config.github_token(None).as_deref(), Some("from-file"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&path, "[paths]\ndata_dir = \"/srv/curation\"\n").unwrap();
        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.paths.data_dir, PathBuf::from("/srv/curation"));
    }
}
