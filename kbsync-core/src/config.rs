//! Sync configuration.
//!
//! Loaded from a YAML file:
//!
//! ```text
//! protectedFields: published.alternatives,draft.alternatives
//! compareMode: MODIFICATION_DATE
//! externalIdPrefix: zd-
//! allowPruneAllEntities: "false"
//! nameConflictSuffix: " (imported)"
//! killAfterLongRunningSeconds: 3600
//! source:
//!   type: local
//!   path: ./export
//! destination:
//!   type: local
//!   path: ./kb
//! ```
//!
//! String-typed flags and comma-separated lists are accepted alongside their
//! native YAML forms.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;
use crate::types::CompareMode;

/// Default number of items per page for paged sources.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Adapter section of the config (`source:` / `destination:`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum AdapterConfig {
    /// JSON files on the local filesystem.
    Local { path: PathBuf },
}

/// Everything the engine needs to know about one source/destination pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    /// Dot-paths whose stored value survives an update.
    #[serde(default, deserialize_with = "de_field_list")]
    pub protected_fields: Vec<String>,
    #[serde(default)]
    pub compare_mode: CompareMode,
    #[serde(default)]
    pub external_id_prefix: Option<String>,
    /// Same-source marker stamped on collected items.
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default, deserialize_with = "de_flag")]
    pub allow_prune_all_entities: bool,
    #[serde(default)]
    pub name_conflict_suffix: Option<String>,
    #[serde(default)]
    pub kill_after_long_running_seconds: Option<u64>,
    /// Checkpoint file; defaults to `~/.kbsync/context.json`.
    #[serde(default)]
    pub context_path: Option<PathBuf>,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default)]
    pub source: Option<AdapterConfig>,
    #[serde(default)]
    pub destination: Option<AdapterConfig>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            protected_fields: Vec::new(),
            compare_mode: CompareMode::default(),
            external_id_prefix: None,
            source_id: None,
            allow_prune_all_entities: false,
            name_conflict_suffix: None,
            kill_after_long_running_seconds: None,
            context_path: None,
            page_size: DEFAULT_PAGE_SIZE,
            source: None,
            destination: None,
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FieldListCompat {
    List(Vec<String>),
    Csv(String),
}

fn de_field_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<FieldListCompat>::deserialize(deserializer)?;
    Ok(match raw {
        None => Vec::new(),
        Some(FieldListCompat::List(items)) => items,
        Some(FieldListCompat::Csv(csv)) => parse_field_list(&csv),
    })
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FlagCompat {
    Bool(bool),
    Text(String),
}

fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<FlagCompat>::deserialize(deserializer)? {
        None => Ok(false),
        Some(FlagCompat::Bool(flag)) => Ok(flag),
        Some(FlagCompat::Text(text)) => Ok(text.trim().eq_ignore_ascii_case("true")),
    }
}

/// Split a comma-separated dot-path list, dropping blank entries.
pub fn parse_field_list(csv: &str) -> Vec<String> {
    csv.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

impl SyncConfig {
    /// Parse a config document. Blank optional strings are treated as unset.
    pub fn from_yaml_str(yaml: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: SyncConfig = serde_yaml::from_str(yaml).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        Ok(config.normalized())
    }

    /// Load the config file at `path`.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        Self::from_yaml_str(&contents, path)
    }

    fn normalized(mut self) -> Self {
        for value in [
            &mut self.external_id_prefix,
            &mut self.source_id,
            &mut self.name_conflict_suffix,
        ] {
            if value.as_deref().is_some_and(|v| v.is_empty()) {
                *value = None;
            }
        }
        if self.page_size == 0 {
            self.page_size = DEFAULT_PAGE_SIZE;
        }
        self
    }

    /// Check that the values a run cannot start without are present.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source.is_none() {
            return Err(ConfigError::Invalid("missing `source` section".to_string()));
        }
        if self.destination.is_none() {
            return Err(ConfigError::Invalid(
                "missing `destination` section".to_string(),
            ));
        }
        for path in &self.protected_fields {
            if path.split('.').any(|segment| segment.trim().is_empty()) {
                return Err(ConfigError::Invalid(format!(
                    "protected field '{path}' has an empty path segment"
                )));
            }
        }
        Ok(())
    }

    /// Kill-timer duration, if configured.
    pub fn kill_after(&self) -> Option<Duration> {
        self.kill_after_long_running_seconds
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
    }

    /// Checkpoint path, explicit or `<home>/.kbsync/context.json`.
    pub fn context_path_at(&self, home: &Path) -> PathBuf {
        self.context_path
            .clone()
            .unwrap_or_else(|| home.join(".kbsync").join("context.json"))
    }

    /// `context_path_at` convenience wrapper using `dirs::home_dir()`.
    pub fn context_path(&self) -> Result<PathBuf, ConfigError> {
        let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
        Ok(self.context_path_at(&home))
    }
}
