//! Configuration for the safe writer: per-save options, backup retention and
//! the table of named pipeline artifacts.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::payload::DataKind;
use crate::{Result, StoreError};

/// Default fraction of the previous snapshot's length below which a new
/// sequence triggers a quality warning.
pub const DEFAULT_QUALITY_RATIO: f64 = 0.5;

/// Default JSON indentation width of written snapshots.
pub const DEFAULT_INDENT: usize = 4;

/// Default name of the backup directory created next to each snapshot.
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Options for a single save.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SaveOptions {
    /// Minimum number of records a sequence payload must hold
    pub min_items: Option<usize>,
    /// Copy the previous snapshot into the backup directory before overwriting
    pub backup: bool,
    /// Skip emptiness, volume and structural checks
    pub force: bool,
}

impl SaveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_min_items(mut self, min_items: usize) -> Self {
        self.min_items = Some(min_items);
        self
    }

    pub fn with_backup(mut self, backup: bool) -> Self {
        self.backup = backup;
        self
    }

    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

impl Default for SaveOptions {
    fn default() -> Self {
        Self {
            min_items: None,
            backup: true,
            force: false,
        }
    }
}

/// How many backups of a snapshot to keep.
///
/// The default keeps every backup forever.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetentionPolicy {
    /// Keep at most this many backups per snapshot (newest first)
    pub max_count: Option<usize>,
    /// Drop backups older than this many days
    pub max_age_days: Option<u32>,
}

impl RetentionPolicy {
    pub fn unbounded() -> Self {
        Self::default()
    }

    pub fn keep_last(max_count: usize) -> Self {
        Self {
            max_count: Some(max_count),
            max_age_days: None,
        }
    }

    pub fn with_max_age_days(mut self, days: u32) -> Self {
        self.max_age_days = Some(days);
        self
    }

    pub fn is_unbounded(&self) -> bool {
        self.max_count.is_none() && self.max_age_days.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_count == Some(0) {
            return Err(StoreError::config(
                "retention max_count must be at least 1",
            ));
        }
        Ok(())
    }
}

/// A named output artifact of the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactProfile {
    /// Name producers refer to the artifact by
    pub name: String,
    /// Snapshot path, relative to the store's base directory
    pub path: PathBuf,
    /// Structural validator to apply
    pub kind: DataKind,
    /// Minimum number of records, if any
    #[serde(default)]
    pub min_items: Option<usize>,
}

impl ArtifactProfile {
    pub fn new(
        name: impl Into<String>,
        path: impl Into<PathBuf>,
        kind: DataKind,
        min_items: Option<usize>,
    ) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            kind,
            min_items,
        }
    }

    /// Save options implied by this profile
    pub fn save_options(&self) -> SaveOptions {
        SaveOptions {
            min_items: self.min_items,
            ..SaveOptions::default()
        }
    }
}

/// Configuration structure for the safe store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Base directory relative snapshot paths are resolved against
    pub base_dir: Option<PathBuf>,
    /// Name of the backup directory next to each snapshot
    pub backup_dir_name: String,
    /// Fraction of the previous length below which a quality warning is logged
    pub quality_ratio: f64,
    /// Indentation width of written JSON
    pub indent: usize,
    /// Backup retention applied after every backup
    pub retention: RetentionPolicy,
    /// Named artifacts
    pub artifacts: Vec<ArtifactProfile>,
}

impl StoreConfig {
    /// Load a configuration from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| {
            StoreError::config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        let config: StoreConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// The output table of the scraping pipeline with its minimum counts
    pub fn pipeline_defaults() -> Self {
        Self {
            base_dir: Some(PathBuf::from("public")),
            artifacts: vec![
                ArtifactProfile::new("vuelos_aena", "vuelos.json", DataKind::Flights, Some(10)),
                ArtifactProfile::new(
                    "trenes_sants",
                    "trenes_sants.json",
                    DataKind::Trains,
                    Some(5),
                ),
                ArtifactProfile::new("cruceros", "cruceros.json", DataKind::Cruises, Some(0)),
                ArtifactProfile::new(
                    "licencias_raw",
                    "../licencias_totales.json",
                    DataKind::Licenses,
                    Some(3),
                ),
                ArtifactProfile::new(
                    "licencias_web_feed",
                    "web_feed.json",
                    DataKind::WebFeed,
                    None,
                ),
                ArtifactProfile::new("data_api", "data.json", DataKind::Generic, None),
            ],
            ..Self::default()
        }
    }

    /// Look up a named artifact
    pub fn artifact(&self, name: &str) -> Option<&ArtifactProfile> {
        self.artifacts.iter().find(|artifact| artifact.name == name)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if !(self.quality_ratio > 0.0 && self.quality_ratio <= 1.0) {
            return Err(StoreError::config(format!(
                "quality_ratio must be in (0, 1], got {}",
                self.quality_ratio
            )));
        }
        if self.indent > 16 {
            return Err(StoreError::config(format!(
                "indent must be at most 16, got {}",
                self.indent
            )));
        }
        if self.backup_dir_name.is_empty()
            || self.backup_dir_name.contains(['/', '\\'])
            || self.backup_dir_name == ".."
        {
            return Err(StoreError::config(format!(
                "backup_dir_name must be a plain directory name, got '{}'",
                self.backup_dir_name
            )));
        }
        self.retention.validate()?;

        let mut seen = HashSet::new();
        for artifact in &self.artifacts {
            if !seen.insert(artifact.name.as_str()) {
                return Err(StoreError::config(format!(
                    "duplicate artifact name '{}'",
                    artifact.name
                )));
            }
        }
        Ok(())
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            backup_dir_name: DEFAULT_BACKUP_DIR.to_string(),
            quality_ratio: DEFAULT_QUALITY_RATIO,
            indent: DEFAULT_INDENT,
            retention: RetentionPolicy::default(),
            artifacts: Vec::new(),
        }
    }
}
