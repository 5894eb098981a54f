//! Runtime configuration, loaded from an optional TOML file.
//!
//! Every field has a default so an empty file (or no file) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SeoMetaError};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub migration: MigrationConfig,
    pub worker: WorkerConfig,
    pub import: ImportConfig,
}

/// Background migration settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub batch_min: u32,
    pub batch_max: u32,
    pub batch_default: u32,
    /// Delay before the next batch may fire. Fixed, not scaled by batch size.
    pub reschedule_delay_secs: u64,
    pub post_types: Vec<String>,
    pub post_status: String,
    /// Compare-and-swap attempts before a state write gives up.
    pub commit_attempts: u32,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_min: 50,
            batch_max: 2000,
            batch_default: 200,
            reschedule_delay_secs: 5,
            post_types: vec!["post".to_string(), "page".to_string()],
            post_status: "publish".to_string(),
            commit_attempts: 5,
        }
    }
}

impl MigrationConfig {
    /// Clamp an operator-chosen batch size into the configured range.
    pub fn clamp_batch_size(&self, requested: u32) -> u32 {
        requested.clamp(self.batch_min, self.batch_max)
    }

    pub fn reschedule_delay(&self) -> Duration {
        Duration::from_secs(self.reschedule_delay_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// How often the worker looks for due batch events.
    pub poll_interval_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

impl WorkerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

/// One-time (foreground) import settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    pub page_size: usize,
    /// Upper bound on per-post lines kept in a head/footer dry-run report.
    pub report_limit: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            report_limit: 200,
        }
    }
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| SeoMetaError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<()> {
        let m = &self.migration;
        if m.batch_min == 0 || m.batch_min > m.batch_max {
            return Err(SeoMetaError::Config(format!(
                "batch range {}..={} is empty or starts at zero",
                m.batch_min, m.batch_max
            )));
        }
        if m.post_types.is_empty() {
            return Err(SeoMetaError::Config("post_types must not be empty".to_string()));
        }
        if m.commit_attempts == 0 {
            return Err(SeoMetaError::Config("commit_attempts must be at least 1".to_string()));
        }
        if self.import.page_size == 0 {
            return Err(SeoMetaError::Config("import.page_size must be at least 1".to_string()));
        }
        Ok(())
    }
}
