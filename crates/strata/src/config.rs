//! Configuration for ingestion, mirroring and the catalog.

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::classify::{TestTypeClassifier, TestTypeRule};
use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Stand name used when no path segment matches a configured prefix.
pub const UNKNOWN_TEST_STAND: &str = "unknown_test_stand";

/// Main configuration for Strata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrataConfig {
    /// Path to the SQLite catalog
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Root of the Bronze tier (`<root>/<stand>/<stem>.parquet`)
    #[serde(default = "default_bronze_root")]
    pub bronze_root: PathBuf,

    /// Root of the Silver tier (`<root>/<stand>/<serial>.parquet`)
    #[serde(default = "default_silver_root")]
    pub silver_root: PathBuf,

    /// Staging tree fed by the mirror watcher (`<root>/<stand>/<serial>/*.csv`)
    #[serde(default = "default_staging_root")]
    pub staging_root: PathBuf,

    /// Distinct serial labels kept in the Bronze-path cache
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    #[serde(default)]
    pub mirror: MirrorConfig,

    /// Per-stand source trees for batch ingestion
    #[serde(default)]
    pub stands: Vec<StandSource>,

    /// Filename pattern → test type rules, first match wins
    #[serde(default)]
    pub test_types: Vec<TestTypeRule>,
}

/// Mirror watcher settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    /// Source trees to watch recursively
    #[serde(default)]
    pub sources: Vec<PathBuf>,

    /// Destination tree; defaults to the staging root
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// A path segment starting with one of these names the test stand
    #[serde(default)]
    pub stand_prefixes: Vec<String>,

    /// Copy attempts while the source file is locked by its writer
    #[serde(default = "default_copy_attempts")]
    pub copy_attempts: u32,

    #[serde(default = "default_copy_backoff_ms")]
    pub copy_backoff_ms: u64,

    /// How often the watch loop checks for shutdown
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// A test stand and the directory holding its per-serial subdirectories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandSource {
    pub name: String,
    pub path: PathBuf,
}

fn default_database_path() -> PathBuf {
    strata_logging::strata_home().join("catalog.sqlite3")
}

fn default_bronze_root() -> PathBuf {
    strata_logging::strata_home().join("bronze")
}

fn default_silver_root() -> PathBuf {
    strata_logging::strata_home().join("silver")
}

fn default_staging_root() -> PathBuf {
    strata_logging::strata_home().join("staging")
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_copy_attempts() -> u32 {
    5
}

fn default_copy_backoff_ms() -> u64 {
    200
}

fn default_poll_interval_ms() -> u64 {
    250
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            sources: Vec::new(),
            destination: None,
            stand_prefixes: Vec::new(),
            copy_attempts: default_copy_attempts(),
            copy_backoff_ms: default_copy_backoff_ms(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl MirrorConfig {
    pub fn copy_backoff(&self) -> Duration {
        Duration::from_millis(self.copy_backoff_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for StrataConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bronze_root: default_bronze_root(),
            silver_root: default_silver_root(),
            staging_root: default_staging_root(),
            cache_capacity: default_cache_capacity(),
            mirror: MirrorConfig::default(),
            stands: Vec::new(),
            test_types: Vec::new(),
        }
    }
}

impl StrataConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: StrataConfig =
            toml::from_str(&content).map_err(|e| StrataError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| StrataError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Destination tree for the mirror watcher.
    pub fn mirror_destination(&self) -> &Path {
        self.mirror
            .destination
            .as_deref()
            .unwrap_or(self.staging_root.as_path())
    }

    /// Check the configuration and compile the test-type rules.
    ///
    /// Run once at startup so a bad pattern stops the process before any
    /// file is converted.
    pub fn validate(&self) -> Result<TestTypeClassifier> {
        if self.cache_capacity == 0 {
            return Err(StrataError::Config(
                "cache_capacity must be at least 1".to_string(),
            ));
        }
        if self.mirror.copy_attempts == 0 {
            return Err(StrataError::Config(
                "mirror.copy_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(prefix) = self.mirror.stand_prefixes.iter().find(|p| p.trim().is_empty()) {
            return Err(StrataError::Config(format!(
                "mirror.stand_prefixes contains an empty prefix: {:?}",
                prefix
            )));
        }

        let mut seen = std::collections::HashSet::new();
        for stand in &self.stands {
            if stand.name.trim().is_empty() {
                return Err(StrataError::Config(format!(
                    "stand at {} has an empty name",
                    stand.path.display()
                )));
            }
            if !seen.insert(stand.name.as_str()) {
                return Err(StrataError::Config(format!(
                    "stand '{}' is configured twice",
                    stand.name
                )));
            }
        }

        TestTypeClassifier::new(&self.test_types)
    }
}
