//! Configuration for the persistence engine

use crate::error::{PersistenceError, Result};
use crate::{
    BACKUPS_DIR_NAME, BACKUP_SUFFIX, DEFAULT_BACKUP_INTERVAL_HOURS, DEFAULT_MAX_ATTEMPTS,
    DEFAULT_MAX_BACKUPS, DEFAULT_RETRY_BASE_DELAY_MS, ROLLING_BACKUP_MARKER, TEMP_SUFFIX,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

const MAX_INTERVAL_HOURS: u64 = 100 * 366 * 24;

/// Configuration for a single persisted file and its backups
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceConfig {
    /// Directory holding the primary file, its `.bak` and the `Backups/` directory
    pub base_dir: PathBuf,

    /// File name of the primary file (no path separators)
    pub file_name: String,

    /// Maximum number of rolling backups to keep
    pub max_backups: usize,

    /// Minimum hours between two rolling backups (0 = every save)
    pub backup_interval_hours: u64,

    /// Retry policy for individual file operations
    pub retry: RetryConfig,
}

/// Retry policy for transient I/O contention
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per operation, including the first one
    pub max_attempts: u32,

    /// Backoff unit; attempt `n` waits `base_delay_ms * n` before retrying
    pub base_delay_ms: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data"),
            file_name: "save.json".to_string(),
            max_backups: DEFAULT_MAX_BACKUPS,
            backup_interval_hours: DEFAULT_BACKUP_INTERVAL_HOURS,
            retry: RetryConfig::default(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self { max_attempts: DEFAULT_MAX_ATTEMPTS, base_delay_ms: DEFAULT_RETRY_BASE_DELAY_MS }
    }
}

impl RetryConfig {
    /// Delay to wait after the given failed attempt (1-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.base_delay_ms.saturating_mul(u64::from(attempt)))
    }
}

/// Environment overrides, read through the `config` crate
#[derive(Debug, Deserialize)]
struct EnvOverrides {
    max_backups: Option<usize>,
    backup_interval_hours: Option<u64>,
    retry_max_attempts: Option<u32>,
    retry_base_delay_ms: Option<u64>,
}

impl PersistenceConfig {
    /// Create a new configuration for `file_name` inside `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Self {
        Self { base_dir: base_dir.into(), file_name: file_name.into(), ..Default::default() }
    }

    /// Builder-style override of the rolling backup retention
    pub fn with_max_backups(mut self, max_backups: usize) -> Self {
        self.max_backups = max_backups;
        self
    }

    /// Builder-style override of the rolling backup cadence
    pub fn with_backup_interval_hours(mut self, hours: u64) -> Self {
        self.backup_interval_hours = hours;
        self
    }

    /// Builder-style override of the retry policy
    pub fn with_retry(mut self, max_attempts: u32, base_delay_ms: u64) -> Self {
        self.retry = RetryConfig { max_attempts, base_delay_ms };
        self
    }

    /// Load a configuration, overlaying `PERSISTENCE_*` environment variables
    /// (`PERSISTENCE_MAX_BACKUPS`, `PERSISTENCE_BACKUP_INTERVAL_HOURS`,
    /// `PERSISTENCE_RETRY_MAX_ATTEMPTS`, `PERSISTENCE_RETRY_BASE_DELAY_MS`)
    pub fn from_env(base_dir: impl Into<PathBuf>, file_name: impl Into<String>) -> Result<Self> {
        let overrides: EnvOverrides = config::Config::builder()
            .add_source(config::Environment::with_prefix("PERSISTENCE").try_parsing(true))
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| PersistenceError::config(e.to_string()))?;

        let mut cfg = Self::new(base_dir, file_name);
        if let Some(max_backups) = overrides.max_backups {
            cfg.max_backups = max_backups;
        }
        if let Some(hours) = overrides.backup_interval_hours {
            cfg.backup_interval_hours = hours;
        }
        if let Some(attempts) = overrides.retry_max_attempts {
            cfg.retry.max_attempts = attempts;
        }
        if let Some(delay) = overrides.retry_base_delay_ms {
            cfg.retry.base_delay_ms = delay;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Primary file: `<base_dir>/<file_name>`
    pub fn primary_path(&self) -> PathBuf {
        self.base_dir.join(&self.file_name)
    }

    /// Last-known-good copy: `<base_dir>/<file_name>.bak`
    pub fn backup_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}{}", self.file_name, BACKUP_SUFFIX))
    }

    /// Staging file used during save: `<base_dir>/<file_name>.tmp`
    pub fn temp_path(&self) -> PathBuf {
        self.base_dir.join(format!("{}{}", self.file_name, TEMP_SUFFIX))
    }

    /// Rolling backup directory: `<base_dir>/Backups`
    pub fn backups_dir(&self) -> PathBuf {
        self.base_dir.join(BACKUPS_DIR_NAME)
    }

    /// File name prefix shared by every rolling backup of this file
    pub fn rolling_backup_prefix(&self) -> String {
        format!("{}{}", self.file_name, ROLLING_BACKUP_MARKER)
    }

    /// Minimum spacing between rolling backups
    pub fn backup_interval(&self) -> chrono::Duration {
        // chrono panics past ~2.5e12 hours; a century is already "never"
        chrono::Duration::hours(self.backup_interval_hours.min(MAX_INTERVAL_HOURS) as i64)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.file_name.trim().is_empty() {
            return Err(PersistenceError::config("file_name must not be empty"));
        }

        if matches!(self.file_name.as_str(), "." | "..") {
            return Err(PersistenceError::config(format!(
                "file_name must name a file: {}",
                self.file_name
            )));
        }

        if self.file_name.contains(['/', '\\']) {
            return Err(PersistenceError::config(format!(
                "file_name must not contain path separators: {}",
                self.file_name
            )));
        }

        if self.max_backups == 0 {
            return Err(PersistenceError::config("max_backups must be greater than 0"));
        }

        if self.retry.max_attempts == 0 {
            return Err(PersistenceError::config("retry.max_attempts must be greater than 0"));
        }

        Ok(())
    }
}
