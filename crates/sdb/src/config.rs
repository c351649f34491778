//! Engine configuration.
//!
//! ```yaml
//! data_path: /var/sdb
//! file_store: true
//! retention_days: 28
//! insert_policy: time_sorted
//! heartbeat_timeout: 3s
//! receive_timeout: 1s
//! ```
//!
//! Every field is optional; missing fields take the `DEFAULT_*` values.

use crate::archive::{DEFAULT_MAX_OPEN_FILES, DEFAULT_RETENTION_DAYS};
use crate::error::{Result, SdbError};
use crate::recovery::DEFAULT_RECOVERY_PROGRAM;
use crate::store::{InsertPolicy, HIST_LIMIT};
use crate::wire::{CHB_ID, CIL_EOL, MCP_ID, SDB_ID};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default archive directory.
pub const DEFAULT_DATA_PATH: &str = "sdb-data";

/// Default receive timeout of the server loop.
pub const DEFAULT_RECEIVE_TIMEOUT: Duration = Duration::from_millis(1000);

/// Default heartbeat silence tolerated before entering SAFE.
pub const DEFAULT_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default number of consecutive write failures before WARN.
pub const DEFAULT_MAX_WRITE_FAILURES: u32 = 5;

/// Default log filter.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Configuration for [`crate::engine::StatusDatabase`] and its server loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SdbConfig {
    /// Directory holding hour files and the units side-file.
    pub data_path: PathBuf,
    /// Enables archival to hour files.
    pub file_store: bool,
    /// Days to keep hour files before retention deletes them.
    pub retention_days: u32,
    /// Placement of events in a non-empty history.
    pub insert_policy: InsertPolicy,
    /// Maximum events kept per key.
    pub history_limit: usize,
    /// Maximum simultaneously open hour files.
    pub max_open_files: usize,
    /// This process's own identifier.
    pub own_id: u32,
    /// Identifier of the heartbeat source.
    pub heartbeat_source: u32,
    /// Identifier of the privileged controller.
    pub controller_id: u32,
    /// Exclusive upper bound of valid source identifiers.
    pub source_id_limit: u32,
    /// Receive timeout of the server loop.
    #[serde(with = "humantime_serde")]
    pub receive_timeout: Duration,
    /// Heartbeat silence tolerated before entering SAFE.
    #[serde(with = "humantime_serde")]
    pub heartbeat_timeout: Duration,
    /// Consecutive write failures before WARN.
    pub max_write_failures: u32,
    /// Program spawned for deep historical reads; `None` disables them.
    pub recovery_program: Option<PathBuf>,
    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for SdbConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            file_store: true,
            retention_days: DEFAULT_RETENTION_DAYS,
            insert_policy: InsertPolicy::default(),
            history_limit: HIST_LIMIT,
            max_open_files: DEFAULT_MAX_OPEN_FILES,
            own_id: SDB_ID,
            heartbeat_source: CHB_ID,
            controller_id: MCP_ID,
            source_id_limit: CIL_EOL,
            receive_timeout: DEFAULT_RECEIVE_TIMEOUT,
            heartbeat_timeout: DEFAULT_HEARTBEAT_TIMEOUT,
            max_write_failures: DEFAULT_MAX_WRITE_FAILURES,
            recovery_program: Some(PathBuf::from(DEFAULT_RECOVERY_PROGRAM)),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl SdbConfig {
    /// Creates a configuration archiving under `data_path`.
    pub fn new(data_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            ..Self::default()
        }
    }

    /// Parses a YAML document and validates it.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a YAML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|err| SdbError::Config(format!("cannot read {:?}: {}", path, err)))?;
        Self::from_yaml_str(&text)
    }

    /// Checks that every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<()> {
        if self.history_limit == 0 {
            return Err(SdbError::Config("history_limit must be at least 1".into()));
        }
        if self.max_open_files == 0 {
            return Err(SdbError::Config("max_open_files must be at least 1".into()));
        }
        if self.max_write_failures == 0 {
            return Err(SdbError::Config(
                "max_write_failures must be at least 1".into(),
            ));
        }
        if self.own_id == 0 || self.own_id >= self.source_id_limit {
            return Err(SdbError::Config(format!(
                "own_id {} outside (0, {})",
                self.own_id, self.source_id_limit
            )));
        }
        if self.heartbeat_timeout.is_zero() {
            return Err(SdbError::Config("heartbeat_timeout must be non-zero".into()));
        }
        if self.file_store && self.data_path.as_os_str().is_empty() {
            return Err(SdbError::Config(
                "data_path is required when file_store is enabled".into(),
            ));
        }
        Ok(())
    }

    /// Sets the archive directory.
    pub fn with_data_path(mut self, data_path: impl Into<PathBuf>) -> Self {
        self.data_path = data_path.into();
        self
    }

    /// Enables or disables archival.
    pub fn with_file_store(mut self, file_store: bool) -> Self {
        self.file_store = file_store;
        self
    }

    /// Sets the retention period in days.
    pub fn with_retention_days(mut self, days: u32) -> Self {
        self.retention_days = days;
        self
    }

    /// Sets the insertion policy.
    pub fn with_insert_policy(mut self, policy: InsertPolicy) -> Self {
        self.insert_policy = policy;
        self
    }

    /// Sets the per-key history limit.
    pub fn with_history_limit(mut self, limit: usize) -> Self {
        self.history_limit = limit;
        self
    }

    /// Sets the open hour-file limit.
    pub fn with_max_open_files(mut self, max_open_files: usize) -> Self {
        self.max_open_files = max_open_files;
        self
    }

    /// Sets the heartbeat timeout.
    pub fn with_heartbeat_timeout(mut self, timeout: Duration) -> Self {
        self.heartbeat_timeout = timeout;
        self
    }

    /// Sets the receive timeout.
    pub fn with_receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = timeout;
        self
    }

    /// Sets the write failure threshold.
    pub fn with_max_write_failures(mut self, max: u32) -> Self {
        self.max_write_failures = max;
        self
    }

    /// Sets the recovery program; `None` disables deep historical reads.
    pub fn with_recovery_program(mut self, program: Option<PathBuf>) -> Self {
        self.recovery_program = program;
        self
    }
}
