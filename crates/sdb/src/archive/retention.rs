//! Retention policy and manager for age-based hour-file deletion.

use crate::archive::layout::ArchiveLayout;
use crate::archive::units::UnitsFile;
use crate::error::Result;
use crate::store::SECS_PER_HOUR;
use std::fs;
use std::time::Duration;
use tracing::{error, info};

/// Default retention period in days.
pub const DEFAULT_RETENTION_DAYS: u32 = 28;

/// Retention policy for determining expired hour files.
pub trait RetentionPolicy: Send + Sync {
    /// Returns the retention duration.
    fn retention_duration(&self) -> Duration;

    /// Returns true if the file for the hour starting at `hour` is expired at `now` (epoch seconds).
    fn is_expired(&self, hour: i32, now: i64) -> bool {
        let end = hour as i64 + SECS_PER_HOUR as i64;
        end + (self.retention_duration().as_secs() as i64) < now
    }
}

/// Default retention policy (28 days).
#[derive(Debug, Clone)]
pub struct DefaultRetentionPolicy {
    retention: Duration,
}

impl Default for DefaultRetentionPolicy {
    fn default() -> Self {
        Self::from_days(DEFAULT_RETENTION_DAYS)
    }
}

impl DefaultRetentionPolicy {
    /// Creates a retention policy with a custom duration.
    pub fn new(retention: Duration) -> Self {
        Self { retention }
    }

    /// Creates a retention policy keeping files for `days` days.
    pub fn from_days(days: u32) -> Self {
        Self::new(Duration::from_secs(days as u64 * 24 * SECS_PER_HOUR as u64))
    }
}

impl RetentionPolicy for DefaultRetentionPolicy {
    fn retention_duration(&self) -> Duration {
        self.retention
    }
}

/// Summary of one retention run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetentionReport {
    /// Number of hour files deleted.
    pub deleted: usize,
    /// Number of distinct entries left in the units side-file.
    pub units_entries: usize,
}

/// Retention manager deleting expired hour files and compacting the units side-file.
pub struct RetentionManager<P: RetentionPolicy> {
    policy: P,
    layout: ArchiveLayout,
}

impl<P: RetentionPolicy> RetentionManager<P> {
    /// Creates a new retention manager.
    pub fn new(policy: P, layout: ArchiveLayout) -> Self {
        Self { policy, layout }
    }

    /// Runs a retention check at `now` (epoch seconds).
    ///
    /// A file that cannot be deleted is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns an error if the archive directory cannot be listed or the
    /// units side-file cannot be rewritten.
    pub fn run(&self, now: i64) -> Result<RetentionReport> {
        let mut report = RetentionReport::default();

        for (hour, path) in self.layout.list_hour_files()? {
            if !self.policy.is_expired(hour, now) {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => report.deleted += 1,
                Err(err) => {
                    error!("Retention delete failed for {:?}: {:?}", path, err);
                }
            }
        }

        report.units_entries = UnitsFile::new(self.layout.units_path()).dedup()?;

        if report.deleted > 0 {
            info!(
                "Retention removed {} hour files from {:?}",
                report.deleted,
                self.layout.root()
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Debug, Clone)]
    struct FixedPolicy(Duration);

    impl RetentionPolicy for FixedPolicy {
        fn retention_duration(&self) -> Duration {
            self.0
        }
    }

    #[test]
    fn test_policy_expiry_boundaries() {
        let policy = FixedPolicy(Duration::from_secs(10));
        let end = 3600i64;

        assert!(!policy.is_expired(0, end + 10));
        assert!(!policy.is_expired(0, end + 9));
        assert!(policy.is_expired(0, end + 11));
    }

    #[test]
    fn test_default_policy_is_28_days() {
        let policy = DefaultRetentionPolicy::default();
        assert_eq!(policy.retention_duration(), Duration::from_secs(28 * 86_400));
    }

    #[test]
    fn test_run_deletes_only_expired_files() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp_dir.path());
        let old_hour = 3600;
        let recent_hour = 10 * 86_400;
        fs::write(layout.hour_path(old_hour), b"SDBR").unwrap();
        fs::write(layout.hour_path(recent_hour), b"SDBR").unwrap();

        let manager = RetentionManager::new(DefaultRetentionPolicy::from_days(1), layout.clone());
        let report = manager.run(recent_hour as i64 + 60).unwrap();

        assert_eq!(report.deleted, 1);
        assert!(!layout.hour_path(old_hour).exists());
        assert!(layout.hour_path(recent_hour).exists());
    }

    #[test]
    fn test_run_dedups_units_file() {
        let temp_dir = TempDir::new().unwrap();
        let layout = ArchiveLayout::new(temp_dir.path());
        let units = UnitsFile::new(layout.units_path());
        units.append(1, 2, 3).unwrap();
        units.append(1, 2, 3).unwrap();

        let manager = RetentionManager::new(DefaultRetentionPolicy::default(), layout);
        let report = manager.run(0).unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.units_entries, 1);
    }
}
