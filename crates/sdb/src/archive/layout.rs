//! Hour-file naming and directory layout for the archive.

use chrono::{DateTime, NaiveDateTime};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Archive file extension.
pub const HOUR_FILE_EXTENSION: &str = "sdb";

/// Name of the units side-file.
pub const UNITS_FILE_NAME: &str = "SdbUnits.dat";

/// Directory layout of the archive.
///
/// # Examples
/// ```rust,ignore
/// use alopex_sdb::archive::layout::ArchiveLayout;
///
/// let layout = ArchiveLayout::new("/var/sdb");
/// let path = layout.hour_path(0); // /var/sdb/70010100.sdb
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLayout {
    root: PathBuf,
}

impl ArchiveLayout {
    /// Creates a layout rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the archive directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Builds a file name `yymmddhh.sdb` for the hour starting at `hour` (UTC).
    pub fn file_name(hour: i32) -> String {
        match DateTime::from_timestamp(hour as i64, 0) {
            Some(start) => format!("{}.{}", start.format("%y%m%d%H"), HOUR_FILE_EXTENSION),
            None => format!("{:08x}.{}", hour, HOUR_FILE_EXTENSION),
        }
    }

    /// Parses a file name produced by [`Self::file_name`] back into its hour.
    pub fn parse_file_name(name: &str) -> Option<i32> {
        let stem = name.strip_suffix(".sdb")?;
        if stem.len() != 8 || !stem.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let start = NaiveDateTime::parse_from_str(&format!("{}0000", stem), "%y%m%d%H%M%S").ok()?;
        i32::try_from(start.and_utc().timestamp()).ok()
    }

    /// Returns the path of the file covering `hour`.
    pub fn hour_path(&self, hour: i32) -> PathBuf {
        self.root.join(Self::file_name(hour))
    }

    /// Returns the path of the units side-file.
    pub fn units_path(&self) -> PathBuf {
        self.root.join(UNITS_FILE_NAME)
    }

    /// Lists every hour file in the archive directory, oldest first.
    pub fn list_hour_files(&self) -> Result<Vec<(i32, PathBuf)>> {
        let mut files = Vec::new();
        if !self.root.exists() {
            return Ok(files);
        }
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            let name = entry.file_name();
            if let Some(hour) = name.to_str().and_then(Self::parse_file_name) {
                files.push((hour, entry.path()));
            }
        }
        files.sort_by_key(|(hour, _)| *hour);
        Ok(files)
    }
}
