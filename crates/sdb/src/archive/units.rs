//! Units side-file: a human-readable listing of each archived key's units.
//!
//! ```text
//! # File: SdbUnits.dat (contains unit listings)
//! # Format: SourceId DatumId Units
//! 000a 0005 0002
//! 000a 0006 0017
//! ```

use crate::error::{Result, SdbError};
use crate::store::{DatumId, SourceId, Units};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

const HEADER_LINES: [&str; 2] = [
    "# File: SdbUnits.dat (contains unit listings)",
    "# Format: SourceId DatumId Units",
];

/// Append-only writer for the units side-file.
#[derive(Debug, Clone)]
pub struct UnitsFile {
    path: PathBuf,
}

impl UnitsFile {
    /// Creates a writer for the side-file at `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Returns the side-file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Formats one entry line.
    pub fn format_entry(source: SourceId, datum: DatumId, units: Units) -> String {
        format!("{:04x} {:04x} {:04x}", source, datum, units)
    }

    /// Appends the units of one key, writing the comment header to a new file.
    pub fn append(&self, source: SourceId, datum: DatumId, units: Units) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|error| SdbError::FileOpen {
                path: self.path.clone(),
                error,
            })?;

        let mut text = String::new();
        if file.metadata()?.len() == 0 {
            for line in HEADER_LINES {
                text.push_str(line);
                text.push('\n');
            }
        }
        text.push_str(&Self::format_entry(source, datum, units));
        text.push('\n');

        file.write_all(text.as_bytes()).map_err(SdbError::FileWrite)
    }

    /// Sorts and de-duplicates the entry lines, keeping the comment header first.
    ///
    /// # Returns
    ///
    /// The number of distinct entries left in the file.
    pub fn dedup(&self) -> Result<usize> {
        if !self.path.exists() {
            return Ok(0);
        }
        let content = fs::read_to_string(&self.path)?;
        let mut entries: Vec<&str> = content
            .lines()
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let before = entries.len();
        entries.sort_unstable();
        entries.dedup();

        let mut text = String::new();
        for line in HEADER_LINES.iter().chain(entries.iter()) {
            text.push_str(line);
            text.push('\n');
        }
        fs::write(&self.path, text)?;

        info!(
            "Units file {:?}: {} entries reduced to {}",
            self.path,
            before,
            entries.len()
        );
        Ok(entries.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_append_writes_header_once() {
        let temp_dir = TempDir::new().unwrap();
        let units = UnitsFile::new(temp_dir.path().join("SdbUnits.dat"));
        units.append(10, 5, 2).unwrap();
        units.append(10, 0x1f, 0x17).unwrap();

        let content = fs::read_to_string(units.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines,
            vec![HEADER_LINES[0], HEADER_LINES[1], "000a 0005 0002", "000a 001f 0017"]
        );
    }

    #[test]
    fn test_dedup_sorts_and_removes_duplicates() {
        let temp_dir = TempDir::new().unwrap();
        let units = UnitsFile::new(temp_dir.path().join("SdbUnits.dat"));
        units.append(2, 1, 1).unwrap();
        units.append(1, 1, 1).unwrap();
        units.append(2, 1, 1).unwrap();

        assert_eq!(units.dedup().unwrap(), 2);
        let content = fs::read_to_string(units.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(&lines[2..], &["0001 0001 0001", "0002 0001 0001"]);
    }

    #[test]
    fn test_dedup_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let units = UnitsFile::new(temp_dir.path().join("missing.dat"));
        assert_eq!(units.dedup().unwrap(), 0);
    }
}
