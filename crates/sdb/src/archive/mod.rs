//! Hour-bucketed archive store.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                     ArchiveStore                       │
//! │  slots: [Option<ArchiveSlot>; max_open_files]          │
//! │    ├─ slot 0: 21030404.sdb  (last_accessed: 17)        │
//! │    ├─ slot 1: 21030405.sdb  (last_accessed: 42)        │
//! │    └─ slot 2: (free)                                   │
//! │  units: SdbUnits.dat                                   │
//! └────────────────────────────────────────────────────────┘
//! ```
//!
//! Each slot is bound to one clock hour. When every slot is busy the
//! least-recently-accessed one is the eviction candidate; the engine
//! force-archives pending values for that hour before closing it.

pub mod file;
pub mod layout;
pub mod retention;
pub mod units;

pub use file::{ArchiveRecord, HourFileHeader, HourFileReader, HEADER_SIZE, RECORD_SIZE};
pub use layout::{ArchiveLayout, HOUR_FILE_EXTENSION, UNITS_FILE_NAME};
pub use retention::{
    DefaultRetentionPolicy, RetentionManager, RetentionPolicy, RetentionReport,
    DEFAULT_RETENTION_DAYS,
};
pub use units::UnitsFile;

use crate::error::{Result, SdbError};
use crate::store::{DatumId, SourceId, Units};
use std::fs::{self, File, OpenOptions};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Default number of simultaneously open hour files.
pub const DEFAULT_MAX_OPEN_FILES: usize = 16;

/// Counters for archive activity.
#[derive(Debug, Default)]
pub struct ArchiveStats {
    /// Records appended to hour files.
    pub records_written: AtomicU64,
    /// Hour files opened.
    pub files_opened: AtomicU64,
    /// Hour files closed.
    pub files_closed: AtomicU64,
    /// Units entries appended.
    pub units_written: AtomicU64,
}

impl ArchiveStats {
    /// Returns the number of records written.
    pub fn records_written(&self) -> u64 {
        self.records_written.load(Ordering::Relaxed)
    }

    /// Returns the number of files opened.
    pub fn files_opened(&self) -> u64 {
        self.files_opened.load(Ordering::Relaxed)
    }

    /// Returns the number of files closed.
    pub fn files_closed(&self) -> u64 {
        self.files_closed.load(Ordering::Relaxed)
    }

    /// Returns the number of units entries written.
    pub fn units_written(&self) -> u64 {
        self.units_written.load(Ordering::Relaxed)
    }
}

#[derive(Debug)]
struct ArchiveSlot {
    start: i32,
    last_accessed: u64,
    file: File,
}

/// Bounded cache of open hour files plus the units side-file.
#[derive(Debug)]
pub struct ArchiveStore {
    layout: ArchiveLayout,
    units: UnitsFile,
    slots: Vec<Option<ArchiveSlot>>,
    tick: u64,
    stats: ArchiveStats,
}

impl ArchiveStore {
    /// Creates a store over `layout` with at most `max_open_files` open hour files.
    pub fn new(layout: ArchiveLayout, max_open_files: usize) -> Self {
        let units = UnitsFile::new(layout.units_path());
        Self {
            layout,
            units,
            slots: (0..max_open_files.max(1)).map(|_| None).collect(),
            tick: 0,
            stats: ArchiveStats::default(),
        }
    }

    /// Returns the archive layout.
    pub fn layout(&self) -> &ArchiveLayout {
        &self.layout
    }

    /// Returns the archive counters.
    pub fn stats(&self) -> &ArchiveStats {
        &self.stats
    }

    /// Returns the slot capacity.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the file for `hour` is open.
    pub fn is_resident(&self, hour: i32) -> bool {
        self.slot_of(hour).is_some()
    }

    /// Returns the hours of every open file, in slot order.
    pub fn open_hours(&self) -> Vec<i32> {
        self.slots.iter().flatten().map(|slot| slot.start).collect()
    }

    /// Returns the hour that must be closed before `hour` can be opened.
    ///
    /// `None` if `hour` is already resident or a slot is free.
    pub fn eviction_candidate(&self, hour: i32) -> Option<i32> {
        if self.is_resident(hour) || self.slots.iter().any(Option::is_none) {
            return None;
        }
        self.slots
            .iter()
            .flatten()
            .min_by_key(|slot| slot.last_accessed)
            .map(|slot| slot.start)
    }

    /// Ensures the file for `hour` is open, writing the header to a new file.
    ///
    /// If every slot is busy the least-recently-accessed file is closed
    /// without flushing; callers that care use [`Self::eviction_candidate`] first.
    pub fn open_hour(&mut self, hour: i32) -> Result<()> {
        if let Some(index) = self.slot_of(hour) {
            self.touch(index);
            return Ok(());
        }

        if let Some(victim) = self.eviction_candidate(hour) {
            self.close_hour(victim);
        }
        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| SdbError::General("no free archive slot".to_string()))?;

        let file = self.open_file(hour)?;
        self.tick += 1;
        self.slots[index] = Some(ArchiveSlot {
            start: hour,
            last_accessed: self.tick,
            file,
        });
        self.stats.files_opened.fetch_add(1, Ordering::Relaxed);
        debug!("Opened archive hour {} in slot {}", hour, index);
        Ok(())
    }

    /// Appends `record` to the file for `hour`, opening it if needed.
    pub fn append(&mut self, hour: i32, record: &ArchiveRecord) -> Result<()> {
        self.open_hour(hour)?;
        let index = self
            .slot_of(hour)
            .ok_or_else(|| SdbError::General(format!("hour {} not resident", hour)))?;
        self.touch(index);
        if let Some(slot) = self.slots[index].as_mut() {
            record.write_to(&mut slot.file)?;
        }
        self.stats.records_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Closes the file for `hour`, returning true if it was open.
    pub fn close_hour(&mut self, hour: i32) -> bool {
        match self.slot_of(hour) {
            Some(index) => {
                self.slots[index] = None;
                self.stats.files_closed.fetch_add(1, Ordering::Relaxed);
                debug!("Closed archive hour {} in slot {}", hour, index);
                true
            }
            None => false,
        }
    }

    /// Closes every open file, returning how many were closed.
    pub fn close_all(&mut self) -> usize {
        let hours = self.open_hours();
        for hour in &hours {
            self.close_hour(*hour);
        }
        hours.len()
    }

    /// Appends one key's units to the side-file.
    pub fn write_units(&mut self, source: SourceId, datum: DatumId, units: Units) -> Result<()> {
        self.ensure_root()?;
        self.units.append(source, datum, units)?;
        self.stats.units_written.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn slot_of(&self, hour: i32) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.as_ref().map(|s| s.start == hour).unwrap_or(false))
    }

    fn touch(&mut self, index: usize) {
        self.tick += 1;
        if let Some(slot) = self.slots[index].as_mut() {
            slot.last_accessed = self.tick;
        }
    }

    fn ensure_root(&self) -> Result<()> {
        let root = self.layout.root();
        if !root.is_dir() {
            fs::create_dir_all(root).map_err(|error| SdbError::FileOpen {
                path: root.to_path_buf(),
                error,
            })?;
        }
        Ok(())
    }

    fn open_file(&self, hour: i32) -> Result<File> {
        self.ensure_root()?;
        let path = self.layout.hour_path(hour);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|error| SdbError::FileOpen {
                path: path.clone(),
                error,
            })?;

        if file.metadata()?.len() == 0 {
            set_file_mode(&file)?;
            HourFileHeader::new(hour).write_to(&mut file)?;
        }
        Ok(file)
    }
}

#[cfg(unix)]
fn set_file_mode(file: &File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o664))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_file: &File) -> Result<()> {
    Ok(())
}
