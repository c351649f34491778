//! The status database engine.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       StatusDatabase                         │
//! │                                                              │
//! │  submit ──▶ KeyIndex ──▶ Definition ──▶ EventHistory         │
//! │                │                                             │
//! │                └──▶ ArchiveStore (hour files + units file)   │
//! │                                                              │
//! │  retrieve / directory / clear ◀── KeyIndex                   │
//! │  lifecycle: nominal state, heartbeat, write failures         │
//! │  TaskCounters ──(heartbeat)──▶ submit (own source id)        │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! All state is mutated synchronously through `&mut StatusDatabase`;
//! the server loop processes one request to completion before the next.

pub mod clear;
pub mod directory;
pub mod ingest;
pub mod lifecycle;
pub mod retrieve;
pub mod stats;

pub use lifecycle::ProcState;
pub use retrieve::RetrieveMode;
pub use stats::{TaskCounters, TaskDatum};

use crate::archive::{ArchiveLayout, ArchiveStore};
use crate::config::SdbConfig;
use crate::error::Result;
use crate::store::{Definition, Key, KeyIndex, Timestamp};

/// In-memory status database with optional hour-file archival.
///
/// # Examples
/// ```rust,ignore
/// use alopex_sdb::{SdbConfig, StatusDatabase};
///
/// let mut db = StatusDatabase::new(SdbConfig::new("/var/sdb"))?;
/// db.start(Timestamp::now());
/// db.submit(&[Datum::new(7, 1, 2, Timestamp::now(), 42)])?;
/// ```
#[derive(Debug)]
pub struct StatusDatabase {
    config: SdbConfig,
    index: KeyIndex,
    archive: ArchiveStore,
    counters: TaskCounters,
    nominal: ProcState,
    reported: ProcState,
    write_fails: u32,
    last_heartbeat: Timestamp,
}

impl StatusDatabase {
    /// Creates an engine in the INIT state.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::SdbError::Config`] if `config` is invalid.
    pub fn new(config: SdbConfig) -> Result<Self> {
        config.validate()?;
        let index = KeyIndex::new(config.history_limit);
        let archive = ArchiveStore::new(
            ArchiveLayout::new(config.data_path.clone()),
            config.max_open_files,
        );
        Ok(Self {
            config,
            index,
            archive,
            counters: TaskCounters::new(),
            nominal: ProcState::Init,
            reported: ProcState::Init,
            write_fails: 0,
            last_heartbeat: Timestamp::ZERO,
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SdbConfig {
        &self.config
    }

    /// Returns the key index.
    pub fn index(&self) -> &KeyIndex {
        &self.index
    }

    /// Returns the definition of `key`, if installed.
    pub fn definition(&self, key: Key) -> Option<&Definition> {
        self.index.lookup(key)
    }

    /// Returns the archive store.
    pub fn archive(&self) -> &ArchiveStore {
        &self.archive
    }

    /// Returns the self-telemetry counters.
    pub fn counters(&self) -> &TaskCounters {
        &self.counters
    }

    /// Returns the number of consecutive archival failures.
    pub fn write_failures(&self) -> u32 {
        self.write_fails
    }

    /// Returns the time of the last accepted heartbeat.
    pub fn last_heartbeat(&self) -> Timestamp {
        self.last_heartbeat
    }

    /// Returns true if values are currently archived.
    pub fn is_archiving(&self) -> bool {
        self.config.file_store && self.nominal == ProcState::Okay
    }
}
