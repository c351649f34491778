//! Operational state machine.
//!
//! ```text
//!   INIT ──start──▶ OKAY ◀──────▶ WARN      (write failures ≥ limit / a write succeeds)
//!                    │  ▲
//!       heartbeat    │  │ ACTIVATE
//!       stale or     ▼  │
//!       SAFESTATE   SAFE
//! ```
//!
//! The nominal state is OKAY or SAFE; the reported state additionally
//! shows WARN while archival keeps failing. Every change of the reported
//! state is submitted as this process's own `PROC_STATE` datum.

use crate::archive::{DefaultRetentionPolicy, RetentionManager};
use crate::engine::{StatusDatabase, TaskDatum};
use crate::store::{Datum, Timestamp};
use std::fmt;
use tracing::{error, info, warn};

/// Process state as encoded on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum ProcState {
    /// Unknown state.
    Invalid = 0,
    /// Running normally.
    Okay = 1,
    /// Starting up.
    Init = 2,
    /// Idle.
    Standby = 3,
    /// Running with archival failures.
    Warn = 4,
    /// Failed.
    Failed = 5,
    /// Degraded: archival suspended.
    Safe = 6,
}

impl ProcState {
    /// Decodes a wire value.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Invalid),
            1 => Some(Self::Okay),
            2 => Some(Self::Init),
            3 => Some(Self::Standby),
            4 => Some(Self::Warn),
            5 => Some(Self::Failed),
            6 => Some(Self::Safe),
            _ => None,
        }
    }

    /// Returns the wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for ProcState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Invalid => "INVALID",
            Self::Okay => "OKAY",
            Self::Init => "INIT",
            Self::Standby => "STANDBY",
            Self::Warn => "WARN",
            Self::Failed => "FAILED",
            Self::Safe => "SAFE",
        };
        f.write_str(name)
    }
}

impl StatusDatabase {
    /// Returns the reported state.
    pub fn state(&self) -> ProcState {
        if self.nominal == ProcState::Okay && self.write_fails >= self.config.max_write_failures {
            ProcState::Warn
        } else {
            self.nominal
        }
    }

    /// Returns the nominal state, ignoring write failures.
    pub fn nominal_state(&self) -> ProcState {
        self.nominal
    }

    /// Brings the engine from INIT to OKAY.
    ///
    /// Retention cleanup runs first when archival is enabled; its failure
    /// is logged and does not prevent startup.
    pub fn start(&mut self, now: Timestamp) {
        info!(
            "Status database {} starting, archive {:?} (file store {})",
            self.config.own_id, self.config.data_path, self.config.file_store
        );
        if self.config.file_store {
            let manager = RetentionManager::new(
                DefaultRetentionPolicy::from_days(self.config.retention_days),
                self.archive.layout().clone(),
            );
            match manager.run(now.sec as i64) {
                Ok(report) => info!(
                    "Retention: {} hour files deleted, {} units entries",
                    report.deleted, report.units_entries
                ),
                Err(err) => error!("Retention cleanup failed: {:?}", err),
            }
        }
        self.last_heartbeat = now;
        self.set_nominal(ProcState::Okay, now);
    }

    /// Records an accepted heartbeat and submits the task counters.
    pub fn heartbeat(&mut self, now: Timestamp) {
        self.auto_submit(now);
        self.last_heartbeat = now;
    }

    /// Submits every task counter under this process's own source id.
    pub fn auto_submit(&mut self, now: Timestamp) {
        for task in TaskDatum::AUTO_SUBMIT {
            let datum = Datum::new(
                self.config.own_id,
                task.id(),
                task.units(),
                now,
                self.counters.get(task),
            );
            if let Err(err) = self.add_data(&datum) {
                error!("Task datum {} submit failed: {:?}", task.id(), err);
            }
        }
    }

    /// Enters SAFE: flushes pending values, closes every file and suspends archival.
    pub fn go_safe(&mut self, now: Timestamp) {
        if self.nominal == ProcState::Safe {
            return;
        }
        let flushed = if self.is_archiving() {
            self.flush_pending()
        } else {
            0
        };
        let closed = self.archive.close_all();
        warn!(
            "Entering SAFE: {} pending values flushed, {} files closed",
            flushed, closed
        );
        self.set_nominal(ProcState::Safe, now);
    }

    /// Leaves SAFE and resumes archival.
    ///
    /// The heartbeat clock restarts so the engine is not immediately stale.
    pub fn activate(&mut self, now: Timestamp) {
        if self.nominal != ProcState::Okay {
            info!("Activating from {}", self.nominal);
        }
        self.last_heartbeat = now;
        self.set_nominal(ProcState::Okay, now);
    }

    /// Flushes pending values and closes every file.
    pub fn shutdown(&mut self) {
        let flushed = if self.is_archiving() {
            self.flush_pending()
        } else {
            0
        };
        let closed = self.archive.close_all();
        info!(
            "Shutting down: {} pending values flushed, {} files closed",
            flushed, closed
        );
    }

    /// Periodic bookkeeping: heartbeat staleness, then the reported state.
    pub fn tick(&mut self, now: Timestamp) -> ProcState {
        if self.nominal == ProcState::Okay {
            let silent = now.secs_since(&self.last_heartbeat);
            if silent > self.config.heartbeat_timeout.as_secs() as i64 {
                warn!("No heartbeat for {}s", silent);
                self.go_safe(now);
            }
        }
        self.refresh_state(now);
        self.state()
    }

    fn set_nominal(&mut self, state: ProcState, now: Timestamp) {
        self.nominal = state;
        self.refresh_state(now);
    }

    /// Publishes the reported state if it changed since the last call.
    pub(crate) fn refresh_state(&mut self, now: Timestamp) {
        let state = self.state();
        if state == self.reported {
            return;
        }
        info!("Process state {} -> {}", self.reported, state);
        self.reported = state;

        let datum = Datum::new(
            self.config.own_id,
            TaskDatum::ProcState.id(),
            TaskDatum::ProcState.units(),
            now,
            state.as_u32() as i32,
        );
        if let Err(err) = self.add_data(&datum) {
            error!("Process state submit failed: {:?}", err);
        }
    }
}
