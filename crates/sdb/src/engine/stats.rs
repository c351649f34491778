//! Self-telemetry counters ("task data").
//!
//! The engine submits these values into itself on every heartbeat under
//! its own source id, so clients read them like any other key.

use crate::store::{DatumId, Units, NO_UNITS, PROC_STATE_UNITS};
use std::sync::atomic::{AtomicI32, Ordering};

/// Datum ids of the engine's own telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum TaskDatum {
    /// Reported process state.
    ProcState = 1,
    /// Authorisation state.
    AuthState = 2,
    /// Pending system request.
    SysRequest = 3,
    /// Application version.
    AppVersion = 4,
    /// Successful submit requests.
    QtySubmitted = 5,
    /// Successful retrieve requests.
    QtyRetrieved = 6,
    /// Heartbeats handled.
    QtyHbeat = 7,
    /// Failed requests.
    QtyErrors = 8,
    /// Successful count requests.
    QtyCount = 9,
    /// Successful list requests.
    QtyList = 10,
    /// Other successful requests.
    QtyMisc = 11,
    /// Installed definitions.
    QtyDefns = 12,
    /// Definitions whose history is at its limit.
    QtyHistLim = 13,
    /// Events held in memory across all keys.
    TotVolatileData = 14,
}

impl TaskDatum {
    /// Counters submitted on every heartbeat, in id order.
    pub const AUTO_SUBMIT: [TaskDatum; 10] = [
        TaskDatum::QtySubmitted,
        TaskDatum::QtyRetrieved,
        TaskDatum::QtyHbeat,
        TaskDatum::QtyErrors,
        TaskDatum::QtyCount,
        TaskDatum::QtyList,
        TaskDatum::QtyMisc,
        TaskDatum::QtyDefns,
        TaskDatum::QtyHistLim,
        TaskDatum::TotVolatileData,
    ];

    /// Returns the datum id.
    pub fn id(self) -> DatumId {
        self as u32
    }

    /// Returns the units the value is submitted with.
    pub fn units(self) -> Units {
        match self {
            Self::ProcState => PROC_STATE_UNITS,
            _ => NO_UNITS,
        }
    }
}

const SLOTS: usize = TaskDatum::TotVolatileData as usize + 1;

/// Current values of every task datum.
#[derive(Debug)]
pub struct TaskCounters {
    values: [AtomicI32; SLOTS],
}

impl Default for TaskCounters {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskCounters {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self {
            values: std::array::from_fn(|_| AtomicI32::new(0)),
        }
    }

    /// Returns the value of `datum`.
    pub fn get(&self, datum: TaskDatum) -> i32 {
        self.values[datum as usize].load(Ordering::Relaxed)
    }

    /// Sets `datum` to `value`.
    pub fn set(&self, datum: TaskDatum, value: i32) {
        self.values[datum as usize].store(value, Ordering::Relaxed);
    }

    /// Adds `delta` to `datum`.
    pub fn add(&self, datum: TaskDatum, delta: i32) {
        self.values[datum as usize].fetch_add(delta, Ordering::Relaxed);
    }

    /// Increments `datum` by one.
    pub fn increment(&self, datum: TaskDatum) {
        self.add(datum, 1);
    }
}
