//! In-memory storage primitives: keys, events, per-key history and the key index.
//!
//! # Layout
//!
//! ```text
//! KeyIndex (101 buckets)
//!   └─ bucket chain ─ Definition { source, datum, units, flags }
//!                       └─ EventHistory (≤ HIST_LIMIT events, oldest → newest)
//! ```
//!
//! Every [`Definition`] exclusively owns its [`EventHistory`]; the
//! [`KeyIndex`] exclusively owns every [`Definition`].

pub mod code;
pub mod definition;
pub mod history;
pub mod index;

pub use code::{decode, encode, Code, CODE_MASK, CODE_MASK_SIZE};
pub use definition::Definition;
pub use history::{EventHistory, InsertPolicy, PushOutcome, HIST_LIMIT};
pub use index::{KeyIndex, HASH_MULTIPLIER, HASH_TABLE_SIZE};

/// Identifier of the process that owns a telemetry channel.
pub type SourceId = u32;

/// Identifier of a telemetry channel within its source.
pub type DatumId = u32;

/// Units code describing how a value is to be interpreted.
pub type Units = u32;

/// Units sentinel marking a value as invalid or unavailable.
pub const INVALID_UNITS: Units = 0;

/// Units code for unit-free quantities such as counts.
pub const NO_UNITS: Units = 2;

/// Units code for process states.
pub const PROC_STATE_UNITS: Units = 23;

/// Nanoseconds per second.
pub const NANOS_PER_SEC: i32 = 1_000_000_000;

/// Seconds per archive hour.
pub const SECS_PER_HOUR: i32 = 3600;

/// Absolute time as seconds and nanoseconds since the Unix epoch.
///
/// Ordering compares seconds first, then nanoseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp {
    /// Whole seconds.
    pub sec: i32,
    /// Nanoseconds within the second.
    pub nsec: i32,
}

impl Timestamp {
    /// The zero timestamp, used on the wire for "no bound".
    pub const ZERO: Timestamp = Timestamp { sec: 0, nsec: 0 };

    /// Creates a timestamp.
    pub fn new(sec: i32, nsec: i32) -> Self {
        Self { sec, nsec }
    }

    /// Creates a timestamp with zero nanoseconds.
    pub fn from_secs(sec: i32) -> Self {
        Self { sec, nsec: 0 }
    }

    /// Returns true if both fields are zero.
    pub fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// Returns the start of the clock hour containing this timestamp.
    ///
    /// `None` when that hour begins before `i32::MIN`.
    pub fn hour_start(&self) -> Option<i32> {
        self.sec.checked_sub(self.sec.rem_euclid(SECS_PER_HOUR))
    }

    /// Returns the microseconds elapsed since [`Self::hour_start`].
    pub fn micros_into_hour(&self) -> u32 {
        let secs = self.sec.rem_euclid(SECS_PER_HOUR) as u32;
        secs * 1_000_000 + (self.nsec.max(0) as u32) / 1_000
    }

    /// Returns the whole seconds elapsed from `earlier` to `self`.
    pub fn secs_since(&self, earlier: &Timestamp) -> i64 {
        let mut secs = self.sec as i64 - earlier.sec as i64;
        if self.nsec < earlier.nsec {
            secs -= 1;
        }
        secs
    }

    /// Returns the current system time.
    pub fn now() -> Self {
        let elapsed = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();
        Self {
            sec: elapsed.as_secs() as i32,
            nsec: elapsed.subsec_nanos() as i32,
        }
    }
}

/// A (source, datum) pair identifying one telemetry channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key {
    /// Source identifier.
    pub source: SourceId,
    /// Datum identifier.
    pub datum: DatumId,
}

impl Key {
    /// Creates a key.
    pub fn new(source: SourceId, datum: DatumId) -> Self {
        Self { source, datum }
    }
}

/// One timestamped sample held in a history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Event {
    /// Time of the measurement.
    pub timestamp: Timestamp,
    /// Measured value.
    pub value: i32,
}

impl Event {
    /// Creates an event.
    pub fn new(timestamp: Timestamp, value: i32) -> Self {
        Self { timestamp, value }
    }
}

/// A full submission tuple as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datum {
    /// Source identifier.
    pub source: SourceId,
    /// Datum identifier.
    pub datum: DatumId,
    /// Units of the value.
    pub units: Units,
    /// Time of the measurement.
    pub timestamp: Timestamp,
    /// Measured value.
    pub value: i32,
}

impl Datum {
    /// Creates a datum.
    pub fn new(source: SourceId, datum: DatumId, units: Units, timestamp: Timestamp, value: i32) -> Self {
        Self {
            source,
            datum,
            units,
            timestamp,
            value,
        }
    }

    /// Returns the key of this datum.
    pub fn key(&self) -> Key {
        Key::new(self.source, self.datum)
    }

    /// Returns the event part of this datum.
    pub fn event(&self) -> Event {
        Event::new(self.timestamp, self.value)
    }

    /// Returns the robust-retrieval placeholder for a missing key.
    pub fn invalid(key: Key) -> Self {
        Self::new(key.source, key.datum, INVALID_UNITS, Timestamp::ZERO, 0)
    }
}
