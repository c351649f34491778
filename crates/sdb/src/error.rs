//! Error types for the status database engine.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for status database operations.
pub type Result<T> = std::result::Result<T, SdbError>;

/// First status code allocated to the status database package.
pub const STATUS_BASE: u32 = 0x000d_0000;

/// Wire status codes, in the order the control system allocates them.
///
/// Error replies carry one of these as a big-endian `u32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum SdbStatus {
    /// Miscellaneous error.
    GenErr = STATUS_BASE,
    /// Message received from an unrecognised source.
    SrcUnknown,
    /// Message received from an inappropriate source.
    WrongSrc,
    /// Message received with a foreign destination.
    WrongDst,
    /// Unrecognised command line argument.
    ClaUnknown,
    /// A non-command message was rejected.
    NotCommand,
    /// Message received with an incorrect class.
    ClassErr,
    /// Insufficient or surplus data in a message payload.
    Truncated,
    /// Memory allocation failure.
    MallocFail,
    /// Data element definition not known.
    UnknownDefn,
    /// Data element has no values stored.
    NoValues,
    /// History was not empty when it was expected to be.
    LlNotEmpty,
    /// History was empty when it was not expected to be.
    LlEmpty,
    /// Attempted to insert a null entry into a history.
    LlNullEntry,
    /// Unexpected end of history.
    LlEndOfList,
    /// Unrecognised service code.
    UnknownService,
    /// Reply would exceed the maximum payload size.
    BufferOverflow,
    /// Unable to write to an archive file.
    FwriteFail,
    /// Unable to open an archive file.
    FopenFail,
    /// Error writing the magic string of an archive header.
    HdrMnWriteErr,
    /// Error writing the timestamp of an archive header.
    HdrTsWriteErr,
    /// Unable to generate a storage code.
    EncodeFailure,
    /// Unable to spawn the recovery process.
    SfrSpawnFail,
    /// Historical file recovery not available.
    SfrNotAvail,
    /// Units file empty or missing.
    NoUnitsFile,
    /// No shell or command handler available.
    NoShell,
    /// Write failure limit exceeded.
    WriteErrLimit,
    /// Heartbeat missing or failed.
    HbeatFail,
    /// Requester not authorised.
    NotAuth,
}

impl SdbStatus {
    /// Returns the raw wire code.
    pub fn code(self) -> u32 {
        self as u32
    }
}

/// Errors that can occur in status database operations.
#[derive(Debug, Error)]
pub enum SdbError {
    /// Payload length does not match the declared element count.
    #[error("Truncated payload: expected {expected} bytes, got {actual}")]
    Truncated {
        /// Expected payload length in bytes.
        expected: usize,
        /// Actual payload length in bytes.
        actual: usize,
    },

    /// No definition exists for the key.
    #[error("Unknown definition ({source_id:#x}, {datum_id:#x})")]
    UnknownDefinition {
        /// Source identifier.
        source_id: u32,
        /// Datum identifier.
        datum_id: u32,
    },

    /// The definition exists but holds no events.
    #[error("No values stored for ({source_id:#x}, {datum_id:#x})")]
    NoValues {
        /// Source identifier.
        source_id: u32,
        /// Datum identifier.
        datum_id: u32,
    },

    /// Allocation failed while serving one request.
    #[error("Out of memory")]
    OutOfMemory,

    /// create-first was applied to a non-empty history.
    #[error("History not empty")]
    HistoryNotEmpty,

    /// An operation needing events was applied to an empty history.
    #[error("History empty")]
    HistoryEmpty,

    /// insert-after was given a position with no following event.
    #[error("End of history at position {0}")]
    EndOfHistory(usize),

    /// The timestamp lies in an hour that cannot be archived.
    #[error("Timestamp {0} outside the archivable range")]
    TimestampOutOfRange(i32),

    /// The IDs do not fit their bit fields in a storage code.
    #[error("Encode failure for ({source_id:#x}, {datum_id:#x})")]
    EncodeFailure {
        /// Source identifier.
        source_id: u32,
        /// Datum identifier.
        datum_id: u32,
    },

    /// Opening an archive file failed.
    #[error("Failed to open {path:?}: {error}")]
    FileOpen {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        error: io::Error,
    },

    /// Writing an archive record failed.
    #[error("Archive write failed: {0}")]
    FileWrite(io::Error),

    /// Writing an archive header failed.
    #[error("Archive header write failed: {0}")]
    HeaderWrite(io::Error),

    /// Invalid magic bytes in an archive header.
    #[error("Invalid magic bytes: expected SDBR, got {0:?}")]
    InvalidMagic([u8; 4]),

    /// The reply would exceed the maximum payload size.
    #[error("Reply of {required} bytes exceeds capacity of {capacity}")]
    BufferOverflow {
        /// Bytes needed for the reply.
        required: usize,
        /// Maximum reply size.
        capacity: usize,
    },

    /// Too many distinct identifiers to enumerate.
    #[error("More than {0} distinct identifiers")]
    TooManyIds(usize),

    /// The requester may not perform this operation.
    #[error("Requester {requester:#x} not authorised for source {source_id:#x}")]
    NotAuthorized {
        /// Requesting process.
        requester: u32,
        /// Source whose data was targeted.
        source_id: u32,
    },

    /// Unrecognised service code.
    #[error("Unknown service {0:#x}")]
    UnknownService(u32),

    /// Source ID outside the valid range.
    #[error("Unrecognised source {0:#x}")]
    SourceUnknown(u32),

    /// Message from a sender not permitted for the service.
    #[error("Wrong source {source_id:#x} via {deliverer:#x}")]
    WrongSource {
        /// Claimed source.
        source_id: u32,
        /// Delivering process.
        deliverer: u32,
    },

    /// Message addressed to another process.
    #[error("Wrong destination {0:#x}")]
    WrongDestination(u32),

    /// Message class other than command.
    #[error("Non-command class {0:#x}")]
    NotCommand(u32),

    /// Spawning the recovery process failed.
    #[error("Failed to spawn recovery process: {0}")]
    SpawnFailed(io::Error),

    /// No recovery backend is configured.
    #[error("Historical recovery not available")]
    RecoveryUnavailable,

    /// Transport send/receive failure.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Miscellaneous failure.
    #[error("{0}")]
    General(String),

    /// Generic I/O failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl SdbError {
    /// Maps this error to the status code carried in error replies.
    pub fn status(&self) -> SdbStatus {
        match self {
            Self::Truncated { .. } => SdbStatus::Truncated,
            Self::UnknownDefinition { .. } => SdbStatus::UnknownDefn,
            Self::NoValues { .. } => SdbStatus::NoValues,
            Self::OutOfMemory => SdbStatus::MallocFail,
            Self::HistoryNotEmpty => SdbStatus::LlNotEmpty,
            Self::HistoryEmpty => SdbStatus::LlEmpty,
            Self::EndOfHistory(_) => SdbStatus::LlEndOfList,
            Self::EncodeFailure { .. } => SdbStatus::EncodeFailure,
            Self::FileOpen { .. } => SdbStatus::FopenFail,
            Self::FileWrite(_) => SdbStatus::FwriteFail,
            Self::HeaderWrite(_) => SdbStatus::HdrMnWriteErr,
            Self::BufferOverflow { .. } => SdbStatus::BufferOverflow,
            Self::NotAuthorized { .. } => SdbStatus::NotAuth,
            Self::UnknownService(_) => SdbStatus::UnknownService,
            Self::SourceUnknown(_) => SdbStatus::SrcUnknown,
            Self::WrongSource { .. } => SdbStatus::WrongSrc,
            Self::WrongDestination(_) => SdbStatus::WrongDst,
            Self::NotCommand(_) => SdbStatus::NotCommand,
            Self::SpawnFailed(_) => SdbStatus::SfrSpawnFail,
            Self::RecoveryUnavailable => SdbStatus::SfrNotAvail,
            Self::Config(_) => SdbStatus::ClaUnknown,
            Self::InvalidMagic(_)
            | Self::TooManyIds(_)
            | Self::TimestampOutOfRange(_)
            | Self::Transport(_)
            | Self::General(_)
            | Self::Io(_) => SdbStatus::GenErr,
        }
    }
}

impl From<serde_yaml::Error> for SdbError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_allocation_order() {
        assert_eq!(SdbStatus::GenErr.code(), 0x000d_0000);
        assert_eq!(SdbStatus::Truncated.code(), 0x000d_0007);
        assert_eq!(SdbStatus::UnknownDefn.code(), 0x000d_0009);
        assert_eq!(SdbStatus::BufferOverflow.code(), 0x000d_0010);
        assert_eq!(SdbStatus::NotAuth.code(), 0x000d_001c);
    }

    #[test]
    fn test_error_status_mapping() {
        let err = SdbError::UnknownDefinition {
            source_id: 1,
            datum_id: 2,
        };
        assert_eq!(err.status(), SdbStatus::UnknownDefn);
        assert_eq!(
            SdbError::Truncated {
                expected: 4,
                actual: 0
            }
            .status(),
            SdbStatus::Truncated
        );
        let io_err = io::Error::new(io::ErrorKind::Other, "disk");
        assert_eq!(SdbError::from(io_err).status(), SdbStatus::GenErr);
    }
}
