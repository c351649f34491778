//! Hour-file format for archived telemetry.
//!
//! ## File Structure
//!
//! ```text
//! ┌───────────────────────────────────────────────┐
//! │  Header (8 bytes)                             │
//! │  - Magic: "SDBR" (4 bytes)                    │
//! │  - Start of hour: i32 epoch seconds (4 bytes) │
//! ├───────────────────────────────────────────────┤
//! │  Records (12 bytes each, in write order)      │
//! │  - Code: u32 (packed source/datum)            │
//! │  - Offset: u32 microseconds since hour start  │
//! │  - Value: i32                                 │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! All fields are little-endian.

use crate::error::{Result, SdbError};
use crate::store::{code, Code, DatumId, Event, SourceId, Timestamp};
use std::fs::File;
use std::io::{self, BufReader, Read, Write};
use std::path::Path;

/// Magic bytes at the start of every hour file: "SDBR".
pub const HOUR_FILE_MAGIC: [u8; 4] = *b"SDBR";

/// Header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Record size in bytes.
pub const RECORD_SIZE: usize = 12;

/// Header of an hour file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HourFileHeader {
    /// Start of the hour covered by the file, in epoch seconds.
    pub start: i32,
}

impl HourFileHeader {
    /// Creates a header for the hour starting at `start`.
    pub fn new(start: i32) -> Self {
        Self { start }
    }

    /// Writes the header.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::HeaderWrite`] if either field cannot be written.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer
            .write_all(&HOUR_FILE_MAGIC)
            .map_err(SdbError::HeaderWrite)?;
        writer
            .write_all(&self.start.to_le_bytes())
            .map_err(SdbError::HeaderWrite)?;
        Ok(())
    }

    /// Reads and validates a header.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let mut magic = [0u8; 4];
        reader.read_exact(&mut magic)?;
        if magic != HOUR_FILE_MAGIC {
            return Err(SdbError::InvalidMagic(magic));
        }
        let mut start = [0u8; 4];
        reader.read_exact(&mut start)?;
        Ok(Self {
            start: i32::from_le_bytes(start),
        })
    }
}

/// One archived value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveRecord {
    /// Packed source/datum code.
    pub code: Code,
    /// Microseconds since the start of the hour.
    pub micros: u32,
    /// Archived value.
    pub value: i32,
}

impl ArchiveRecord {
    /// Builds the record for `event` of key (`source`, `datum`).
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::EncodeFailure`] if the key does not fit a code.
    pub fn from_event(source: SourceId, datum: DatumId, event: &Event) -> Result<Self> {
        Ok(Self {
            code: code::encode(source, datum)?,
            micros: event.timestamp.micros_into_hour(),
            value: event.value,
        })
    }

    /// Returns the key of this record.
    pub fn key(&self) -> (SourceId, DatumId) {
        code::decode(self.code)
    }

    /// Reconstructs the timestamp given the file's hour start.
    ///
    /// `None` when the offset carries the seconds past `i32::MAX`.
    pub fn timestamp(&self, hour_start: i32) -> Option<Timestamp> {
        let sec = hour_start.checked_add((self.micros / 1_000_000) as i32)?;
        Some(Timestamp::new(sec, ((self.micros % 1_000_000) * 1_000) as i32))
    }

    /// Serializes the record into its fixed 12-byte form.
    pub fn to_bytes(&self) -> [u8; RECORD_SIZE] {
        let mut buf = [0u8; RECORD_SIZE];
        buf[0..4].copy_from_slice(&self.code.to_le_bytes());
        buf[4..8].copy_from_slice(&self.micros.to_le_bytes());
        buf[8..12].copy_from_slice(&self.value.to_le_bytes());
        buf
    }

    /// Writes the record as a single 12-byte block.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer
            .write_all(&self.to_bytes())
            .map_err(SdbError::FileWrite)
    }

    /// Reads one record, returning `None` at a clean end of file.
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Option<Self>> {
        let mut buf = [0u8; RECORD_SIZE];
        let mut filled = 0;
        while filled < RECORD_SIZE {
            match reader.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(None),
                Ok(0) => {
                    return Err(SdbError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("partial record of {} bytes", filled),
                    )))
                }
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err.into()),
            }
        }
        Ok(Some(Self {
            code: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            micros: u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]),
            value: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
        }))
    }
}

/// Sequential reader over an hour file.
///
/// # Examples
/// ```rust,ignore
/// use alopex_sdb::archive::HourFileReader;
///
/// let mut reader = HourFileReader::open(path)?;
/// for record in reader.read_all()? {
///     println!("{:?} at {:?}", record.key(), record.timestamp(reader.header().start));
/// }
/// ```
pub struct HourFileReader<R: Read = BufReader<File>> {
    reader: R,
    header: HourFileHeader,
}

impl HourFileReader<BufReader<File>> {
    /// Opens the file at `path` and validates its header.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|error| SdbError::FileOpen {
            path: path.to_path_buf(),
            error,
        })?;
        Self::new(BufReader::new(file))
    }
}

impl<R: Read> HourFileReader<R> {
    /// Wraps `reader`, consuming and validating the header.
    pub fn new(mut reader: R) -> Result<Self> {
        let header = HourFileHeader::read_from(&mut reader)?;
        Ok(Self { reader, header })
    }

    /// Returns the file header.
    pub fn header(&self) -> &HourFileHeader {
        &self.header
    }

    /// Reads the next record.
    pub fn next_record(&mut self) -> Result<Option<ArchiveRecord>> {
        ArchiveRecord::read_from(&mut self.reader)
    }

    /// Reads every remaining record.
    pub fn read_all(&mut self) -> Result<Vec<ArchiveRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.next_record()? {
            records.push(record);
        }
        Ok(records)
    }
}
