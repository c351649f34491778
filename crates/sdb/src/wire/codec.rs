//! Big-endian payload codecs for requests and replies.
//!
//! ## Layouts
//!
//! ```text
//! datum        : source u32 | datum u32 | units u32 | sec i32 | nsec i32 | value i32   (24 bytes)
//! key          : source u32 | datum u32                                               (8 bytes)
//! multi request: source | datum | max_count | oldest.sec | oldest.nsec
//!                | newest.sec | newest.nsec                                         (28 bytes)
//! block        : source | datum | units | n  then  n × { sec | nsec | value }
//! clear        : source u32 | n u32 | n × datum u32
//! ```
//!
//! Every list payload is prefixed with a `count: u32`.

use crate::error::{Result, SdbError, SdbStatus};
use crate::store::{Datum, DatumId, Event, Key, SourceId, Timestamp, Units};

/// Maximum payload size of a reply.
pub const MAX_REPLY_SIZE: usize = 16384;

/// Maximum number of distinct identifiers in a directory reply.
pub const MAX_IDS: usize = 4095;

/// Encoded size of a datum.
pub const DATUM_SIZE: usize = 24;

/// Encoded size of a key.
pub const KEY_SIZE: usize = 8;

/// Encoded size of a multi-key request element.
pub const MULTI_REQUEST_SIZE: usize = 28;

/// Encoded size of a block header.
pub const BLOCK_HEADER_SIZE: usize = 16;

/// Encoded size of one event inside a block.
pub const BLOCK_EVENT_SIZE: usize = 12;

const COUNT_SIZE: usize = 4;

/// Cursor over a big-endian payload.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    /// Creates a reader at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Returns the number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Reads a big-endian `u32`.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::Truncated`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        let end = self.pos + 4;
        let bytes = self.buf.get(self.pos..end).ok_or(SdbError::Truncated {
            expected: end,
            actual: self.buf.len(),
        })?;
        self.pos = end;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Reads a big-endian `i32`.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Reads a timestamp as two big-endian `i32` words.
    pub fn read_timestamp(&mut self) -> Result<Timestamp> {
        let sec = self.read_i32()?;
        let nsec = self.read_i32()?;
        Ok(Timestamp::new(sec, nsec))
    }
}

/// Growable big-endian payload buffer.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Vec<u8>,
}

impl PayloadWriter {
    /// Creates an empty writer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a writer for a reply of exactly `size` bytes.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::BufferOverflow`] if `size` exceeds
    /// [`MAX_REPLY_SIZE`] and [`SdbError::OutOfMemory`] if the buffer
    /// cannot be reserved.
    pub fn for_reply(size: usize) -> Result<Self> {
        if size > MAX_REPLY_SIZE {
            return Err(SdbError::BufferOverflow {
                required: size,
                capacity: MAX_REPLY_SIZE,
            });
        }
        let mut buf = Vec::new();
        buf.try_reserve_exact(size)
            .map_err(|_| SdbError::OutOfMemory)?;
        Ok(Self { buf })
    }

    /// Appends a big-endian `u32`.
    pub fn put_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a big-endian `i32`.
    pub fn put_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// Appends a timestamp as two big-endian `i32` words.
    pub fn put_timestamp(&mut self, timestamp: Timestamp) {
        self.put_i32(timestamp.sec);
        self.put_i32(timestamp.nsec);
    }

    /// Returns the number of bytes written.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns true if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Returns the finished payload.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

fn expect_len(payload: &[u8], expected: usize) -> Result<()> {
    if payload.len() != expected {
        return Err(SdbError::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    Ok(())
}

fn counted_len(count: u32, element: usize) -> usize {
    (count as usize)
        .checked_mul(element)
        .and_then(|n| n.checked_add(COUNT_SIZE))
        .unwrap_or(usize::MAX)
}

fn read_count(payload: &[u8]) -> Result<(PayloadReader<'_>, u32)> {
    let mut reader = PayloadReader::new(payload);
    let count = reader.read_u32()?;
    Ok((reader, count))
}

/// Rejects a non-empty payload.
pub fn expect_empty(payload: &[u8]) -> Result<()> {
    expect_len(payload, 0)
}

/// Decodes a counted list of datums.
///
/// A payload shorter than its declared count is rejected before any
/// element is decoded; trailing bytes are ignored.
pub fn decode_datums(payload: &[u8]) -> Result<Vec<Datum>> {
    let (mut reader, count) = read_count(payload)?;
    let expected = counted_len(count, DATUM_SIZE);
    if payload.len() < expected {
        return Err(SdbError::Truncated {
            expected,
            actual: payload.len(),
        });
    }
    let mut datums = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let source = reader.read_u32()?;
        let datum = reader.read_u32()?;
        let units = reader.read_u32()?;
        let timestamp = reader.read_timestamp()?;
        let value = reader.read_i32()?;
        datums.push(Datum::new(source, datum, units, timestamp, value));
    }
    Ok(datums)
}

/// Encodes a counted list of datums.
pub fn encode_datums(datums: &[Datum]) -> Result<Vec<u8>> {
    let mut writer = PayloadWriter::for_reply(COUNT_SIZE + datums.len() * DATUM_SIZE)?;
    writer.put_u32(datums.len() as u32);
    for datum in datums {
        writer.put_u32(datum.source);
        writer.put_u32(datum.datum);
        writer.put_u32(datum.units);
        writer.put_timestamp(datum.timestamp);
        writer.put_i32(datum.value);
    }
    Ok(writer.into_inner())
}

/// Decodes a counted list of keys; the length must match exactly.
pub fn decode_keys(payload: &[u8]) -> Result<Vec<Key>> {
    let (mut reader, count) = read_count(payload)?;
    expect_len(payload, counted_len(count, KEY_SIZE))?;
    let mut keys = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let source = reader.read_u32()?;
        let datum = reader.read_u32()?;
        keys.push(Key::new(source, datum));
    }
    Ok(keys)
}

/// Encodes a counted list of keys.
pub fn encode_keys(keys: &[Key]) -> Vec<u8> {
    let mut writer = PayloadWriter::new();
    writer.put_u32(keys.len() as u32);
    for key in keys {
        writer.put_u32(key.source);
        writer.put_u32(key.datum);
    }
    writer.into_inner()
}

/// One element of a windowed block request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MultiRequest {
    /// Key to read.
    pub key: Key,
    /// Maximum number of events to return; zero for unlimited.
    pub max_count: u32,
    /// Oldest accepted timestamp; zero for no lower bound.
    pub oldest: Timestamp,
    /// Newest accepted timestamp; zero for no upper bound.
    pub newest: Timestamp,
}

impl MultiRequest {
    /// Creates a request for `key`.
    pub fn new(key: Key, max_count: u32, oldest: Timestamp, newest: Timestamp) -> Self {
        Self {
            key,
            max_count,
            oldest,
            newest,
        }
    }

    /// Returns true if neither bound is set.
    pub fn is_unbounded(&self) -> bool {
        self.oldest.is_zero() && self.newest.is_zero()
    }

    /// Returns true if `timestamp` is newer than the upper bound.
    pub fn is_after(&self, timestamp: Timestamp) -> bool {
        !self.newest.is_zero() && timestamp > self.newest
    }

    /// Returns true if `timestamp` is older than the lower bound.
    pub fn is_before(&self, timestamp: Timestamp) -> bool {
        !self.oldest.is_zero() && timestamp < self.oldest
    }

    /// Returns the count limit, `None` when unlimited.
    pub fn limit(&self) -> Option<usize> {
        match self.max_count {
            0 => None,
            n => Some(n as usize),
        }
    }

    fn read(reader: &mut PayloadReader<'_>) -> Result<Self> {
        let source = reader.read_u32()?;
        let datum = reader.read_u32()?;
        let max_count = reader.read_u32()?;
        let oldest = reader.read_timestamp()?;
        let newest = reader.read_timestamp()?;
        Ok(Self::new(Key::new(source, datum), max_count, oldest, newest))
    }

    fn write(&self, writer: &mut PayloadWriter) {
        writer.put_u32(self.key.source);
        writer.put_u32(self.key.datum);
        writer.put_u32(self.max_count);
        writer.put_timestamp(self.oldest);
        writer.put_timestamp(self.newest);
    }

    /// Decodes a single un-prefixed request; the payload must be exactly 28 bytes.
    pub fn decode_single(payload: &[u8]) -> Result<Self> {
        expect_len(payload, MULTI_REQUEST_SIZE)?;
        Self::read(&mut PayloadReader::new(payload))
    }

    /// Encodes a single un-prefixed request.
    pub fn encode_single(&self) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        self.write(&mut writer);
        writer.into_inner()
    }
}

/// Decodes a counted list of multi-key requests; the length must match exactly.
pub fn decode_multi_requests(payload: &[u8]) -> Result<Vec<MultiRequest>> {
    let (mut reader, count) = read_count(payload)?;
    expect_len(payload, counted_len(count, MULTI_REQUEST_SIZE))?;
    let mut requests = Vec::with_capacity(count as usize);
    for _ in 0..count {
        requests.push(MultiRequest::read(&mut reader)?);
    }
    Ok(requests)
}

/// Encodes a counted list of multi-key requests.
pub fn encode_multi_requests(requests: &[MultiRequest]) -> Result<Vec<u8>> {
    let mut writer = PayloadWriter::for_reply(COUNT_SIZE + requests.len() * MULTI_REQUEST_SIZE)?;
    writer.put_u32(requests.len() as u32);
    for request in requests {
        request.write(&mut writer);
    }
    Ok(writer.into_inner())
}

/// Events of one key returned by a block retrieve, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetrievedBlock {
    /// Source identifier.
    pub source: SourceId,
    /// Datum identifier.
    pub datum: DatumId,
    /// Units of the key.
    pub units: Units,
    /// Matching events, newest first.
    pub events: Vec<Event>,
}

impl RetrievedBlock {
    /// Returns the encoded size of a block holding `matches` events.
    pub fn encoded_len(matches: usize) -> usize {
        BLOCK_HEADER_SIZE + matches * BLOCK_EVENT_SIZE
    }

    /// Returns the values of the block, newest first.
    pub fn values(&self) -> Vec<i32> {
        self.events.iter().map(|event| event.value).collect()
    }
}

/// Encodes a counted list of blocks.
pub fn encode_blocks(blocks: &[RetrievedBlock]) -> Result<Vec<u8>> {
    let size = blocks
        .iter()
        .fold(COUNT_SIZE, |acc, block| acc + RetrievedBlock::encoded_len(block.events.len()));
    let mut writer = PayloadWriter::for_reply(size)?;
    writer.put_u32(blocks.len() as u32);
    for block in blocks {
        writer.put_u32(block.source);
        writer.put_u32(block.datum);
        writer.put_u32(block.units);
        writer.put_u32(block.events.len() as u32);
        for event in &block.events {
            writer.put_timestamp(event.timestamp);
            writer.put_i32(event.value);
        }
    }
    Ok(writer.into_inner())
}

/// Decodes a counted list of blocks.
pub fn decode_blocks(payload: &[u8]) -> Result<Vec<RetrievedBlock>> {
    let (mut reader, count) = read_count(payload)?;
    let mut blocks = Vec::new();
    for _ in 0..count {
        let source = reader.read_u32()?;
        let datum = reader.read_u32()?;
        let units = reader.read_u32()?;
        let matches = reader.read_u32()?;
        let mut events = Vec::new();
        for _ in 0..matches {
            let timestamp = reader.read_timestamp()?;
            let value = reader.read_i32()?;
            events.push(Event::new(timestamp, value));
        }
        blocks.push(RetrievedBlock {
            source,
            datum,
            units,
            events,
        });
    }
    Ok(blocks)
}

/// Request payload of the clear services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClearRequest {
    /// Source whose keys are cleared.
    pub source: SourceId,
    /// Datums either spared or targeted, depending on the service.
    pub datums: Vec<DatumId>,
}

impl ClearRequest {
    /// Creates a clear request.
    pub fn new(source: SourceId, datums: Vec<DatumId>) -> Self {
        Self { source, datums }
    }

    /// Decodes `source | n | n × datum`; the length must match exactly.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        if payload.len() < 2 * COUNT_SIZE {
            return Err(SdbError::Truncated {
                expected: 2 * COUNT_SIZE,
                actual: payload.len(),
            });
        }
        let mut reader = PayloadReader::new(payload);
        let source = reader.read_u32()?;
        let count = reader.read_u32()?;
        expect_len(payload, counted_len(count, 4).saturating_add(COUNT_SIZE))?;
        let mut datums = Vec::with_capacity(count as usize);
        for _ in 0..count {
            datums.push(reader.read_u32()?);
        }
        Ok(Self { source, datums })
    }

    /// Encodes the request.
    pub fn encode(&self) -> Vec<u8> {
        let mut writer = PayloadWriter::new();
        writer.put_u32(self.source);
        writer.put_u32(self.datums.len() as u32);
        for datum in &self.datums {
            writer.put_u32(*datum);
        }
        writer.into_inner()
    }
}

/// Decodes a payload holding exactly one source identifier.
pub fn decode_source(payload: &[u8]) -> Result<SourceId> {
    expect_len(payload, 4)?;
    PayloadReader::new(payload).read_u32()
}

/// Encodes a single source identifier.
pub fn encode_source(source: SourceId) -> Vec<u8> {
    source.to_be_bytes().to_vec()
}

/// Encodes a counted list of identifiers.
pub fn encode_ids(ids: &[u32]) -> Result<Vec<u8>> {
    let mut writer = PayloadWriter::for_reply(COUNT_SIZE + ids.len() * 4)?;
    writer.put_u32(ids.len() as u32);
    for id in ids {
        writer.put_u32(*id);
    }
    Ok(writer.into_inner())
}

/// Decodes a counted list of identifiers; the length must match exactly.
pub fn decode_ids(payload: &[u8]) -> Result<Vec<u32>> {
    let (mut reader, count) = read_count(payload)?;
    expect_len(payload, counted_len(count, 4))?;
    (0..count).map(|_| reader.read_u32()).collect()
}

/// Encodes a single count word.
pub fn encode_count(count: usize) -> Vec<u8> {
    (count as u32).to_be_bytes().to_vec()
}

/// Encodes a process state word.
pub fn encode_state(state: u32) -> Vec<u8> {
    state.to_be_bytes().to_vec()
}

/// Decodes a process state word.
pub fn decode_state(payload: &[u8]) -> Result<u32> {
    expect_len(payload, 4)?;
    PayloadReader::new(payload).read_u32()
}

/// Encodes an error status word.
pub fn encode_status(status: SdbStatus) -> Vec<u8> {
    status.code().to_be_bytes().to_vec()
}

/// Decodes an error status word.
pub fn decode_status(payload: &[u8]) -> Result<u32> {
    expect_len(payload, 4)?;
    PayloadReader::new(payload).read_u32()
}
