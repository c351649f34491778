//! Message envelope, class and service codes.
//!
//! ```text
//! Message
//! ┌────────┬──────┬───────┬─────────┬─────────┬───────────┬─────────────┐
//! │ source │ dest │ class │ service │ seq_num │ timestamp │ payload (BE)│
//! └────────┴──────┴───────┴─────────┴─────────┴───────────┴─────────────┘
//! ```
//!
//! Replies swap source and destination and keep the service code and
//! sequence number of the request.

pub mod codec;

pub use codec::{
    decode_blocks, decode_datums, decode_ids, decode_keys, decode_multi_requests, decode_source,
    decode_state, decode_status, encode_blocks, encode_count, encode_datums, encode_ids, encode_keys,
    encode_multi_requests, encode_source, encode_state, encode_status, expect_empty, ClearRequest,
    PayloadReader, PayloadWriter, MultiRequest, RetrievedBlock, BLOCK_HEADER_SIZE, BLOCK_EVENT_SIZE,
    DATUM_SIZE, KEY_SIZE, MAX_IDS, MAX_REPLY_SIZE, MULTI_REQUEST_SIZE,
};

use crate::error::SdbStatus;
use crate::store::{SourceId, Timestamp};

/// CIL identifier of the process controller.
pub const MCP_ID: u32 = 1;

/// CIL identifier of the heartbeat source.
pub const CHB_ID: u32 = 2;

/// CIL identifier of the status database.
pub const SDB_ID: u32 = 10;

/// CIL identifier of the historical recovery helper.
pub const SFR_ID: u32 = 11;

/// Upper bound (exclusive) of valid CIL identifiers.
pub const CIL_EOL: u32 = 157;

/// Message class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum MessageClass {
    /// Unset or unrecognised class.
    Invalid = 0,
    /// Request.
    Command = 1,
    /// Reply carrying data.
    Response = 2,
    /// Acknowledgement.
    Ack = 3,
    /// Request accepted, action in progress.
    Act = 4,
    /// Action completed.
    Com = 5,
    /// Error reply carrying a status code.
    Error = 6,
}

impl MessageClass {
    /// Decodes a raw class, mapping unknown values to [`MessageClass::Invalid`].
    pub fn from_u32(value: u32) -> Self {
        match value {
            1 => Self::Command,
            2 => Self::Response,
            3 => Self::Ack,
            4 => Self::Act,
            5 => Self::Com,
            6 => Self::Error,
            _ => Self::Invalid,
        }
    }

    /// Returns the raw wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

/// First service code of the status database package.
pub const SERVICE_BASE: u32 = 0x000d_0000;

/// Service codes understood by the status database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Liveness ping from the heartbeat source.
    Heartbeat,
    /// Stop the server loop.
    Shutdown,
    /// Enter SAFE.
    SafeState,
    /// Leave SAFE.
    Activate,
    /// Reserved; always rejected.
    Purge,
    /// Acknowledged submit.
    Submit1,
    /// Strict latest-value retrieve.
    Retrieve1,
    /// Acknowledged batch submit.
    SubmitN,
    /// Windowed block retrieve.
    RetrieveN,
    /// List distinct sources.
    ListSources,
    /// List distinct datums of one source.
    ListData,
    /// Count distinct sources.
    CountSources,
    /// Count distinct datums of one source.
    CountData,
    /// Count stored events per key.
    CountMeasurements,
    /// Robust latest-value retrieve.
    Retrieve1Robust,
    /// Deep historical retrieve from the first matching record.
    RetrieveFirst,
    /// Fire-and-forget submit.
    Submit1Post,
    /// Clear every key of a source except the listed ones.
    ClearSource,
    /// Clear only the listed keys of a source.
    ClearData,
    /// Deep historical retrieve from the last matching record.
    RetrieveLast,
}

impl Service {
    /// Every service, in code order.
    pub const ALL: [Service; 20] = [
        Service::Heartbeat,
        Service::Shutdown,
        Service::SafeState,
        Service::Activate,
        Service::Purge,
        Service::Submit1,
        Service::Retrieve1,
        Service::SubmitN,
        Service::RetrieveN,
        Service::ListSources,
        Service::ListData,
        Service::CountSources,
        Service::CountData,
        Service::CountMeasurements,
        Service::Retrieve1Robust,
        Service::RetrieveFirst,
        Service::Submit1Post,
        Service::ClearSource,
        Service::ClearData,
        Service::RetrieveLast,
    ];

    /// Returns the raw wire code.
    pub fn code(self) -> u32 {
        match self {
            Self::Heartbeat => 255,
            Self::Shutdown => 254,
            Self::SafeState => 253,
            Self::Activate => 252,
            Self::Purge => SERVICE_BASE,
            Self::Submit1 => SERVICE_BASE + 0x1,
            Self::Retrieve1 => SERVICE_BASE + 0x2,
            Self::SubmitN => SERVICE_BASE + 0x3,
            Self::RetrieveN => SERVICE_BASE + 0x4,
            Self::ListSources => SERVICE_BASE + 0x5,
            Self::ListData => SERVICE_BASE + 0x6,
            Self::CountSources => SERVICE_BASE + 0x7,
            Self::CountData => SERVICE_BASE + 0x8,
            Self::CountMeasurements => SERVICE_BASE + 0x9,
            Self::Retrieve1Robust => SERVICE_BASE + 0xa,
            Self::RetrieveFirst => SERVICE_BASE + 0xb,
            Self::Submit1Post => SERVICE_BASE + 0xc,
            Self::ClearSource => SERVICE_BASE + 0xd,
            Self::ClearData => SERVICE_BASE + 0xe,
            Self::RetrieveLast => SERVICE_BASE + 0xf,
        }
    }

    /// Decodes a raw service code.
    pub fn from_code(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|service| service.code() == code)
    }
}

/// One message exchanged with the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sending process.
    pub source: SourceId,
    /// Receiving process.
    pub dest: u32,
    /// Message class.
    pub class: MessageClass,
    /// Raw service code.
    pub service: u32,
    /// Sequence number chosen by the requester.
    pub seq_num: u32,
    /// Time the message was built.
    pub timestamp: Timestamp,
    /// Big-endian payload.
    pub payload: Vec<u8>,
}

impl Message {
    /// Builds a command message.
    pub fn command(source: SourceId, dest: u32, service: Service, seq_num: u32, payload: Vec<u8>) -> Self {
        Self {
            source,
            dest,
            class: MessageClass::Command,
            service: service.code(),
            seq_num,
            timestamp: Timestamp::now(),
            payload,
        }
    }

    /// Returns the decoded service, if known.
    pub fn service(&self) -> Option<Service> {
        Service::from_code(self.service)
    }

    /// Builds a reply of `class` with source and destination swapped.
    pub fn reply(&self, class: MessageClass, payload: Vec<u8>) -> Self {
        Self {
            source: self.dest,
            dest: self.source,
            class,
            service: self.service,
            seq_num: self.seq_num,
            timestamp: Timestamp::now(),
            payload,
        }
    }

    /// Builds a data-carrying response.
    pub fn response(&self, payload: Vec<u8>) -> Self {
        self.reply(MessageClass::Response, payload)
    }

    /// Builds an empty acknowledgement.
    pub fn ack(&self) -> Self {
        self.reply(MessageClass::Ack, Vec::new())
    }

    /// Builds an empty "acting" reply.
    pub fn act(&self) -> Self {
        self.reply(MessageClass::Act, Vec::new())
    }

    /// Builds a "completed" reply.
    pub fn com(&self, payload: Vec<u8>) -> Self {
        self.reply(MessageClass::Com, payload)
    }

    /// Builds an error reply carrying `status`.
    pub fn error(&self, status: SdbStatus) -> Self {
        self.reply(MessageClass::Error, encode_status(status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_service_codes() {
        assert_eq!(Service::Heartbeat.code(), 255);
        assert_eq!(Service::Purge.code(), 0xd0000);
        assert_eq!(Service::RetrieveN.code(), 0xd0004);
        assert_eq!(Service::RetrieveLast.code(), 0xd000f);
        for service in Service::ALL {
            assert_eq!(Service::from_code(service.code()), Some(service));
        }
        assert_eq!(Service::from_code(0xd0010), None);
    }

    #[test]
    fn test_class_from_u32() {
        assert_eq!(MessageClass::from_u32(1), MessageClass::Command);
        assert_eq!(MessageClass::from_u32(6), MessageClass::Error);
        assert_eq!(MessageClass::from_u32(99), MessageClass::Invalid);
    }

    #[test]
    fn test_reply_swaps_endpoints() {
        let request = Message::command(7, SDB_ID, Service::Submit1, 42, vec![1, 2]);
        let reply = request.ack();

        assert_eq!(reply.source, SDB_ID);
        assert_eq!(reply.dest, 7);
        assert_eq!(reply.class, MessageClass::Ack);
        assert_eq!(reply.service, Service::Submit1.code());
        assert_eq!(reply.seq_num, 42);
        assert!(reply.payload.is_empty());
    }

    #[test]
    fn test_error_reply_carries_status() {
        let request = Message::command(7, SDB_ID, Service::Retrieve1, 1, Vec::new());
        let reply = request.error(SdbStatus::UnknownDefn);
        assert_eq!(reply.class, MessageClass::Error);
        assert_eq!(reply.payload, vec![0x00, 0x0d, 0x00, 0x09]);
    }
}
