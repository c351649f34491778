//! End-to-end tests for request dispatch over the in-process transport.
//!
//! These tests verify:
//! - Reply classes and payloads per service
//! - Envelope rejection and error replies
//! - Controller authorization and clear authorization
//! - Delegated historical reads
//! - Task counter accounting

use alopex_sdb::error::SdbStatus;
use alopex_sdb::recovery::{RecoveryBackend, RecoveryRequest};
use alopex_sdb::wire::{
    decode_blocks, decode_datums, decode_ids, decode_multi_requests, decode_state, decode_status,
    encode_datums, encode_keys, encode_multi_requests, encode_source, ClearRequest,
    PayloadReader, CHB_ID, MCP_ID, SDB_ID,
};
use alopex_sdb::{
    ChannelHub, ChannelTransport, Control, Datum, DisabledRecovery, Dispatcher, Key, Message,
    MessageClass, MultiRequest, ProcState, Result, SdbConfig, Service, StatusDatabase, TaskDatum,
    Timestamp, Transport,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const CLIENT: u32 = 7;

#[derive(Debug, Default)]
struct RecordingRecovery {
    requests: Vec<RecoveryRequest>,
}

impl RecoveryBackend for RecordingRecovery {
    fn submit(&mut self, request: &RecoveryRequest) -> Result<()> {
        self.requests.push(request.clone());
        Ok(())
    }
}

struct Harness<R: RecoveryBackend> {
    _temp_dir: TempDir,
    hub: ChannelHub,
    dispatcher: Dispatcher<ChannelTransport, R>,
    client: ChannelTransport,
}

fn harness_with<R: RecoveryBackend>(recovery: R) -> Harness<R> {
    let temp_dir = TempDir::new().unwrap();
    let config = SdbConfig::new(temp_dir.path()).with_file_store(false);
    let mut db = StatusDatabase::new(config).unwrap();
    db.start(Timestamp::from_secs(0));

    let hub = ChannelHub::new();
    let server = hub.register(SDB_ID);
    let client = hub.register(CLIENT);
    Harness {
        _temp_dir: temp_dir,
        hub,
        dispatcher: Dispatcher::new(db, server, recovery),
        client,
    }
}

fn harness() -> Harness<DisabledRecovery> {
    harness_with(DisabledRecovery)
}

impl<R: RecoveryBackend> Harness<R> {
    /// Dispatches every queued request and returns the last control decision.
    fn pump(&mut self, now: i32) -> Control {
        let mut control = Control::Continue;
        while let Some(delivery) = self.dispatcher.transport().try_receive() {
            control = self.dispatcher.dispatch(&delivery, Timestamp::from_secs(now));
        }
        control
    }

    fn request(&mut self, service: Service, payload: Vec<u8>) -> Vec<Message> {
        let message = Message::command(CLIENT, SDB_ID, service, 1, payload);
        self.client.send(SDB_ID, &message).unwrap();
        self.pump(1);
        self.client.drain()
    }

    fn submit(&mut self, sec: i32, datum: u32, value: i32) {
        let payload = encode_datums(&[Datum::new(CLIENT, datum, 2, Timestamp::from_secs(sec), value)])
            .unwrap();
        let replies = self.request(Service::Submit1, payload);
        assert_eq!(replies[0].class, MessageClass::Ack);
    }

    fn counter(&self, task: TaskDatum) -> i32 {
        self.dispatcher.db().counters().get(task)
    }
}

fn error_status(reply: &Message) -> u32 {
    assert_eq!(reply.class, MessageClass::Error);
    decode_status(&reply.payload).unwrap()
}

// ============================================================================
// Submit and retrieve
// ============================================================================

#[test]
fn test_submit_then_retrieve_latest() {
    let mut h = harness();
    h.submit(5, 1, 30);
    h.submit(6, 1, 31);

    let replies = h.request(Service::Retrieve1, encode_keys(&[Key::new(CLIENT, 1)]));
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].class, MessageClass::Response);
    assert_eq!(replies[0].dest, CLIENT);
    assert_eq!(
        decode_datums(&replies[0].payload).unwrap(),
        vec![Datum::new(CLIENT, 1, 2, Timestamp::from_secs(6), 31)]
    );
}

#[test]
fn test_strict_retrieve_of_unknown_key_fails() {
    let mut h = harness();
    let replies = h.request(Service::Retrieve1, encode_keys(&[Key::new(CLIENT, 9)]));
    assert_eq!(error_status(&replies[0]), SdbStatus::UnknownDefn.code());

    // the failed lookup left a placeholder behind
    let replies = h.request(Service::Retrieve1, encode_keys(&[Key::new(CLIENT, 9)]));
    assert_eq!(error_status(&replies[0]), SdbStatus::NoValues.code());
}

#[test]
fn test_robust_retrieve_substitutes_invalid() {
    let mut h = harness();
    h.submit(5, 1, 30);
    let keys = [Key::new(CLIENT, 1), Key::new(CLIENT, 9)];
    let replies = h.request(Service::Retrieve1Robust, encode_keys(&keys));

    let datums = decode_datums(&replies[0].payload).unwrap();
    assert_eq!(datums.len(), 2);
    assert_eq!(datums[0].value, 30);
    assert_eq!(datums[1], Datum::invalid(Key::new(CLIENT, 9)));
}

#[test]
fn test_batch_submit_is_acknowledged() {
    let mut h = harness();
    let datums: Vec<Datum> = (1..=3)
        .map(|datum| Datum::new(CLIENT, datum, 2, Timestamp::from_secs(1), datum as i32))
        .collect();
    let replies = h.request(Service::SubmitN, encode_datums(&datums).unwrap());

    assert_eq!(replies[0].class, MessageClass::Ack);
    assert_eq!(h.counter(TaskDatum::QtySubmitted), 1);
    assert_eq!(h.dispatcher.db().definition(Key::new(CLIENT, 3)).unwrap().num_data(), 1);
}

#[test]
fn test_post_submit_never_replies() {
    let mut h = harness();
    let payload = encode_datums(&[Datum::new(CLIENT, 1, 2, Timestamp::from_secs(1), 4)]).unwrap();
    assert!(h.request(Service::Submit1Post, payload).is_empty());
    assert!(h.request(Service::Submit1Post, vec![0, 0, 0]).is_empty());

    assert_eq!(h.dispatcher.db().definition(Key::new(CLIENT, 1)).unwrap().num_data(), 1);
    assert_eq!(h.counter(TaskDatum::QtySubmitted), 1);
    assert_eq!(h.counter(TaskDatum::QtyErrors), 1);
}

#[test]
fn test_multi_retrieve_windows() {
    let mut h = harness();
    for (sec, value) in [(1, 10), (2, 20), (3, 30)] {
        h.submit(sec, 1, value);
    }
    let key = Key::new(CLIENT, 1);

    let requests = [
        MultiRequest::new(key, 2, Timestamp::ZERO, Timestamp::ZERO),
        MultiRequest::new(key, 0, Timestamp::from_secs(2), Timestamp::from_secs(2)),
    ];
    let replies = h.request(Service::RetrieveN, encode_multi_requests(&requests).unwrap());
    let blocks = decode_blocks(&replies[0].payload).unwrap();

    assert_eq!(blocks.len(), 2);
    assert_eq!(blocks[0].values(), vec![30, 20]);
    assert_eq!(blocks[1].values(), vec![20]);
    assert_eq!(blocks[1].units, 2);
}

#[test]
fn test_multi_retrieve_unknown_key() {
    let mut h = harness();
    let requests = [MultiRequest::new(Key::new(CLIENT, 5), 0, Timestamp::ZERO, Timestamp::ZERO)];
    let replies = h.request(Service::RetrieveN, encode_multi_requests(&requests).unwrap());

    assert_eq!(error_status(&replies[0]), SdbStatus::UnknownDefn.code());
    assert!(h.dispatcher.db().definition(Key::new(CLIENT, 5)).is_none());
}

// ============================================================================
// Directory and counts
// ============================================================================

#[test]
fn test_directory_services() {
    let mut h = harness();
    h.submit(1, 2, 0);
    h.submit(1, 1, 0);

    let replies = h.request(Service::ListSources, Vec::new());
    assert_eq!(decode_ids(&replies[0].payload).unwrap(), vec![CLIENT, SDB_ID]);

    let replies = h.request(Service::ListData, encode_source(CLIENT));
    assert_eq!(decode_ids(&replies[0].payload).unwrap(), vec![1, 2]);

    let replies = h.request(Service::CountData, encode_source(CLIENT));
    assert_eq!(PayloadReader::new(&replies[0].payload).read_u32().unwrap(), 2);

    let replies = h.request(Service::CountSources, vec![0; 4]);
    assert_eq!(error_status(&replies[0]), SdbStatus::Truncated.code());

    assert_eq!(h.counter(TaskDatum::QtyList), 2);
    assert_eq!(h.counter(TaskDatum::QtyCount), 1);
}

#[test]
fn test_count_measurements() {
    let mut h = harness();
    for sec in 1..=4 {
        h.submit(sec, 1, sec);
    }
    let key = Key::new(CLIENT, 1);
    let requests = [
        MultiRequest::new(key, 0, Timestamp::ZERO, Timestamp::ZERO),
        MultiRequest::new(key, 0, Timestamp::from_secs(2), Timestamp::from_secs(3)),
    ];
    let replies = h.request(Service::CountMeasurements, encode_multi_requests(&requests).unwrap());
    let counted = decode_multi_requests(&replies[0].payload).unwrap();

    assert_eq!(counted[0].max_count, 4);
    assert_eq!(counted[1].max_count, 2);
    assert_eq!(counted[1].oldest, Timestamp::from_secs(2));
}

// ============================================================================
// Clear
// ============================================================================

#[test]
fn test_clear_requires_owner_or_controller() {
    let mut h = harness();
    h.submit(1, 1, 5);
    h.submit(1, 2, 6);

    let stranger = h.hub.register(8);
    let request = ClearRequest::new(CLIENT, vec![1]);
    let message = Message::command(8, SDB_ID, Service::ClearData, 3, request.encode());
    stranger.send(SDB_ID, &message).unwrap();
    h.pump(2);
    assert_eq!(error_status(&stranger.drain()[0]), SdbStatus::NotAuth.code());

    let replies = h.request(Service::ClearData, request.encode());
    assert_eq!(replies[0].class, MessageClass::Ack);
    let replies = h.request(Service::Retrieve1, encode_keys(&[Key::new(CLIENT, 1)]));
    assert_eq!(error_status(&replies[0]), SdbStatus::NoValues.code());

    let replies = h.request(Service::ClearSource, ClearRequest::new(CLIENT, vec![]).encode());
    assert_eq!(replies[0].class, MessageClass::Ack);
    assert!(!h.dispatcher.db().definition(Key::new(CLIENT, 2)).unwrap().has_data());
    assert_eq!(h.counter(TaskDatum::QtyMisc), 2);
}

// ============================================================================
// Control services
// ============================================================================

#[test]
fn test_heartbeat_replies_with_state() {
    let mut h = harness();
    let chb = h.hub.register(CHB_ID);
    chb.send(SDB_ID, &Message::command(CHB_ID, SDB_ID, Service::Heartbeat, 1, Vec::new()))
        .unwrap();
    h.pump(2);

    let replies = chb.drain();
    assert_eq!(replies.len(), 1);
    assert_eq!(replies[0].class, MessageClass::Response);
    assert_eq!(decode_state(&replies[0].payload).unwrap(), ProcState::Okay.as_u32());
    assert_eq!(h.dispatcher.db().last_heartbeat(), Timestamp::from_secs(2));
    assert_eq!(h.counter(TaskDatum::QtyHbeat), 1);
}

#[test]
fn test_relayed_heartbeat_is_rejected() {
    let mut h = harness();
    let chb = h.hub.register(CHB_ID);
    let forged = Message::command(CHB_ID, SDB_ID, Service::Heartbeat, 1, Vec::new());
    h.client.send(SDB_ID, &forged).unwrap();
    h.pump(2);

    assert_eq!(error_status(&chb.drain()[0]), SdbStatus::WrongSrc.code());
    assert_eq!(h.dispatcher.db().last_heartbeat(), Timestamp::from_secs(0));
}

#[test]
fn test_safe_state_and_activate() {
    let mut h = harness();
    let mcp = h.hub.register(MCP_ID);

    mcp.send(SDB_ID, &Message::command(MCP_ID, SDB_ID, Service::SafeState, 4, Vec::new()))
        .unwrap();
    h.pump(2);
    let replies = mcp.drain();
    let classes: Vec<MessageClass> = replies.iter().map(|reply| reply.class).collect();
    assert_eq!(classes, vec![MessageClass::Act, MessageClass::Com]);
    assert_eq!(decode_state(&replies[1].payload).unwrap(), ProcState::Safe.as_u32());

    mcp.send(SDB_ID, &Message::command(MCP_ID, SDB_ID, Service::Activate, 5, Vec::new()))
        .unwrap();
    h.pump(3);
    let replies = mcp.drain();
    assert_eq!(decode_state(&replies[1].payload).unwrap(), ProcState::Okay.as_u32());
}

#[test]
fn test_control_services_require_controller() {
    let mut h = harness();
    let replies = h.request(Service::SafeState, Vec::new());
    assert_eq!(error_status(&replies[0]), SdbStatus::NotAuth.code());
    assert_eq!(h.dispatcher.db().state(), ProcState::Okay);

    let replies = h.request(Service::Shutdown, Vec::new());
    assert_eq!(error_status(&replies[0]), SdbStatus::NotAuth.code());
}

#[test]
fn test_shutdown_stops_the_loop() {
    let mut h = harness();
    let mcp = h.hub.register(MCP_ID);
    mcp.send(SDB_ID, &Message::command(MCP_ID, SDB_ID, Service::Shutdown, 1, Vec::new()))
        .unwrap();

    assert_eq!(h.pump(2), Control::Shutdown);
    assert_eq!(mcp.drain()[0].class, MessageClass::Ack);
}

#[test]
fn test_purge_and_unknown_service() {
    let mut h = harness();
    let replies = h.request(Service::Purge, Vec::new());
    assert_eq!(error_status(&replies[0]), SdbStatus::GenErr.code());

    let mut message = Message::command(CLIENT, SDB_ID, Service::Purge, 2, Vec::new());
    message.service = 0x000d_0010;
    h.client.send(SDB_ID, &message).unwrap();
    h.pump(1);
    let replies = h.client.drain();
    assert_eq!(error_status(&replies[0]), SdbStatus::UnknownService.code());
    assert_eq!(replies[0].service, 0x000d_0010);
    assert_eq!(h.counter(TaskDatum::QtyErrors), 2);
}

// ============================================================================
// Envelope validation
// ============================================================================

#[test]
fn test_envelope_rejections_are_silent() {
    let mut h = harness();
    let mut messages = vec![
        Message::command(CLIENT, SDB_ID + 1, Service::ListSources, 1, Vec::new()),
        Message::command(0, SDB_ID, Service::ListSources, 2, Vec::new()),
        Message::command(500, SDB_ID, Service::ListSources, 3, Vec::new()),
    ];
    let mut not_command = Message::command(CLIENT, SDB_ID, Service::ListSources, 4, Vec::new());
    not_command.class = MessageClass::Ack;
    messages.push(not_command);

    for message in &messages {
        h.client.send(SDB_ID, message).unwrap();
    }
    h.pump(1);

    assert!(h.client.drain().is_empty());
    assert_eq!(h.counter(TaskDatum::QtyErrors), 4);
    assert_eq!(h.counter(TaskDatum::QtyList), 0);
}

// ============================================================================
// Delegated historical reads
// ============================================================================

#[test]
fn test_retrieve_last_is_delegated() {
    let mut h = harness_with(RecordingRecovery::default());
    let window = MultiRequest::new(Key::new(CLIENT, 1), 10, Timestamp::ZERO, Timestamp::ZERO);
    let payload = window.encode_single();

    let message = Message::command(CLIENT, SDB_ID, Service::RetrieveLast, 42, payload.clone());
    h.client.send(SDB_ID, &message).unwrap();
    h.pump(1);

    assert!(h.client.drain().is_empty());
    assert_eq!(
        h.dispatcher.recovery().requests,
        vec![RecoveryRequest::new(CLIENT, payload, 42, true)]
    );
    assert_eq!(h.counter(TaskDatum::QtyRetrieved), 1);

    let replies = h.request(Service::RetrieveFirst, vec![0; 27]);
    assert_eq!(error_status(&replies[0]), SdbStatus::Truncated.code());
    assert_eq!(h.dispatcher.recovery().requests.len(), 1);
}

#[test]
fn test_retrieve_first_without_recovery() {
    let mut h = harness();
    let window = MultiRequest::new(Key::new(CLIENT, 1), 0, Timestamp::ZERO, Timestamp::ZERO);
    let replies = h.request(Service::RetrieveFirst, window.encode_single());
    assert_eq!(error_status(&replies[0]), SdbStatus::SfrNotAvail.code());
}
