//! Tests for the server loop with a manually driven clock.

use alopex_sdb::wire::{CHB_ID, MCP_ID, SDB_ID};
use alopex_sdb::{
    ChannelHub, ChannelTransport, Clock, Control, DisabledRecovery, Dispatcher, Key, Message,
    MessageClass, MultiRequest, ProcState, ProcessRecovery, SdbConfig, Server, Service,
    StatusDatabase, TaskDatum, Timestamp, Transport,
};
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::TempDir;

#[derive(Debug, Clone, Default)]
struct ManualClock {
    secs: Arc<AtomicI32>,
}

impl ManualClock {
    fn set(&self, secs: i32) {
        self.secs.store(secs, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        Timestamp::from_secs(self.secs.load(Ordering::SeqCst))
    }
}

type TestServer = Server<ChannelTransport, DisabledRecovery, ManualClock>;

fn server(temp_dir: &TempDir, hub: &ChannelHub, clock: &ManualClock) -> TestServer {
    let config = SdbConfig::new(temp_dir.path())
        .with_receive_timeout(Duration::from_millis(10))
        .with_heartbeat_timeout(Duration::from_secs(3));
    let db = StatusDatabase::new(config).unwrap();
    let dispatcher = Dispatcher::new(db, hub.register(SDB_ID), DisabledRecovery);
    Server::new(dispatcher, clock.clone())
}

#[test]
fn test_run_stops_on_shutdown() {
    let temp_dir = TempDir::new().unwrap();
    let hub = ChannelHub::new();
    let clock = ManualClock::default();
    let mut server = server(&temp_dir, &hub, &clock);

    let mcp = hub.register(MCP_ID);
    mcp.send(SDB_ID, &Message::command(MCP_ID, SDB_ID, Service::Shutdown, 1, Vec::new()))
        .unwrap();
    server.run();

    assert_eq!(mcp.drain()[0].class, MessageClass::Ack);
    assert_eq!(server.dispatcher().db().state(), ProcState::Okay);
    assert!(server.dispatcher().db().archive().open_hours().is_empty());
}

#[test]
fn test_missing_heartbeats_enter_safe() {
    let temp_dir = TempDir::new().unwrap();
    let hub = ChannelHub::new();
    let clock = ManualClock::default();
    let mut server = server(&temp_dir, &hub, &clock);
    let chb = hub.register(CHB_ID);

    assert_eq!(server.run_once().unwrap(), Control::Continue);
    assert_eq!(server.dispatcher().db().state(), ProcState::Okay);

    clock.set(2);
    chb.send(SDB_ID, &Message::command(CHB_ID, SDB_ID, Service::Heartbeat, 1, Vec::new()))
        .unwrap();
    server.run_once().unwrap();
    assert_eq!(chb.drain().len(), 1);

    clock.set(5);
    server.run_once().unwrap();
    assert_eq!(server.dispatcher().db().state(), ProcState::Okay);

    clock.set(6);
    server.run_once().unwrap();
    assert_eq!(server.dispatcher().db().state(), ProcState::Safe);
}

#[test]
fn test_receive_failure_is_counted() {
    let temp_dir = TempDir::new().unwrap();
    let hub = ChannelHub::new();
    let clock = ManualClock::default();
    let mut server = server(&temp_dir, &hub, &clock);

    hub.unregister(SDB_ID);
    assert!(server.run_once().is_err());
    assert_eq!(
        server.dispatcher().db().counters().get(TaskDatum::QtyErrors),
        1
    );
}

#[test]
#[cfg(unix)]
fn test_loop_reaps_finished_recovery_processes() {
    let temp_dir = TempDir::new().unwrap();
    let hub = ChannelHub::new();
    let clock = ManualClock::default();
    let config = SdbConfig::new(temp_dir.path())
        .with_file_store(false)
        .with_receive_timeout(Duration::from_millis(10))
        .with_recovery_program(Some(PathBuf::from("/bin/true")));
    let db = StatusDatabase::new(config).unwrap();
    let recovery = ProcessRecovery::from_config(db.config());
    let dispatcher = Dispatcher::new(db, hub.register(SDB_ID), recovery);
    let mut server = Server::new(dispatcher, clock.clone());

    let client = hub.register(7);
    let window = MultiRequest::new(Key::new(7, 1), 0, Timestamp::ZERO, Timestamp::ZERO);
    for seq in 0..3 {
        let message = Message::command(7, SDB_ID, Service::RetrieveFirst, seq, window.encode_single());
        client.send(SDB_ID, &message).unwrap();
    }
    for _ in 0..3 {
        assert_eq!(server.run_once().unwrap(), Control::Continue);
    }
    assert!(client.drain().is_empty());

    let running = |server: &Server<ChannelTransport, Option<ProcessRecovery>, ManualClock>| {
        server
            .dispatcher()
            .recovery()
            .as_ref()
            .map(ProcessRecovery::running)
            .unwrap_or(0)
    };
    let deadline = Instant::now() + Duration::from_secs(5);
    while running(&server) > 0 && Instant::now() < deadline {
        server.run_once().unwrap();
    }
    assert_eq!(running(&server), 0);
}
