//! Message transport seam and an in-process channel implementation.
//!
//! ```text
//!            ChannelHub (id → Sender<Delivery>)
//!   ┌───────────────┬────────────────┬───────────────┐
//!   │ id 2 (CHB)    │ id 10 (SDB)    │ id 7 (client) │
//!   └──────┬────────┴───────┬────────┴───────┬───────┘
//!          │   send(dest)   │   receive()    │
//!          └──────────────▶ │ ◀──────────────┘
//! ```

use crate::error::{Result, SdbError};
use crate::wire::Message;
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::debug;

/// A received message plus the process that actually delivered it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Process that handed the message to the transport.
    pub deliverer: u32,
    /// The message.
    pub message: Message,
}

/// Send/receive primitives consumed by the server.
pub trait Transport {
    /// Sends `message` to process `dest`.
    fn send(&self, dest: u32, message: &Message) -> Result<()>;

    /// Waits up to `timeout` for the next message; `None` on timeout.
    fn receive(&self, timeout: Duration) -> Result<Option<Delivery>>;
}

/// Registry of in-process endpoints.
#[derive(Debug, Clone, Default)]
pub struct ChannelHub {
    peers: Arc<RwLock<HashMap<u32, Sender<Delivery>>>>,
}

impl ChannelHub {
    /// Creates an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers process `id`, replacing any earlier endpoint with that id.
    pub fn register(&self, id: u32) -> ChannelTransport {
        let (sender, receiver) = unbounded();
        let mut peers = self.peers.write().unwrap_or_else(|err| err.into_inner());
        peers.insert(id, sender);
        debug!("Registered channel endpoint {}", id);
        ChannelTransport {
            id,
            hub: self.clone(),
            receiver,
        }
    }

    /// Removes process `id`.
    pub fn unregister(&self, id: u32) {
        let mut peers = self.peers.write().unwrap_or_else(|err| err.into_inner());
        peers.remove(&id);
    }

    fn deliver(&self, dest: u32, delivery: Delivery) -> Result<()> {
        let peers = self.peers.read().unwrap_or_else(|err| err.into_inner());
        let sender = peers
            .get(&dest)
            .ok_or_else(|| SdbError::Transport(format!("no endpoint {}", dest)))?;
        sender
            .send(delivery)
            .map_err(|err| SdbError::Transport(format!("endpoint {} closed: {}", dest, err)))
    }
}

/// One endpoint of a [`ChannelHub`].
#[derive(Debug)]
pub struct ChannelTransport {
    id: u32,
    hub: ChannelHub,
    receiver: Receiver<Delivery>,
}

impl ChannelTransport {
    /// Returns this endpoint's process id.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Returns the next queued message without waiting.
    pub fn try_receive(&self) -> Option<Delivery> {
        self.receiver.try_recv().ok()
    }

    /// Drains every queued message.
    pub fn drain(&self) -> Vec<Message> {
        self.receiver.try_iter().map(|delivery| delivery.message).collect()
    }
}

impl Transport for ChannelTransport {
    fn send(&self, dest: u32, message: &Message) -> Result<()> {
        self.hub.deliver(
            dest,
            Delivery {
                deliverer: self.id,
                message: message.clone(),
            },
        )
    }

    fn receive(&self, timeout: Duration) -> Result<Option<Delivery>> {
        match self.receiver.recv_timeout(timeout) {
            Ok(delivery) => Ok(Some(delivery)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(SdbError::Transport(format!("endpoint {} disconnected", self.id)))
            }
        }
    }
}
