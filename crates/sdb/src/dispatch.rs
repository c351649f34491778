//! Request validation, routing and replies.
//!
//! ```text
//! Delivery ─▶ envelope check ──fail──▶ QTY_ERRORS (no reply)
//!                 │
//!                 ▼
//!           route(service) ──Err──▶ QTY_ERRORS + Error reply (except post)
//!                 │
//!                 ▼
//!          service counter + reply
//! ```

use crate::engine::{RetrieveMode, StatusDatabase, TaskDatum};
use crate::error::{Result, SdbError};
use crate::recovery::RecoveryBackend;
use crate::store::Timestamp;
use crate::transport::{Delivery, Transport};
use crate::wire::{
    decode_datums, decode_keys, decode_multi_requests, decode_source, encode_blocks,
    encode_count, encode_datums, encode_ids, encode_multi_requests, encode_state, expect_empty, ClearRequest,
    Message, MessageClass, Service,
};
use tracing::{debug, error, warn};

/// What the server loop should do after a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Keep serving.
    Continue,
    /// Stop the loop.
    Shutdown,
}

impl Service {
    /// Returns the counter incremented when this service succeeds.
    pub fn counter(self) -> TaskDatum {
        match self {
            Service::Heartbeat => TaskDatum::QtyHbeat,
            Service::Shutdown
            | Service::SafeState
            | Service::Activate
            | Service::Purge
            | Service::ClearSource
            | Service::ClearData => TaskDatum::QtyMisc,
            Service::Submit1 | Service::SubmitN | Service::Submit1Post => TaskDatum::QtySubmitted,
            Service::Retrieve1
            | Service::RetrieveN
            | Service::Retrieve1Robust
            | Service::RetrieveFirst
            | Service::RetrieveLast => TaskDatum::QtyRetrieved,
            Service::ListSources | Service::ListData => TaskDatum::QtyList,
            Service::CountSources | Service::CountData | Service::CountMeasurements => {
                TaskDatum::QtyCount
            }
        }
    }
}

/// Routes validated requests to a [`StatusDatabase`] and replies through a transport.
pub struct Dispatcher<T: Transport, R: RecoveryBackend> {
    db: StatusDatabase,
    transport: T,
    recovery: R,
}

impl<T: Transport, R: RecoveryBackend> Dispatcher<T, R> {
    /// Creates a dispatcher.
    pub fn new(db: StatusDatabase, transport: T, recovery: R) -> Self {
        Self {
            db,
            transport,
            recovery,
        }
    }

    /// Returns the database.
    pub fn db(&self) -> &StatusDatabase {
        &self.db
    }

    /// Returns the database for mutation.
    pub fn db_mut(&mut self) -> &mut StatusDatabase {
        &mut self.db
    }

    /// Returns the transport.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Returns the recovery backend.
    pub fn recovery(&self) -> &R {
        &self.recovery
    }

    /// Returns the recovery backend for mutation.
    pub fn recovery_mut(&mut self) -> &mut R {
        &mut self.recovery
    }

    /// Checks source range, destination and class of a request.
    pub fn validate_envelope(&self, message: &Message) -> Result<()> {
        let config = self.db.config();
        if message.source == 0 || message.source >= config.source_id_limit {
            return Err(SdbError::SourceUnknown(message.source));
        }
        if message.dest != config.own_id {
            return Err(SdbError::WrongDestination(message.dest));
        }
        if message.class != MessageClass::Command {
            return Err(SdbError::NotCommand(message.class.as_u32()));
        }
        Ok(())
    }

    /// Handles one delivery. Every outcome increments exactly one counter.
    pub fn dispatch(&mut self, delivery: &Delivery, now: Timestamp) -> Control {
        let message = &delivery.message;
        if let Err(err) = self.validate_envelope(message) {
            warn!(
                "Rejected message from {:#x} via {:#x}: {}",
                message.source, delivery.deliverer, err
            );
            self.db.counters().increment(TaskDatum::QtyErrors);
            return Control::Continue;
        }

        let service = message.service();
        match self.route(delivery, service, now) {
            Ok(control) => {
                if let Some(service) = service {
                    self.db.counters().increment(service.counter());
                }
                control
            }
            Err(err) => {
                self.db.counters().increment(TaskDatum::QtyErrors);
                debug!(
                    "Service {:#x} from {:#x} failed: {}",
                    message.service, message.source, err
                );
                if service != Some(Service::Submit1Post) {
                    self.reply(message.error(err.status()));
                }
                Control::Continue
            }
        }
    }

    fn route(&mut self, delivery: &Delivery, service: Option<Service>, now: Timestamp) -> Result<Control> {
        let message = &delivery.message;
        let payload = message.payload.as_slice();
        let service = service.ok_or(SdbError::UnknownService(message.service))?;

        match service {
            Service::Heartbeat => {
                let chb = self.db.config().heartbeat_source;
                if message.source != chb || delivery.deliverer != chb {
                    return Err(SdbError::WrongSource {
                        source_id: message.source,
                        deliverer: delivery.deliverer,
                    });
                }
                if !payload.is_empty() {
                    return Err(SdbError::General("heartbeat carries a payload".into()));
                }
                self.reply(message.response(encode_state(self.db.state().as_u32())));
                self.db.heartbeat(now);
            }
            Service::SafeState => {
                self.authorize_controller(message)?;
                self.reply(message.act());
                self.db.go_safe(now);
                self.reply(message.com(encode_state(self.db.state().as_u32())));
            }
            Service::Activate => {
                self.authorize_controller(message)?;
                self.reply(message.act());
                self.db.activate(now);
                self.reply(message.com(encode_state(self.db.state().as_u32())));
            }
            Service::Shutdown => {
                self.authorize_controller(message)?;
                self.db.shutdown();
                self.reply(message.ack());
                return Ok(Control::Shutdown);
            }
            Service::Purge => {
                return Err(SdbError::General("purge is not supported".into()));
            }
            Service::Submit1 | Service::SubmitN => {
                self.db.submit(&decode_datums(payload)?)?;
                self.reply(message.ack());
            }
            Service::Submit1Post => {
                self.db.submit(&decode_datums(payload)?)?;
            }
            Service::Retrieve1 | Service::Retrieve1Robust => {
                let mode = if service == Service::Retrieve1 {
                    RetrieveMode::Strict
                } else {
                    RetrieveMode::Robust
                };
                let datums = self.db.retrieve(&decode_keys(payload)?, mode)?;
                self.reply(message.response(encode_datums(&datums)?));
            }
            Service::RetrieveN => {
                let blocks = self.db.multi_retrieve(&decode_multi_requests(payload)?)?;
                self.reply(message.response(encode_blocks(&blocks)?));
            }
            Service::RetrieveFirst | Service::RetrieveLast => {
                let last = service == Service::RetrieveLast;
                self.db.recover_history(
                    &mut self.recovery,
                    message.source,
                    payload,
                    message.seq_num,
                    last,
                )?;
            }
            Service::ListSources => {
                expect_empty(payload)?;
                let sources = self.db.list_sources()?;
                self.reply(message.response(encode_ids(&sources)?));
            }
            Service::ListData => {
                let datums = self.db.list_data(decode_source(payload)?)?;
                self.reply(message.response(encode_ids(&datums)?));
            }
            Service::CountSources => {
                expect_empty(payload)?;
                let count = self.db.count_sources()?;
                self.reply(message.response(encode_count(count)));
            }
            Service::CountData => {
                let count = self.db.count_data(decode_source(payload)?)?;
                self.reply(message.response(encode_count(count)));
            }
            Service::CountMeasurements => {
                let counted = self
                    .db
                    .count_measurements(&decode_multi_requests(payload)?)?;
                self.reply(message.response(encode_multi_requests(&counted)?));
            }
            Service::ClearSource => {
                self.db
                    .clear_source(message.source, &ClearRequest::decode(payload)?)?;
                self.reply(message.ack());
            }
            Service::ClearData => {
                self.db
                    .clear_data(message.source, &ClearRequest::decode(payload)?)?;
                self.reply(message.ack());
            }
        }
        Ok(Control::Continue)
    }

    fn authorize_controller(&self, message: &Message) -> Result<()> {
        let controller = self.db.config().controller_id;
        if message.source != controller {
            return Err(SdbError::NotAuthorized {
                requester: message.source,
                source_id: controller,
            });
        }
        Ok(())
    }

    fn reply(&self, reply: Message) {
        if let Err(err) = self.transport.send(reply.dest, &reply) {
            error!(
                "Reply to {:#x} for service {:#x} failed: {:?}",
                reply.dest, reply.service, err
            );
        }
    }
}
