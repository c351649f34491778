//! Alopex SDB - status database for a distributed real-time control system.
//!
//! Client processes submit timestamped telemetry keyed by (source, datum)
//! pairs; other processes read the latest value, bounded histories, or
//! directory and count metadata.
//!
//! # Components
//!
//! - [`store`]: key index, per-key bounded event history, key compaction
//! - [`archive`]: hour-bucketed binary archive files and the units side-file
//! - [`StatusDatabase`]: ingestion, retrieval, directory, clear and lifecycle
//! - [`wire`]: message envelope and big-endian payload codecs
//! - [`Dispatcher`] / [`Server`]: request routing and the serving loop
//!
//! # Example
//!
//! ```rust,ignore
//! use alopex_sdb::{ChannelHub, Dispatcher, ProcessRecovery, SdbConfig, Server, StatusDatabase, SystemClock};
//!
//! let config = SdbConfig::from_file(Path::new("sdb.yaml"))?;
//! alopex_sdb::init_logging(&config.log_level)?;
//!
//! let hub = ChannelHub::new();
//! let transport = hub.register(config.own_id);
//! let recovery = ProcessRecovery::from_config(&config);
//! let db = StatusDatabase::new(config)?;
//!
//! let mut server = Server::new(Dispatcher::new(db, transport, recovery), SystemClock);
//! server.run();
//! ```

#![deny(missing_docs)]

pub mod archive;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod logging;
pub mod recovery;
pub mod server;
pub mod store;
pub mod transport;
pub mod wire;

pub use archive::{ArchiveLayout, ArchiveRecord, ArchiveStore, HourFileReader};
pub use config::SdbConfig;
pub use dispatch::{Control, Dispatcher};
pub use engine::{ProcState, RetrieveMode, StatusDatabase, TaskDatum};
pub use error::{Result, SdbError, SdbStatus};
pub use logging::init_logging;
pub use recovery::{DisabledRecovery, ProcessRecovery, RecoveryBackend, RecoveryRequest};
pub use server::{Clock, Server, SystemClock};
pub use store::{Datum, DatumId, Event, InsertPolicy, Key, SourceId, Timestamp, Units};
pub use transport::{ChannelHub, ChannelTransport, Delivery, Transport};
pub use wire::{Message, MessageClass, MultiRequest, Service};
