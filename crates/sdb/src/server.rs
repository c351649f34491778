//! Single-threaded receive / dispatch / tick loop.

use crate::dispatch::{Control, Dispatcher};
use crate::engine::TaskDatum;
use crate::error::Result;
use crate::recovery::RecoveryBackend;
use crate::store::Timestamp;
use crate::transport::Transport;
use tracing::{debug, error, info};

/// Source of the current time.
pub trait Clock {
    /// Returns the current time.
    fn now(&self) -> Timestamp;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        Timestamp::now()
    }
}

/// Server loop around a [`Dispatcher`].
///
/// # Examples
/// ```rust,ignore
/// let hub = ChannelHub::new();
/// let db = StatusDatabase::new(config)?;
/// let mut server = Server::new(Dispatcher::new(db, hub.register(10), DisabledRecovery), SystemClock);
/// server.run();
/// ```
pub struct Server<T: Transport, R: RecoveryBackend, C: Clock = SystemClock> {
    dispatcher: Dispatcher<T, R>,
    clock: C,
    started: bool,
}

impl<T: Transport, R: RecoveryBackend, C: Clock> Server<T, R, C> {
    /// Creates a server; the engine is started on the first iteration.
    pub fn new(dispatcher: Dispatcher<T, R>, clock: C) -> Self {
        Self {
            dispatcher,
            clock,
            started: false,
        }
    }

    /// Returns the dispatcher.
    pub fn dispatcher(&self) -> &Dispatcher<T, R> {
        &self.dispatcher
    }

    /// Returns the dispatcher for mutation.
    pub fn dispatcher_mut(&mut self) -> &mut Dispatcher<T, R> {
        &mut self.dispatcher
    }

    /// Returns the clock.
    pub fn clock(&self) -> &C {
        &self.clock
    }

    /// Starts the engine if it has not been started.
    pub fn start(&mut self) {
        if !self.started {
            let now = self.clock.now();
            self.dispatcher.db_mut().start(now);
            self.started = true;
        }
    }

    /// Receives at most one message, dispatches it, runs the periodic tick
    /// and reaps finished recovery processes.
    ///
    /// # Errors
    ///
    /// Returns the transport error if receiving failed; it has already
    /// been counted as a failed request.
    pub fn run_once(&mut self) -> Result<Control> {
        self.start();
        let timeout = self.dispatcher.db().config().receive_timeout;

        let received = self.dispatcher.transport().receive(timeout);
        let control = match received {
            Ok(Some(delivery)) => {
                let now = self.clock.now();
                self.dispatcher.dispatch(&delivery, now)
            }
            Ok(None) => Control::Continue,
            Err(err) => {
                self.dispatcher
                    .db()
                    .counters()
                    .increment(TaskDatum::QtyErrors);
                let now = self.clock.now();
                self.dispatcher.db_mut().tick(now);
                return Err(err);
            }
        };

        if control == Control::Continue {
            let now = self.clock.now();
            self.dispatcher.db_mut().tick(now);
        }
        let reaped = self.dispatcher.recovery_mut().reap();
        if reaped > 0 {
            debug!("Reaped {} recovery processes", reaped);
        }
        Ok(control)
    }

    /// Serves until SHUTDOWN is processed.
    pub fn run(&mut self) {
        info!(
            "Serving as {:#x}",
            self.dispatcher.db().config().own_id
        );
        loop {
            match self.run_once() {
                Ok(Control::Shutdown) => break,
                Ok(Control::Continue) => {}
                Err(err) => error!("Receive failed: {:?}", err),
            }
        }
        info!("Server loop stopped");
    }
}
