//! Hand-off of deep historical reads to an external recovery process.
//!
//! The recovery process scans archived hour files and replies to the
//! requester directly; the engine only builds its invocation and
//! collects the exit status of finished children.

use crate::config::SdbConfig;
use crate::error::{Result, SdbError};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, error, info};

/// Default recovery program name.
pub const DEFAULT_RECOVERY_PROGRAM: &str = "Sfr";

/// A delegated historical read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecoveryRequest {
    /// Process that asked for the data and will receive the reply.
    pub requester: u32,
    /// Raw request bytes, forwarded unchanged.
    pub payload: Vec<u8>,
    /// Sequence number of the original request.
    pub seq_num: u32,
    /// True to scan from the newest record backwards.
    pub last: bool,
}

impl RecoveryRequest {
    /// Creates a request.
    pub fn new(requester: u32, payload: Vec<u8>, seq_num: u32, last: bool) -> Self {
        Self {
            requester,
            payload,
            seq_num,
            last,
        }
    }

    /// Builds the positional argument vector, starting with `program`.
    ///
    /// # Examples
    /// ```rust,ignore
    /// let request = RecoveryRequest::new(7, vec![0xab, 0x01], 3, false);
    /// assert_eq!(request.argv("Sfr")[10], "ab01");
    /// ```
    pub fn argv(&self, program: &str) -> Vec<String> {
        vec![
            program.to_string(),
            "-quiet".to_string(),
            "-syslog".to_string(),
            "-debug".to_string(),
            "5".to_string(),
            "-prio".to_string(),
            "9".to_string(),
            "-sendto".to_string(),
            self.requester.to_string(),
            "-request".to_string(),
            hex::encode(&self.payload),
            "-seqnum".to_string(),
            self.seq_num.to_string(),
            "-last".to_string(),
            if self.last { "1" } else { "0" }.to_string(),
        ]
    }
}

/// Executor of delegated historical reads.
pub trait RecoveryBackend {
    /// Starts `request` without waiting for it to complete.
    fn submit(&mut self, request: &RecoveryRequest) -> Result<()>;

    /// Collects finished work, returning how many runs were collected.
    fn reap(&mut self) -> usize {
        0
    }
}

/// A missing backend rejects every request.
impl<R: RecoveryBackend> RecoveryBackend for Option<R> {
    fn submit(&mut self, request: &RecoveryRequest) -> Result<()> {
        match self {
            Some(backend) => backend.submit(request),
            None => DisabledRecovery.submit(request),
        }
    }

    fn reap(&mut self) -> usize {
        self.as_mut().map(|backend| backend.reap()).unwrap_or(0)
    }
}

/// Spawns the recovery program as a child process and reaps it once it exits.
#[derive(Debug)]
pub struct ProcessRecovery {
    program: PathBuf,
    children: Vec<Child>,
}

impl Default for ProcessRecovery {
    fn default() -> Self {
        Self::new(DEFAULT_RECOVERY_PROGRAM)
    }
}

impl ProcessRecovery {
    /// Creates a backend running `program`.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            children: Vec::new(),
        }
    }

    /// Creates the backend named by `config.recovery_program`.
    ///
    /// # Returns
    ///
    /// `None` when recovery is disabled; the `Option` is itself a backend
    /// that rejects every request.
    pub fn from_config(config: &SdbConfig) -> Option<Self> {
        config.recovery_program.as_ref().map(Self::new)
    }

    /// Returns the program path.
    pub fn program(&self) -> &PathBuf {
        &self.program
    }

    /// Returns the number of spawned children not yet reaped.
    pub fn running(&self) -> usize {
        self.children.len()
    }
}

impl RecoveryBackend for ProcessRecovery {
    fn submit(&mut self, request: &RecoveryRequest) -> Result<()> {
        self.reap();
        let program = self.program.to_string_lossy();
        let argv = request.argv(&program);
        let child = Command::new(&self.program)
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(SdbError::SpawnFailed)?;
        info!(
            "Spawned recovery process {} for requester {} (seq {})",
            child.id(),
            request.requester,
            request.seq_num
        );
        self.children.push(child);
        Ok(())
    }

    fn reap(&mut self) -> usize {
        let before = self.children.len();
        self.children.retain_mut(|child| match child.try_wait() {
            Ok(Some(status)) => {
                debug!("Recovery process {} exited: {}", child.id(), status);
                false
            }
            Ok(None) => true,
            Err(err) => {
                error!("Failed to poll recovery process {}: {:?}", child.id(), err);
                false
            }
        });
        before - self.children.len()
    }
}

/// Backend used when historical recovery is not available.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRecovery;

impl RecoveryBackend for DisabledRecovery {
    fn submit(&mut self, request: &RecoveryRequest) -> Result<()> {
        debug!(
            "Recovery disabled, rejecting request from {}",
            request.requester
        );
        Err(SdbError::RecoveryUnavailable)
    }
}
