//! Latest-value, windowed block and delegated historical retrieval.

use crate::engine::{StatusDatabase, TaskDatum};
use crate::error::{Result, SdbError};
use crate::recovery::{RecoveryBackend, RecoveryRequest};
use crate::store::{Datum, Definition, Event, Key};
use crate::wire::{MultiRequest, RetrievedBlock, MAX_REPLY_SIZE};
use tracing::debug;

/// Handling of missing keys in a latest-value retrieve.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetrieveMode {
    /// Any missing key fails the whole request.
    Strict,
    /// Missing keys are returned with INVALID units and zero time/value.
    Robust,
}

/// Walks the history newest to oldest, skipping events after the window
/// and stopping at the first event before it.
fn walk_window<'a>(
    defn: &'a Definition,
    request: &'a MultiRequest,
) -> impl Iterator<Item = &'a Event> + 'a {
    defn.history()
        .newest_first()
        .skip_while(move |event| request.is_after(event.timestamp))
        .take_while(move |event| !request.is_before(event.timestamp))
}

fn count_in_window(defn: &Definition, request: &MultiRequest) -> usize {
    let walk = walk_window(defn, request);
    match request.limit() {
        Some(limit) => walk.take(limit).count(),
        None => walk.count(),
    }
}

impl StatusDatabase {
    /// Returns the newest value of `key`.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::UnknownDefinition`] for a key never seen before;
    /// a placeholder is installed so that later lookups report
    /// [`SdbError::NoValues`] instead.
    pub fn latest(&mut self, key: Key) -> Result<Datum> {
        let (_, installed) = self.index.lookup_or_install(key)?;
        if installed {
            self.counters
                .set(TaskDatum::QtyDefns, self.index.len() as i32);
            return Err(SdbError::UnknownDefinition {
                source_id: key.source,
                datum_id: key.datum,
            });
        }

        let no_values = || SdbError::NoValues {
            source_id: key.source,
            datum_id: key.datum,
        };
        let defn = self.index.lookup(key).ok_or_else(no_values)?;
        let newest = defn.history().newest().ok_or_else(no_values)?;
        Ok(Datum::new(
            key.source,
            key.datum,
            defn.units,
            newest.timestamp,
            newest.value,
        ))
    }

    /// Returns the newest value of every key in `keys`, in request order.
    pub fn retrieve(&mut self, keys: &[Key], mode: RetrieveMode) -> Result<Vec<Datum>> {
        let mut datums = Vec::new();
        datums
            .try_reserve_exact(keys.len())
            .map_err(|_| SdbError::OutOfMemory)?;

        for key in keys {
            match self.latest(*key) {
                Ok(datum) => datums.push(datum),
                Err(err) if mode == RetrieveMode::Robust => {
                    debug!(
                        "Robust retrieve substitutes ({:#x}, {:#x}): {}",
                        key.source, key.datum, err
                    );
                    datums.push(Datum::invalid(*key));
                }
                Err(err) => return Err(err),
            }
        }
        Ok(datums)
    }

    /// Returns the events of each requested key inside its window, newest first.
    ///
    /// The reply size is computed before any block is assembled.
    ///
    /// # Errors
    ///
    /// - [`SdbError::UnknownDefinition`] if any key is not installed.
    /// - [`SdbError::BufferOverflow`] if the encoded reply would exceed
    ///   [`MAX_REPLY_SIZE`].
    /// - [`SdbError::OutOfMemory`] if the reply cannot be reserved.
    pub fn multi_retrieve(&self, requests: &[MultiRequest]) -> Result<Vec<RetrievedBlock>> {
        let mut size = 4usize;
        let mut matches = Vec::with_capacity(requests.len());
        for request in requests {
            let defn = self.lookup_known(request.key)?;
            let count = count_in_window(defn, request);
            size += RetrievedBlock::encoded_len(count);
            matches.push(count);
        }
        if size > MAX_REPLY_SIZE {
            return Err(SdbError::BufferOverflow {
                required: size,
                capacity: MAX_REPLY_SIZE,
            });
        }

        let mut blocks = Vec::new();
        blocks
            .try_reserve_exact(requests.len())
            .map_err(|_| SdbError::OutOfMemory)?;
        for (request, count) in requests.iter().zip(matches) {
            let defn = self.lookup_known(request.key)?;
            let mut events = Vec::new();
            events
                .try_reserve_exact(count)
                .map_err(|_| SdbError::OutOfMemory)?;
            events.extend(walk_window(defn, request).take(count).copied());
            blocks.push(RetrievedBlock {
                source: defn.source,
                datum: defn.datum,
                units: defn.units,
                events,
            });
        }
        Ok(blocks)
    }

    /// Echoes each request with `max_count` replaced by the number of stored events.
    ///
    /// Unbounded requests count the whole history; bounded ones count the
    /// events a block retrieve of the same window would walk.
    pub fn count_measurements(&self, requests: &[MultiRequest]) -> Result<Vec<MultiRequest>> {
        requests
            .iter()
            .map(|request| {
                let defn = self.lookup_known(request.key)?;
                let stored = if request.is_unbounded() {
                    defn.num_data()
                } else {
                    walk_window(defn, request).count()
                };
                Ok(MultiRequest {
                    max_count: stored as u32,
                    ..*request
                })
            })
            .collect()
    }

    /// Hands a deep historical read to `backend`.
    ///
    /// `payload` must be a single 28-byte window request; it is forwarded
    /// unchanged and the backend replies to `requester` directly.
    pub fn recover_history<R: RecoveryBackend + ?Sized>(
        &self,
        backend: &mut R,
        requester: u32,
        payload: &[u8],
        seq_num: u32,
        last: bool,
    ) -> Result<()> {
        let request = MultiRequest::decode_single(payload)?;
        debug!(
            "Delegating {} history of ({:#x}, {:#x}) for {}",
            if last { "last" } else { "first" },
            request.key.source,
            request.key.datum,
            requester
        );
        backend.submit(&RecoveryRequest::new(
            requester,
            payload.to_vec(),
            seq_num,
            last,
        ))
    }

    fn lookup_known(&self, key: Key) -> Result<&Definition> {
        self.index.lookup(key).ok_or(SdbError::UnknownDefinition {
            source_id: key.source,
            datum_id: key.datum,
        })
    }
}
