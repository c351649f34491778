//! Clear services: empty the histories of a source's keys.
//!
//! Cleared definitions stay resident; only their events are dropped.

use crate::engine::{StatusDatabase, TaskDatum};
use crate::error::{Result, SdbError};
use crate::store::{DatumId, Definition, Key, SourceId};
use crate::wire::ClearRequest;
use tracing::{error, info};

impl StatusDatabase {
    /// Clears every key of `request.source` except the listed datums.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::NotAuthorized`] unless `requester` is the source
    /// itself or the controller.
    ///
    /// # Returns
    ///
    /// The number of keys cleared.
    pub fn clear_source(&mut self, requester: u32, request: &ClearRequest) -> Result<usize> {
        self.clear_where(requester, request.source, |datum| {
            !request.datums.contains(&datum)
        })
    }

    /// Clears only the listed datums of `request.source`.
    pub fn clear_data(&mut self, requester: u32, request: &ClearRequest) -> Result<usize> {
        self.clear_where(requester, request.source, |datum| {
            request.datums.contains(&datum)
        })
    }

    fn clear_where<F>(&mut self, requester: u32, source: SourceId, select: F) -> Result<usize>
    where
        F: Fn(DatumId) -> bool,
    {
        if requester != source && requester != self.config.controller_id {
            return Err(SdbError::NotAuthorized {
                requester,
                source_id: source,
            });
        }

        let keys = self
            .index
            .keys_where(|defn| defn.source == source && defn.has_data() && select(defn.datum));
        for key in &keys {
            self.clear_key(*key);
        }
        info!(
            "Cleared {} keys of source {:#x} for {:#x}",
            keys.len(),
            source,
            requester
        );
        Ok(keys.len())
    }

    fn clear_key(&mut self, key: Key) {
        let pending = self
            .index
            .lookup(key)
            .map(Definition::is_pending)
            .unwrap_or(false);
        if pending && self.is_archiving() {
            if let Err(err) = self.store_data(key, true) {
                error!(
                    "Flush before clear failed for ({:#x}, {:#x}): {:?}",
                    key.source, key.datum, err
                );
            }
        }

        let limit = self.index.history_limit();
        let (was_full, removed) = match self.index.lookup_mut(key) {
            Some(defn) => {
                let was_full = defn.num_data() >= limit;
                let removed = defn.history_mut().clear();
                defn.value_recorded = false;
                (was_full, removed)
            }
            None => return,
        };
        if was_full {
            self.counters.add(TaskDatum::QtyHistLim, -1);
        }
        self.counters
            .add(TaskDatum::TotVolatileData, -(removed as i32));
    }
}
