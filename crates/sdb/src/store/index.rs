//! Fixed-size hash table mapping keys to definitions.
//!
//! ```text
//! hash(source, datum) = (source + 31 * datum) mod 101
//!
//! bucket[0]  → Definition → Definition
//! bucket[1]  → (empty)
//! ...
//! bucket[100]→ Definition
//! ```
//!
//! New definitions are prepended to their bucket chain. Definitions are
//! never removed.

use crate::error::{Result, SdbError};
use crate::store::{DatumId, Definition, Key, SourceId, HIST_LIMIT};
use std::collections::VecDeque;
use tracing::debug;

/// Number of buckets in the hash table.
pub const HASH_TABLE_SIZE: usize = 101;

/// Multiplier applied to the datum identifier when hashing.
pub const HASH_MULTIPLIER: u32 = 31;

/// Computes the bucket of a key.
pub fn hash(source: SourceId, datum: DatumId) -> usize {
    (source.wrapping_add(HASH_MULTIPLIER.wrapping_mul(datum)) % HASH_TABLE_SIZE as u32) as usize
}

/// Hash-indexed table of definitions with chained buckets.
#[derive(Debug, Clone)]
pub struct KeyIndex {
    buckets: Vec<VecDeque<Definition>>,
    len: usize,
    history_limit: usize,
}

impl Default for KeyIndex {
    fn default() -> Self {
        Self::new(HIST_LIMIT)
    }
}

impl KeyIndex {
    /// Creates an empty index whose definitions hold at most `history_limit` events.
    pub fn new(history_limit: usize) -> Self {
        Self {
            buckets: (0..HASH_TABLE_SIZE).map(|_| VecDeque::new()).collect(),
            len: 0,
            history_limit,
        }
    }

    /// Returns the number of installed definitions.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns true if no definitions are installed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the history limit applied to new definitions.
    pub fn history_limit(&self) -> usize {
        self.history_limit
    }

    /// Finds the definition for `key`.
    pub fn lookup(&self, key: Key) -> Option<&Definition> {
        self.buckets[hash(key.source, key.datum)]
            .iter()
            .find(|defn| defn.source == key.source && defn.datum == key.datum)
    }

    /// Finds the definition for `key` for mutation.
    pub fn lookup_mut(&mut self, key: Key) -> Option<&mut Definition> {
        self.buckets[hash(key.source, key.datum)]
            .iter_mut()
            .find(|defn| defn.source == key.source && defn.datum == key.datum)
    }

    /// Installs an empty definition for `key` at the head of its bucket.
    ///
    /// If `key` is already installed the existing definition is returned
    /// unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::OutOfMemory`] if the bucket cannot grow.
    pub fn install(&mut self, key: Key) -> Result<&mut Definition> {
        Ok(self.lookup_or_install(key)?.0)
    }

    /// Finds the definition for `key`, installing an empty one on a miss.
    ///
    /// # Returns
    ///
    /// The definition and `true` if it was newly installed.
    pub fn lookup_or_install(&mut self, key: Key) -> Result<(&mut Definition, bool)> {
        let bucket = hash(key.source, key.datum);
        let found = self.buckets[bucket]
            .iter()
            .position(|defn| defn.source == key.source && defn.datum == key.datum);

        match found {
            Some(pos) => Ok((&mut self.buckets[bucket][pos], false)),
            None => {
                let chain = &mut self.buckets[bucket];
                chain.try_reserve(1).map_err(|_| SdbError::OutOfMemory)?;
                chain.push_front(Definition::new(key, self.history_limit));
                self.len += 1;
                debug!(
                    "Installed definition ({:#x}, {:#x}) in bucket {}",
                    key.source, key.datum, bucket
                );
                Ok((&mut chain[0], true))
            }
        }
    }

    /// Iterates all definitions in bucket order.
    pub fn iter(&self) -> impl Iterator<Item = &Definition> {
        self.buckets.iter().flat_map(|chain| chain.iter())
    }

    /// Iterates all definitions in bucket order for mutation.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Definition> {
        self.buckets.iter_mut().flat_map(|chain| chain.iter_mut())
    }

    /// Returns the keys of every definition matching `predicate`.
    pub fn keys_where<F>(&self, mut predicate: F) -> Vec<Key>
    where
        F: FnMut(&Definition) -> bool,
    {
        self.iter()
            .filter(|defn| predicate(defn))
            .map(Definition::key)
            .collect()
    }
}
