//! Directory services: distinct sources and datums and their counts.
//!
//! Placeholders (definitions without events) are invisible here.

use crate::engine::StatusDatabase;
use crate::error::{Result, SdbError};
use crate::store::{DatumId, Definition, SourceId};
use crate::wire::MAX_IDS;

impl StatusDatabase {
    fn distinct<F>(&self, select: F) -> Result<Vec<u32>>
    where
        F: Fn(&Definition) -> Option<u32>,
    {
        let mut ids: Vec<u32> = Vec::new();
        for id in self
            .index
            .iter()
            .filter(|defn| defn.has_data())
            .filter_map(|defn| select(defn))
        {
            if ids.contains(&id) {
                continue;
            }
            if ids.len() >= MAX_IDS {
                return Err(SdbError::TooManyIds(MAX_IDS));
            }
            ids.push(id);
        }
        Ok(ids)
    }

    /// Lists every source holding data, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`SdbError::TooManyIds`] past [`MAX_IDS`] distinct sources.
    pub fn list_sources(&self) -> Result<Vec<SourceId>> {
        let mut sources = self.distinct(|defn| Some(defn.source))?;
        sources.sort_unstable();
        Ok(sources)
    }

    /// Lists every datum of `source` holding data, ascending.
    pub fn list_data(&self, source: SourceId) -> Result<Vec<DatumId>> {
        let mut datums = self.distinct(|defn| (defn.source == source).then_some(defn.datum))?;
        datums.sort_unstable();
        Ok(datums)
    }

    /// Counts the sources holding data.
    pub fn count_sources(&self) -> Result<usize> {
        Ok(self.distinct(|defn| Some(defn.source))?.len())
    }

    /// Counts the datums of `source` holding data.
    pub fn count_data(&self, source: SourceId) -> Result<usize> {
        Ok(self
            .distinct(|defn| (defn.source == source).then_some(defn.datum))?
            .len())
    }
}
