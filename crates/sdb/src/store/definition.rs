//! Per-key definition record.

use crate::store::{DatumId, EventHistory, Key, SourceId, Units};

/// Metadata for one telemetry channel plus ownership of its history.
#[derive(Debug, Clone)]
pub struct Definition {
    /// Source identifier.
    pub source: SourceId,
    /// Datum identifier.
    pub datum: DatumId,
    /// Units of the most recent submission.
    pub units: Units,
    /// True once this key's units have been written to the units side-file.
    pub units_recorded: bool,
    /// Hour (epoch seconds) of the archive file last written for this key.
    pub file_hour: Option<i32>,
    /// True if the last submitted value has been archived.
    pub value_recorded: bool,
    history: EventHistory,
}

impl Definition {
    /// Creates an empty definition whose history holds at most `history_limit` events.
    pub fn new(key: Key, history_limit: usize) -> Self {
        Self {
            source: key.source,
            datum: key.datum,
            units: 0,
            units_recorded: false,
            file_hour: None,
            value_recorded: false,
            history: EventHistory::new(history_limit),
        }
    }

    /// Returns the key of this definition.
    pub fn key(&self) -> Key {
        Key::new(self.source, self.datum)
    }

    /// Returns the event history.
    pub fn history(&self) -> &EventHistory {
        &self.history
    }

    /// Returns the event history for mutation.
    pub fn history_mut(&mut self) -> &mut EventHistory {
        &mut self.history
    }

    /// Returns the number of stored events.
    pub fn num_data(&self) -> usize {
        self.history.len()
    }

    /// Returns true if at least one event is stored.
    ///
    /// Definitions without events are placeholders left by failed lookups
    /// or by clear operations.
    pub fn has_data(&self) -> bool {
        !self.history.is_empty()
    }

    /// Returns true if the last submitted value has not been archived.
    pub fn is_pending(&self) -> bool {
        self.has_data() && !self.value_recorded
    }

    /// Returns true if the unarchived last submitted value falls within `hour`.
    pub fn is_pending_in_hour(&self, hour: i32) -> bool {
        self.is_pending()
            && self
                .history
                .last_submitted()
                .map(|event| event.timestamp.hour_start() == Some(hour))
                .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Event, InsertPolicy, Timestamp};

    #[test]
    fn test_new_definition_is_placeholder() {
        let defn = Definition::new(Key::new(3, 4), 10);
        assert_eq!(defn.key(), Key::new(3, 4));
        assert!(!defn.has_data());
        assert!(!defn.is_pending());
        assert_eq!(defn.file_hour, None);
    }

    #[test]
    fn test_pending_in_hour() {
        let mut defn = Definition::new(Key::new(1, 1), 10);
        defn.history_mut()
            .push(Event::new(Timestamp::from_secs(7300), 5), InsertPolicy::Append)
            .unwrap();

        assert!(defn.is_pending_in_hour(7200));
        assert!(!defn.is_pending_in_hour(3600));

        defn.value_recorded = true;
        assert!(!defn.is_pending_in_hour(7200));
    }
}
