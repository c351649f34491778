//! Submission and the archive write pipeline.
//!
//! ```text
//! add_data(datum)
//!   ├─ lookup_or_install(key)
//!   ├─ units = datum.units
//!   ├─ history.push(event, policy)       (clips the oldest when full)
//!   └─ if archiving:
//!        store_units ─▶ store_previous ─▶ store_data(force = false)
//! ```
//!
//! A record is written only when the hour changes, the value changes or
//! a flush is forced, so each hour file holds a step function per key.

use crate::archive::ArchiveRecord;
use crate::engine::{StatusDatabase, TaskDatum};
use crate::error::{Result, SdbError};
use crate::store::{Datum, Definition, Key};
use tracing::{debug, error, info};

fn unknown(key: Key) -> SdbError {
    SdbError::UnknownDefinition {
        source_id: key.source,
        datum_id: key.datum,
    }
}

impl StatusDatabase {
    /// Applies a batch of submissions in order.
    ///
    /// # Errors
    ///
    /// The first failing element aborts the batch; earlier elements stay applied.
    ///
    /// # Returns
    ///
    /// The number of datums applied.
    pub fn submit(&mut self, datums: &[Datum]) -> Result<usize> {
        for datum in datums {
            self.add_data(datum)?;
        }
        Ok(datums.len())
    }

    /// Stores one datum, installing its definition on first use.
    ///
    /// Archival failures are logged and counted, never returned.
    pub fn add_data(&mut self, datum: &Datum) -> Result<()> {
        let key = datum.key();
        let policy = self.config.insert_policy;

        let (defn, installed) = self.index.lookup_or_install(key)?;
        defn.units = datum.units;
        let outcome = defn.history_mut().push(datum.event(), policy)?;

        if installed {
            self.counters
                .set(TaskDatum::QtyDefns, self.index.len() as i32);
        }
        self.counters
            .add(TaskDatum::TotVolatileData, 1 - outcome.clipped as i32);
        if outcome.reached_limit {
            self.counters.increment(TaskDatum::QtyHistLim);
        }

        if key.source != self.config.own_id && key.datum == TaskDatum::ProcState.id() {
            info!(
                "Process {:#x} reports state {} at {}",
                key.source, datum.value, datum.timestamp.sec
            );
        }

        if self.is_archiving() {
            let result = self.archive_latest(key);
            self.record_write(key, result);
        }
        Ok(())
    }

    fn archive_latest(&mut self, key: Key) -> Result<()> {
        self.store_units(key)?;
        self.store_previous(key)?;
        self.store_data(key, false)
    }

    fn record_write(&mut self, key: Key, result: Result<()>) {
        let limit = self.config.max_write_failures;
        match result {
            Ok(()) => {
                if self.write_fails >= limit {
                    info!(
                        "Archive writes recovered after {} failures",
                        self.write_fails
                    );
                }
                self.write_fails = 0;
            }
            Err(err) => {
                self.write_fails = self.write_fails.saturating_add(1);
                error!(
                    "Archive write failed for ({:#x}, {:#x}): {:?}",
                    key.source, key.datum, err
                );
                if self.write_fails == limit {
                    error!(
                        "{} consecutive archive write failures, reporting WARN",
                        self.write_fails
                    );
                }
            }
        }
    }

    fn store_units(&mut self, key: Key) -> Result<()> {
        let units = match self.index.lookup(key) {
            Some(defn) if defn.units_recorded => return Ok(()),
            Some(defn) => defn.units,
            None => return Err(unknown(key)),
        };
        self.archive.write_units(key.source, key.datum, units)?;
        if let Some(defn) = self.index.lookup_mut(key) {
            defn.units_recorded = true;
        }
        Ok(())
    }

    /// Archives the event preceding the last submission when it was never written.
    fn store_previous(&mut self, key: Key) -> Result<()> {
        let (hour, record) = {
            let defn = self.index.lookup(key).ok_or_else(|| unknown(key))?;
            if defn.value_recorded {
                return Ok(());
            }
            let history = defn.history();
            let (previous, last) = match (history.previous(), history.last_submitted()) {
                (Some(previous), Some(last)) => (*previous, *last),
                _ => return Ok(()),
            };
            if previous.value == last.value {
                return Ok(());
            }
            // its failure was counted when it was submitted
            let hour = match previous.timestamp.hour_start() {
                Some(hour) => hour,
                None => return Ok(()),
            };
            (
                hour,
                ArchiveRecord::from_event(key.source, key.datum, &previous)?,
            )
        };

        self.write_record(hour, &record)?;
        if let Some(defn) = self.index.lookup_mut(key) {
            defn.file_hour = Some(hour);
        }
        Ok(())
    }

    /// Archives the last submitted event of `key`.
    ///
    /// Unless `force` is set, the write is skipped when the event falls in
    /// the hour last written for this key and repeats the previous value.
    pub(crate) fn store_data(&mut self, key: Key, force: bool) -> Result<()> {
        let (hour, record) = {
            let defn = self.index.lookup_mut(key).ok_or_else(|| unknown(key))?;
            defn.value_recorded = false;
            let last = *defn
                .history()
                .last_submitted()
                .ok_or(SdbError::HistoryEmpty)?;
            let hour = last
                .timestamp
                .hour_start()
                .ok_or(SdbError::TimestampOutOfRange(last.timestamp.sec))?;
            let repeated = defn
                .history()
                .previous()
                .map(|previous| previous.value == last.value)
                .unwrap_or(false);
            if !force && defn.file_hour == Some(hour) && repeated {
                return Ok(());
            }
            (hour, ArchiveRecord::from_event(key.source, key.datum, &last)?)
        };

        self.write_record(hour, &record)?;
        if let Some(defn) = self.index.lookup_mut(key) {
            defn.file_hour = Some(hour);
            defn.value_recorded = true;
        }
        Ok(())
    }

    fn write_record(&mut self, hour: i32, record: &ArchiveRecord) -> Result<()> {
        self.ready_hour(hour);
        self.archive.append(hour, record)
    }

    /// Frees a slot for `hour`, flushing values pending in the evicted hour first.
    fn ready_hour(&mut self, hour: i32) {
        let victim = match self.archive.eviction_candidate(hour) {
            Some(victim) => victim,
            None => return,
        };
        let pending = self
            .index
            .keys_where(|defn| defn.is_pending_in_hour(victim));
        debug!(
            "Evicting archive hour {} for {}, flushing {} pending values",
            victim,
            hour,
            pending.len()
        );
        for key in pending {
            if let Err(err) = self.store_data(key, true) {
                error!(
                    "Flush before eviction failed for ({:#x}, {:#x}): {:?}",
                    key.source, key.datum, err
                );
            }
        }
        self.archive.close_hour(victim);
    }

    /// Force-archives every definition whose last submitted value is unwritten.
    ///
    /// # Returns
    ///
    /// The number of values written.
    pub(crate) fn flush_pending(&mut self) -> usize {
        let pending = self.index.keys_where(Definition::is_pending);
        let mut written = 0;
        for key in pending {
            let still_pending = self
                .index
                .lookup(key)
                .map(Definition::is_pending)
                .unwrap_or(false);
            if !still_pending {
                continue;
            }
            match self.store_data(key, true) {
                Ok(()) => written += 1,
                Err(err) => {
                    error!(
                        "Forced flush failed for ({:#x}, {:#x}): {:?}",
                        key.source, key.datum, err
                    );
                }
            }
        }
        written
    }
}

#[cfg(test)]
mod tests {
    use crate::archive::HourFileReader;
    use crate::config::SdbConfig;
    use crate::engine::{StatusDatabase, TaskDatum};
    use crate::store::{Datum, InsertPolicy, Key, Timestamp};
    use tempfile::TempDir;

    fn started(temp_dir: &TempDir) -> StatusDatabase {
        let config = SdbConfig::new(temp_dir.path());
        let mut db = StatusDatabase::new(config).unwrap();
        db.start(Timestamp::from_secs(0));
        db
    }

    fn values_in_hour(db: &StatusDatabase, hour: i32, key: Key) -> Vec<i32> {
        let path = db.archive().layout().hour_path(hour);
        HourFileReader::open(&path)
            .unwrap()
            .read_all()
            .unwrap()
            .into_iter()
            .filter(|record| record.key() == (key.source, key.datum))
            .map(|record| record.value)
            .collect()
    }

    #[test]
    fn test_add_data_installs_and_counts() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = StatusDatabase::new(SdbConfig::new(temp_dir.path()).with_file_store(false)).unwrap();
        let datum = Datum::new(7, 1, 2, Timestamp::from_secs(10), 5);
        db.add_data(&datum).unwrap();
        db.add_data(&datum).unwrap();

        let defn = db.definition(Key::new(7, 1)).unwrap();
        assert_eq!(defn.num_data(), 2);
        assert_eq!(defn.units, 2);
        assert_eq!(db.counters().get(TaskDatum::QtyDefns), 1);
        assert_eq!(db.counters().get(TaskDatum::TotVolatileData), 2);
    }

    #[test]
    fn test_history_limit_counters() {
        let temp_dir = TempDir::new().unwrap();
        let config = SdbConfig::new(temp_dir.path())
            .with_file_store(false)
            .with_history_limit(3);
        let mut db = StatusDatabase::new(config).unwrap();
        for value in 0..5 {
            db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(value), value))
                .unwrap();
        }

        assert_eq!(db.definition(Key::new(7, 1)).unwrap().num_data(), 3);
        assert_eq!(db.counters().get(TaskDatum::TotVolatileData), 3);
        assert_eq!(db.counters().get(TaskDatum::QtyHistLim), 1);
    }

    #[test]
    fn test_equal_values_write_once() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = started(&temp_dir);
        let key = Key::new(7, 1);
        db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(100), 5)).unwrap();
        db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(200), 5)).unwrap();

        assert_eq!(values_in_hour(&db, 0, key), vec![5]);
        assert!(db.definition(key).unwrap().is_pending());
    }

    #[test]
    fn test_value_change_writes_previous_and_current() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = started(&temp_dir);
        let key = Key::new(7, 1);
        for (sec, value) in [(100, 5), (200, 5), (300, 5), (400, 9)] {
            db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(sec), value))
                .unwrap();
        }
        // step shape: first 5, last 5 before the change, then 9
        assert_eq!(values_in_hour(&db, 0, key), vec![5, 5, 9]);
        assert!(!db.definition(key).unwrap().is_pending());
    }

    #[test]
    fn test_hour_change_forces_write() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = started(&temp_dir);
        let key = Key::new(7, 1);
        db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(3599), 5)).unwrap();
        db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(3600), 5)).unwrap();

        assert_eq!(values_in_hour(&db, 0, key), vec![5]);
        assert_eq!(values_in_hour(&db, 3600, key), vec![5]);
    }

    #[test]
    fn test_unarchivable_timestamp_counts_write_failure() {
        let temp_dir = TempDir::new().unwrap();
        let mut db = started(&temp_dir);
        let key = Key::new(7, 1);
        db.add_data(&Datum::new(7, 1, 2, Timestamp::new(i32::MIN, 0), 5))
            .unwrap();

        assert_eq!(db.write_failures(), 1);
        assert_eq!(db.definition(key).unwrap().num_data(), 1);
        assert!(db.definition(key).unwrap().is_pending());

        // a forced flush skips the value again without aborting
        db.shutdown();
        assert!(db.definition(key).unwrap().is_pending());

        db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(10), 6))
            .unwrap();
        assert_eq!(db.write_failures(), 0);
        assert_eq!(values_in_hour(&db, 0, key), vec![6]);
    }

    #[test]
    fn test_time_sorted_policy_from_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = SdbConfig::new(temp_dir.path())
            .with_file_store(false)
            .with_insert_policy(InsertPolicy::TimeSorted);
        let mut db = StatusDatabase::new(config).unwrap();
        for sec in [300, 100, 200] {
            db.add_data(&Datum::new(7, 1, 2, Timestamp::from_secs(sec), sec))
                .unwrap();
        }
        let order: Vec<i32> = db
            .definition(Key::new(7, 1))
            .unwrap()
            .history()
            .iter()
            .map(|event| event.value)
            .collect();
        assert_eq!(order, vec![100, 200, 300]);
    }
}
