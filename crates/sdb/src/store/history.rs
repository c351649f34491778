//! Bounded, time-ordered event history owned by a single definition.
//!
//! Events are kept oldest → newest in a [`VecDeque`]. Before an insertion
//! would exceed the configured limit the oldest event is clipped, so a
//! history behaves as a ring buffer over the most recent submissions.

use crate::error::{Result, SdbError};
use crate::store::Event;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Default maximum number of events retained per definition.
pub const HIST_LIMIT: usize = 10;

/// Strategy used to place a new event in a non-empty history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InsertPolicy {
    /// Always append as the newest event, whatever its timestamp.
    #[default]
    Append,
    /// Walk back from the newest event and insert in timestamp order.
    TimeSorted,
}

/// Bookkeeping returned by [`EventHistory::push`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PushOutcome {
    /// Number of oldest events evicted to make room.
    pub clipped: usize,
    /// True if this push filled the history to its limit for the first time.
    pub reached_limit: bool,
}

/// Per-definition event history.
#[derive(Debug, Clone)]
pub struct EventHistory {
    events: VecDeque<Event>,
    limit: usize,
    last_submitted: Option<usize>,
}

impl Default for EventHistory {
    fn default() -> Self {
        Self::new(HIST_LIMIT)
    }
}

impl EventHistory {
    /// Creates an empty history holding at most `limit` events.
    pub fn new(limit: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(limit),
            limit: limit.max(1),
            last_submitted: None,
        }
    }

    /// Returns the number of stored events.
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Returns true if no events are stored.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Returns the maximum number of events retained.
    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Returns true if the history holds its maximum number of events.
    pub fn is_full(&self) -> bool {
        self.events.len() >= self.limit
    }

    /// Returns the newest event.
    pub fn newest(&self) -> Option<&Event> {
        self.events.back()
    }

    /// Returns the oldest event.
    pub fn oldest(&self) -> Option<&Event> {
        self.events.front()
    }

    /// Returns the most recently submitted event.
    ///
    /// Under [`InsertPolicy::Append`] this is always the newest event.
    pub fn last_submitted(&self) -> Option<&Event> {
        self.last_submitted.and_then(|pos| self.events.get(pos))
    }

    /// Returns the event immediately preceding the last submitted one in time order.
    pub fn previous(&self) -> Option<&Event> {
        match self.last_submitted {
            Some(pos) if pos > 0 => self.events.get(pos - 1),
            _ => None,
        }
    }

    /// Iterates events from oldest to newest.
    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Event> + ExactSizeIterator {
        self.events.iter()
    }

    /// Iterates events from newest to oldest.
    pub fn newest_first(&self) -> impl Iterator<Item = &Event> {
        self.events.iter().rev()
    }

    /// Inserts `event` according to `policy`, clipping the oldest events first if needed.
    ///
    /// # Errors
    ///
    /// Returns a history error only if the internal ordering invariants
    /// have been violated; callers treat this as corruption of one definition.
    pub fn push(&mut self, event: Event, policy: InsertPolicy) -> Result<PushOutcome> {
        let reached_limit = self.events.len() + 1 == self.limit;

        let mut clipped = 0;
        while self.events.len() >= self.limit {
            self.clip_oldest()?;
            clipped += 1;
        }

        let position = if self.events.is_empty() {
            self.create_first(event)?
        } else {
            match policy {
                InsertPolicy::Append => self.append(event)?,
                InsertPolicy::TimeSorted => self.insert_sorted(event)?,
            }
        };
        self.last_submitted = Some(position);

        Ok(PushOutcome {
            clipped,
            reached_limit,
        })
    }

    /// Removes every event, returning how many were removed.
    pub fn clear(&mut self) -> usize {
        let removed = self.events.len();
        self.events.clear();
        self.last_submitted = None;
        removed
    }

    /// Stores the first event of an empty history.
    pub fn create_first(&mut self, event: Event) -> Result<usize> {
        if !self.events.is_empty() {
            return Err(SdbError::HistoryNotEmpty);
        }
        self.events.push_back(event);
        Ok(0)
    }

    /// Adds `event` as the newest entry.
    pub fn append(&mut self, event: Event) -> Result<usize> {
        if self.events.is_empty() {
            return Err(SdbError::HistoryEmpty);
        }
        self.events.push_back(event);
        Ok(self.events.len() - 1)
    }

    /// Adds `event` as the oldest entry.
    pub fn prepend(&mut self, event: Event) -> Result<usize> {
        if self.events.is_empty() {
            return Err(SdbError::HistoryEmpty);
        }
        self.events.push_front(event);
        if let Some(pos) = self.last_submitted.as_mut() {
            *pos += 1;
        }
        Ok(0)
    }

    /// Inserts `event` directly after the event at `position`.
    ///
    /// The event at `position` must not be the newest; use
    /// [`Self::append`] for that.
    pub fn insert_after(&mut self, position: usize, event: Event) -> Result<usize> {
        if self.events.is_empty() {
            return Err(SdbError::HistoryEmpty);
        }
        if position + 1 >= self.events.len() {
            return Err(SdbError::EndOfHistory(position));
        }
        self.events.insert(position + 1, event);
        if let Some(pos) = self.last_submitted.as_mut() {
            if *pos > position {
                *pos += 1;
            }
        }
        Ok(position + 1)
    }

    /// Evicts and returns the oldest event.
    pub fn clip_oldest(&mut self) -> Result<Event> {
        let event = self.events.pop_front().ok_or(SdbError::HistoryEmpty)?;
        self.last_submitted = match self.last_submitted {
            Some(0) | None => None,
            Some(pos) => Some(pos - 1),
        };
        Ok(event)
    }

    fn insert_sorted(&mut self, event: Event) -> Result<usize> {
        let newest = self.events.back().ok_or(SdbError::HistoryEmpty)?;
        if event.timestamp >= newest.timestamp {
            return self.append(event);
        }

        for position in (0..self.events.len() - 1).rev() {
            if event.timestamp >= self.events[position].timestamp {
                return self.insert_after(position, event);
            }
        }

        self.prepend(event)
    }
}
