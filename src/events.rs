//! Plate event log and its deduplication policy.
//!
//! A plate that stays in view produces a stabilized reading on nearly every
//! scan cycle. The deduplicator turns that stream into a handful of log
//! entries: a reading is logged when it differs from (and is not a substring
//! of, nor contains) the last logged text, or when the last entry is older
//! than the re-log interval.
//!
//! The substring comparison is literal. `"1กก 1234"` and `"1กก1234"` are not
//! substrings of one another, so the second is logged as a new plate.

use std::collections::VecDeque;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// Default number of events kept in memory.
pub const DEFAULT_LOG_CAPACITY: usize = 15;

/// Default seconds after which identical text may be logged again.
pub const DEFAULT_RELOG_AFTER_SECS: u64 = 10;

/// Default minimum length (excluding spaces) of a loggable reading, exclusive.
pub const DEFAULT_MIN_PLATE_CHARS: usize = 3;

/// One accepted plate reading.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlateEvent {
    /// Wall-clock time of the reading, `HH:MM:SS`.
    pub time: String,
    pub text: String,
}

impl PlateEvent {
    pub fn new(text: &str, at: NaiveDateTime) -> Self {
        Self {
            time: at.format("%H:%M:%S").to_string(),
            text: text.to_string(),
        }
    }
}

/// Bounded newest-first event log.
#[derive(Clone, Debug)]
pub struct PlateLog {
    entries: VecDeque<PlateEvent>,
    capacity: usize,
}

impl PlateLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, event: PlateEvent) {
        self.entries.push_front(event);
        self.entries.truncate(self.capacity);
    }

    /// Events newest first.
    pub fn snapshot(&self) -> Vec<PlateEvent> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PlateLog {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_CAPACITY)
    }
}

/// Tracks the last logged reading and decides whether a new one is an event.
#[derive(Clone, Debug)]
pub struct LogDeduplicator {
    last_text: String,
    last_logged_at: Option<NaiveDateTime>,
    relog_after_secs: u64,
    min_plate_chars: usize,
}

impl LogDeduplicator {
    pub fn new(relog_after_secs: u64, min_plate_chars: usize) -> Self {
        Self {
            last_text: String::new(),
            last_logged_at: None,
            relog_after_secs,
            min_plate_chars,
        }
    }

    /// Whether `full_text` observed at `now` should become a new event.
    pub fn should_log(&self, full_text: &str, now: NaiveDateTime) -> bool {
        let last = self.last_text.as_str();
        // An empty last text only matches an empty reading.
        let is_substring = if last.is_empty() {
            full_text.is_empty()
        } else {
            full_text.contains(last) || last.contains(full_text)
        };
        let changed = full_text != last && !is_substring;
        let stale = match self.last_logged_at {
            Some(at) => now - at > self.relog_window(),
            None => true,
        };

        (changed || stale) && full_text.chars().filter(|c| *c != ' ').count() > self.min_plate_chars
    }

    /// Offer a reading; on acceptance it is recorded and pushed to `log`.
    pub fn offer(
        &mut self,
        full_text: &str,
        now: NaiveDateTime,
        log: &mut PlateLog,
    ) -> Option<PlateEvent> {
        if !self.should_log(full_text, now) {
            return None;
        }
        let event = PlateEvent::new(full_text, now);
        log.push(event.clone());
        self.last_text = full_text.to_string();
        self.last_logged_at = Some(now);
        Some(event)
    }

    fn relog_window(&self) -> Duration {
        Duration::seconds(self.relog_after_secs.min(u64::from(u32::MAX)) as i64)
    }

    pub fn last_text(&self) -> &str {
        &self.last_text
    }

    pub fn last_logged_at(&self) -> Option<NaiveDateTime> {
        self.last_logged_at
    }

    /// Forget the last text but keep its timestamp (plate left the scene).
    pub fn forget_text(&mut self) {
        self.last_text.clear();
    }

    /// Forget everything (new source).
    pub fn reset(&mut self) {
        self.last_text.clear();
        self.last_logged_at = None;
    }
}

impl Default for LogDeduplicator {
    fn default() -> Self {
        Self::new(DEFAULT_RELOG_AFTER_SECS, DEFAULT_MIN_PLATE_CHARS)
    }
}
