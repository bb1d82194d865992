//! Majority-vote stabilization of per-line readings.

use std::collections::VecDeque;

/// Default number of readings kept per line.
pub const DEFAULT_HISTORY_CAPACITY: usize = 10;

/// Default number of agreeing readings needed before a value is trusted.
pub const DEFAULT_VOTE_THRESHOLD: usize = 7;

/// Bounded FIFO of recent readings for one plate row.
///
/// - Empty readings never enter the history.
/// - The oldest reading is evicted once `capacity` is reached.
#[derive(Clone, Debug)]
pub struct VoteBuffer {
    history: VecDeque<String>,
    capacity: usize,
    threshold: usize,
}

impl VoteBuffer {
    pub fn new(capacity: usize, threshold: usize) -> Self {
        Self {
            history: VecDeque::with_capacity(capacity),
            capacity,
            threshold,
        }
    }

    /// Record a reading. Empty readings are ignored.
    pub fn append(&mut self, reading: &str) {
        if reading.is_empty() || self.capacity == 0 {
            return;
        }
        while self.history.len() >= self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(reading.to_string());
    }

    /// Most frequent reading if it occurs at least `threshold` times, else "".
    ///
    /// Ties go to the value seen first (oldest) in the history.
    pub fn stabilize(&self) -> String {
        let mut counts: Vec<(&str, usize)> = Vec::new();
        for reading in &self.history {
            match counts.iter_mut().find(|(value, _)| *value == reading.as_str()) {
                Some((_, count)) => *count += 1,
                None => counts.push((reading.as_str(), 1)),
            }
        }

        let mut best: Option<(&str, usize)> = None;
        for (value, count) in counts {
            if best.map_or(true, |(_, best_count)| count > best_count) {
                best = Some((value, count));
            }
        }

        match best {
            Some((value, count)) if count >= self.threshold => value.to_string(),
            _ => String::new(),
        }
    }

    pub fn clear(&mut self) {
        self.history.clear();
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    /// Readings oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.history.iter().map(String::as_str)
    }
}

impl Default for VoteBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_VOTE_THRESHOLD)
    }
}
