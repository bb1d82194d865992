//! Plate presence hysteresis.
//!
//! Counts consecutive scan cycles in which the plate detector found nothing.
//! Two thresholds act on the same counter: a short one that hides stale
//! overlay boxes, and a longer one that forgets accumulated readings.

/// Default cycles without a plate before stabilization history is dropped.
pub const DEFAULT_CLEAR_AFTER_CYCLES: u32 = 10;

/// Default cycles without a plate before the last overlay is hidden.
pub const DEFAULT_HIDE_AFTER_CYCLES: u32 = 5;

/// Actions requested by one observed scan cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PresenceActions {
    /// Drop both vote buffers and the last logged text.
    pub clear_history: bool,
    /// Drop the overlay boxes carried over from earlier cycles.
    pub hide_boxes: bool,
}

#[derive(Clone, Debug)]
pub struct PresenceTracker {
    absent_cycles: u32,
    clear_after: u32,
    hide_after: u32,
}

impl PresenceTracker {
    pub fn new(clear_after: u32, hide_after: u32) -> Self {
        Self {
            absent_cycles: 0,
            clear_after,
            hide_after,
        }
    }

    /// Record one scan cycle and return the actions it triggers.
    ///
    /// Both actions fire on every absent cycle once their threshold is
    /// exceeded; applying them repeatedly is harmless.
    pub fn observe(&mut self, plate_found: bool) -> PresenceActions {
        if plate_found {
            self.absent_cycles = 0;
            return PresenceActions::default();
        }

        self.absent_cycles = self.absent_cycles.saturating_add(1);
        PresenceActions {
            clear_history: self.absent_cycles > self.clear_after,
            hide_boxes: self.absent_cycles > self.hide_after,
        }
    }

    pub fn absent_cycles(&self) -> u32 {
        self.absent_cycles
    }

    pub fn reset(&mut self) {
        self.absent_cycles = 0;
    }
}

impl Default for PresenceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CLEAR_AFTER_CYCLES, DEFAULT_HIDE_AFTER_CYCLES)
    }
}
