//! The monitoring state bundle and the transition tracker.
//!
//! All mutable monitoring state lives in one [`MonitorState`] owned by the
//! monitor and guarded by a single mutex: the sampling thread is the only
//! writer, snapshot reads briefly take the same lock. Keeping the bundle in
//! one place is what makes a snapshot internally consistent — a reader can
//! never observe a pending high start for a pin recorded low.

use crate::monitor::history::{HighInterval, HistoryBuffer};
use crate::source::Level;
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// A single observed edge, forwarded to the broadcast path.
#[derive(Debug, Clone, Copy)]
pub struct ChangeEvent {
    pub pin: u8,
    pub old_level: Level,
    pub new_level: Level,
    pub at: DateTime<Utc>,
}

/// Every per-pin map the tracker mutates, in one bundle.
#[derive(Debug, Default)]
pub struct MonitorState {
    /// Accepted pins, in configured order
    pub(crate) pins: Vec<u8>,
    pub(crate) levels: HashMap<u8, Level>,
    pub(crate) labels: HashMap<u8, String>,
    pub(crate) transition_counts: HashMap<u8, u64>,
    pub(crate) last_transition: HashMap<u8, DateTime<Utc>>,
    pub(crate) history: HashMap<u8, HistoryBuffer>,
    /// Present iff the pin is currently high and its rising edge was observed
    pub(crate) pending_high_start: HashMap<u8, DateTime<Utc>>,
}

impl MonitorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a pin after successful setup.
    ///
    /// A pin that starts out high gets no pending start: its first falling
    /// edge will record no interval, because no rising edge was observed.
    /// Re-registering an existing pin (monitor restart) keeps its counters.
    pub fn register_pin(&mut self, pin: u8, level: Level, label: String, at: DateTime<Utc>) {
        self.labels.insert(pin, label);
        if self.pins.contains(&pin) {
            return;
        }
        self.pins.push(pin);
        self.levels.insert(pin, level);
        self.transition_counts.insert(pin, 0);
        self.last_transition.insert(pin, at);
        self.history.insert(pin, HistoryBuffer::new());
    }

    pub fn pins(&self) -> &[u8] {
        &self.pins
    }

    pub fn level(&self, pin: u8) -> Option<Level> {
        self.levels.get(&pin).copied()
    }

    /// Apply one observed edge.
    ///
    /// The caller (the sampler) only routes reads here when the level
    /// actually changed, so repeated identical reads never reach this
    /// point and never inflate counters.
    pub fn apply_edge(&mut self, pin: u8, new_level: Level, at: DateTime<Utc>) -> ChangeEvent {
        let old_level = self.levels.insert(pin, new_level).unwrap_or(Level::Low);
        debug_assert_ne!(old_level, new_level);

        *self.transition_counts.entry(pin).or_insert(0) += 1;
        self.last_transition.insert(pin, at);

        if old_level.is_high() && !new_level.is_high() {
            // Falling edge: close the pending interval, if one exists. A
            // pin that was already high at startup has none, and the
            // interval is silently discarded rather than guessed at.
            if let Some(start) = self.pending_high_start.remove(&pin) {
                self.history
                    .entry(pin)
                    .or_default()
                    .append(HighInterval { start, end: at });
            }
        } else if !old_level.is_high() && new_level.is_high() {
            self.pending_high_start.insert(pin, at);
        }

        tracing::debug!(
            "Pin {pin} changed from {} to {}",
            old_level.as_u8(),
            new_level.as_u8()
        );

        ChangeEvent {
            pin,
            old_level,
            new_level,
            at,
        }
    }

    /// Zero every transition counter and clear every history buffer.
    ///
    /// Current levels and pending high starts survive: an in-progress high
    /// interval is still recorded on its eventual falling edge, landing in
    /// the freshly cleared history.
    pub fn reset(&mut self) {
        for pin in &self.pins {
            self.transition_counts.insert(*pin, 0);
            if let Some(buffer) = self.history.get_mut(pin) {
                buffer.clear();
            }
        }
    }

    /// Merge label updates; unknown pins are ignored.
    pub fn set_labels(&mut self, labels: HashMap<u8, String>) {
        for (pin, label) in labels {
            if self.pins.contains(&pin) {
                self.labels.insert(pin, label);
            }
        }
    }

    /// Transition counts per pin since the last reset.
    pub fn transition_summary(&self) -> HashMap<u8, u64> {
        self.pins
            .iter()
            .map(|pin| (*pin, self.transition_counts.get(pin).copied().unwrap_or(0)))
            .collect()
    }

    /// History entries for a pin with start at or after `cutoff`.
    pub fn history_since(&self, pin: u8, cutoff: DateTime<Utc>) -> Vec<HighInterval> {
        self.history
            .get(&pin)
            .map(|b| b.since(cutoff))
            .unwrap_or_default()
    }
}
