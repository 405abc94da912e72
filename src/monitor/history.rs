//! Bounded per-pin history of completed high-level intervals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Maximum completed intervals kept per pin.
pub const HISTORY_CAPACITY: usize = 1000;

/// Default number of entries returned by [`HistoryBuffer::recent`].
pub const RECENT_DEFAULT: usize = 50;

/// One completed interval during which a pin stayed high.
///
/// Created only on a falling edge with a matching rising edge on record,
/// so `end >= start` always holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighInterval {
    /// When the pin went high
    pub start: DateTime<Utc>,
    /// When the pin went low again
    pub end: DateTime<Utc>,
}

impl HighInterval {
    pub fn duration_secs(&self) -> f64 {
        (self.end - self.start).num_milliseconds() as f64 / 1000.0
    }
}

/// Insertion-ordered, capacity-bounded store of completed intervals.
///
/// Appending past capacity evicts the oldest entry. The buffer is a
/// passive structure; the transition tracker is its only writer.
#[derive(Debug, Clone, Default)]
pub struct HistoryBuffer {
    entries: VecDeque<HighInterval>,
}

impl HistoryBuffer {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Append an interval, evicting the oldest entry when at capacity.
    pub fn append(&mut self, interval: HighInterval) {
        if self.entries.len() == HISTORY_CAPACITY {
            self.entries.pop_front();
        }
        self.entries.push_back(interval);
    }

    /// The most recent `n` entries, oldest first.
    pub fn recent(&self, n: usize) -> Vec<HighInterval> {
        let skip = self.entries.len().saturating_sub(n);
        self.entries.iter().skip(skip).cloned().collect()
    }

    /// All entries whose start is at or after `cutoff`, in insertion order.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<HighInterval> {
        self.entries
            .iter()
            .filter(|e| e.start >= cutoff)
            .cloned()
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn interval(start_secs: i64, end_secs: i64) -> HighInterval {
        HighInterval {
            start: Utc.timestamp_opt(start_secs, 0).unwrap(),
            end: Utc.timestamp_opt(end_secs, 0).unwrap(),
        }
    }

    #[test]
    fn test_duration_is_end_minus_start() {
        let i = interval(100, 103);
        assert_eq!(i.duration_secs(), 3.0);
        assert!(interval(100, 100).duration_secs() >= 0.0);
    }

    #[test]
    fn test_append_evicts_oldest_at_capacity() {
        let mut buffer = HistoryBuffer::new();
        for n in 0..HISTORY_CAPACITY as i64 + 5 {
            buffer.append(interval(n, n + 1));
        }

        assert_eq!(buffer.len(), HISTORY_CAPACITY);
        // The 5 oldest entries were evicted, never newer ones.
        let all = buffer.recent(HISTORY_CAPACITY);
        assert_eq!(all.first().unwrap().start, Utc.timestamp_opt(5, 0).unwrap());
        assert_eq!(
            all.last().unwrap().start,
            Utc.timestamp_opt(HISTORY_CAPACITY as i64 + 4, 0).unwrap()
        );
    }

    #[test]
    fn test_recent_returns_tail_in_order() {
        let mut buffer = HistoryBuffer::new();
        for n in 0..10 {
            buffer.append(interval(n, n + 1));
        }

        let last3 = buffer.recent(3);
        assert_eq!(last3.len(), 3);
        assert_eq!(last3[0].start, Utc.timestamp_opt(7, 0).unwrap());
        assert_eq!(last3[2].start, Utc.timestamp_opt(9, 0).unwrap());

        // Asking for more than exists returns everything.
        assert_eq!(buffer.recent(100).len(), 10);
    }

    #[test]
    fn test_since_filters_on_start() {
        let mut buffer = HistoryBuffer::new();
        for n in 0..10 {
            buffer.append(interval(n * 10, n * 10 + 1));
        }

        let cutoff = Utc.timestamp_opt(50, 0).unwrap();
        let filtered = buffer.since(cutoff);
        assert_eq!(filtered.len(), 5);
        assert!(filtered.iter().all(|e| e.start >= cutoff));
        // Insertion order preserved.
        assert_eq!(filtered[0].start, Utc.timestamp_opt(50, 0).unwrap());
    }

    #[test]
    fn test_clear_empties_buffer() {
        let mut buffer = HistoryBuffer::new();
        buffer.append(interval(0, 1));
        buffer.clear();
        assert!(buffer.is_empty());
    }
}
