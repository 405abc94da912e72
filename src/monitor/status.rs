//! Point-in-time status snapshots of all monitored pins.

use crate::monitor::history::{HighInterval, RECENT_DEFAULT};
use crate::monitor::state::MonitorState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Wire form of one completed high interval.
///
/// `timestamp` is the moment the interval ended (the falling edge), which
/// is what the dashboard plots the duration against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub timestamp: DateTime<Utc>,
    pub duration: f64,
}

impl From<&HighInterval> for HistoryEntry {
    fn from(interval: &HighInterval) -> Self {
        Self {
            timestamp: interval.end,
            duration: interval.duration_secs(),
        }
    }
}

/// Published status of a single pin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PinStatus {
    /// Current level, 0 or 1
    pub state: u8,
    pub label: String,
    /// Level flips observed since the last reset
    pub transitions: u64,
    pub last_transition: DateTime<Utc>,
    /// Seconds the pin has currently been high, 0 when low
    pub current_high_duration: f64,
    /// Most recent completed high intervals, oldest first
    pub high_duration_history: Vec<HistoryEntry>,
}

/// Full snapshot keyed by stringified pin number.
pub type StatusSnapshot = BTreeMap<String, PinStatus>;

/// Assemble a snapshot of every monitored pin.
///
/// Pure function of the state bundle plus `now`; the caller holds the
/// state lock, so the snapshot reflects a single consistent tick.
pub fn assemble(state: &MonitorState, now: DateTime<Utc>) -> StatusSnapshot {
    let mut snapshot = BTreeMap::new();

    for &pin in state.pins() {
        let level = state.levels.get(&pin).copied().unwrap_or(crate::source::Level::Low);

        let current_high_duration = match state.pending_high_start.get(&pin) {
            Some(start) if level.is_high() => {
                ((now - *start).num_milliseconds() as f64 / 1000.0).max(0.0)
            }
            _ => 0.0,
        };

        let history = state
            .history
            .get(&pin)
            .map(|b| b.recent(RECENT_DEFAULT).iter().map(HistoryEntry::from).collect())
            .unwrap_or_default();

        snapshot.insert(
            pin.to_string(),
            PinStatus {
                state: level.as_u8(),
                label: state
                    .labels
                    .get(&pin)
                    .cloned()
                    .unwrap_or_else(|| format!("GPIO {pin}")),
                transitions: state.transition_counts.get(&pin).copied().unwrap_or(0),
                last_transition: state.last_transition.get(&pin).copied().unwrap_or(now),
                current_high_duration,
                high_duration_history: history,
            },
        );
    }

    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::Level;
    use chrono::TimeZone;

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(millis).unwrap()
    }

    #[test]
    fn test_snapshot_covers_all_pins() {
        let mut state = MonitorState::new();
        state.register_pin(17, Level::Low, "Door".to_string(), at(0));
        state.register_pin(27, Level::Low, "GPIO 27".to_string(), at(0));

        let snapshot = assemble(&state, at(1000));
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot["17"].label, "Door");
        assert_eq!(snapshot["17"].state, 0);
        assert_eq!(snapshot["17"].transitions, 0);
        assert_eq!(snapshot["27"].current_high_duration, 0.0);
    }

    #[test]
    fn test_live_high_duration_tracks_pending_start() {
        let mut state = MonitorState::new();
        state.register_pin(17, Level::Low, "GPIO 17".to_string(), at(0));
        state.apply_edge(17, Level::High, at(1000));

        let snapshot = assemble(&state, at(3500));
        assert_eq!(snapshot["17"].state, 1);
        assert_eq!(snapshot["17"].current_high_duration, 2.5);

        // Back low: duration reports zero again.
        state.apply_edge(17, Level::Low, at(4000));
        let snapshot = assemble(&state, at(5000));
        assert_eq!(snapshot["17"].state, 0);
        assert_eq!(snapshot["17"].current_high_duration, 0.0);
        assert_eq!(snapshot["17"].high_duration_history.len(), 1);
        assert_eq!(snapshot["17"].high_duration_history[0].duration, 3.0);
        assert_eq!(snapshot["17"].high_duration_history[0].timestamp, at(4000));
    }

    #[test]
    fn test_pin_high_at_startup_reports_zero_duration() {
        // No rising edge observed, so no pending start to measure from.
        let mut state = MonitorState::new();
        state.register_pin(9, Level::High, "GPIO 9".to_string(), at(0));

        let snapshot = assemble(&state, at(10_000));
        assert_eq!(snapshot["9"].state, 1);
        assert_eq!(snapshot["9"].current_high_duration, 0.0);
    }

    #[test]
    fn test_history_limited_to_recent_entries() {
        let mut state = MonitorState::new();
        state.register_pin(4, Level::Low, "GPIO 4".to_string(), at(0));

        for n in 0..60i64 {
            state.apply_edge(4, Level::High, at(n * 1000));
            state.apply_edge(4, Level::Low, at(n * 1000 + 500));
        }

        let snapshot = assemble(&state, at(100_000));
        let history = &snapshot["4"].high_duration_history;
        assert_eq!(history.len(), RECENT_DEFAULT);
        // Tail of the buffer, oldest first.
        assert_eq!(history.last().unwrap().timestamp, at(59_500));
    }

    #[test]
    fn test_snapshot_serializes_with_wire_field_names() {
        let mut state = MonitorState::new();
        state.register_pin(2, Level::Low, "GPIO 2".to_string(), at(0));

        let json = serde_json::to_value(assemble(&state, at(0))).unwrap();
        let pin = &json["2"];
        assert!(pin["state"].is_number());
        assert!(pin["label"].is_string());
        assert!(pin["transitions"].is_number());
        assert!(pin["last_transition"].is_string());
        assert!(pin["current_high_duration"].is_number());
        assert!(pin["high_duration_history"].is_array());
    }
}
