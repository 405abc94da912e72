//! The fixed-interval sampling loop.
//!
//! One dedicated thread reads every accepted pin each tick, routes edges
//! through the transition tracker, and enqueues change events for the
//! broadcast path. The queue send never blocks: a full queue drops the
//! event with a warning and the snapshot heartbeat covers the gap.

use crate::monitor::state::{ChangeEvent, MonitorState};
use crate::monitor::lock_state;
use crate::source::LineSource;
use chrono::Utc;
use crossbeam_channel::{Sender, TrySendError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Drive the tick loop until the stop flag clears.
///
/// The flag is checked once per tick boundary, so stop latency is bounded
/// by one interval.
pub(crate) fn run(
    mut source: LineSource,
    state: Arc<Mutex<MonitorState>>,
    events: Sender<ChangeEvent>,
    interval: Duration,
    running: Arc<AtomicBool>,
) {
    tracing::debug!("Sampler started ({} source)", source.name());

    while running.load(Ordering::SeqCst) {
        sample_tick(&mut source, &state, &events);
        std::thread::sleep(interval);
    }

    tracing::debug!("Sampler stopped");
}

/// Process one tick: read every pin, apply edges, enqueue change events.
pub(crate) fn sample_tick(
    source: &mut LineSource,
    state: &Mutex<MonitorState>,
    events: &Sender<ChangeEvent>,
) {
    let now = Utc::now();
    let pins: Vec<u8> = lock_state(state).pins().to_vec();

    // Read outside the lock so a slow read never stalls snapshot queries.
    let mut readings = Vec::with_capacity(pins.len());
    for pin in pins {
        match source.read(pin) {
            Ok(level) => readings.push((pin, level)),
            Err(e) => {
                // This pin keeps its previous recorded state for this tick;
                // the other pins are unaffected.
                tracing::warn!("{e}; skipping pin for this tick");
            }
        }
    }

    let mut changes = Vec::new();
    {
        let mut guard = lock_state(state);
        for (pin, new_level) in readings {
            // Identical reads are filtered here and never reach the tracker.
            if guard.level(pin) != Some(new_level) {
                changes.push(guard.apply_edge(pin, new_level, now));
            }
        }
    }

    for event in changes {
        match events.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                tracing::warn!(
                    "Notification queue full, dropping change event for pin {}",
                    ev.pin
                );
            }
            Err(TrySendError::Disconnected(_)) => {
                tracing::debug!("Broadcast consumer gone, discarding change event");
            }
        }
    }
}
