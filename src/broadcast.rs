//! The broadcast path: change notifications and heartbeats into a sink.
//!
//! A dedicated consumer thread dequeues change events from the sampler's
//! bounded queue and publishes a full snapshot for each one, without the
//! sampler ever waiting on the sink. Independently of changes, a snapshot
//! heartbeat fires every update interval as a backstop, and a slower
//! heartbeat publishes host resource data.

use crate::monitor::lock_state;
use crate::monitor::state::{ChangeEvent, MonitorState};
use crate::monitor::status;
use crate::system::SystemInfoCollector;
use chrono::Utc;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Cadence of the host-resource heartbeat.
pub const SYSTEM_UPDATE_INTERVAL: Duration = Duration::from_secs(1);

/// Named update channels, matching the wire event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateEvent {
    Gpio,
    System,
}

impl UpdateEvent {
    pub fn as_str(self) -> &'static str {
        match self {
            UpdateEvent::Gpio => "gpio_update",
            UpdateEvent::System => "system_update",
        }
    }
}

/// A publish attempt was rejected by the external sink.
#[derive(Debug)]
pub struct PublishError {
    pub reason: String,
}

impl std::fmt::Display for PublishError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "publish failed: {}", self.reason)
    }
}

impl std::error::Error for PublishError {}

/// Where published updates go.
///
/// Implementations must tolerate redundant identical snapshots: the
/// immediate and heartbeat paths are never de-duplicated against each
/// other. A failed publish is logged and never stops sampling or
/// subsequent publishes.
pub trait PublishSink: Send + Sync {
    fn publish(&self, event: UpdateEvent, payload: &serde_json::Value) -> Result<(), PublishError>;
}

/// Sink that writes updates to the log. Used when no transport is attached.
#[derive(Debug, Default)]
pub struct LogSink;

impl PublishSink for LogSink {
    fn publish(&self, event: UpdateEvent, payload: &serde_json::Value) -> Result<(), PublishError> {
        tracing::debug!("{}: {payload}", event.as_str());
        Ok(())
    }
}

/// Drive the broadcast loop until the stop flag clears.
pub(crate) fn run(
    events: Receiver<ChangeEvent>,
    state: Arc<Mutex<MonitorState>>,
    sink: Arc<dyn PublishSink>,
    snapshot_interval: Duration,
    system_interval: Duration,
    running: Arc<AtomicBool>,
) {
    let mut system = SystemInfoCollector::new();
    let mut last_snapshot = Instant::now();
    let mut last_system = Instant::now();

    tracing::debug!("Broadcast loop started");

    while running.load(Ordering::SeqCst) {
        // Immediate path: one snapshot per dequeued change, in order.
        match events.recv_timeout(snapshot_interval) {
            Ok(event) => {
                tracing::debug!(
                    "Pin {} changed {} -> {}, publishing immediate update",
                    event.pin,
                    event.old_level.as_u8(),
                    event.new_level.as_u8()
                );
                publish_snapshot(&state, sink.as_ref());
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                tracing::debug!("Change event queue closed");
                break;
            }
        }

        // Heartbeat path: unconditional snapshot each interval, in case an
        // immediate notification was dropped or coalesced downstream.
        if last_snapshot.elapsed() >= snapshot_interval {
            publish_snapshot(&state, sink.as_ref());
            last_snapshot = Instant::now();
        }

        if last_system.elapsed() >= system_interval {
            publish_system(&mut system, sink.as_ref());
            last_system = Instant::now();
        }
    }

    tracing::debug!("Broadcast loop stopped");
}

fn publish_snapshot(state: &Mutex<MonitorState>, sink: &dyn PublishSink) {
    let snapshot = {
        let guard = lock_state(state);
        status::assemble(&guard, Utc::now())
    };

    match serde_json::to_value(&snapshot) {
        Ok(payload) => {
            if let Err(e) = sink.publish(UpdateEvent::Gpio, &payload) {
                tracing::warn!("{e}");
            }
        }
        Err(e) => tracing::error!("Failed to serialize snapshot: {e}"),
    }
}

fn publish_system(system: &mut SystemInfoCollector, sink: &dyn PublishSink) {
    match serde_json::to_value(system.lightweight_summary()) {
        Ok(payload) => {
            if let Err(e) = sink.publish(UpdateEvent::System, &payload) {
                tracing::warn!("{e}");
            }
        }
        Err(e) => tracing::error!("Failed to serialize system summary: {e}"),
    }
}
