//! The pin monitoring engine.
//!
//! [`PinMonitor`] owns the whole monitoring state behind a single mutex,
//! runs the sampling loop and the broadcast consumer on dedicated threads,
//! and exposes the query API used by the CLI and the HTTP layer.

pub mod history;
mod sampler;
pub mod state;
pub mod status;

pub use history::{HighInterval, HistoryBuffer, HISTORY_CAPACITY};
pub use state::{ChangeEvent, MonitorState};
pub use status::{HistoryEntry, PinStatus, StatusSnapshot};

use crate::broadcast::{self, PublishSink, SYSTEM_UPDATE_INTERVAL};
use crate::config::Config;
use crate::source::LineSource;
use chrono::Utc;
use crossbeam_channel::bounded;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

/// Capacity of the change notification queue between sampler and
/// broadcaster. The sampler never blocks on it; overflow is dropped and
/// covered by the snapshot heartbeat.
const EVENT_QUEUE_CAPACITY: usize = 1024;

/// Lock the state bundle, recovering from a poisoned mutex.
///
/// A panicking sampler tick cannot leave the bundle in an invariant-
/// violating intermediate state (edges apply atomically under the lock),
/// so continuing with the inner value is sound.
pub(crate) fn lock_state(state: &Mutex<MonitorState>) -> MutexGuard<'_, MonitorState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// Errors from the monitor lifecycle.
#[derive(Debug)]
pub enum MonitorError {
    /// Not a single requested line initialized; there is nothing to sample.
    NoLinesAccepted,
}

impl std::fmt::Display for MonitorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorError::NoLinesAccepted => {
                write!(f, "no GPIO lines could be initialized for monitoring")
            }
        }
    }
}

impl std::error::Error for MonitorError {}

/// The monitoring engine: sampling loop, transition tracking, history,
/// and the dual-cadence broadcast path.
pub struct PinMonitor {
    config: Config,
    state: Arc<Mutex<MonitorState>>,
    sink: Arc<dyn PublishSink>,
    running: Arc<AtomicBool>,
    force_simulation: bool,
    workers: Mutex<Vec<JoinHandle<()>>>,
    done: Mutex<Option<crossbeam_channel::Receiver<()>>>,
}

impl PinMonitor {
    /// Create a monitor with the given configuration and publish sink.
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    pub fn new(config: Config, sink: Arc<dyn PublishSink>) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(MonitorState::new())),
            sink,
            running: Arc::new(AtomicBool::new(false)),
            force_simulation: false,
            workers: Mutex::new(Vec::new()),
            done: Mutex::new(None),
        }
    }

    /// Always use the simulated source, even when hardware is present.
    pub fn set_simulation(&mut self, force: bool) {
        self.force_simulation = force;
    }

    /// Probe for a line source and start monitoring.
    ///
    /// Idempotent: calling start while running is a no-op. The only fatal
    /// outcome is that no line at all passes setup.
    pub fn start(&self) -> Result<(), MonitorError> {
        let source = if self.force_simulation {
            tracing::info!("Simulation forced, skipping hardware probe");
            LineSource::Simulated(crate::source::SimulatedSource::new(
                self.config.simulation_flip_probability,
            ))
        } else {
            LineSource::detect(self.config.simulation_flip_probability)
        };
        self.start_with_source(source)
    }

    /// Start monitoring with an explicit line source.
    pub fn start_with_source(&self, mut source: LineSource) -> Result<(), MonitorError> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::debug!("Monitor already running, start ignored");
            return Ok(());
        }

        let accepted = source.setup(&self.config.monitored_lines);
        if accepted.is_empty() {
            self.running.store(false, Ordering::SeqCst);
            return Err(MonitorError::NoLinesAccepted);
        }
        if accepted.len() < self.config.monitored_lines.len() {
            tracing::warn!(
                "Monitoring {} of {} requested lines",
                accepted.len(),
                self.config.monitored_lines.len()
            );
        }

        // Seed the state bundle with initial levels before the first tick.
        let now = Utc::now();
        {
            let mut guard = lock_state(&self.state);
            for &pin in &accepted {
                let level = match source.read(pin) {
                    Ok(level) => level,
                    Err(e) => {
                        tracing::warn!("{e}; assuming low at startup");
                        crate::source::Level::Low
                    }
                };
                guard.register_pin(pin, level, self.config.label_for(pin), now);
            }
        }

        let (event_tx, event_rx) = bounded(EVENT_QUEUE_CAPACITY);
        let (done_tx, done_rx) = bounded(2);

        let sampler_state = self.state.clone();
        let sampler_running = self.running.clone();
        let sampler_done = done_tx.clone();
        let interval = self.config.update_interval;
        let sampler = std::thread::spawn(move || {
            sampler::run(source, sampler_state, event_tx, interval, sampler_running);
            let _ = sampler_done.send(());
        });

        let broadcast_state = self.state.clone();
        let broadcast_sink = self.sink.clone();
        let broadcast_running = self.running.clone();
        let broadcaster = std::thread::spawn(move || {
            broadcast::run(
                event_rx,
                broadcast_state,
                broadcast_sink,
                interval,
                SYSTEM_UPDATE_INTERVAL,
                broadcast_running,
            );
            let _ = done_tx.send(());
        });

        *self.workers.lock().unwrap_or_else(|e| e.into_inner()) = vec![sampler, broadcaster];
        *self.done.lock().unwrap_or_else(|e| e.into_inner()) = Some(done_rx);

        tracing::info!("GPIO monitoring started on {} lines", accepted.len());
        Ok(())
    }

    /// Signal the workers to stop and wait for them with a bounded timeout.
    ///
    /// Idempotent. A worker that misses the deadline is detached rather
    /// than joined unboundedly.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }

        let deadline = self.config.update_interval * 2 + Duration::from_millis(500);
        let done = self.done.lock().unwrap_or_else(|e| e.into_inner()).take();
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(|e| e.into_inner()));

        let mut finished = 0;
        if let Some(done) = done {
            for _ in 0..workers.len() {
                if done.recv_timeout(deadline).is_ok() {
                    finished += 1;
                }
            }
        }

        if finished == workers.len() {
            for handle in workers {
                let _ = handle.join();
            }
        } else {
            tracing::warn!("A monitor worker did not stop in time, detaching");
        }

        tracing::info!("GPIO monitoring stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Snapshot of every monitored pin's current status.
    pub fn get_status(&self) -> StatusSnapshot {
        let guard = lock_state(&self.state);
        status::assemble(&guard, Utc::now())
    }

    /// Transition counts per pin since the last reset.
    pub fn get_transition_summary(&self) -> HashMap<u8, u64> {
        lock_state(&self.state).transition_summary()
    }

    /// Completed high intervals for a pin whose start lies within the last
    /// `hours`. Zero or negative hours yield an empty list; a window too
    /// large to represent returns the whole buffer.
    pub fn get_history(&self, pin: u8, hours: f64) -> Vec<HighInterval> {
        if hours <= 0.0 {
            return Vec::new();
        }
        // The cast saturates for huge values; the subtraction can still
        // underflow the datetime range, in which case no cutoff applies.
        let window = chrono::Duration::milliseconds((hours * 3_600_000.0) as i64);
        let cutoff = Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC);
        lock_state(&self.state).history_since(pin, cutoff)
    }

    /// Default history query window from the configuration.
    pub fn default_history_hours(&self) -> f64 {
        self.config.history_window_minutes as f64 / 60.0
    }

    /// Zero all transition counters and clear all history buffers.
    ///
    /// Current levels and in-progress high intervals are untouched.
    pub fn reset(&self) {
        lock_state(&self.state).reset();
        tracing::info!("All counters reset");
    }

    /// Update pin labels at runtime. Unknown pins are ignored.
    pub fn set_labels(&self, labels: HashMap<u8, String>) {
        lock_state(&self.state).set_labels(labels);
    }

    /// Pins that passed setup and are actively monitored.
    pub fn monitored_pins(&self) -> Vec<u8> {
        lock_state(&self.state).pins().to_vec()
    }

    /// Current labels of the monitored pins.
    pub fn labels(&self) -> HashMap<u8, String> {
        lock_state(&self.state).labels.clone()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }
}

impl Drop for PinMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::LogSink;
    use crate::source::SimulatedSource;

    fn test_monitor(pins: Vec<u8>) -> PinMonitor {
        let config = Config {
            monitored_lines: pins,
            update_interval: Duration::from_millis(5),
            ..Config::default()
        };
        PinMonitor::new(config, Arc::new(LogSink))
    }

    fn flipping_source() -> LineSource {
        LineSource::Simulated(SimulatedSource::with_seed(1.0, 9))
    }

    #[test]
    fn test_start_fails_without_lines() {
        let monitor = test_monitor(Vec::new());
        assert!(matches!(
            monitor.start_with_source(flipping_source()),
            Err(MonitorError::NoLinesAccepted)
        ));
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_start_and_stop_are_idempotent() {
        let monitor = test_monitor(vec![17]);
        monitor.start_with_source(flipping_source()).unwrap();
        assert!(monitor.is_running());

        // Second start is a no-op, not an error.
        monitor.start().unwrap();
        assert!(monitor.is_running());

        monitor.stop();
        assert!(!monitor.is_running());
        monitor.stop();
        assert!(!monitor.is_running());
    }

    #[test]
    fn test_sampling_accumulates_transitions() {
        let monitor = test_monitor(vec![17, 27]);
        monitor.start_with_source(flipping_source()).unwrap();
        std::thread::sleep(Duration::from_millis(80));
        monitor.stop();

        // Flip probability 1.0 flips every pin on every tick.
        let summary = monitor.get_transition_summary();
        assert!(summary[&17] > 0);
        assert!(summary[&27] > 0);

        let status = monitor.get_status();
        assert_eq!(status.len(), 2);
    }

    #[test]
    fn test_reset_while_running() {
        let monitor = test_monitor(vec![17]);
        monitor.start_with_source(flipping_source()).unwrap();
        std::thread::sleep(Duration::from_millis(50));

        monitor.reset();
        // Counters may tick up again immediately, but history restarts from
        // the reset point and levels remain whatever the source says.
        let status = monitor.get_status();
        assert!(status.contains_key("17"));
        monitor.stop();
    }

    #[test]
    fn test_history_window_filtering() {
        let monitor = test_monitor(vec![17]);
        {
            let mut guard = lock_state(&monitor.state);
            guard.register_pin(17, crate::source::Level::Low, "GPIO 17".to_string(), Utc::now());
            let old = Utc::now() - chrono::Duration::hours(3);
            guard.apply_edge(17, crate::source::Level::High, old);
            guard.apply_edge(17, crate::source::Level::Low, old + chrono::Duration::seconds(1));
            let fresh = Utc::now() - chrono::Duration::minutes(2);
            guard.apply_edge(17, crate::source::Level::High, fresh);
            guard.apply_edge(17, crate::source::Level::Low, fresh + chrono::Duration::seconds(1));
        }

        assert_eq!(monitor.get_history(17, 1.0).len(), 1);
        assert_eq!(monitor.get_history(17, 4.0).len(), 2);
        assert!(monitor.get_history(17, 0.0).is_empty());

        // Windows too large to subtract from now fall back to "everything"
        // instead of overflowing the datetime range.
        assert_eq!(monitor.get_history(17, 1e12).len(), 2);
        assert_eq!(monitor.get_history(17, f64::MAX).len(), 2);
    }

    #[test]
    fn test_label_updates_apply_to_status() {
        let monitor = test_monitor(vec![17]);
        monitor.start_with_source(flipping_source()).unwrap();
        monitor.set_labels(HashMap::from([(17, "Door sensor".to_string())]));
        let status = monitor.get_status();
        assert_eq!(status["17"].label, "Door sensor");
        monitor.stop();
    }
}
