//! Digital line sources for the pinwatch agent.
//!
//! A line source answers one question: what is the current logic level of
//! pin N? Two backends exist: the sysfs GPIO interface on real hardware,
//! and a pseudo-random simulation used when no GPIO controller is present.
//! The backend is probed once at startup and never changes during a run.

pub mod hardware;
pub mod simulated;

pub use hardware::HardwareSource;
pub use simulated::SimulatedSource;

/// Logic level of a digital input line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Low,
    High,
}

impl Level {
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// The opposite level.
    pub fn toggled(self) -> Level {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }

    /// Wire representation (0 or 1).
    pub fn as_u8(self) -> u8 {
        match self {
            Level::Low => 0,
            Level::High => 1,
        }
    }
}

/// A single read of a line failed.
///
/// Read failures are per-tick, per-pin events: the sampler logs them and
/// leaves the pin's recorded state untouched for that tick.
#[derive(Debug)]
pub struct ReadError {
    pub pin: u8,
    pub reason: String,
}

impl std::fmt::Display for ReadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "failed to read pin {}: {}", self.pin, self.reason)
    }
}

impl std::error::Error for ReadError {}

/// The line source backend, selected once at startup.
pub enum LineSource {
    Hardware(HardwareSource),
    Simulated(SimulatedSource),
}

impl LineSource {
    /// Probe for a GPIO controller and pick the matching backend.
    pub fn detect(flip_probability: f64) -> Self {
        if HardwareSource::available() {
            tracing::info!("GPIO controller found, using hardware line source");
            LineSource::Hardware(HardwareSource::new())
        } else {
            tracing::info!("No GPIO controller available, running in simulation mode");
            LineSource::Simulated(SimulatedSource::new(flip_probability))
        }
    }

    /// Initialize the requested pins, returning the subset that succeeded.
    ///
    /// Pins that fail setup are logged and dropped for the rest of the run;
    /// a partial failure is not fatal.
    pub fn setup(&mut self, pins: &[u8]) -> Vec<u8> {
        match self {
            LineSource::Hardware(s) => s.setup(pins),
            LineSource::Simulated(s) => s.setup(pins),
        }
    }

    /// Read the current level of a pin.
    pub fn read(&mut self, pin: u8) -> Result<Level, ReadError> {
        match self {
            LineSource::Hardware(s) => s.read(pin),
            LineSource::Simulated(s) => Ok(s.read(pin)),
        }
    }

    /// Backend name for logs and the config API.
    pub fn name(&self) -> &'static str {
        match self {
            LineSource::Hardware(_) => "hardware",
            LineSource::Simulated(_) => "simulated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_toggle() {
        assert_eq!(Level::Low.toggled(), Level::High);
        assert_eq!(Level::High.toggled(), Level::Low);
        assert_eq!(Level::High.as_u8(), 1);
        assert_eq!(Level::Low.as_u8(), 0);
    }

    #[test]
    fn test_read_error_display() {
        let err = ReadError {
            pin: 9,
            reason: "value file missing".to_string(),
        };
        assert!(err.to_string().contains("pin 9"));
    }
}
