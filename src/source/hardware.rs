//! Hardware line source backed by the Linux sysfs GPIO interface.
//!
//! Each pin is exported under `/sys/class/gpio`, configured as an input,
//! and read back from its `value` file. The sysfs root is injectable so
//! tests can run against a fake tree.

use crate::source::{Level, ReadError};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Line source reading real GPIO pins through sysfs.
pub struct HardwareSource {
    root: PathBuf,
    /// Pins this source exported itself; unexported again on drop.
    exported: HashSet<u8>,
}

impl HardwareSource {
    /// Create a source against the system GPIO tree.
    pub fn new() -> Self {
        Self::with_root(PathBuf::from(SYSFS_GPIO_ROOT))
    }

    /// Create a source against an alternate sysfs root (used by tests).
    pub fn with_root(root: PathBuf) -> Self {
        Self {
            root,
            exported: HashSet::new(),
        }
    }

    /// Whether a GPIO controller is present on this host.
    pub fn available() -> bool {
        Path::new(SYSFS_GPIO_ROOT).is_dir()
    }

    /// Export and configure the requested pins as inputs.
    ///
    /// Returns the pins that initialized successfully; failures are logged
    /// and the pin is excluded for the rest of the run.
    pub fn setup(&mut self, pins: &[u8]) -> Vec<u8> {
        let mut accepted = Vec::with_capacity(pins.len());

        for &pin in pins {
            match self.setup_pin(pin) {
                Ok(()) => accepted.push(pin),
                Err(reason) => {
                    tracing::warn!("Failed to set up GPIO pin {pin}: {reason}");
                }
            }
        }

        accepted
    }

    fn setup_pin(&mut self, pin: u8) -> Result<(), String> {
        let pin_dir = self.pin_dir(pin);

        // Export unless the pin is already visible (e.g. exported by a
        // previous run). Writing to `export` for an exported pin fails.
        if !pin_dir.is_dir() {
            std::fs::write(self.root.join("export"), pin.to_string())
                .map_err(|e| format!("export failed: {e}"))?;
            self.exported.insert(pin);
        }

        std::fs::write(pin_dir.join("direction"), "in")
            .map_err(|e| format!("setting direction failed: {e}"))?;

        // A first read catches pins that exported but are not actually usable.
        self.read(pin).map_err(|e| e.reason)?;
        Ok(())
    }

    /// Read the current level of a pin from its sysfs value file.
    pub fn read(&self, pin: u8) -> Result<Level, ReadError> {
        let value_path = self.pin_dir(pin).join("value");
        let raw = std::fs::read_to_string(&value_path).map_err(|e| ReadError {
            pin,
            reason: format!("{}: {e}", value_path.display()),
        })?;

        match raw.trim() {
            "0" => Ok(Level::Low),
            "1" => Ok(Level::High),
            other => Err(ReadError {
                pin,
                reason: format!("unexpected value {other:?}"),
            }),
        }
    }

    fn pin_dir(&self, pin: u8) -> PathBuf {
        self.root.join(format!("gpio{pin}"))
    }
}

impl Default for HardwareSource {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for HardwareSource {
    fn drop(&mut self) {
        for pin in self.exported.drain() {
            if let Err(e) = std::fs::write(self.root.join("unexport"), pin.to_string()) {
                tracing::debug!("Failed to unexport pin {pin}: {e}");
            }
        }
    }
}
