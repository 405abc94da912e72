//! Simulated line source for hosts without a GPIO controller.
//!
//! Each pin keeps its previous level; on every read a pseudo-random draw
//! (1% by default) flips it. Reads never fail.

use crate::source::Level;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Line source producing pseudo-random level flips.
pub struct SimulatedSource {
    flip_probability: f64,
    rng: StdRng,
    levels: HashMap<u8, Level>,
}

impl SimulatedSource {
    /// Create a simulated source with the given per-read flip probability.
    pub fn new(flip_probability: f64) -> Self {
        Self::with_rng(flip_probability, StdRng::from_os_rng())
    }

    /// Create a simulated source with a fixed RNG seed.
    ///
    /// With `flip_probability` 1.0 every read flips, which makes the
    /// sampler fully deterministic in tests.
    pub fn with_seed(flip_probability: f64, seed: u64) -> Self {
        Self::with_rng(flip_probability, StdRng::seed_from_u64(seed))
    }

    fn with_rng(flip_probability: f64, rng: StdRng) -> Self {
        Self {
            flip_probability: flip_probability.clamp(0.0, 1.0),
            rng,
            levels: HashMap::new(),
        }
    }

    /// Initialize pins with random starting levels. Never fails.
    pub fn setup(&mut self, pins: &[u8]) -> Vec<u8> {
        for &pin in pins {
            let level = if self.rng.random_bool(0.5) {
                Level::High
            } else {
                Level::Low
            };
            self.levels.insert(pin, level);
        }
        pins.to_vec()
    }

    /// Read a pin, occasionally flipping its level.
    pub fn read(&mut self, pin: u8) -> Level {
        let flip = self.rng.random_bool(self.flip_probability);
        let level = self.levels.entry(pin).or_insert(Level::Low);
        if flip {
            *level = level.toggled();
        }
        *level
    }
}
