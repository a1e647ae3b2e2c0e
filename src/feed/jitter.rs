// src/feed/jitter.rs
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::source::round_to;

/// ±0.25% around the last real value.
pub const DEFAULT_AMPLITUDE: f64 = 0.0025;

/// Symmetric random nudge for display liveliness.
pub struct Jitter {
    amplitude: f64,
    decimals: u32,
    rng: StdRng,
}

impl Jitter {
    /// Default amplitude, OS-seeded.
    pub fn new(decimals: u32) -> Self {
        Self {
            amplitude: DEFAULT_AMPLITUDE,
            decimals,
            rng: StdRng::from_os_rng(),
        }
    }

    /// Deterministic variant for tests and replays.
    pub fn seeded(amplitude: f64, decimals: u32, seed: u64) -> Self {
        Self {
            amplitude,
            decimals,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Always relative to `base`, so repeated nudges never drift.
    pub fn nudge(&mut self, base: f64) -> f64 {
        let a = self.amplitude.abs();
        let delta = if a > 0.0 {
            self.rng.random_range(-a..=a)
        } else {
            0.0
        };
        round_to((base * (1.0 + delta)).max(0.0), self.decimals)
    }
}
