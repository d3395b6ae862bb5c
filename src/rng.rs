//! Random source for grid generation.
//!
//! Wraps the `rand` crate's `SmallRng`, which is fast and cheap to
//! reseed. Everything the engine randomizes (mine placement, candidate
//! shuffles, region selection) goes through this one stream so that a
//! fixed seed reproduces a grid bit for bit.

use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, SmallRng};
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng, TryRngCore};

/// A seedable RNG owned by the generator and borrowed by collaborators.
pub struct EngineRng {
    inner: SmallRng,
}

impl EngineRng {
    /// Create with a specific seed for deterministic behavior.
    pub fn from_seed(seed: u64) -> Self {
        Self {
            inner: SmallRng::seed_from_u64(seed),
        }
    }

    /// Generate a random usize in `[0, max)`.
    #[inline(always)]
    pub fn gen_range(&mut self, max: usize) -> usize {
        self.inner.random_range(0..max)
    }

    /// Shuffle a slice in place.
    pub fn shuffle<T>(&mut self, slice: &mut [T]) {
        slice.shuffle(&mut self.inner);
    }
}

/// Pick a non-zero seed from the OS entropy source.
///
/// Falls back to a clock-derived value when no entropy source is
/// available, so generation still works on exotic targets.
pub fn auto_seed() -> u64 {
    match OsRng.try_next_u64() {
        Ok(s) if s != 0 => s,
        _ => {
            let nanos = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0);
            nanos | 1
        }
    }
}
