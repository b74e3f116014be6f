//! Deterministic Environment implementation for simulation tests.

use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sniksnak_client::Environment;

/// Wall clock reading at the start of every simulation (2023-11-14).
pub const SIM_EPOCH_MILLIS: u64 = 1_700_000_000_000;

/// Simulation environment on tokio's clock with a seeded RNG.
///
/// - **Virtual Time**: `now()` reads tokio's clock. Inside a runtime started
///   with `start_paused = true`, sleeps complete instantly and time only
///   moves when every task is idle.
///
/// - **Seeded RNG**: `random_bytes()` uses ChaCha20Rng, so room IDs, keys and
///   IVs are the same on every run with the same seed.
///
/// - **Wall Clock**: [`SIM_EPOCH_MILLIS`] plus the virtual time elapsed since
///   the environment was created, so store timestamps advance with the
///   simulation.
///
/// Clones share the RNG stream, so one seed drives a whole scenario.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    epoch: tokio::time::Instant,
}

impl SimEnv {
    /// Create a new SimEnv with default seed (0)
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Create a new SimEnv with a specific seed
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            epoch: tokio::time::Instant::now(),
        }
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now().into_std()
    }

    fn wall_clock_millis(&self) -> u64 {
        let elapsed = tokio::time::Instant::now().saturating_duration_since(self.epoch);
        SIM_EPOCH_MILLIS + elapsed.as_millis() as u64
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // A poisoned lock still holds a usable generator.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
