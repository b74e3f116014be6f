//! Production Environment implementation using system time and RNG.
//!
//! Real time that advances naturally, OS cryptographic randomness and tokio
//! sleeps. Nothing here is reproducible; deterministic runs use the
//! harness's `SimEnv` instead.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use sniksnak_client::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// # Security
///
/// Room keys, author keys and IVs all come from `random_bytes`, which uses
/// getrandom (the OS CSPRNG).
///
/// # Panics
///
/// Panics if the OS RNG fails. Without working randomness no key or IV can be
/// generated safely, so there is nothing sensible to fall back to.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_millis(&self) -> u64 {
        // A clock before 1970 reads as the epoch; stores still order records.
        SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_millis() as u64)
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
