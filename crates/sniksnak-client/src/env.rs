//! Environment abstraction for deterministic testing.
//!
//! Decouples session logic from system resources (time, randomness). The
//! simulation environment drives a paused tokio clock and a seeded RNG; the
//! command-line front end uses the real clock and OS entropy.

use std::{
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

/// Abstract environment providing time, randomness, and async sleep.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// - `now()` and `wall_clock_millis()` never go backwards
/// - `random_bytes()` uses cryptographically secure entropy in production.
///   Room keys, author keys and IVs are all drawn from it.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant type used by this environment.
    type Instant: Copy
        + Ord
        + Send
        + Sync
        + Sub<Output = Duration>
        + Add<Duration, Output = Self::Instant>;

    /// Current monotonic time.
    fn now(&self) -> Self::Instant;

    /// Milliseconds since the Unix epoch.
    ///
    /// Only stores use this, to stamp `createdAt` on appended records.
    fn wall_clock_millis(&self) -> u64;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code awaits this; the session state machine never does.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Fixed-size array of random bytes.
    fn random_array<const N: usize>(&self) -> [u8; N] {
        let mut bytes = [0u8; N];
        self.random_bytes(&mut bytes);
        bytes
    }

    /// Generates a random `u128`.
    ///
    /// Used for room and message IDs.
    fn random_u128(&self) -> u128 {
        u128::from_be_bytes(self.random_array())
    }
}
