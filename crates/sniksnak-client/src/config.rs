//! Client timing configuration.

use std::time::Duration;

/// Timing and retry knobs for a room session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Delay between automatic message fetches once the room is ready.
    pub poll_interval: Duration,
    /// How many times a transient store failure is retried before giving up.
    pub fetch_retries: u32,
    /// Delay between store retries.
    pub retry_delay: Duration,
    /// Total attempts to load the author identity.
    pub identity_attempts: u32,
    /// Base identity backoff; attempt `n` waits `n * identity_backoff`.
    pub identity_backoff: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            fetch_retries: 3,
            retry_delay: Duration::from_millis(250),
            identity_attempts: 5,
            identity_backoff: Duration::from_millis(200),
        }
    }
}
