//! Chaotic store wrapper for fault injection testing
//!
//! Store wrapper that fails operations with `Unavailable` to exercise the
//! client's retry policy. Failures come from a seeded generator, or can be
//! forced for an exact number of upcoming calls.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicU32, AtomicUsize, Ordering},
};

use sniksnak_client::{MessageRecord, NewMessage, Room, RoomId, RoomStore, StoreError, Timestamp};

/// Chaotic store wrapper that injects transient failures.
///
/// Delegates to an underlying store. Clones share the RNG and counters.
#[derive(Clone)]
pub struct ChaoticStore<S> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Calls that will fail regardless of the rate
    forced_failures: Arc<AtomicU32>,
    /// Writes that commit but report `Unavailable`
    lost_acks: Arc<AtomicU32>,
    /// Total calls attempted
    operation_count: Arc<AtomicUsize>,
}

/// Linear congruential generator; reproducible with the same seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: RoomStore> ChaoticStore<S> {
    /// Wrap `inner`, failing each call with probability `failure_rate`.
    ///
    /// The rate is clamped to [0.0, 1.0].
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        Self {
            inner,
            failure_rate: failure_rate.clamp(0.0, 1.0),
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            forced_failures: Arc::new(AtomicU32::new(0)),
            lost_acks: Arc::new(AtomicU32::new(0)),
            operation_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Wrap `inner` without random failures; use [`Self::fail_next`].
    pub fn reliable(inner: S) -> Self {
        Self::with_seed(inner, 0.0, 0)
    }

    /// Fail the next `count` calls.
    pub fn fail_next(&self, count: u32) {
        self.forced_failures.store(count, Ordering::SeqCst);
    }

    /// Commit the next `count` writes but report them as `Unavailable`.
    pub fn lose_next_acks(&self, count: u32) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Underlying store (for checking state after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of calls attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::SeqCst)
    }

    fn inject(&self, operation: &'static str) -> Result<(), StoreError> {
        self.operation_count.fetch_add(1, Ordering::SeqCst);

        let forced = self
            .forced_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        // A poisoned RNG lock counts as a failure.
        let failed =
            forced || self.rng.lock().map_or(true, |mut rng| rng.next() < self.failure_rate);

        if failed {
            tracing::trace!(operation, "injecting store failure");
            return Err(StoreError::Unavailable { reason: "chaotic failure injection".to_string() });
        }
        Ok(())
    }
}

impl<S: RoomStore> RoomStore for ChaoticStore<S> {
    async fn create_room(&self, room_signing_public_key: &str) -> Result<Room, StoreError> {
        self.inject("create_room")?;
        self.inner.create_room(room_signing_public_key).await
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Room, StoreError> {
        self.inject("get_room")?;
        self.inner.get_room(room_id).await
    }

    async fn get_messages(
        &self,
        room_id: RoomId,
        after: Option<Timestamp>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        self.inject("get_messages")?;
        self.inner.get_messages(room_id, after).await
    }

    async fn add_message(
        &self,
        room_id: RoomId,
        message: &NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        self.inject("add_message")?;
        let record = self.inner.add_message(room_id, message).await?;

        let lost =
            self.lost_acks.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if lost.is_ok() {
            tracing::trace!(id = %record.id, "dropping write acknowledgement");
            return Err(StoreError::Unavailable { reason: "acknowledgement lost".to_string() });
        }
        Ok(record)
    }
}
