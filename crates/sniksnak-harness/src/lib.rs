//! Deterministic simulation harness for Sniksnak protocol testing.
//!
//! Runs real [`sniksnak_client::SessionRuntime`]s against the reference
//! stores on tokio's paused clock with a seeded RNG, so every scenario is
//! reproducible from its seed.
//!
//! # Invariant Testing
//!
//! The `invariants` module checks behavioral properties of the parties'
//! observable state (log ordering, cursor monotonicity, transcript
//! agreement) after every step. Use [`InvariantRegistry::standard()`] for the
//! common set.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod invariants;
pub mod sim_env;
pub mod sim_party;

use sniksnak_client::{
    ClientConfig, ClientError, CreatedRoom, IdentityKeyStore, MemoryIdentityStorage, RoomStore,
    create_room,
};

pub use invariants::{
    CursorMonotonicity, CursorTracksLog, InvalidRoomIsQuiet, Invariant, InvariantRegistry,
    InvariantResult, LogOrdering, PartySnapshot, SystemSnapshot, TranscriptAgreement, Violation,
};
pub use sim_env::{SIM_EPOCH_MILLIS, SimEnv};
pub use sim_party::SimParty;

/// Base URL used for links created in simulations.
pub const SIM_BASE_URL: &str = "https://sniksnak.test";

/// Create a room as `creator` would from the landing page.
///
/// # Errors
///
/// Whatever [`create_room`] returns.
pub async fn create_sim_room<S: RoomStore>(
    store: &S,
    creator: &MemoryIdentityStorage,
    env: &SimEnv,
    config: &ClientConfig,
) -> Result<CreatedRoom, ClientError> {
    let identities = IdentityKeyStore::new(creator.clone());
    create_room(store, &identities, env, config, SIM_BASE_URL).await
}
