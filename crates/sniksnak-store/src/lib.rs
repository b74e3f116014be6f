//! Reference stores for Sniksnak.
//!
//! Implementations of the [`RoomStore`] contract used by tests, simulation
//! and the command-line front end:
//!
//! - [`MemoryStore`]: in-memory, for tests and simulation
//! - [`ChaoticStore`]: wraps another store and injects transient failures
//! - [`RedbStore`]: durable, backed by redb
//!
//! Every implementation enforces the write gate ([`authorize_write`]) and
//! assigns strictly increasing `createdAt` values per room, so a reader
//! fetching "strictly after the cursor" never skips a message.
//!
//! [`RedbIdentityStorage`] persists the author identity for the CLI.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod chaotic;
mod gate;
mod identity;
mod memory;
mod redb_store;

pub use chaotic::ChaoticStore;
pub use gate::{authorize_write, next_created_at};
pub use identity::RedbIdentityStorage;
pub use memory::MemoryStore;
pub use redb_store::RedbStore;
pub use sniksnak_client::{RoomStore, StoreError};
