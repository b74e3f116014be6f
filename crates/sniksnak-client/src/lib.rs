//! Client
//!
//! Client side of the Sniksnak protocol: end-to-end encrypted rooms on top of
//! an untrusted append-only store. The store only ever sees ciphertext and
//! the room signing public key.
//!
//! # Architecture
//!
//! The room session is a Sans-IO state machine. It receives events
//! ([`SessionEvent`]), processes them through pure logic, and returns actions
//! ([`SessionAction`]) for the caller to execute. [`SessionRuntime`] is the
//! async caller that executes them against a [`RoomStore`].
//!
//! # Components
//!
//! - [`IdentityKeyStore`]: Per-installation author keypair, load or create
//! - [`RoomKeyMaterial`]: Room encryption and signing keys from the link
//! - [`envelope`]: Dual-signed encrypt and decode of message records
//! - [`SyncEngine`]: Cursor, decrypted log and in-flight guard
//! - [`Scheduler`]: Owned poll timer
//! - [`RoomSession`]: `Initializing → ImportingKeys → AwaitingRoom → Ready`
//!   or `InvalidRoom`
//! - [`SessionRuntime`]: Executes session actions with bounded store retries

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod action;
mod config;
pub mod envelope;
mod env;
mod error;
mod event;
pub mod identity;
pub mod room_keys;
mod runtime;
mod scheduler;
mod session;
pub mod store;
mod sync;

#[cfg(test)]
mod test_support;

pub use action::{SessionAction, SessionStatus};
pub use config::ClientConfig;
pub use env::Environment;
pub use envelope::DecryptedMessage;
pub use error::ClientError;
pub use event::SessionEvent;
pub use identity::{
    AuthorIdentity, IdentityKeyStore, IdentityStorage, IdentityStorageError,
    MemoryIdentityStorage, StoredIdentity,
};
pub use room_keys::{GeneratedRoomKeys, RoomKeyMaterial, RoomLink, RoomSecrets};
pub use runtime::{CreatedRoom, SessionNotice, SessionRuntime, create_room, with_retry};
pub use scheduler::Scheduler;
pub use session::RoomSession;
pub use store::{
    MessageId, MessageRecord, NewMessage, Room, RoomId, RoomStore, StoreError, Timestamp,
};
pub use sync::{FetchOutcome, FetchRequest, SyncEngine};
