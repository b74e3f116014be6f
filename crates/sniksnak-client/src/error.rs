//! Error types for the room session.
//!
//! Most errors are terminal for the room: the session escalates them to
//! `InvalidRoom` and stops polling. [`ClientError::is_fatal`] is the single
//! place that classification lives.

use sniksnak_crypto::CryptoError;
use thiserror::Error;

use crate::{
    identity::IdentityStorageError,
    store::{MessageId, RoomId, StoreError},
};

/// Errors surfaced by the client.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The link fragment does not carry both key fields
    #[error("malformed key material: {reason}")]
    MalformedKeyMaterial {
        /// What was missing or undecodable
        reason: String,
    },

    /// A key string decoded but could not be imported
    #[error("key import failed: {source}")]
    KeyImport {
        /// Underlying codec error
        #[source]
        source: CryptoError,
    },

    /// A record in a fetched batch did not decrypt under the room key
    #[error("message {message_id} failed to decrypt: {source}")]
    Decryption {
        /// Offending record
        message_id: MessageId,
        /// Underlying AEAD error
        #[source]
        source: CryptoError,
    },

    /// Signing an outgoing message failed
    #[error("signing failed: {source}")]
    Signing {
        /// Underlying signing error
        #[source]
        source: CryptoError,
    },

    /// The store does not know this room
    #[error("room {room_id} not found")]
    RoomNotFound {
        /// Requested room
        room_id: RoomId,
    },

    /// The store rejected a write's room signature
    #[error("room {room_id} rejected the message signature")]
    Unauthorized {
        /// Target room
        room_id: RoomId,
    },

    /// A store record failed boundary validation
    #[error("malformed record: {reason}")]
    MalformedRecord {
        /// Validation failure
        reason: String,
    },

    /// The store stayed unavailable through every retry
    #[error("store unavailable after {attempts} attempts: {reason}")]
    TransientFetch {
        /// Attempts made, including the first
        attempts: u32,
        /// Last failure
        reason: String,
    },

    /// `send` was called when it is not allowed
    #[error("cannot send: {reason}")]
    SendPrecondition {
        /// Which precondition failed
        reason: &'static str,
    },

    /// Identity storage stayed unavailable through every attempt
    #[error("author identity unavailable after {attempts} attempts: {reason}")]
    IdentityUnavailable {
        /// Attempts made
        attempts: u32,
        /// Last failure
        reason: String,
    },

    /// Identity storage failed
    #[error(transparent)]
    IdentityStorage(#[from] IdentityStorageError),

    /// Store failure outside a room context (room creation)
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ClientError {
    /// Returns true if the error invalidates the room.
    ///
    /// Send preconditions and signing failures only fail the send;
    /// everything else means the room can never be read correctly.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::SendPrecondition { .. } | Self::Signing { .. })
    }

    /// Returns true if the error may clear on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::IdentityStorage(e) => e.is_transient(),
            Self::Store(e) => e.is_transient(),
            _ => false,
        }
    }

    /// Attach room context to a store failure.
    ///
    /// `attempts` is how many calls were made before giving up.
    pub fn from_store(room_id: RoomId, error: StoreError, attempts: u32) -> Self {
        match error {
            StoreError::NotFound => Self::RoomNotFound { room_id },
            StoreError::Unauthorized => Self::Unauthorized { room_id },
            StoreError::Malformed { reason } => Self::MalformedRecord { reason },
            StoreError::Unavailable { reason } => Self::TransientFetch { attempts, reason },
        }
    }

    pub(crate) fn malformed_key(reason: impl Into<String>) -> Self {
        Self::MalformedKeyMaterial { reason: reason.into() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_gain_room_context() {
        let room_id = RoomId(7);

        assert_eq!(
            ClientError::from_store(room_id, StoreError::NotFound, 1),
            ClientError::RoomNotFound { room_id }
        );
        assert_eq!(
            ClientError::from_store(room_id, StoreError::Unauthorized, 1),
            ClientError::Unauthorized { room_id }
        );
        assert_eq!(
            ClientError::from_store(room_id, StoreError::Unavailable { reason: "down".into() }, 4),
            ClientError::TransientFetch { attempts: 4, reason: "down".into() }
        );
    }

    #[test]
    fn send_precondition_is_not_fatal() {
        assert!(!ClientError::SendPrecondition { reason: "empty message" }.is_fatal());
        assert!(ClientError::RoomNotFound { room_id: RoomId(1) }.is_fatal());
        assert!(ClientError::malformed_key("missing field").is_fatal());
    }

    #[test]
    fn transient_classification() {
        let unavailable = IdentityStorageError::Unavailable { reason: "locked".into() };

        assert!(ClientError::from(unavailable).is_transient());
        assert!(!ClientError::TransientFetch { attempts: 4, reason: String::new() }.is_transient());
    }

    #[test]
    fn display_includes_room() {
        let err = ClientError::RoomNotFound { room_id: RoomId(0x10) };
        assert_eq!(err.to_string(), format!("room {} not found", RoomId(0x10)));
    }
}
