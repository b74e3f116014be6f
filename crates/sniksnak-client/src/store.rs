//! Store contract.
//!
//! The store is an untrusted append-only relay. It holds rooms (an ID plus
//! the room signing public key) and per-room message records, and never sees
//! plaintext or private keys.
//!
//! # Contract
//!
//! - `get_messages(room, after)` returns records in ascending `createdAt`
//!   order, strictly greater than `after`
//! - `add_message` MUST reject any write whose `messageSignature` does not
//!   verify over `ciphertext|iv` under the room's stored public key
//! - `createdAt` is assigned by the store

use std::{fmt, future::Future, str::FromStr};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use sniksnak_crypto::{EncryptedPayload, IV_SIZE, SIGNATURE_SIZE};
use thiserror::Error;

/// GCM tag size; the shortest valid ciphertext.
const MIN_CIPHERTEXT_SIZE: usize = 16;

/// Error parsing a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid identifier {input:?}: expected 1 to 32 hex digits")]
pub struct ParseIdError {
    /// Rejected input
    pub input: String,
}

fn parse_hex_id(input: &str) -> Result<u128, ParseIdError> {
    if input.is_empty() || input.len() > 32 {
        return Err(ParseIdError { input: input.to_string() });
    }
    u128::from_str_radix(input, 16).map_err(|_| ParseIdError { input: input.to_string() })
}

/// Opaque room identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u128);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for RoomId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_id(s).map(Self)
    }
}

/// Opaque message identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub u128);

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl FromStr for MessageId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_hex_id(s).map(Self)
    }
}

/// Store-assigned creation time, in milliseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(pub u64);

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ms", self.0)
    }
}

/// A room as held by the store. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    /// Store-assigned ID
    pub id: RoomId,
    /// Encoded public half of the room signing keypair
    pub room_signing_public_key: String,
}

/// A message write, as produced by the envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewMessage {
    /// Base64 AES-GCM ciphertext including the tag
    pub ciphertext: String,
    /// Base64 12-byte IV
    pub iv: String,
    /// Room signature over `ciphertext|iv`
    pub message_signature: String,
    /// Author signature over `message_signature`
    pub author_signature: String,
}

/// A stored message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    /// Store-assigned ID
    pub id: MessageId,
    /// Base64 AES-GCM ciphertext including the tag
    pub ciphertext: String,
    /// Base64 12-byte IV
    pub iv: String,
    /// Room signature over `ciphertext|iv`
    pub message_signature: String,
    /// Author signature over `message_signature`
    pub author_signature: String,
    /// Store-assigned creation time
    pub created_at: Timestamp,
}

impl MessageRecord {
    /// Build a record from an accepted write.
    pub fn from_new(id: MessageId, message: NewMessage, created_at: Timestamp) -> Self {
        let NewMessage { ciphertext, iv, message_signature, author_signature } = message;
        Self { id, ciphertext, iv, message_signature, author_signature, created_at }
    }

    /// Ciphertext and IV as a decryptable payload.
    pub fn payload(&self) -> EncryptedPayload {
        EncryptedPayload { ciphertext: self.ciphertext.clone(), iv: self.iv.clone() }
    }

    /// Check the record's shape at the store boundary.
    ///
    /// Does not verify any signature; only that every field decodes and has
    /// the expected length.
    ///
    /// # Errors
    ///
    /// - `Malformed`: a field is not base64 or has the wrong length
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_fields(&self.ciphertext, &self.iv, &self.message_signature, &self.author_signature)
            .map_err(|reason| StoreError::Malformed {
                reason: format!("message {}: {reason}", self.id),
            })
    }
}

impl NewMessage {
    /// Check the write's shape. Same rules as [`MessageRecord::validate`].
    pub fn validate(&self) -> Result<(), StoreError> {
        validate_fields(&self.ciphertext, &self.iv, &self.message_signature, &self.author_signature)
            .map_err(|reason| StoreError::Malformed { reason })
    }
}

fn validate_fields(
    ciphertext: &str,
    iv: &str,
    message_signature: &str,
    author_signature: &str,
) -> Result<(), String> {
    let decoded_len = |field: &str, value: &str| {
        BASE64.decode(value).map(|raw| raw.len()).map_err(|_| format!("{field} is not base64"))
    };

    if decoded_len("ciphertext", ciphertext)? < MIN_CIPHERTEXT_SIZE {
        return Err("ciphertext shorter than authentication tag".to_string());
    }
    let iv_len = decoded_len("iv", iv)?;
    if iv_len != IV_SIZE {
        return Err(format!("iv length: expected {IV_SIZE}, got {iv_len}"));
    }
    let signatures = [("messageSignature", message_signature), ("authorSignature", author_signature)];
    for (field, value) in signatures {
        let len = decoded_len(field, value)?;
        if len != SIGNATURE_SIZE {
            return Err(format!("{field} length: expected {SIGNATURE_SIZE}, got {len}"));
        }
    }
    Ok(())
}

/// Errors returned by a store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The room does not exist
    #[error("room not found")]
    NotFound,

    /// A write was rejected by the authenticity gate
    #[error("unauthorized: message signature does not match the room key")]
    Unauthorized,

    /// Temporary failure; the call may succeed on retry
    #[error("store unavailable: {reason}")]
    Unavailable {
        /// What went wrong
        reason: String,
    },

    /// Input or stored data failed shape validation
    #[error("malformed record: {reason}")]
    Malformed {
        /// What was wrong with it
        reason: String,
    },
}

impl StoreError {
    /// Returns true if the call may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// The remote message store.
///
/// Implementations must be safe to share between tasks. All methods take
/// `&self`; implementations use interior mutability.
pub trait RoomStore: Send + Sync {
    /// Create a room holding only the room signing public key.
    fn create_room(
        &self,
        room_signing_public_key: &str,
    ) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Look up a room. `NotFound` if absent.
    fn get_room(&self, room_id: RoomId) -> impl Future<Output = Result<Room, StoreError>> + Send;

    /// Records with `createdAt` strictly greater than `after`, ascending.
    ///
    /// `None` returns the whole room history. `NotFound` if the room is
    /// absent.
    fn get_messages(
        &self,
        room_id: RoomId,
        after: Option<Timestamp>,
    ) -> impl Future<Output = Result<Vec<MessageRecord>, StoreError>> + Send;

    /// Append a message after checking its room signature.
    ///
    /// `NotFound` if the room is absent, `Unauthorized` if the signature
    /// does not verify under the room's stored public key.
    fn add_message(
        &self,
        room_id: RoomId,
        message: &NewMessage,
    ) -> impl Future<Output = Result<MessageRecord, StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn well_formed() -> MessageRecord {
        MessageRecord {
            id: MessageId(1),
            ciphertext: BASE64.encode([0u8; 20]),
            iv: BASE64.encode([0u8; IV_SIZE]),
            message_signature: BASE64.encode([0u8; SIGNATURE_SIZE]),
            author_signature: BASE64.encode([0u8; SIGNATURE_SIZE]),
            created_at: Timestamp(10),
        }
    }

    #[test]
    fn ids_render_as_fixed_width_hex() {
        assert_eq!(RoomId(0xab).to_string(), format!("{:0>32}", "ab"));
        assert_eq!("ab".parse::<RoomId>().unwrap(), RoomId(0xab));
        assert_eq!(RoomId(u128::MAX).to_string().parse::<RoomId>().unwrap(), RoomId(u128::MAX));
    }

    #[test]
    fn bad_ids_are_rejected() {
        assert!("".parse::<RoomId>().is_err());
        assert!("xyz".parse::<MessageId>().is_err());
        assert!("0".repeat(33).parse::<RoomId>().is_err());
    }

    #[test]
    fn well_formed_record_validates() {
        assert_eq!(well_formed().validate(), Ok(()));
    }

    #[test]
    fn short_iv_is_malformed() {
        let record = MessageRecord { iv: BASE64.encode([0u8; 8]), ..well_formed() };

        assert!(matches!(
            record.validate(),
            Err(StoreError::Malformed { reason }) if reason.contains("iv length")
        ));
    }

    #[test]
    fn truncated_signature_is_malformed() {
        let record = MessageRecord { author_signature: BASE64.encode([0u8; 32]), ..well_formed() };

        assert!(record.validate().is_err());
    }

    #[test]
    fn non_base64_ciphertext_is_malformed() {
        let record = MessageRecord { ciphertext: "!!".to_string(), ..well_formed() };

        assert!(record.validate().is_err());
    }

    #[test]
    fn from_new_keeps_every_field() {
        let record = well_formed();
        let from_new = MessageRecord::from_new(
            record.id,
            NewMessage {
                ciphertext: record.ciphertext.clone(),
                iv: record.iv.clone(),
                message_signature: record.message_signature.clone(),
                author_signature: record.author_signature.clone(),
            },
            record.created_at,
        );
        assert_eq!(from_new, record);
    }

    #[test]
    fn only_unavailable_is_transient() {
        assert!(StoreError::Unavailable { reason: "timeout".into() }.is_transient());
        assert!(!StoreError::NotFound.is_transient());
        assert!(!StoreError::Unauthorized.is_transient());
        assert!(!StoreError::Malformed { reason: String::new() }.is_transient());
    }
}
