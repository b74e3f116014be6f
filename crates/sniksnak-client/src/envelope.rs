//! Message envelope: dual-signed encryption and decoding.
//!
//! # Encoding
//!
//! ```text
//! {ciphertext, iv}   = encrypt(plaintext, room encryption key)
//! messageSignature   = sign("ciphertext|iv", room signing key)
//! authorSignature    = sign(messageSignature, author key)
//! ```
//!
//! The room signature proves the writer holds the link; the store checks it
//! before accepting a write. The author signature binds the message to one
//! installation and is only used locally to recognise our own messages.
//!
//! # Decoding
//!
//! Decoding never re-verifies the room signature; the store gate is the
//! authority for that. A batch decodes all-or-nothing: one record that fails
//! to decrypt rejects the whole batch.

use sniksnak_crypto::{EncryptionKey, IV_SIZE, VerifyingKey, decrypt, encrypt, sign, verify};

use crate::{
    AuthorIdentity, ClientError, RoomKeyMaterial,
    store::{MessageId, MessageRecord, NewMessage, Timestamp},
};

/// A decoded message. Derived, never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecryptedMessage {
    /// Store-assigned ID
    pub id: MessageId,
    /// Plaintext
    pub message: String,
    /// Store-assigned creation time
    pub created_at: Timestamp,
    /// Whether this installation wrote it
    pub is_author: bool,
}

/// The exact input of the room signature.
pub fn signed_content(ciphertext: &str, iv: &str) -> String {
    format!("{ciphertext}|{iv}")
}

/// Encrypt and dual-sign a message.
///
/// # Errors
///
/// - `Signing`: either signature could not be produced
pub fn seal(
    plaintext: &str,
    room: &RoomKeyMaterial,
    author: &AuthorIdentity,
    iv: [u8; IV_SIZE],
) -> Result<NewMessage, ClientError> {
    let payload = encrypt(plaintext, room.encryption_key(), iv);
    let content = signed_content(&payload.ciphertext, &payload.iv);
    let message_signature =
        sign(&content, room.signing_key()).map_err(|source| ClientError::Signing { source })?;
    let author_signature = sign(&message_signature, author.signing_key())
        .map_err(|source| ClientError::Signing { source })?;

    Ok(NewMessage {
        ciphertext: payload.ciphertext,
        iv: payload.iv,
        message_signature,
        author_signature,
    })
}

/// Whether a write carries a valid room signature under `room_key`.
///
/// This is the store's authenticity gate.
pub fn is_room_authentic(message: &NewMessage, room_key: &VerifyingKey) -> bool {
    verify(&signed_content(&message.ciphertext, &message.iv), &message.message_signature, room_key)
}

/// Decode one record.
///
/// # Errors
///
/// - `Decryption`: the record does not decrypt under `encryption_key`
pub fn open(
    record: &MessageRecord,
    encryption_key: &EncryptionKey,
    author_key: &VerifyingKey,
) -> Result<DecryptedMessage, ClientError> {
    let is_author = verify(&record.message_signature, &record.author_signature, author_key);
    let message = decrypt(&record.payload(), encryption_key)
        .map_err(|source| ClientError::Decryption { message_id: record.id, source })?;

    Ok(DecryptedMessage { id: record.id, message, created_at: record.created_at, is_author })
}

/// Decode a fetched batch, all or nothing.
///
/// # Errors
///
/// - `Decryption`: the first record that failed; nothing is returned
pub fn open_batch(
    records: &[MessageRecord],
    encryption_key: &EncryptionKey,
    author_key: &VerifyingKey,
) -> Result<Vec<DecryptedMessage>, ClientError> {
    records.iter().map(|record| open(record, encryption_key, author_key)).collect()
}

#[cfg(test)]
mod tests {
    use sniksnak_crypto::{
        KEY_SIZE, SEED_SIZE, SigningKeyPair, encode_signing_key, encode_verifying_key,
    };

    use super::*;
    use crate::{identity::StoredIdentity, room_keys::GeneratedRoomKeys, test_support::TestEnv};

    fn room_material(seed: u64) -> RoomKeyMaterial {
        let keys = GeneratedRoomKeys::generate(&TestEnv::new(seed));
        RoomKeyMaterial::from_fragment(&keys.fragment()).unwrap()
    }

    fn author(seed: u8) -> AuthorIdentity {
        let pair = SigningKeyPair::generate([seed; SEED_SIZE]);
        AuthorIdentity::decode(&StoredIdentity {
            private_key: encode_signing_key(pair.signing_key()),
            public_key: encode_verifying_key(pair.verifying_key()),
        })
        .unwrap()
    }

    fn stored(message: NewMessage, id: u128, created_at: u64) -> MessageRecord {
        MessageRecord::from_new(MessageId(id), message, Timestamp(created_at))
    }

    #[test]
    fn seal_open_roundtrip() {
        let room = room_material(1);
        let alice = author(1);
        let sealed = seal("hello", &room, &alice, [0; IV_SIZE]).unwrap();

        let opened =
            open(&stored(sealed, 1, 5), room.encryption_key(), alice.verifying_key()).unwrap();

        assert_eq!(opened.message, "hello");
        assert_eq!(opened.created_at, Timestamp(5));
        assert!(opened.is_author);
    }

    #[test]
    fn other_author_is_not_us() {
        let room = room_material(1);
        let sealed = seal("hi", &room, &author(1), [0; IV_SIZE]).unwrap();

        let opened = open(&stored(sealed, 1, 1), room.encryption_key(), author(2).verifying_key())
            .unwrap();

        assert!(!opened.is_author);
        assert_eq!(opened.message, "hi");
    }

    #[test]
    fn room_signature_covers_ciphertext_and_iv() {
        let room = room_material(1);
        let sealed = seal("x", &room, &author(1), [3; IV_SIZE]).unwrap();

        assert!(is_room_authentic(&sealed, room.verifying_key()));
        assert!(!is_room_authentic(&sealed, room_material(2).verifying_key()));

        let moved = NewMessage { iv: sealed.ciphertext.clone(), ..sealed.clone() };
        assert!(!is_room_authentic(&moved, room.verifying_key()));
    }

    #[test]
    fn swapped_author_signature_is_not_ours() {
        let room = room_material(1);
        let alice = author(1);
        let first = seal("one", &room, &alice, [1; IV_SIZE]).unwrap();
        let second = seal("two", &room, &alice, [2; IV_SIZE]).unwrap();

        // Author signature from another message does not bind to this one.
        let spliced = NewMessage { author_signature: first.author_signature, ..second };
        let opened = open(&stored(spliced, 1, 1), room.encryption_key(), alice.verifying_key())
            .unwrap();

        assert!(!opened.is_author);
    }

    #[test]
    fn batch_is_all_or_nothing() {
        let room = room_material(1);
        let alice = author(1);
        let good = stored(seal("good", &room, &alice, [1; IV_SIZE]).unwrap(), 1, 1);
        let foreign = stored(seal("bad", &room_material(9), &alice, [2; IV_SIZE]).unwrap(), 2, 2);

        let result =
            open_batch(&[good.clone(), foreign], room.encryption_key(), alice.verifying_key());
        assert!(matches!(
            result,
            Err(ClientError::Decryption { message_id: MessageId(2), .. })
        ));

        let decoded = open_batch(&[good], room.encryption_key(), alice.verifying_key()).unwrap();
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn empty_batch_decodes_to_nothing() {
        let room = room_material(1);
        let key = EncryptionKey::from_bytes([0; KEY_SIZE]);

        assert!(open_batch(&[], &key, room.verifying_key()).unwrap().is_empty());
    }

    #[test]
    fn signed_content_format() {
        assert_eq!(signed_content("abc", "def"), "abc|def");
    }
}
