//! Write-time authenticity gate and `createdAt` assignment.

use sniksnak_client::{NewMessage, Room, StoreError, Timestamp, envelope::is_room_authentic};
use sniksnak_crypto::decode_verifying_key;

/// Accept a write only if its room signature verifies under the room's
/// stored public key.
///
/// # Errors
///
/// - `Malformed`: the write fails shape validation
/// - `Unauthorized`: the room key does not decode or the signature does not
///   verify over `ciphertext|iv`
pub fn authorize_write(room: &Room, message: &NewMessage) -> Result<(), StoreError> {
    message.validate()?;

    let Ok(room_key) = decode_verifying_key(&room.room_signing_public_key) else {
        tracing::warn!(room_id = %room.id, "stored room key does not decode");
        return Err(StoreError::Unauthorized);
    };
    if !is_room_authentic(message, &room_key) {
        tracing::debug!(room_id = %room.id, "rejecting write with bad room signature");
        return Err(StoreError::Unauthorized);
    }
    Ok(())
}

/// `createdAt` for the next record in a room.
///
/// Wall-clock time, bumped past the previous record when the clock has not
/// advanced (or went backwards), so per-room timestamps are strictly
/// increasing.
pub fn next_created_at(now_millis: u64, last: Option<Timestamp>) -> Timestamp {
    match last {
        Some(Timestamp(last)) if now_millis <= last => Timestamp(last.saturating_add(1)),
        _ => Timestamp(now_millis),
    }
}
