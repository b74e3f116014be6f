//! Redb-backed durable store.
//!
//! Uses Redb's ACID transactions, so rooms and messages survive restarts and
//! a write either lands completely or not at all.

use std::{fmt, path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use sniksnak_client::{
    Environment, MessageId, MessageRecord, NewMessage, Room, RoomId, RoomStore, StoreError,
    Timestamp,
};

use crate::gate::{authorize_write, next_created_at};

/// Table: rooms
/// Key: room_id as big-endian bytes [16 bytes]
/// Value: CBOR-encoded Room
const ROOMS: TableDefinition<&[u8], &[u8]> = TableDefinition::new("rooms");

/// Table: messages
/// Key: (room_id: u128, created_at: u64) as big-endian bytes [24 bytes]
/// Value: CBOR-encoded MessageRecord
const MESSAGES: TableDefinition<&[u8], &[u8]> = TableDefinition::new("messages");

/// Durable store backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc).
#[derive(Clone)]
pub struct RedbStore<E> {
    db: Arc<Database>,
    env: E,
}

fn unavailable(e: impl fmt::Display) -> StoreError {
    StoreError::Unavailable { reason: e.to_string() }
}

fn malformed(e: impl fmt::Display) -> StoreError {
    StoreError::Malformed { reason: e.to_string() }
}

impl<E: Environment> RedbStore<E> {
    /// Open or create a Redb database at the given path.
    ///
    /// Creates the tables if they don't exist.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unavailable` if the database cannot be opened or
    /// created.
    pub fn open(path: impl AsRef<Path>, env: E) -> Result<Self, StoreError> {
        let db = Database::create(path.as_ref()).map_err(unavailable)?;

        let txn = db.begin_write().map_err(unavailable)?;
        {
            let _ = txn.open_table(ROOMS).map_err(unavailable)?;
            let _ = txn.open_table(MESSAGES).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)?;

        Ok(Self { db: Arc::new(db), env })
    }

    fn load_room<T: ReadableTable<&'static [u8], &'static [u8]>>(
        table: &T,
        room_id: RoomId,
    ) -> Result<Option<Room>, StoreError> {
        let key = encode_room_key(room_id);
        match table.get(key.as_slice()).map_err(unavailable)? {
            Some(value) => ciborium::from_reader(value.value()).map(Some).map_err(malformed),
            None => Ok(None),
        }
    }

    /// `createdAt` of the newest record in a room.
    fn latest_created_at<T: ReadableTable<&'static [u8], &'static [u8]>>(
        table: &T,
        room_id: RoomId,
    ) -> Result<Option<Timestamp>, StoreError> {
        let start = encode_message_key(room_id, Timestamp(0));
        let end = encode_message_key(room_id, Timestamp(u64::MAX));

        let mut range = table.range(start.as_slice()..=end.as_slice()).map_err(unavailable)?;
        match range.next_back() {
            Some(entry) => {
                let (key, _) = entry.map_err(unavailable)?;
                Ok(decode_message_key(key.value()).map(|(_, created_at)| created_at))
            },
            None => Ok(None),
        }
    }
}

impl<E: Environment> RoomStore for RedbStore<E> {
    async fn create_room(&self, room_signing_public_key: &str) -> Result<Room, StoreError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        let room = {
            let mut table = txn.open_table(ROOMS).map_err(unavailable)?;

            let mut id = RoomId(self.env.random_u128());
            while Self::load_room(&table, id)?.is_some() {
                id = RoomId(self.env.random_u128());
            }
            let room = Room { id, room_signing_public_key: room_signing_public_key.to_string() };

            let mut bytes = Vec::new();
            ciborium::into_writer(&room, &mut bytes).map_err(malformed)?;
            table
                .insert(encode_room_key(id).as_slice(), bytes.as_slice())
                .map_err(unavailable)?;
            room
        };
        txn.commit().map_err(unavailable)?;

        tracing::debug!(room_id = %room.id, "room created");
        Ok(room)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Room, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable)?;
        let table = txn.open_table(ROOMS).map_err(unavailable)?;

        Self::load_room(&table, room_id)?.ok_or(StoreError::NotFound)
    }

    async fn get_messages(
        &self,
        room_id: RoomId,
        after: Option<Timestamp>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let txn = self.db.begin_read().map_err(unavailable)?;
        let rooms = txn.open_table(ROOMS).map_err(unavailable)?;
        if Self::load_room(&rooms, room_id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let first = match after {
            Some(Timestamp(after)) => match after.checked_add(1) {
                Some(next) => Timestamp(next),
                None => return Ok(Vec::new()),
            },
            None => Timestamp(0),
        };
        let start = encode_message_key(room_id, first);
        let end = encode_message_key(room_id, Timestamp(u64::MAX));

        let table = txn.open_table(MESSAGES).map_err(unavailable)?;
        let mut records = Vec::new();
        for entry in table.range(start.as_slice()..=end.as_slice()).map_err(unavailable)? {
            let (_, value) = entry.map_err(unavailable)?;
            let record: MessageRecord = ciborium::from_reader(value.value()).map_err(malformed)?;
            records.push(record);
        }
        Ok(records)
    }

    async fn add_message(
        &self,
        room_id: RoomId,
        message: &NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        let record = {
            let rooms = txn.open_table(ROOMS).map_err(unavailable)?;
            let room = Self::load_room(&rooms, room_id)?.ok_or(StoreError::NotFound)?;
            authorize_write(&room, message)?;

            let mut table = txn.open_table(MESSAGES).map_err(unavailable)?;
            let last = Self::latest_created_at(&table, room_id)?;
            let created_at = next_created_at(self.env.wall_clock_millis(), last);
            let record = MessageRecord::from_new(
                MessageId(self.env.random_u128()),
                message.clone(),
                created_at,
            );

            let mut bytes = Vec::new();
            ciborium::into_writer(&record, &mut bytes).map_err(malformed)?;
            table
                .insert(encode_message_key(room_id, created_at).as_slice(), bytes.as_slice())
                .map_err(unavailable)?;
            record
        };
        txn.commit().map_err(unavailable)?;

        tracing::debug!(%room_id, id = %record.id, created_at = %record.created_at, "message stored");
        Ok(record)
    }
}

/// Encode room_id as 16-byte big-endian key.
fn encode_room_key(room_id: RoomId) -> [u8; 16] {
    room_id.0.to_be_bytes()
}

/// Encode (room_id, created_at) as 24-byte big-endian key.
///
/// Layout: [room_id: 16 bytes BE][created_at: 8 bytes BE]
/// This ensures lexicographic ordering matches numeric ordering.
fn encode_message_key(room_id: RoomId, created_at: Timestamp) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(&room_id.0.to_be_bytes());
    key[16..].copy_from_slice(&created_at.0.to_be_bytes());
    key
}

/// Decode a message key back to (room_id, created_at).
fn decode_message_key(key: &[u8]) -> Option<(RoomId, Timestamp)> {
    let room: [u8; 16] = key.get(..16)?.try_into().ok()?;
    let created_at: [u8; 8] = key.get(16..24)?.try_into().ok()?;
    Some((RoomId(u128::from_be_bytes(room)), Timestamp(u64::from_be_bytes(created_at))))
}
