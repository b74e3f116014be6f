//! In-memory store for testing and simulation.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use sniksnak_client::{
    Environment, MessageId, MessageRecord, NewMessage, Room, RoomId, RoomStore, StoreError,
    Timestamp,
};

use crate::gate::{authorize_write, next_created_at};

/// In-memory store.
///
/// Room and message IDs come from the environment's RNG and `createdAt`
/// from its wall clock, so a seeded simulation produces the same store
/// contents on every run. Clone is cheap and clones share state.
#[derive(Clone)]
pub struct MemoryStore<E> {
    env: E,
    inner: Arc<Mutex<MemoryStoreInner>>,
}

#[derive(Default)]
struct MemoryStoreInner {
    rooms: HashMap<RoomId, Room>,
    /// Records per room in `createdAt` order
    messages: HashMap<RoomId, Vec<MessageRecord>>,
}

impl<E: Environment> MemoryStore<E> {
    /// Create an empty store.
    pub fn new(env: E) -> Self {
        Self { env, inner: Arc::new(Mutex::new(MemoryStoreInner::default())) }
    }

    /// Number of records in a room.
    pub fn message_count(&self, room_id: RoomId) -> usize {
        self.lock().map_or(0, |inner| inner.messages.get(&room_id).map_or(0, Vec::len))
    }

    /// Append a record without the write gate.
    ///
    /// Simulates a compromised store injecting a record. The record's
    /// `createdAt` is replaced so ordering still holds.
    pub fn inject(&self, room_id: RoomId, mut record: MessageRecord) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let now = self.env.wall_clock_millis();
        let log = inner.messages.entry(room_id).or_default();
        record.created_at = next_created_at(now, log.last().map(|r| r.created_at));
        log.push(record);
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryStoreInner>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Unavailable { reason: "store lock poisoned".to_string() })
    }
}

impl<E: Environment> RoomStore for MemoryStore<E> {
    async fn create_room(&self, room_signing_public_key: &str) -> Result<Room, StoreError> {
        let mut inner = self.lock()?;
        let mut id = RoomId(self.env.random_u128());
        while inner.rooms.contains_key(&id) {
            id = RoomId(self.env.random_u128());
        }

        let room = Room { id, room_signing_public_key: room_signing_public_key.to_string() };
        inner.rooms.insert(id, room.clone());
        inner.messages.insert(id, Vec::new());
        tracing::debug!(room_id = %id, "room created");
        Ok(room)
    }

    async fn get_room(&self, room_id: RoomId) -> Result<Room, StoreError> {
        self.lock()?.rooms.get(&room_id).cloned().ok_or(StoreError::NotFound)
    }

    async fn get_messages(
        &self,
        room_id: RoomId,
        after: Option<Timestamp>,
    ) -> Result<Vec<MessageRecord>, StoreError> {
        let inner = self.lock()?;
        if !inner.rooms.contains_key(&room_id) {
            return Err(StoreError::NotFound);
        }

        let log = inner.messages.get(&room_id).map_or(&[][..], Vec::as_slice);
        Ok(log.iter().filter(|r| after.is_none_or(|after| r.created_at > after)).cloned().collect())
    }

    async fn add_message(
        &self,
        room_id: RoomId,
        message: &NewMessage,
    ) -> Result<MessageRecord, StoreError> {
        let mut inner = self.lock()?;
        let room = inner.rooms.get(&room_id).ok_or(StoreError::NotFound)?;
        authorize_write(room, message)?;

        let id = MessageId(self.env.random_u128());
        let now = self.env.wall_clock_millis();
        let log = inner.messages.entry(room_id).or_default();
        let created_at = next_created_at(now, log.last().map(|r| r.created_at));

        let record = MessageRecord::from_new(id, message.clone(), created_at);
        log.push(record.clone());
        tracing::debug!(%room_id, id = %record.id, %created_at, "message stored");
        Ok(record)
    }
}
