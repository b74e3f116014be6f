//! Inputs to the room session state machine.
//!
//! Events come from two places: the caller (open, send, tick, close) and the
//! runtime reporting the outcome of an action it executed.

use crate::{
    AuthorIdentity, ClientError,
    store::{MessageRecord, Room, RoomId},
};

/// Events consumed by [`crate::RoomSession`].
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The user opened a room link.
    Open {
        /// Room from the link path
        room_id: RoomId,
        /// Key fragment from the link, with or without the leading `#`
        fragment: String,
    },

    /// The author identity finished loading.
    IdentityLoaded(AuthorIdentity),

    /// The author identity could not be loaded.
    IdentityFailed(ClientError),

    /// Result of looking the room up in the store.
    RoomFetched(Result<Room, ClientError>),

    /// Result of an incremental message fetch.
    MessagesFetched(Result<Vec<MessageRecord>, ClientError>),

    /// The user wants to send a message.
    Send {
        /// Draft text; trimmed before encryption
        text: String,
    },

    /// Result of appending a message to the store.
    MessageSent(Result<MessageRecord, ClientError>),

    /// Time has passed; the poll timer may be due.
    Tick,

    /// The user left the room.
    Close,
}
