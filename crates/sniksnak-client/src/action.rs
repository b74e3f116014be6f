//! Outputs of the room session state machine.

use crate::{
    envelope::DecryptedMessage,
    store::{NewMessage, RoomId, Timestamp},
};

/// Externally visible session status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    /// Waiting for the link.
    Initializing,
    /// Room keys imported, waiting for the author identity.
    ImportingKeys,
    /// All keys available, waiting for the store to confirm the room.
    AwaitingRoom,
    /// Polling; sending enabled.
    Ready,
    /// Terminal. Polling stopped and sending disabled.
    InvalidRoom,
}

/// Instructions produced by [`crate::RoomSession`] for the runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionAction {
    /// Load or create the author identity, then report
    /// `IdentityLoaded` or `IdentityFailed`.
    LoadIdentity,

    /// Look the room up, then report `RoomFetched`.
    FetchRoom {
        /// Room to look up
        room_id: RoomId,
    },

    /// Fetch newer messages, then report `MessagesFetched`.
    FetchMessages {
        /// Room to fetch from
        room_id: RoomId,
        /// Cursor; `None` fetches the whole history
        after: Option<Timestamp>,
    },

    /// Append a sealed message, then report `MessageSent`.
    AddMessage {
        /// Target room
        room_id: RoomId,
        /// Sealed message
        message: NewMessage,
    },

    /// Newly appended messages for the caller.
    DeliverMessages(Vec<DecryptedMessage>),

    /// The session moved to a new status.
    StatusChanged(SessionStatus),

    /// A send failed without invalidating the room; the caller keeps its
    /// draft.
    SendFailed {
        /// Why it failed
        reason: String,
    },
}
