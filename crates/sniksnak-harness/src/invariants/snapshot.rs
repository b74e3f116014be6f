//! Observable state snapshots for invariant checking.

use sniksnak_client::{DecryptedMessage, RoomId, SessionStatus, Timestamp};

/// Snapshot of every party in a simulation.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// Per-party state.
    pub parties: Vec<PartySnapshot>,
}

impl SystemSnapshot {
    /// Create an empty snapshot (no parties).
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a snapshot with a single party.
    pub fn single(party: PartySnapshot) -> Self {
        Self { parties: vec![party] }
    }

    /// Create a snapshot from several parties.
    pub fn from_parties(parties: Vec<PartySnapshot>) -> Self {
        Self { parties }
    }
}

/// Snapshot of one party's session.
#[derive(Debug, Clone)]
pub struct PartySnapshot {
    /// Party name.
    pub name: &'static str,
    /// Room the session was opened on, if any.
    pub room_id: Option<RoomId>,
    /// Session status.
    pub status: SessionStatus,
    /// Whether the poll timer is armed.
    pub polling: bool,
    /// Current sync cursor.
    pub cursor: Option<Timestamp>,
    /// Every distinct cursor value observed, oldest first.
    pub cursor_history: Vec<Timestamp>,
    /// Decrypted log.
    pub log: Vec<DecryptedMessage>,
}

impl PartySnapshot {
    /// Snapshot of a party that has not opened a room.
    pub fn idle(name: &'static str) -> Self {
        Self {
            name,
            room_id: None,
            status: SessionStatus::Initializing,
            polling: false,
            cursor: None,
            cursor_history: Vec::new(),
            log: Vec::new(),
        }
    }
}
