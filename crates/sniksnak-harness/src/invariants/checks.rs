//! Standard invariant checks.

use std::collections::HashSet;

use sniksnak_client::SessionStatus;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Each log is in non-decreasing `createdAt` order with unique IDs.
///
/// Records written in the same millisecond may share a `createdAt`. A
/// repeated ID or a record sorting before its predecessor means the engine
/// appended something it should have dropped.
pub struct LogOrdering;

impl Invariant for LogOrdering {
    fn name(&self) -> &'static str {
        "log_ordering"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for party in &state.parties {
            for pair in party.log.windows(2) {
                if pair[1].created_at < pair[0].created_at {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{}: {} at {} follows {} at {}",
                            party.name,
                            pair[1].id,
                            pair[1].created_at,
                            pair[0].id,
                            pair[0].created_at
                        ),
                    });
                }
            }

            let mut seen = HashSet::new();
            if let Some(duplicate) = party.log.iter().find(|m| !seen.insert(m.id)) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{}: duplicate message {}", party.name, duplicate.id),
                });
            }
        }
        Ok(())
    }
}

/// The cursor is the `createdAt` of the newest appended message.
pub struct CursorTracksLog;

impl Invariant for CursorTracksLog {
    fn name(&self) -> &'static str {
        "cursor_tracks_log"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for party in &state.parties {
            let newest = party.log.last().map(|m| m.created_at);
            if party.cursor != newest {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{}: cursor {:?} but newest message at {:?}",
                        party.name, party.cursor, newest
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Observed cursor values only ever increase.
pub struct CursorMonotonicity;

impl Invariant for CursorMonotonicity {
    fn name(&self) -> &'static str {
        "cursor_monotonicity"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for party in &state.parties {
            for pair in party.cursor_history.windows(2) {
                if pair[1] <= pair[0] {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{}: cursor went from {} to {}",
                            party.name, pair[0], pair[1]
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// A session in `InvalidRoom` has its poll timer torn down.
pub struct InvalidRoomIsQuiet;

impl Invariant for InvalidRoomIsQuiet {
    fn name(&self) -> &'static str {
        "invalid_room_is_quiet"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for party in &state.parties {
            if party.status == SessionStatus::InvalidRoom && party.polling {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{}: still polling in InvalidRoom", party.name),
                });
            }
        }
        Ok(())
    }
}

/// Parties in the same room agree on history.
///
/// Parties may be at different cursors, so the shorter log must be a prefix
/// of the longer one. Only IDs and plaintexts are compared; `isAuthor`
/// legitimately differs between parties.
pub struct TranscriptAgreement;

impl Invariant for TranscriptAgreement {
    fn name(&self) -> &'static str {
        "transcript_agreement"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let ready: Vec<_> =
            state.parties.iter().filter(|p| p.status == SessionStatus::Ready).collect();

        for (i, a) in ready.iter().enumerate() {
            for b in &ready[i + 1..] {
                if a.room_id != b.room_id {
                    continue;
                }
                let diverged = a
                    .log
                    .iter()
                    .zip(&b.log)
                    .find(|(x, y)| x.id != y.id || x.message != y.message);
                if let Some((x, y)) = diverged {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} has {} where {} has {}",
                            a.name, x.id, b.name, y.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use sniksnak_client::{DecryptedMessage, MessageId, RoomId, Timestamp};

    use super::*;
    use crate::invariants::PartySnapshot;

    fn message(id: u128, at: u64, text: &str) -> DecryptedMessage {
        DecryptedMessage {
            id: MessageId(id),
            message: text.to_string(),
            created_at: Timestamp(at),
            is_author: false,
        }
    }

    fn ready(name: &'static str, log: Vec<DecryptedMessage>) -> PartySnapshot {
        let cursor = log.last().map(|m| m.created_at);
        PartySnapshot {
            room_id: Some(RoomId(1)),
            status: SessionStatus::Ready,
            polling: true,
            cursor,
            cursor_history: cursor.into_iter().collect(),
            log,
            ..PartySnapshot::idle(name)
        }
    }

    #[test]
    fn ordered_log_passes() {
        let party = ready("a", vec![message(1, 10, "x"), message(2, 11, "y")]);
        assert!(LogOrdering.check(&SystemSnapshot::single(party)).is_ok());
    }

    #[test]
    fn equal_timestamps_pass_ordering() {
        let party = ready("a", vec![message(1, 10, "x"), message(2, 10, "y")]);
        assert!(LogOrdering.check(&SystemSnapshot::single(party)).is_ok());
    }

    #[test]
    fn decreasing_timestamps_violate_ordering() {
        let party = ready("a", vec![message(1, 11, "x"), message(2, 10, "y")]);
        assert!(LogOrdering.check(&SystemSnapshot::single(party)).is_err());
    }

    #[test]
    fn duplicate_ids_violate_ordering() {
        let party = ready("a", vec![message(1, 10, "x"), message(1, 11, "x")]);
        let violation = LogOrdering.check(&SystemSnapshot::single(party)).unwrap_err();
        assert!(violation.message.contains("duplicate"));
    }

    #[test]
    fn stale_cursor_violates() {
        let mut party = ready("a", vec![message(1, 10, "x"), message(2, 11, "y")]);
        party.cursor = Some(Timestamp(10));
        assert!(CursorTracksLog.check(&SystemSnapshot::single(party)).is_err());
    }

    #[test]
    fn regressing_cursor_violates() {
        let mut party = ready("a", vec![]);
        party.cursor_history = vec![Timestamp(5), Timestamp(3)];
        assert!(CursorMonotonicity.check(&SystemSnapshot::single(party)).is_err());
    }

    #[test]
    fn polling_invalid_room_violates() {
        let mut party = ready("a", vec![]);
        party.status = SessionStatus::InvalidRoom;
        assert!(InvalidRoomIsQuiet.check(&SystemSnapshot::single(party.clone())).is_err());

        party.polling = false;
        assert!(InvalidRoomIsQuiet.check(&SystemSnapshot::single(party)).is_ok());
    }

    #[test]
    fn prefix_transcripts_agree() {
        let a = ready("a", vec![message(1, 10, "x")]);
        let b = ready("b", vec![message(1, 10, "x"), message(2, 11, "y")]);
        assert!(TranscriptAgreement.check(&SystemSnapshot::from_parties(vec![a, b])).is_ok());
    }

    #[test]
    fn divergent_transcripts_violate() {
        let a = ready("a", vec![message(1, 10, "x")]);
        let b = ready("b", vec![message(2, 10, "x")]);
        assert!(TranscriptAgreement.check(&SystemSnapshot::from_parties(vec![a, b])).is_err());
    }

    #[test]
    fn different_rooms_are_not_compared() {
        let a = ready("a", vec![message(1, 10, "x")]);
        let mut b = ready("b", vec![message(2, 10, "y")]);
        b.room_id = Some(RoomId(2));
        assert!(TranscriptAgreement.check(&SystemSnapshot::from_parties(vec![a, b])).is_ok());
    }
}
