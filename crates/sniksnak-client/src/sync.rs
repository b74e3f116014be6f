//! Incremental message sync.
//!
//! The engine owns the decrypted log, the cursor (the `createdAt` of the last
//! appended message) and the in-flight guard. It never talks to the store:
//! callers ask it for a [`FetchRequest`], perform the fetch, and hand back the
//! decoded batch.
//!
//! # Invariants
//!
//! - At most one fetch is in flight
//! - The cursor never decreases
//! - The log is ordered by non-decreasing `createdAt`
//! - The log never holds two messages with the same ID
//! - A manual trigger during an in-flight fetch is remembered and issued when
//!   that fetch completes

use std::collections::HashSet;

use crate::{
    envelope::DecryptedMessage,
    store::{MessageId, Timestamp},
};

/// A fetch the caller should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchRequest {
    /// Only records strictly newer than this
    pub after: Option<Timestamp>,
}

/// Result of completing a fetch.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct FetchOutcome {
    /// Messages appended to the log, in order
    pub appended: Vec<DecryptedMessage>,
    /// Deferred manual fetch that should be issued now
    pub next: Option<FetchRequest>,
}

/// Cursor, log and in-flight guard for one room.
#[derive(Debug, Default)]
pub struct SyncEngine {
    cursor: Option<Timestamp>,
    log: Vec<DecryptedMessage>,
    seen: HashSet<MessageId>,
    in_flight: bool,
    refetch_pending: bool,
}

impl SyncEngine {
    /// Empty log, no cursor.
    pub fn new() -> Self {
        Self::default()
    }

    /// `createdAt` of the last appended message.
    pub fn cursor(&self) -> Option<Timestamp> {
        self.cursor
    }

    /// Decrypted log in append order.
    pub fn log(&self) -> &[DecryptedMessage] {
        &self.log
    }

    /// Whether a fetch is outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Start a fetch unless one is already in flight.
    ///
    /// Used by the poll timer: an overlapping tick is simply skipped.
    pub fn begin_fetch(&mut self) -> Option<FetchRequest> {
        if self.in_flight {
            return None;
        }
        self.in_flight = true;
        Some(FetchRequest { after: self.cursor })
    }

    /// Request an immediate fetch (after a send).
    ///
    /// If a fetch is in flight the request is deferred until it completes.
    pub fn trigger(&mut self) -> Option<FetchRequest> {
        if self.in_flight {
            self.refetch_pending = true;
            return None;
        }
        self.begin_fetch()
    }

    /// Finish the in-flight fetch with a decoded batch.
    ///
    /// Messages are appended in received order. Any whose ID is already in
    /// the log, whose `createdAt` is not past the cursor the fetch started
    /// from, or that sorts before the message appended just ahead of it, are
    /// dropped. Records sharing a `createdAt` within one batch are all kept.
    pub fn complete(&mut self, batch: Vec<DecryptedMessage>) -> FetchOutcome {
        self.in_flight = false;

        let start = self.cursor;
        let mut appended = Vec::with_capacity(batch.len());
        for message in batch {
            if self.seen.contains(&message.id) {
                tracing::warn!(id = %message.id, "dropping duplicate message");
                continue;
            }
            if start.is_some_and(|cursor| message.created_at <= cursor) {
                tracing::warn!(
                    id = %message.id,
                    created_at = %message.created_at,
                    "dropping message older than cursor"
                );
                continue;
            }
            if self.cursor.is_some_and(|cursor| message.created_at < cursor) {
                tracing::warn!(
                    id = %message.id,
                    created_at = %message.created_at,
                    "dropping out-of-order message"
                );
                continue;
            }

            self.cursor = Some(message.created_at);
            self.seen.insert(message.id);
            self.log.push(message.clone());
            appended.push(message);
        }

        if !appended.is_empty() {
            tracing::debug!(count = appended.len(), cursor = ?self.cursor, "appended messages");
        }

        let next = if std::mem::take(&mut self.refetch_pending) { self.begin_fetch() } else { None };
        FetchOutcome { appended, next }
    }

    /// Abandon the in-flight fetch without touching the log.
    pub fn abort(&mut self) {
        self.in_flight = false;
        self.refetch_pending = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(id: u128, created_at: u64) -> DecryptedMessage {
        DecryptedMessage {
            id: MessageId(id),
            message: format!("m{id}"),
            created_at: Timestamp(created_at),
            is_author: false,
        }
    }

    #[test]
    fn first_fetch_has_no_cursor() {
        let mut sync = SyncEngine::new();

        assert_eq!(sync.begin_fetch(), Some(FetchRequest { after: None }));
    }

    #[test]
    fn cursor_follows_last_appended() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        sync.complete(vec![message(1, 10), message(2, 20)]);

        assert_eq!(sync.cursor(), Some(Timestamp(20)));
        assert_eq!(sync.begin_fetch(), Some(FetchRequest { after: Some(Timestamp(20)) }));
    }

    #[test]
    fn empty_batch_keeps_cursor() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        sync.complete(vec![message(1, 10)]);
        sync.begin_fetch();
        let outcome = sync.complete(Vec::new());

        assert!(outcome.appended.is_empty());
        assert_eq!(sync.cursor(), Some(Timestamp(10)));
    }

    #[test]
    fn overlapping_fetch_is_suppressed() {
        let mut sync = SyncEngine::new();

        assert!(sync.begin_fetch().is_some());
        assert!(sync.begin_fetch().is_none());
        assert!(sync.is_in_flight());
    }

    #[test]
    fn trigger_during_fetch_is_deferred() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();

        assert!(sync.trigger().is_none());
        let outcome = sync.complete(vec![message(1, 10)]);

        assert_eq!(outcome.next, Some(FetchRequest { after: Some(Timestamp(10)) }));
        assert!(sync.is_in_flight());
    }

    #[test]
    fn trigger_when_idle_fetches_now() {
        let mut sync = SyncEngine::new();

        assert_eq!(sync.trigger(), Some(FetchRequest { after: None }));
    }

    #[test]
    fn duplicates_and_stale_records_are_dropped() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        sync.complete(vec![message(1, 10), message(2, 20)]);
        sync.begin_fetch();
        let outcome = sync.complete(vec![message(2, 30), message(3, 15), message(4, 40)]);

        assert_eq!(outcome.appended, vec![message(4, 40)]);
        let ids: Vec<_> = sync.log().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MessageId(1), MessageId(2), MessageId(4)]);
        assert_eq!(sync.cursor(), Some(Timestamp(40)));
    }

    #[test]
    fn same_millisecond_records_are_all_appended() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        let outcome = sync.complete(vec![message(1, 100), message(2, 100), message(3, 101)]);

        let ids: Vec<_> = outcome.appended.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MessageId(1), MessageId(2), MessageId(3)]);
        assert_eq!(sync.cursor(), Some(Timestamp(101)));
    }

    #[test]
    fn same_millisecond_as_cursor_is_stale_in_later_batch() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        sync.complete(vec![message(1, 100), message(2, 100)]);
        sync.begin_fetch();
        let outcome = sync.complete(vec![message(3, 100), message(4, 101)]);

        assert_eq!(outcome.appended, vec![message(4, 101)]);
    }

    #[test]
    fn out_of_order_record_in_batch_is_dropped() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        let outcome = sync.complete(vec![message(1, 50), message(2, 40), message(3, 60)]);

        let ids: Vec<_> = outcome.appended.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![MessageId(1), MessageId(3)]);
        assert_eq!(sync.cursor(), Some(Timestamp(60)));
    }

    #[test]
    fn abort_clears_guard_and_deferred_trigger() {
        let mut sync = SyncEngine::new();
        sync.begin_fetch();
        sync.trigger();
        sync.abort();

        assert!(!sync.is_in_flight());
        assert_eq!(sync.complete(Vec::new()).next, None);
    }
}
