//! Fuzz target for the room session state machine
//!
//! Feeds arbitrary event sequences (including results the runtime would
//! never produce in that order) into a `RoomSession`.
//!
//! # Invariants
//!
//! - `handle` NEVER panics
//! - Only `Send` ever returns `Err`
//! - `InvalidRoom` is absorbing and never polls
//! - While Ready, the decrypted log only grows and the cursor never goes
//!   backwards

#![no_main]

use std::time::Duration;

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sniksnak_client::{
    ClientConfig, ClientError, Environment, GeneratedRoomKeys, IdentityKeyStore,
    MemoryIdentityStorage, MessageId, MessageRecord, Room, RoomId, RoomKeyMaterial, RoomSession,
    SessionEvent, SessionStatus, StoreError, Timestamp, envelope,
};
use sniksnak_harness::SimEnv;

const ROOM: RoomId = RoomId(7);

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    events: Vec<FuzzEvent>,
}

#[derive(Debug, Clone, Arbitrary)]
enum FuzzEvent {
    Open { garbage: Option<String> },
    IdentityLoaded,
    IdentityFailed,
    RoomFetched { found: bool },
    MessagesFetched { records: Vec<FuzzRecord> },
    FetchFailed,
    Send { text: String },
    MessageSent { ok: bool, created_at: u64 },
    Tick,
    Close,
}

#[derive(Debug, Clone, Arbitrary)]
struct FuzzRecord {
    id: u8,
    created_at: u64,
    foreign: bool,
}

fuzz_target!(|input: FuzzInput| {
    let env = SimEnv::with_seed(input.seed);
    let config = ClientConfig { poll_interval: Duration::ZERO, ..ClientConfig::default() };
    let keys = GeneratedRoomKeys::generate(&env);
    let room = RoomKeyMaterial::from_fragment(&keys.fragment()).expect("generated fragment");
    let foreign = RoomKeyMaterial::from_fragment(&GeneratedRoomKeys::generate(&env).fragment())
        .expect("generated fragment");
    let author = IdentityKeyStore::new(MemoryIdentityStorage::new())
        .load_or_create(&env)
        .expect("memory identity");

    let record = |r: &FuzzRecord| {
        let material = if r.foreign { &foreign } else { &room };
        let message = envelope::seal("fuzz", material, &author, env.random_array())
            .expect("sealing");
        MessageRecord::from_new(MessageId(r.id.into()), message, Timestamp(r.created_at))
    };

    let mut session = RoomSession::new(env.clone(), &config);
    let mut log_len = 0;
    let mut cursor = None;
    let mut invalid = false;

    for event in input.events {
        let is_send = matches!(event, FuzzEvent::Send { .. });
        let event = match event {
            FuzzEvent::Open { garbage } => SessionEvent::Open {
                room_id: ROOM,
                fragment: garbage.unwrap_or_else(|| keys.fragment()),
            },
            FuzzEvent::IdentityLoaded => SessionEvent::IdentityLoaded(author.clone()),
            FuzzEvent::IdentityFailed => SessionEvent::IdentityFailed(
                ClientError::IdentityUnavailable { attempts: 5, reason: "fuzz".to_string() },
            ),
            FuzzEvent::RoomFetched { found: true } => SessionEvent::RoomFetched(Ok(Room {
                id: ROOM,
                room_signing_public_key: keys.signing_public_key.clone(),
            })),
            FuzzEvent::RoomFetched { found: false } => {
                SessionEvent::RoomFetched(Err(ClientError::RoomNotFound { room_id: ROOM }))
            },
            FuzzEvent::MessagesFetched { records } => {
                SessionEvent::MessagesFetched(Ok(records.iter().map(record).collect()))
            },
            FuzzEvent::FetchFailed => SessionEvent::MessagesFetched(Err(ClientError::from_store(
                ROOM,
                StoreError::Unavailable { reason: "fuzz".to_string() },
                4,
            ))),
            FuzzEvent::Send { text } => SessionEvent::Send { text },
            FuzzEvent::MessageSent { ok: true, created_at } => SessionEvent::MessageSent(Ok(
                record(&FuzzRecord { id: 0, created_at, foreign: false }),
            )),
            FuzzEvent::MessageSent { ok: false, .. } => {
                SessionEvent::MessageSent(Err(ClientError::TransientFetch {
                    attempts: 4,
                    reason: "fuzz".to_string(),
                }))
            },
            FuzzEvent::Tick => SessionEvent::Tick,
            FuzzEvent::Close => SessionEvent::Close,
        };

        if session.handle(event).is_err() {
            assert!(is_send, "only Send may return Err");
        }

        let status = session.status();
        if invalid {
            assert_eq!(status, SessionStatus::InvalidRoom, "InvalidRoom must be absorbing");
        }
        invalid = status == SessionStatus::InvalidRoom;
        if invalid {
            assert!(!session.is_polling());
        }

        // The log only exists while Ready, and Ready is never re-entered.
        if status == SessionStatus::Ready {
            assert!(session.messages().len() >= log_len, "log shrank");
            assert!(session.cursor() >= cursor, "cursor went backwards");
        }
        log_len = session.messages().len();
        cursor = session.cursor();
    }
});
