//! Store fault injection.
//!
//! Transient read failures are retried a bounded number of times. A fetch
//! that stays unavailable through every retry invalidates the room. Sends are
//! never retried; a transient send failure only produces a notice.

use proptest::prelude::*;
use sniksnak_client::{
    ClientConfig, ClientError, MemoryIdentityStorage, RoomLink, SessionNotice, SessionStatus,
};
use sniksnak_harness::{InvariantRegistry, SimEnv, SimParty, SystemSnapshot, create_sim_room};
use sniksnak_store::{ChaoticStore, MemoryStore};

type Store = ChaoticStore<MemoryStore<SimEnv>>;

async fn setup(seed: u64, store: Store) -> (SimParty<Store>, RoomLink) {
    let env = SimEnv::with_seed(seed);
    let config = ClientConfig::default();
    let party = SimParty::new("party", store.clone(), env.clone(), config.clone())
        .with_invariants(InvariantRegistry::standard());
    let created = create_sim_room(&store, party.identity(), &env, &config).await.unwrap();
    (party, created.link)
}

fn reliable(seed: u64) -> Store {
    ChaoticStore::reliable(MemoryStore::new(SimEnv::with_seed(seed)))
}

#[tokio::test(start_paused = true)]
async fn open_recovers_from_transient_failures() {
    let store = reliable(1);
    let (mut party, link) = setup(1, store.clone()).await;

    store.fail_next(3);
    let status = party.open(&link).await;

    assert_eq!(status, SessionStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn poll_recovers_within_retry_budget() {
    let store = reliable(2);
    let (mut party, link) = setup(2, store.clone()).await;
    party.open(&link).await;

    let before = store.operation_count();
    store.fail_next(ClientConfig::default().fetch_retries);
    party.poll().await;

    assert_eq!(party.status(), SessionStatus::Ready);
    assert_eq!(store.operation_count() - before, 4);
}

#[tokio::test(start_paused = true)]
async fn exhausted_poll_retries_invalidate_room() {
    let store = reliable(3);
    let (mut party, link) = setup(3, store.clone()).await;
    party.open(&link).await;

    let before = store.operation_count();
    store.fail_next(ClientConfig::default().fetch_retries + 1);
    party.poll().await;

    assert_eq!(party.status(), SessionStatus::InvalidRoom);
    assert!(!party.session().is_polling());
    assert_eq!(store.operation_count() - before, 4);

    // Absorbing: no more store traffic.
    party.poll().await;
    assert_eq!(store.operation_count() - before, 4);
}

#[tokio::test(start_paused = true)]
async fn exhausted_room_lookup_invalidates() {
    let store = reliable(4);
    let (mut party, link) = setup(4, store.clone()).await;

    store.fail_next(4);
    let status = party.open(&link).await;

    assert_eq!(status, SessionStatus::InvalidRoom);
}

#[tokio::test(start_paused = true)]
async fn failed_send_keeps_room_usable() {
    let store = reliable(5);
    let (mut party, link) = setup(5, store.clone()).await;
    party.open(&link).await;

    store.fail_next(1);
    party.send("first try").await.unwrap();

    assert_eq!(party.status(), SessionStatus::Ready);
    assert!(!party.session().is_sending());
    assert!(party.notices().iter().any(|n| matches!(n, SessionNotice::SendFailed { .. })));
    assert_eq!(store.inner().message_count(link.room_id), 0);

    party.send("second try").await.unwrap();
    assert_eq!(party.transcript(), ["second try"]);
}

#[tokio::test(start_paused = true)]
async fn send_is_attempted_once() {
    let store = reliable(6);
    let (mut party, link) = setup(6, store.clone()).await;
    party.open(&link).await;

    let before = store.operation_count();
    store.fail_next(1);
    party.send("once").await.unwrap();

    assert_eq!(store.operation_count() - before, 1);
    assert!(party.notices().iter().any(|n| matches!(n, SessionNotice::SendFailed { .. })));
    assert_eq!(store.inner().message_count(link.room_id), 0);
}

#[tokio::test(start_paused = true)]
async fn lost_acknowledgement_does_not_duplicate_message() {
    let store = reliable(7);
    let (mut party, link) = setup(7, store.clone()).await;
    party.open(&link).await;

    store.lose_next_acks(1);
    party.send("hello").await.unwrap();

    assert_eq!(store.inner().message_count(link.room_id), 1);
    assert!(party.notices().iter().any(|n| matches!(n, SessionNotice::SendFailed { .. })));
    assert_eq!(party.status(), SessionStatus::Ready);

    // The committed write shows up on the next poll, exactly once.
    party.poll().await;
    assert_eq!(party.transcript(), ["hello"]);
}

#[derive(Debug, Clone)]
enum Step {
    Send { party: usize, text: String },
    Poll { party: usize },
}

fn step() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..2usize, "[a-z]{1,8}").prop_map(|(party, text)| Step::Send { party, text }),
        (0..2usize).prop_map(|party| Step::Poll { party }),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn invariants_hold_under_random_failures(
        seed in any::<u64>(),
        steps in prop::collection::vec(step(), 1..24),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .start_paused(true)
            .build()
            .unwrap();

        runtime.block_on(async {
            let env = SimEnv::with_seed(seed);
            let store = ChaoticStore::with_seed(MemoryStore::new(env.clone()), 0.2, seed);
            let config = ClientConfig::default();

            let created = loop {
                match create_sim_room(&store, &MemoryIdentityStorage::new(), &env, &config).await {
                    Ok(created) => break created,
                    Err(error) => assert!(matches!(error, ClientError::TransientFetch { .. })),
                }
            };

            let mut parties: Vec<_> = ["alice", "bob"]
                .into_iter()
                .map(|name| {
                    SimParty::new(name, store.clone(), env.clone(), config.clone())
                        .with_invariants(InvariantRegistry::standard())
                })
                .collect();
            for party in &mut parties {
                party.open(&created.link).await;
            }

            for step in steps {
                match step {
                    Step::Send { party, text } => {
                        let _ = parties[party].send(&text).await;
                    },
                    Step::Poll { party } => parties[party].poll().await,
                }
            }

            let snapshot =
                SystemSnapshot::from_parties(parties.iter().map(SimParty::snapshot).collect());
            InvariantRegistry::standard().assert_all(&snapshot, "after random steps");

            for party in &parties {
                let stored = store.inner().message_count(created.link.room_id);
                assert!(party.messages().len() <= stored);
            }
        });
    }
}
