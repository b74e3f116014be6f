//! Rooms and identities survive a restart of the durable store.

use sniksnak_client::{ClientConfig, MemoryIdentityStorage, SessionStatus};
use sniksnak_harness::{InvariantRegistry, SimEnv, SimParty, create_sim_room};
use sniksnak_store::RedbStore;
use tempfile::TempDir;

#[tokio::test(start_paused = true)]
async fn history_survives_restart() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("rooms.redb");
    let env = SimEnv::with_seed(1);
    let config = ClientConfig::default();
    let identity = MemoryIdentityStorage::new();

    let link = {
        let store = RedbStore::open(&path, env.clone()).unwrap();
        let created = create_sim_room(&store, &identity, &env, &config).await.unwrap();
        let mut party = SimParty::with_identity(
            "before",
            store,
            env.clone(),
            config.clone(),
            identity.clone(),
        );
        party.open(&created.link).await;
        party.send("persisted").await.unwrap();
        party.send("twice").await.unwrap();
        created.link
    };

    let store = RedbStore::open(&path, env.clone()).unwrap();
    let mut owner =
        SimParty::with_identity("after", store.clone(), env.clone(), config.clone(), identity)
            .with_invariants(InvariantRegistry::standard());
    let mut stranger = SimParty::new("stranger", store, env, config);

    assert_eq!(owner.open(&link).await, SessionStatus::Ready);
    assert_eq!(stranger.open(&link).await, SessionStatus::Ready);

    assert_eq!(owner.transcript(), ["persisted", "twice"]);
    assert!(owner.messages().iter().all(|m| m.is_author));
    assert!(stranger.messages().iter().all(|m| !m.is_author));

    owner.send("after restart").await.unwrap();
    assert_eq!(owner.transcript(), ["persisted", "twice", "after restart"]);
}
