//! The runtime's poll loop on virtual time.

use std::time::Duration;

use sniksnak_client::{
    ClientConfig, MemoryIdentityStorage, RoomId, SessionNotice, SessionRuntime, SessionStatus,
};
use sniksnak_harness::{SimEnv, SimParty, create_sim_room};
use sniksnak_store::MemoryStore;

#[tokio::test(start_paused = true)]
async fn run_delivers_messages_until_shutdown() {
    let env = SimEnv::with_seed(1);
    let store = MemoryStore::new(env.clone());
    let config = ClientConfig::default();

    let mut writer = SimParty::new("writer", store.clone(), env.clone(), config.clone());
    let created = create_sim_room(&store, writer.identity(), &env, &config).await.unwrap();
    writer.open(&created.link).await;

    let mut reader =
        SessionRuntime::new(store.clone(), MemoryIdentityStorage::new(), env.clone(), config);
    reader.open(created.link.room_id, &created.link.fragment).await;
    writer.send("ping").await.unwrap();

    let mut notices = Vec::new();
    reader.run(tokio::time::sleep(Duration::from_millis(2500)), |n| notices.push(n)).await;

    let delivered: Vec<_> = notices
        .iter()
        .filter_map(|n| match n {
            SessionNotice::Messages(batch) => Some(batch),
            _ => None,
        })
        .flatten()
        .map(|m| m.message.as_str())
        .collect();
    assert_eq!(delivered, ["ping"]);
    assert!(notices.contains(&SessionNotice::Status(SessionStatus::Ready)));
    assert_eq!(reader.session().status(), SessionStatus::Ready);
}

#[tokio::test(start_paused = true)]
async fn run_returns_when_room_is_invalid() {
    let env = SimEnv::with_seed(2);
    let store = MemoryStore::new(env.clone());
    let config = ClientConfig::default();
    let created =
        create_sim_room(&store, &MemoryIdentityStorage::new(), &env, &config).await.unwrap();

    let mut reader = SessionRuntime::new(store, MemoryIdentityStorage::new(), env, config);
    reader.open(RoomId(7), &created.link.fragment).await;

    let mut notices = Vec::new();
    reader.run(std::future::pending(), |n| notices.push(n)).await;

    assert_eq!(notices.last(), Some(&SessionNotice::Status(SessionStatus::InvalidRoom)));
}

#[tokio::test(start_paused = true)]
async fn run_returns_after_close() {
    let env = SimEnv::with_seed(3);
    let store = MemoryStore::new(env.clone());
    let config = ClientConfig::default();
    let created =
        create_sim_room(&store, &MemoryIdentityStorage::new(), &env, &config).await.unwrap();

    let mut reader = SessionRuntime::new(store, MemoryIdentityStorage::new(), env, config);
    reader.open(created.link.room_id, &created.link.fragment).await;
    reader.close();

    reader.run(std::future::pending(), |_| {}).await;

    assert!(reader.session().is_closed());
}
