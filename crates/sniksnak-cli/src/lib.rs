//! Command-line front end for Sniksnak rooms.
//!
//! Creates rooms, sends messages and reads (or follows) a room against a
//! local redb store. The author identity lives in a separate database, so two
//! identity files sharing one store behave like two installations.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
pub mod system_env;

use std::{future::Future, io::Write, path::Path};

use sniksnak_client::{
    ClientConfig, DecryptedMessage, Environment, IdentityKeyStore, RoomLink, SessionNotice,
    SessionRuntime, SessionStatus, create_room,
};
use sniksnak_store::{RedbIdentityStorage, RedbStore};

pub use error::CliError;
pub use system_env::SystemEnv;

/// Local databases used by every command.
#[derive(Clone)]
pub struct Stores<E> {
    /// Room and message store
    pub rooms: RedbStore<E>,
    /// This installation's author identity
    pub identity: RedbIdentityStorage,
}

impl<E: Environment> Stores<E> {
    /// Open (or create) both databases.
    pub fn open(db: &Path, identity_db: &Path, env: E) -> Result<Self, CliError> {
        Ok(Self {
            rooms: RedbStore::open(db, env)?,
            identity: RedbIdentityStorage::open(identity_db)?,
        })
    }
}

/// One line of output for a message.
pub fn format_message(message: &DecryptedMessage) -> String {
    let who = if message.is_author { "me" } else { "them" };
    format!("[{}] {who}: {}", message.created_at, message.message)
}

/// Create a room and write its link to `out`.
pub async fn create<E, W>(
    stores: &Stores<E>,
    env: &E,
    config: &ClientConfig,
    base_url: &str,
    out: &mut W,
) -> Result<RoomLink, CliError>
where
    E: Environment,
    W: Write,
{
    let identities = IdentityKeyStore::new(stores.identity.clone());
    let created = create_room(&stores.rooms, &identities, env, config, base_url).await?;
    writeln!(out, "{}", created.link)?;
    Ok(created.link)
}

/// Send one message to the room behind `link`.
pub async fn send<E: Environment>(
    stores: &Stores<E>,
    env: &E,
    config: &ClientConfig,
    link: &str,
    text: &str,
) -> Result<(), CliError> {
    let mut runtime = open_room(stores, env, config, link).await?;
    runtime.send(text).await?;

    for notice in runtime.take_notices() {
        match notice {
            SessionNotice::SendFailed { reason } => return Err(CliError::SendFailed { reason }),
            SessionNotice::Status(SessionStatus::InvalidRoom) => return Err(invalid(&runtime)),
            SessionNotice::Messages(_) | SessionNotice::Status(_) => {},
        }
    }
    tracing::info!("message sent");
    Ok(())
}

/// Write the room's history to `out`.
///
/// With `follow`, keeps polling and writing new messages until `follow`
/// resolves or the room becomes invalid. Returns the number of messages
/// written.
pub async fn read<E, W, F>(
    stores: &Stores<E>,
    env: &E,
    config: &ClientConfig,
    link: &str,
    out: &mut W,
    follow: Option<F>,
) -> Result<usize, CliError>
where
    E: Environment,
    W: Write,
    F: Future<Output = ()>,
{
    let mut runtime = open_room(stores, env, config, link).await?;
    let mut written = write_messages(out, runtime.session().messages())?;

    if let Some(shutdown) = follow {
        runtime.take_notices();

        let mut failure = None;
        runtime
            .run(shutdown, |notice| {
                if let SessionNotice::Messages(batch) = notice {
                    match write_messages(out, &batch) {
                        Ok(n) => written += n,
                        Err(error) => failure = Some(error),
                    }
                }
            })
            .await;
        if let Some(error) = failure {
            return Err(error);
        }
        if runtime.session().status() == SessionStatus::InvalidRoom {
            return Err(invalid(&runtime));
        }
    }
    Ok(written)
}

type CliRuntime<E> = SessionRuntime<RedbStore<E>, RedbIdentityStorage, E>;

async fn open_room<E: Environment>(
    stores: &Stores<E>,
    env: &E,
    config: &ClientConfig,
    link: &str,
) -> Result<CliRuntime<E>, CliError> {
    let link = RoomLink::parse(link)?;
    let mut runtime = SessionRuntime::new(
        stores.rooms.clone(),
        stores.identity.clone(),
        env.clone(),
        config.clone(),
    );

    match runtime.open(link.room_id, &link.fragment).await {
        SessionStatus::Ready => Ok(runtime),
        _ => Err(invalid(&runtime)),
    }
}

fn invalid<E: Environment>(runtime: &CliRuntime<E>) -> CliError {
    let reason = runtime.session().invalid_reason().unwrap_or("room not ready");
    CliError::RoomInvalid { reason: reason.to_string() }
}

fn write_messages<W: Write>(
    out: &mut W,
    messages: &[DecryptedMessage],
) -> Result<usize, CliError> {
    for message in messages {
        writeln!(out, "{}", format_message(message))?;
    }
    Ok(messages.len())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use sniksnak_client::{MessageId, Timestamp};
    use tempfile::TempDir;

    use super::*;

    const BASE_URL: &str = "https://sniksnak.test";

    fn config() -> ClientConfig {
        ClientConfig { poll_interval: Duration::from_millis(20), ..ClientConfig::default() }
    }

    /// Two installations sharing one room database.
    fn installations(dir: &TempDir) -> (Stores<SystemEnv>, Stores<SystemEnv>) {
        let db = dir.path().join("rooms.redb");
        let alice = Stores::open(&db, &dir.path().join("alice.redb"), SystemEnv::new()).unwrap();
        let bob = Stores {
            rooms: alice.rooms.clone(),
            identity: RedbIdentityStorage::open(dir.path().join("bob.redb")).unwrap(),
        };
        (alice, bob)
    }

    #[test]
    fn formats_authorship() {
        let mut message = DecryptedMessage {
            id: MessageId(1),
            message: "hi".to_string(),
            created_at: Timestamp(5),
            is_author: true,
        };
        assert_eq!(format_message(&message), "[5ms] me: hi");

        message.is_author = false;
        assert_eq!(format_message(&message), "[5ms] them: hi");
    }

    #[tokio::test]
    async fn create_send_read() {
        let dir = TempDir::new().unwrap();
        let (alice, bob) = installations(&dir);
        let env = SystemEnv::new();

        let mut out = Vec::new();
        let link = create(&alice, &env, &config(), BASE_URL, &mut out).await.unwrap();
        let printed = String::from_utf8(out).unwrap();
        assert_eq!(printed.trim(), link.to_string());

        send(&alice, &env, &config(), printed.trim(), "hello bob").await.unwrap();
        send(&bob, &env, &config(), printed.trim(), "hello alice").await.unwrap();

        let mut out = Vec::new();
        let no_follow: Option<std::future::Pending<()>> = None;
        let count =
            read(&bob, &env, &config(), printed.trim(), &mut out, no_follow).await.unwrap();
        let lines = String::from_utf8(out).unwrap();

        assert_eq!(count, 2);
        let lines: Vec<_> = lines.lines().collect();
        assert!(lines[0].ends_with("them: hello bob"));
        assert!(lines[1].ends_with("me: hello alice"));
    }

    #[tokio::test]
    async fn follow_stops_on_shutdown() {
        let dir = TempDir::new().unwrap();
        let (alice, _) = installations(&dir);
        let env = SystemEnv::new();
        let link = create(&alice, &env, &config(), BASE_URL, &mut Vec::new()).await.unwrap();
        send(&alice, &env, &config(), &link.to_string(), "first").await.unwrap();

        let mut out = Vec::new();
        let shutdown = tokio::time::sleep(Duration::from_millis(100));
        let link = link.to_string();
        let count = read(&alice, &env, &config(), &link, &mut out, Some(shutdown)).await.unwrap();

        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn unknown_room_is_reported() {
        let dir = TempDir::new().unwrap();
        let (alice, _) = installations(&dir);
        let env = SystemEnv::new();
        let link = create(&alice, &env, &config(), BASE_URL, &mut Vec::new()).await.unwrap();

        let missing = RoomLink { room_id: sniksnak_client::RoomId(1), ..link }.to_string();
        let result = send(&alice, &env, &config(), &missing, "hello").await;

        assert!(matches!(result, Err(CliError::RoomInvalid { .. })));
    }

    #[tokio::test]
    async fn link_without_fragment_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (alice, _) = installations(&dir);

        let result = send(&alice, &SystemEnv::new(), &config(), "https://x/room/ab", "hi").await;

        assert!(matches!(result, Err(CliError::Client(_))));
    }
}
