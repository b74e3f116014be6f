//! Async runtime for a room session.
//!
//! The runtime owns a [`RoomSession`] and executes the actions it produces
//! against a [`RoomStore`] and an [`IdentityStorage`], feeding each result
//! back in as an event until the session goes quiet.
//!
//! Reads go through [`with_retry`]: transient failures are retried a bounded
//! number of times, everything else is returned at once. `add_message` is not
//! idempotent, so a send is attempted exactly once and a transient failure
//! surfaces as [`SessionNotice::SendFailed`].

use std::{collections::VecDeque, future::Future, pin::pin};

use crate::{
    ClientConfig, ClientError, Environment,
    action::{SessionAction, SessionStatus},
    envelope::DecryptedMessage,
    event::SessionEvent,
    identity::{IdentityKeyStore, IdentityStorage},
    room_keys::{GeneratedRoomKeys, RoomLink},
    session::RoomSession,
    store::{Room, RoomId, RoomStore, StoreError},
};

/// Something the caller should show the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionNotice {
    /// Newly appended messages, in order.
    Messages(Vec<DecryptedMessage>),
    /// The session status changed.
    Status(SessionStatus),
    /// A send failed; the room is still usable.
    SendFailed {
        /// Why it failed
        reason: String,
    },
}

/// Invoke `call` until it succeeds, fails permanently, or runs out of
/// retries.
///
/// Makes at most `1 + config.fetch_retries` calls, sleeping
/// `config.retry_delay` between them. Only [`StoreError::is_transient`]
/// errors are retried.
///
/// # Errors
///
/// The last error, with the number of calls made.
pub async fn with_retry<E, T, F, Fut>(
    env: &E,
    config: &ClientConfig,
    operation: &'static str,
    mut call: F,
) -> Result<T, (StoreError, u32)>
where
    E: Environment,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, StoreError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Ok(value) => return Ok(value),
            Err(error) if error.is_transient() && attempt <= config.fetch_retries => {
                tracing::debug!(operation, attempt, %error, "transient store failure, retrying");
                env.sleep(config.retry_delay).await;
            },
            Err(error) => {
                if error.is_transient() {
                    tracing::warn!(operation, attempt, %error, "store retries exhausted");
                }
                return Err((error, attempt));
            },
        }
    }
}

/// A newly created room and its shareable link.
#[derive(Debug, Clone)]
pub struct CreatedRoom {
    /// Room as stored
    pub room: Room,
    /// Link carrying the key fragment
    pub link: RoomLink,
}

/// Create a room: make sure an author identity exists, generate room keys,
/// publish the signing public key, and build the link.
///
/// # Errors
///
/// - `IdentityUnavailable` or `KeyImport`: the author identity could not be
///   loaded
/// - `TransientFetch`: the store stayed unavailable through every retry
/// - `Store`: the store rejected the room
pub async fn create_room<S, L, E>(
    store: &S,
    identities: &IdentityKeyStore<L>,
    env: &E,
    config: &ClientConfig,
    base_url: &str,
) -> Result<CreatedRoom, ClientError>
where
    S: RoomStore,
    L: IdentityStorage,
    E: Environment,
{
    identities.load_with_backoff(env, config).await?;

    let keys = GeneratedRoomKeys::generate(env);
    let public_key = keys.signing_public_key.as_str();
    let room = with_retry(env, config, "create_room", move || store.create_room(public_key))
        .await
        .map_err(|(error, attempts)| match error {
            StoreError::Unavailable { reason } => ClientError::TransientFetch { attempts, reason },
            other => ClientError::Store(other),
        })?;

    tracing::info!(room_id = %room.id, "room created");
    let link = RoomLink::new(base_url, room.id, &keys);
    Ok(CreatedRoom { room, link })
}

/// Drives a [`RoomSession`] against real collaborators.
pub struct SessionRuntime<S, L, E: Environment> {
    store: S,
    identities: IdentityKeyStore<L>,
    env: E,
    config: ClientConfig,
    session: RoomSession<E>,
    notices: Vec<SessionNotice>,
}

impl<S, L, E> SessionRuntime<S, L, E>
where
    S: RoomStore,
    L: IdentityStorage,
    E: Environment,
{
    /// New runtime with a fresh session.
    pub fn new(store: S, identity_storage: L, env: E, config: ClientConfig) -> Self {
        let session = RoomSession::new(env.clone(), &config);
        Self {
            store,
            identities: IdentityKeyStore::new(identity_storage),
            env,
            config,
            session,
            notices: Vec::new(),
        }
    }

    /// The session being driven.
    pub fn session(&self) -> &RoomSession<E> {
        &self.session
    }

    /// The store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Drain notices emitted since the last call.
    pub fn take_notices(&mut self) -> Vec<SessionNotice> {
        std::mem::take(&mut self.notices)
    }

    /// Open a room link and drive the session until it is `Ready` or
    /// `InvalidRoom`.
    pub async fn open(&mut self, room_id: RoomId, fragment: &str) -> SessionStatus {
        let event = SessionEvent::Open { room_id, fragment: fragment.to_string() };
        if let Err(error) = self.dispatch(event).await {
            tracing::warn!(%error, "open failed");
        }
        self.session.status()
    }

    /// Send a message and wait for it to be stored and fetched back.
    ///
    /// # Errors
    ///
    /// - `SendPrecondition`: not ready, empty draft, or a send in progress
    /// - `Signing`: the message could not be signed
    ///
    /// Store failures arrive as notices, not as `Err`.
    pub async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        self.dispatch(SessionEvent::Send { text: text.to_string() }).await
    }

    /// Let the poll timer run if it is due.
    pub async fn tick(&mut self) {
        if let Err(error) = self.dispatch(SessionEvent::Tick).await {
            tracing::warn!(%error, "tick failed");
        }
    }

    /// Leave the room. Polling stops for good.
    pub fn close(&mut self) {
        if let Err(error) = self.session.handle(SessionEvent::Close) {
            tracing::warn!(%error, "close failed");
        }
    }

    /// Poll until `shutdown` resolves or polling stops.
    ///
    /// Notices are passed to `on_notice` as they are produced.
    pub async fn run<F, N>(&mut self, shutdown: F, mut on_notice: N)
    where
        F: Future<Output = ()>,
        N: FnMut(SessionNotice),
    {
        let mut shutdown = pin!(shutdown);
        loop {
            for notice in self.take_notices() {
                on_notice(notice);
            }
            if !self.session.is_polling() {
                tracing::debug!(status = ?self.session.status(), "polling stopped");
                break;
            }

            let env = self.env.clone();
            let ticked = tokio::select! {
                biased;
                () = &mut shutdown => false,
                () = env.sleep(self.config.poll_interval) => true,
            };
            if !ticked {
                tracing::debug!("shutdown requested");
                break;
            }
            self.tick().await;
        }
    }

    async fn dispatch(&mut self, event: SessionEvent) -> Result<(), ClientError> {
        let mut pending = VecDeque::from([event]);
        while let Some(event) = pending.pop_front() {
            for action in self.session.handle(event)? {
                if let Some(next) = self.execute(action).await {
                    pending.push_back(next);
                }
            }
        }
        Ok(())
    }

    async fn execute(&mut self, action: SessionAction) -> Option<SessionEvent> {
        let store = &self.store;
        let (env, config) = (&self.env, &self.config);

        match action {
            SessionAction::LoadIdentity => {
                Some(match self.identities.load_with_backoff(env, config).await {
                    Ok(identity) => SessionEvent::IdentityLoaded(identity),
                    Err(error) => SessionEvent::IdentityFailed(error),
                })
            },
            SessionAction::FetchRoom { room_id } => {
                let result = with_retry(env, config, "get_room", move || store.get_room(room_id))
                    .await
                    .map_err(|(error, attempts)| ClientError::from_store(room_id, error, attempts));
                Some(SessionEvent::RoomFetched(result))
            },
            SessionAction::FetchMessages { room_id, after } => {
                let result = with_retry(env, config, "get_messages", move || {
                    store.get_messages(room_id, after)
                })
                .await
                .map_err(|(error, attempts)| ClientError::from_store(room_id, error, attempts));
                Some(SessionEvent::MessagesFetched(result))
            },
            SessionAction::AddMessage { room_id, message } => {
                // A lost acknowledgement may hide a committed write.
                let result = store
                    .add_message(room_id, &message)
                    .await
                    .map_err(|error| ClientError::from_store(room_id, error, 1));
                Some(SessionEvent::MessageSent(result))
            },
            SessionAction::DeliverMessages(messages) => {
                self.notices.push(SessionNotice::Messages(messages));
                None
            },
            SessionAction::StatusChanged(status) => {
                self.notices.push(SessionNotice::Status(status));
                None
            },
            SessionAction::SendFailed { reason } => {
                self.notices.push(SessionNotice::SendFailed { reason });
                None
            },
        }
    }
}
