//! Room session state machine.
//!
//! Pure state machine: it consumes [`SessionEvent`]s and produces
//! [`SessionAction`]s for a runtime to execute. No I/O happens here, so the
//! whole lifecycle can be driven step by step in tests.
//!
//! # Lifecycle
//!
//! ```text
//! Initializing ──Open──► ImportingKeys ──IdentityLoaded──► AwaitingRoom ──RoomFetched──► Ready
//!       │                     │                                 │                         │
//!       └──────────────── any failure ──────────────────────────┴─────────────────────────┴──► InvalidRoom
//! ```
//!
//! `InvalidRoom` is absorbing. Events that do not apply to the current state
//! are ignored, which makes every transition idempotent.

use sniksnak_crypto::{IV_SIZE, decode_verifying_key};

use crate::{
    AuthorIdentity, ClientConfig, ClientError, Environment, RoomKeyMaterial,
    action::{SessionAction, SessionStatus},
    envelope::{self, DecryptedMessage},
    event::SessionEvent,
    scheduler::Scheduler,
    store::{MessageRecord, Room, RoomId, Timestamp},
    sync::{FetchRequest, SyncEngine},
};

/// State of an open room. Each variant carries exactly the data valid in it.
enum SessionState {
    Initializing,
    ImportingKeys { room_id: RoomId, keys: RoomKeyMaterial },
    AwaitingRoom { room_id: RoomId, keys: RoomKeyMaterial, author: AuthorIdentity },
    Ready(ReadyRoom),
    InvalidRoom { reason: String },
}

struct ReadyRoom {
    room_id: RoomId,
    keys: RoomKeyMaterial,
    author: AuthorIdentity,
    sync: SyncEngine,
    sending: bool,
}

impl ReadyRoom {
    fn fetch(&self, request: FetchRequest) -> SessionAction {
        SessionAction::FetchMessages { room_id: self.room_id, after: request.after }
    }
}

/// One open room.
pub struct RoomSession<E: Environment> {
    env: E,
    scheduler: Scheduler<E::Instant>,
    state: SessionState,
    closed: bool,
}

impl<E: Environment> RoomSession<E> {
    /// New session in `Initializing`.
    pub fn new(env: E, config: &ClientConfig) -> Self {
        Self {
            env,
            scheduler: Scheduler::new(config.poll_interval),
            state: SessionState::Initializing,
            closed: false,
        }
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        match self.state {
            SessionState::Initializing => SessionStatus::Initializing,
            SessionState::ImportingKeys { .. } => SessionStatus::ImportingKeys,
            SessionState::AwaitingRoom { .. } => SessionStatus::AwaitingRoom,
            SessionState::Ready(_) => SessionStatus::Ready,
            SessionState::InvalidRoom { .. } => SessionStatus::InvalidRoom,
        }
    }

    /// Room this session was opened for.
    pub fn room_id(&self) -> Option<RoomId> {
        match &self.state {
            SessionState::ImportingKeys { room_id, .. }
            | SessionState::AwaitingRoom { room_id, .. } => Some(*room_id),
            SessionState::Ready(ready) => Some(ready.room_id),
            SessionState::Initializing | SessionState::InvalidRoom { .. } => None,
        }
    }

    /// Why the room is invalid, if it is.
    pub fn invalid_reason(&self) -> Option<&str> {
        match &self.state {
            SessionState::InvalidRoom { reason } => Some(reason),
            _ => None,
        }
    }

    /// Decrypted log. Empty unless `Ready`.
    pub fn messages(&self) -> &[DecryptedMessage] {
        match &self.state {
            SessionState::Ready(ready) => ready.sync.log(),
            _ => &[],
        }
    }

    /// Sync cursor, if `Ready`.
    pub fn cursor(&self) -> Option<Timestamp> {
        match &self.state {
            SessionState::Ready(ready) => ready.sync.cursor(),
            _ => None,
        }
    }

    /// Whether the poll timer is armed.
    pub fn is_polling(&self) -> bool {
        self.scheduler.is_armed()
    }

    /// Whether a fetch is outstanding.
    pub fn is_fetching(&self) -> bool {
        matches!(&self.state, SessionState::Ready(ready) if ready.sync.is_in_flight())
    }

    /// Whether a send is outstanding.
    pub fn is_sending(&self) -> bool {
        matches!(&self.state, SessionState::Ready(ready) if ready.sending)
    }

    /// Whether `Close` has been handled.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Process an event and return actions.
    ///
    /// # Errors
    ///
    /// - `SendPrecondition`: a `Send` event was rejected; nothing changed
    /// - `Signing`: the message could not be signed; nothing changed
    ///
    /// Every other failure is reported through the state, never as `Err`.
    pub fn handle(&mut self, event: SessionEvent) -> Result<Vec<SessionAction>, ClientError> {
        if self.closed {
            return match event {
                SessionEvent::Send { .. } => {
                    Err(ClientError::SendPrecondition { reason: "session closed" })
                },
                _ => Ok(Vec::new()),
            };
        }

        let actions = match event {
            SessionEvent::Open { room_id, fragment } => self.on_open(room_id, &fragment),
            SessionEvent::IdentityLoaded(author) => self.on_identity_loaded(author),
            SessionEvent::IdentityFailed(error) => self.on_identity_failed(&error),
            SessionEvent::RoomFetched(result) => self.on_room_fetched(result),
            SessionEvent::MessagesFetched(result) => self.on_messages_fetched(result),
            SessionEvent::Send { text } => return self.on_send(&text),
            SessionEvent::MessageSent(result) => self.on_message_sent(result),
            SessionEvent::Tick => self.on_tick(),
            SessionEvent::Close => self.on_close(),
        };
        Ok(actions)
    }

    fn on_open(&mut self, room_id: RoomId, fragment: &str) -> Vec<SessionAction> {
        if !matches!(self.state, SessionState::Initializing) {
            tracing::debug!(%room_id, status = ?self.status(), "ignoring repeated open");
            return Vec::new();
        }

        match RoomKeyMaterial::from_fragment(fragment) {
            Ok(keys) => {
                tracing::debug!(%room_id, "room keys imported");
                self.state = SessionState::ImportingKeys { room_id, keys };
                vec![
                    SessionAction::StatusChanged(SessionStatus::ImportingKeys),
                    SessionAction::LoadIdentity,
                ]
            },
            Err(error) => self.invalidate(&error),
        }
    }

    fn on_identity_loaded(&mut self, author: AuthorIdentity) -> Vec<SessionAction> {
        let SessionState::ImportingKeys { room_id, keys } = &self.state else {
            tracing::debug!(status = ?self.status(), "ignoring identity outside key import");
            return Vec::new();
        };

        let room_id = *room_id;
        self.state = SessionState::AwaitingRoom { room_id, keys: keys.clone(), author };
        vec![
            SessionAction::StatusChanged(SessionStatus::AwaitingRoom),
            SessionAction::FetchRoom { room_id },
        ]
    }

    fn on_identity_failed(&mut self, error: &ClientError) -> Vec<SessionAction> {
        if !matches!(self.state, SessionState::ImportingKeys { .. }) {
            return Vec::new();
        }
        self.invalidate(error)
    }

    fn on_room_fetched(&mut self, result: Result<Room, ClientError>) -> Vec<SessionAction> {
        let SessionState::AwaitingRoom { room_id, keys, author } = &self.state else {
            tracing::debug!(status = ?self.status(), "ignoring room outside await");
            return Vec::new();
        };
        let room_id = *room_id;

        let room = match result {
            Ok(room) => room,
            Err(error) => return self.invalidate(&error),
        };

        let published = decode_verifying_key(&room.room_signing_public_key).ok();
        if published.as_ref() != Some(keys.verifying_key()) {
            tracing::warn!(%room_id, "room public key does not match the link's signing key");
        }

        let mut ready = ReadyRoom {
            room_id,
            keys: keys.clone(),
            author: author.clone(),
            sync: SyncEngine::new(),
            sending: false,
        };
        let mut actions = vec![SessionAction::StatusChanged(SessionStatus::Ready)];
        if let Some(request) = ready.sync.begin_fetch() {
            actions.push(ready.fetch(request));
        }

        self.scheduler.start(self.env.now());
        self.state = SessionState::Ready(ready);
        tracing::info!(%room_id, "room ready");
        actions
    }

    fn on_messages_fetched(
        &mut self,
        result: Result<Vec<MessageRecord>, ClientError>,
    ) -> Vec<SessionAction> {
        let SessionState::Ready(ready) = &mut self.state else {
            return Vec::new();
        };
        if !ready.sync.is_in_flight() {
            tracing::debug!(room_id = %ready.room_id, "ignoring unsolicited fetch result");
            return Vec::new();
        }

        let room_id = ready.room_id;
        let decoded = result.and_then(|records| {
            for record in &records {
                record.validate().map_err(|e| ClientError::from_store(room_id, e, 1))?;
            }
            envelope::open_batch(&records, ready.keys.encryption_key(), ready.author.verifying_key())
        });

        match decoded {
            Ok(batch) => {
                let outcome = ready.sync.complete(batch);
                let mut actions = Vec::new();
                if !outcome.appended.is_empty() {
                    actions.push(SessionAction::DeliverMessages(outcome.appended));
                }
                if let Some(request) = outcome.next {
                    actions.push(ready.fetch(request));
                }
                actions
            },
            Err(error) if error.is_fatal() => self.invalidate(&error),
            Err(error) => {
                tracing::warn!(%room_id, %error, "fetch failed");
                ready.sync.abort();
                Vec::new()
            },
        }
    }

    fn on_send(&mut self, text: &str) -> Result<Vec<SessionAction>, ClientError> {
        let SessionState::Ready(ready) = &mut self.state else {
            return Err(ClientError::SendPrecondition { reason: "room not ready" });
        };
        if ready.sending {
            return Err(ClientError::SendPrecondition { reason: "send already in progress" });
        }
        let text = text.trim();
        if text.is_empty() {
            return Err(ClientError::SendPrecondition { reason: "empty message" });
        }

        let iv = self.env.random_array::<IV_SIZE>();
        let message = envelope::seal(text, &ready.keys, &ready.author, iv)?;
        ready.sending = true;
        tracing::debug!(room_id = %ready.room_id, "sending message");

        Ok(vec![SessionAction::AddMessage { room_id: ready.room_id, message }])
    }

    fn on_message_sent(&mut self, result: Result<MessageRecord, ClientError>) -> Vec<SessionAction> {
        let SessionState::Ready(ready) = &mut self.state else {
            return Vec::new();
        };
        if !ready.sending {
            return Vec::new();
        }
        ready.sending = false;

        match result {
            Ok(record) => {
                tracing::debug!(room_id = %ready.room_id, id = %record.id, "message accepted");
                ready.sync.trigger().map(|request| ready.fetch(request)).into_iter().collect()
            },
            Err(
                error @ (ClientError::RoomNotFound { .. } | ClientError::Unauthorized { .. }),
            ) => self.invalidate(&error),
            Err(error) => {
                tracing::warn!(room_id = %ready.room_id, %error, "send failed");
                vec![SessionAction::SendFailed { reason: error.to_string() }]
            },
        }
    }

    fn on_tick(&mut self) -> Vec<SessionAction> {
        if !self.scheduler.poll(self.env.now()) {
            return Vec::new();
        }
        let SessionState::Ready(ready) = &mut self.state else {
            return Vec::new();
        };

        match ready.sync.begin_fetch() {
            Some(request) => vec![ready.fetch(request)],
            None => {
                tracing::trace!(room_id = %ready.room_id, "poll skipped, fetch in flight");
                Vec::new()
            },
        }
    }

    fn on_close(&mut self) -> Vec<SessionAction> {
        self.closed = true;
        self.scheduler.cancel();
        if let SessionState::Ready(ready) = &mut self.state {
            ready.sync.abort();
            tracing::debug!(room_id = %ready.room_id, "room closed");
        }
        Vec::new()
    }

    fn invalidate(&mut self, error: &ClientError) -> Vec<SessionAction> {
        if matches!(self.state, SessionState::InvalidRoom { .. }) {
            return Vec::new();
        }

        tracing::warn!(room_id = ?self.room_id(), %error, "room invalid");
        self.scheduler.cancel();
        self.state = SessionState::InvalidRoom { reason: error.to_string() };
        vec![SessionAction::StatusChanged(SessionStatus::InvalidRoom)]
    }
}
