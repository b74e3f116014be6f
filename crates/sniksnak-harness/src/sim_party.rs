//! One simulated participant.
//!
//! A `SimParty` is an installation: its own identity storage and its own
//! [`SessionRuntime`], talking to a store shared with the other parties. The
//! same runtime code the command-line front end uses runs here on virtual
//! time.

use sniksnak_client::{
    ClientConfig, ClientError, DecryptedMessage, MemoryIdentityStorage, RoomLink, RoomSession,
    RoomStore, SessionNotice, SessionRuntime, SessionStatus, Timestamp,
};

use crate::{
    SimEnv,
    invariants::{InvariantRegistry, PartySnapshot},
};

/// Simulated participant driving a real [`SessionRuntime`].
pub struct SimParty<S: RoomStore> {
    name: &'static str,
    identity: MemoryIdentityStorage,
    runtime: SessionRuntime<S, MemoryIdentityStorage, SimEnv>,
    config: ClientConfig,
    notices: Vec<SessionNotice>,
    cursor_history: Vec<Timestamp>,
    invariants: Option<InvariantRegistry>,
}

impl<S: RoomStore> SimParty<S> {
    /// New party with empty identity storage.
    pub fn new(name: &'static str, store: S, env: SimEnv, config: ClientConfig) -> Self {
        Self::with_identity(name, store, env, config, MemoryIdentityStorage::new())
    }

    /// New party reusing `identity`, as a restarted installation would.
    pub fn with_identity(
        name: &'static str,
        store: S,
        env: SimEnv,
        config: ClientConfig,
        identity: MemoryIdentityStorage,
    ) -> Self {
        let runtime = SessionRuntime::new(store, identity.clone(), env, config.clone());
        Self {
            name,
            identity,
            runtime,
            config,
            notices: Vec::new(),
            cursor_history: Vec::new(),
            invariants: None,
        }
    }

    /// Check `registry` against this party after every step.
    #[must_use]
    pub fn with_invariants(mut self, registry: InvariantRegistry) -> Self {
        self.invariants = Some(registry);
        self
    }

    /// Party name, for assertions and logs.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// This installation's identity storage.
    pub fn identity(&self) -> &MemoryIdentityStorage {
        &self.identity
    }

    /// The store this party talks to.
    pub fn store(&self) -> &S {
        self.runtime.store()
    }

    /// The underlying session.
    pub fn session(&self) -> &RoomSession<SimEnv> {
        self.runtime.session()
    }

    /// Current status.
    pub fn status(&self) -> SessionStatus {
        self.session().status()
    }

    /// Decrypted log.
    pub fn messages(&self) -> &[DecryptedMessage] {
        self.session().messages()
    }

    /// Plaintexts of the decrypted log, in order.
    pub fn transcript(&self) -> Vec<&str> {
        self.messages().iter().map(|m| m.message.as_str()).collect()
    }

    /// Every notice received so far.
    pub fn notices(&self) -> &[SessionNotice] {
        &self.notices
    }

    /// Open a room link.
    pub async fn open(&mut self, link: &RoomLink) -> SessionStatus {
        tracing::debug!(party = self.name, room_id = %link.room_id, "opening room");
        let status = self.runtime.open(link.room_id, &link.fragment).await;
        self.record();
        status
    }

    /// Open a room by ID with a raw fragment.
    pub async fn open_raw(&mut self, link: &RoomLink, fragment: &str) -> SessionStatus {
        let status = self.runtime.open(link.room_id, fragment).await;
        self.record();
        status
    }

    /// Send a message and wait until it has been fetched back.
    pub async fn send(&mut self, text: &str) -> Result<(), ClientError> {
        let result = self.runtime.send(text).await;
        self.record();
        result
    }

    /// Let one poll interval pass, then tick.
    pub async fn poll(&mut self) {
        tokio::time::sleep(self.config.poll_interval).await;
        self.runtime.tick().await;
        self.record();
    }

    /// Leave the room.
    pub fn close(&mut self) {
        self.runtime.close();
        self.record();
    }

    /// Observable state for invariant checks.
    pub fn snapshot(&self) -> PartySnapshot {
        let session = self.session();
        PartySnapshot {
            name: self.name,
            room_id: session.room_id(),
            status: session.status(),
            polling: session.is_polling(),
            cursor: session.cursor(),
            cursor_history: self.cursor_history.clone(),
            log: session.messages().to_vec(),
        }
    }

    fn record(&mut self) {
        self.notices.extend(self.runtime.take_notices());

        if let Some(cursor) = self.session().cursor() {
            if self.cursor_history.last() != Some(&cursor) {
                self.cursor_history.push(cursor);
            }
        }

        if let Some(registry) = &self.invariants {
            registry.assert_party(&self.snapshot(), self.name);
        }
    }
}
