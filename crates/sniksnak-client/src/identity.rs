//! Author identity: the per-installation signing keypair.
//!
//! The identity is generated on first use and persisted as two named entries,
//! `privateAuthorKey` and `publicAuthorKey`. It is never transmitted; it only
//! lets this installation recognise its own messages.
//!
//! # Atomicity
//!
//! Both halves are read and written together. If either entry is missing the
//! pair is treated as absent and wholly regenerated, and when two callers
//! race to create it the first writer wins: [`IdentityStorage::store_pair_if_absent`]
//! returns whichever pair ended up stored, so every caller converges on the
//! same identity.

use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex},
};

use sniksnak_crypto::{
    SEED_SIZE, SigningKey, SigningKeyPair, VerifyingKey, decode_signing_key, decode_verifying_key,
    encode_signing_key, encode_verifying_key,
};
use thiserror::Error;

use crate::{ClientConfig, ClientError, Environment};

/// Entry name for the encoded private key.
pub const PRIVATE_KEY_ENTRY: &str = "privateAuthorKey";

/// Entry name for the encoded public key.
pub const PUBLIC_KEY_ENTRY: &str = "publicAuthorKey";

/// Errors from identity storage backends.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityStorageError {
    /// Storage could not be reached; may succeed on retry
    #[error("identity storage unavailable: {reason}")]
    Unavailable {
        /// What went wrong
        reason: String,
    },

    /// Stored entries could not be read back
    #[error("identity storage corrupt: {reason}")]
    Corrupt {
        /// What went wrong
        reason: String,
    },
}

impl IdentityStorageError {
    /// Returns true if the operation may succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Both encoded halves of an author identity.
#[derive(Clone, PartialEq, Eq)]
pub struct StoredIdentity {
    /// base64(JWK) private key
    pub private_key: String,
    /// base64(JWK) public key
    pub public_key: String,
}

impl fmt::Debug for StoredIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredIdentity")
            .field("private_key", &"..")
            .field("public_key", &self.public_key)
            .finish()
    }
}

/// Durable storage for the two identity entries.
pub trait IdentityStorage: Clone + Send + Sync + 'static {
    /// Read both entries atomically. `None` unless both are present.
    fn read_pair(&self) -> Result<Option<StoredIdentity>, IdentityStorageError>;

    /// Write both entries unless a complete pair is already stored.
    ///
    /// Returns the pair that is stored after the call: `identity` if it was
    /// written, otherwise the existing pair. A half-written pair is
    /// overwritten.
    fn store_pair_if_absent(
        &self,
        identity: StoredIdentity,
    ) -> Result<StoredIdentity, IdentityStorageError>;
}

/// In-memory identity storage.
///
/// Entries are kept by name, so tests can remove one half to simulate a
/// partially cleared store.
#[derive(Clone, Default)]
pub struct MemoryIdentityStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryIdentityStorage {
    /// Create empty storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a single named entry.
    pub fn set_entry(&self, name: &str, value: &str) -> Result<(), IdentityStorageError> {
        self.lock()?.insert(name.to_string(), value.to_string());
        Ok(())
    }

    /// Remove a single named entry.
    pub fn remove_entry(&self, name: &str) -> Result<(), IdentityStorageError> {
        self.lock()?.remove(name);
        Ok(())
    }

    fn lock(
        &self,
    ) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, IdentityStorageError> {
        self.entries
            .lock()
            .map_err(|_| IdentityStorageError::Unavailable { reason: "lock poisoned".to_string() })
    }
}

fn pair_from(entries: &HashMap<String, String>) -> Option<StoredIdentity> {
    let private_key = entries.get(PRIVATE_KEY_ENTRY)?;
    let public_key = entries.get(PUBLIC_KEY_ENTRY)?;
    Some(StoredIdentity { private_key: private_key.clone(), public_key: public_key.clone() })
}

impl IdentityStorage for MemoryIdentityStorage {
    fn read_pair(&self) -> Result<Option<StoredIdentity>, IdentityStorageError> {
        let entries = self.lock()?;
        Ok(pair_from(&entries))
    }

    fn store_pair_if_absent(
        &self,
        identity: StoredIdentity,
    ) -> Result<StoredIdentity, IdentityStorageError> {
        let mut entries = self.lock()?;
        if let Some(existing) = pair_from(&entries) {
            return Ok(existing);
        }
        entries.insert(PRIVATE_KEY_ENTRY.to_string(), identity.private_key.clone());
        entries.insert(PUBLIC_KEY_ENTRY.to_string(), identity.public_key.clone());
        Ok(identity)
    }
}

/// Decoded author identity.
#[derive(Clone)]
pub struct AuthorIdentity {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl AuthorIdentity {
    /// Decode a stored pair.
    ///
    /// # Errors
    ///
    /// - `KeyImport`: either half is not a valid P-256 JWK
    pub fn decode(stored: &StoredIdentity) -> Result<Self, ClientError> {
        let signing_key = decode_signing_key(&stored.private_key)
            .map_err(|source| ClientError::KeyImport { source })?;
        let verifying_key = decode_verifying_key(&stored.public_key)
            .map_err(|source| ClientError::KeyImport { source })?;
        Ok(Self { signing_key, verifying_key })
    }

    /// Private half, used to sign outgoing messages.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Public half, used to recognise our own messages.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

impl fmt::Debug for AuthorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AuthorIdentity(..)")
    }
}

/// Loads or creates the author identity on top of an [`IdentityStorage`].
#[derive(Clone)]
pub struct IdentityKeyStore<S> {
    storage: S,
}

impl<S: IdentityStorage> IdentityKeyStore<S> {
    /// Wrap a storage backend.
    pub fn new(storage: S) -> Self {
        Self { storage }
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Return the stored identity, generating and persisting one if either
    /// half is missing.
    ///
    /// Idempotent: once a pair is stored every call returns it.
    ///
    /// # Errors
    ///
    /// - `IdentityStorage`: the backend failed
    /// - `KeyImport`: the stored pair does not decode
    pub fn load_or_create<E: Environment>(&self, env: &E) -> Result<AuthorIdentity, ClientError> {
        if let Some(stored) = self.storage.read_pair()? {
            return AuthorIdentity::decode(&stored);
        }

        let pair = SigningKeyPair::generate(env.random_array::<SEED_SIZE>());
        let fresh = StoredIdentity {
            private_key: encode_signing_key(pair.signing_key()),
            public_key: encode_verifying_key(pair.verifying_key()),
        };
        let stored = self.storage.store_pair_if_absent(fresh.clone())?;
        if stored == fresh {
            tracing::info!("generated new author identity");
        }
        AuthorIdentity::decode(&stored)
    }

    /// [`Self::load_or_create`] with bounded retry of transient storage
    /// failures.
    ///
    /// Attempt `n` that fails transiently is followed by a sleep of
    /// `n * identity_backoff`, up to `identity_attempts` attempts in total.
    ///
    /// # Errors
    ///
    /// - `IdentityUnavailable`: storage stayed unavailable on every attempt
    /// - Any non-transient error from [`Self::load_or_create`], immediately
    pub async fn load_with_backoff<E: Environment>(
        &self,
        env: &E,
        config: &ClientConfig,
    ) -> Result<AuthorIdentity, ClientError> {
        let attempts = config.identity_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.load_or_create(env) {
                Ok(identity) => return Ok(identity),
                Err(ClientError::IdentityStorage(e)) if e.is_transient() => {
                    if attempt >= attempts {
                        tracing::warn!(attempt, error = %e, "giving up on author identity");
                        return Err(ClientError::IdentityUnavailable {
                            attempts: attempt,
                            reason: e.to_string(),
                        });
                    }
                    tracing::debug!(attempt, error = %e, "identity storage unavailable, retrying");
                    env.sleep(config.identity_backoff * attempt).await;
                },
                Err(e) => return Err(e),
            }
        }
    }
}
