//! Redb-backed author identity storage.
//!
//! Both entries live in one table and are read and written in a single
//! transaction, so a reader never observes half an identity.

use std::{path::Path, sync::Arc};

use redb::{Database, ReadableTable, TableDefinition};
use sniksnak_client::{
    IdentityStorage, IdentityStorageError, StoredIdentity,
    identity::{PRIVATE_KEY_ENTRY, PUBLIC_KEY_ENTRY},
};

/// Table: identity
/// Key: entry name
/// Value: base64(JWK) key
const IDENTITY: TableDefinition<&str, &str> = TableDefinition::new("identity");

/// Durable identity storage backed by Redb.
#[derive(Clone)]
pub struct RedbIdentityStorage {
    db: Arc<Database>,
}

fn unavailable(e: impl std::fmt::Display) -> IdentityStorageError {
    IdentityStorageError::Unavailable { reason: e.to_string() }
}

impl RedbIdentityStorage {
    /// Open or create the identity database at `path`.
    ///
    /// # Errors
    ///
    /// Returns `Unavailable` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, IdentityStorageError> {
        let db = Database::create(path.as_ref()).map_err(unavailable)?;

        let txn = db.begin_write().map_err(unavailable)?;
        {
            let _ = txn.open_table(IDENTITY).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)?;

        Ok(Self { db: Arc::new(db) })
    }

    /// Remove one entry, leaving the other in place.
    ///
    /// The next load regenerates the whole pair.
    pub fn remove_entry(&self, name: &str) -> Result<(), IdentityStorageError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        {
            let mut table = txn.open_table(IDENTITY).map_err(unavailable)?;
            table.remove(name).map_err(unavailable)?;
        }
        txn.commit().map_err(unavailable)
    }
}

fn read_from<T: ReadableTable<&'static str, &'static str>>(
    table: &T,
) -> Result<Option<StoredIdentity>, IdentityStorageError> {
    let private_key = table.get(PRIVATE_KEY_ENTRY).map_err(unavailable)?;
    let public_key = table.get(PUBLIC_KEY_ENTRY).map_err(unavailable)?;

    Ok(match (private_key, public_key) {
        (Some(private_key), Some(public_key)) => Some(StoredIdentity {
            private_key: private_key.value().to_string(),
            public_key: public_key.value().to_string(),
        }),
        _ => None,
    })
}

impl IdentityStorage for RedbIdentityStorage {
    fn read_pair(&self) -> Result<Option<StoredIdentity>, IdentityStorageError> {
        let txn = self.db.begin_read().map_err(unavailable)?;
        let table = txn.open_table(IDENTITY).map_err(unavailable)?;
        read_from(&table)
    }

    fn store_pair_if_absent(
        &self,
        identity: StoredIdentity,
    ) -> Result<StoredIdentity, IdentityStorageError> {
        let txn = self.db.begin_write().map_err(unavailable)?;
        let existing = {
            let mut table = txn.open_table(IDENTITY).map_err(unavailable)?;
            let existing = read_from(&table)?;
            if existing.is_none() {
                table
                    .insert(PRIVATE_KEY_ENTRY, identity.private_key.as_str())
                    .map_err(unavailable)?;
                table
                    .insert(PUBLIC_KEY_ENTRY, identity.public_key.as_str())
                    .map_err(unavailable)?;
            }
            existing
        };
        txn.commit().map_err(unavailable)?;

        Ok(existing.unwrap_or(identity))
    }
}
