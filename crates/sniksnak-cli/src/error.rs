//! Command errors.

use sniksnak_client::{ClientError, IdentityStorageError, StoreError};
use thiserror::Error;

/// Why a command failed.
#[derive(Error, Debug)]
pub enum CliError {
    /// Protocol failure (bad link, key import, store unreachable)
    #[error(transparent)]
    Client(#[from] ClientError),

    /// A local database could not be opened
    #[error(transparent)]
    Store(#[from] StoreError),

    /// The identity database could not be opened
    #[error(transparent)]
    Identity(#[from] IdentityStorageError),

    /// Writing output failed
    #[error("output: {0}")]
    Io(#[from] std::io::Error),

    /// The room could not be opened
    #[error("room invalid: {reason}")]
    RoomInvalid {
        /// Why the session gave up
        reason: String,
    },

    /// The message was not stored
    #[error("send failed: {reason}")]
    SendFailed {
        /// Last store error
        reason: String,
    },
}
