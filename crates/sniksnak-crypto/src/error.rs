//! Error types for cryptographic operations

use thiserror::Error;

/// Errors from encryption, signing and key import.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Ciphertext could not be authenticated or decoded.
    ///
    /// Covers tag mismatch (tampering or wrong key), malformed base64, a
    /// wrong IV length and plaintext that is not valid UTF-8.
    #[error("decryption failed: {reason}")]
    DecryptionFailed {
        /// Reason for decryption failure
        reason: String,
    },

    /// Encoded key material could not be imported.
    #[error("key import failed: {reason}")]
    KeyImportFailed {
        /// Reason the key was rejected
        reason: String,
    },

    /// The signing backend rejected the digest.
    #[error("signing failed: {reason}")]
    SigningFailed {
        /// Reason for signing failure
        reason: String,
    },
}

impl CryptoError {
    pub(crate) fn decryption(reason: impl Into<String>) -> Self {
        Self::DecryptionFailed { reason: reason.into() }
    }

    pub(crate) fn key_import(reason: impl Into<String>) -> Self {
        Self::KeyImportFailed { reason: reason.into() }
    }
}
