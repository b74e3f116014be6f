//! Sniksnak Cryptographic Primitives
//!
//! Cryptographic building blocks for Sniksnak. Pure functions with fixed
//! algorithm parameters. Callers provide random bytes (IVs, key seeds) so the
//! whole pipeline can be driven deterministically in tests.
//!
//! # Algorithms
//!
//! The parameters are fixed and must match across every client that joins a
//! room:
//!
//! - Symmetric: AES-GCM with a 256-bit key and a 96-bit IV that is fresh for
//!   every encryption call
//! - Asymmetric: ECDSA over P-256, signing the SHA-512 digest of the message;
//!   signatures are the raw 64-byte `r || s` form
//!
//! Every binary value that leaves this crate is standard base64 text.
//!
//! # Key Encoding
//!
//! ```text
//! Room encryption key  ──► raw 32 bytes ──► base64
//! Signing private key  ──► JWK {kty, crv, x, y, d} ──► base64(JSON)
//! Signing public key   ──► JWK {kty, crv, x, y}    ──► base64(JSON)
//! ```
//!
//! # Security
//!
//! - Authentication tag mismatch rejects the whole ciphertext; no partial
//!   plaintext is ever returned
//! - Verification never errors: malformed or mismatched signatures verify
//!   `false`
//! - Symmetric key bytes and decoded JWK text are zeroized on drop

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod aead;
pub mod codec;
mod error;
pub mod signing;

pub use aead::{EncryptedPayload, EncryptionKey, IV_SIZE, KEY_SIZE, decrypt, encrypt};
pub use codec::{
    decode_encryption_key, decode_signing_key, decode_verifying_key, encode_encryption_key,
    encode_signing_key, encode_verifying_key,
};
pub use error::CryptoError;
pub use signing::{
    SEED_SIZE, SIGNATURE_SIZE, SigningKey, SigningKeyPair, VerifyingKey, sign, verify,
    verifying_key_for,
};
