//! ECDSA P-256 signatures over SHA-512 digests
//!
//! The message is hashed with SHA-512 and the digest is truncated to the
//! curve's field size before signing, which is what WebCrypto does for
//! `{ name: "ECDSA", hash: "SHA-512" }`. Signatures are deterministic
//! (RFC 6979) and encoded as base64 of the 64-byte `r || s` form.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use p256::ecdsa::{
    Signature,
    signature::hazmat::{PrehashSigner, PrehashVerifier},
};
pub use p256::ecdsa::{SigningKey, VerifyingKey};
use rand_chacha::{ChaCha20Rng, rand_core::SeedableRng};
use sha2::{Digest, Sha512};

use crate::error::CryptoError;

/// Size of a raw `r || s` signature (64 bytes)
pub const SIGNATURE_SIZE: usize = 64;

/// Size of the seed used for key generation (32 bytes)
pub const SEED_SIZE: usize = 32;

/// An ECDSA P-256 keypair.
#[derive(Clone)]
pub struct SigningKeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl SigningKeyPair {
    /// Generate a keypair from a caller-provided seed.
    ///
    /// The seed drives a ChaCha20 RNG, so the same seed always yields the
    /// same keypair. Caller MUST provide cryptographically secure random
    /// bytes in production.
    pub fn generate(seed: [u8; SEED_SIZE]) -> Self {
        let mut rng = ChaCha20Rng::from_seed(seed);
        Self::from_signing_key(SigningKey::random(&mut rng))
    }

    /// Build a keypair from an existing private key.
    pub fn from_signing_key(signing_key: SigningKey) -> Self {
        let verifying_key = VerifyingKey::from(&signing_key);
        Self { signing_key, verifying_key }
    }

    /// Private half.
    pub fn signing_key(&self) -> &SigningKey {
        &self.signing_key
    }

    /// Public half.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }
}

/// Public half of a private key.
pub fn verifying_key_for(key: &SigningKey) -> VerifyingKey {
    *key.verifying_key()
}

/// Sign a UTF-8 message. Returns the base64 signature.
pub fn sign(message: &str, key: &SigningKey) -> Result<String, CryptoError> {
    let digest = Sha512::digest(message.as_bytes());
    let signature: Signature = key
        .sign_prehash(&digest)
        .map_err(|e| CryptoError::SigningFailed { reason: e.to_string() })?;

    Ok(BASE64.encode(signature.to_bytes()))
}

/// Verify a base64 signature over a UTF-8 message.
///
/// Returns `false` for mismatched keys, mutated messages, and signatures
/// that are not valid base64 or not 64 bytes long. Never errors.
pub fn verify(message: &str, signature: &str, key: &VerifyingKey) -> bool {
    let Ok(raw) = BASE64.decode(signature) else {
        return false;
    };
    if raw.len() != SIGNATURE_SIZE {
        return false;
    }
    let Ok(signature) = Signature::from_slice(&raw) else {
        return false;
    };

    let digest = Sha512::digest(message.as_bytes());
    key.verify_prehash(&digest, &signature).is_ok()
}
