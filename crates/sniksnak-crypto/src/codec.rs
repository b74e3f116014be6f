//! Key codec: transportable string forms for key material.
//!
//! Asymmetric keys travel as base64-encoded JSON Web Keys, the symmetric
//! room key as base64 of its raw bytes. These strings end up in local
//! storage, in the store (room public key only) and in link fragments.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use p256::{PublicKey, SecretKey};
use zeroize::Zeroizing;

use crate::{
    aead::{EncryptionKey, KEY_SIZE},
    error::CryptoError,
    signing::{SigningKey, VerifyingKey},
};

/// Encode the room encryption key as base64 of its raw bytes.
pub fn encode_encryption_key(key: &EncryptionKey) -> String {
    BASE64.encode(key.as_bytes())
}

/// Decode a room encryption key.
///
/// # Errors
///
/// - `KeyImportFailed`: invalid base64 or not exactly 32 bytes
pub fn decode_encryption_key(encoded: &str) -> Result<EncryptionKey, CryptoError> {
    let raw = Zeroizing::new(
        BASE64
            .decode(encoded)
            .map_err(|e| CryptoError::key_import(format!("invalid base64: {e}")))?,
    );

    let bytes: [u8; KEY_SIZE] = raw.as_slice().try_into().map_err(|_| {
        CryptoError::key_import(format!("key length: expected {KEY_SIZE}, got {}", raw.len()))
    })?;

    Ok(EncryptionKey::from_bytes(bytes))
}

/// Encode a signing private key as base64(JWK).
pub fn encode_signing_key(key: &SigningKey) -> String {
    let secret = SecretKey::from(key);
    let jwk = secret.to_jwk_string();
    BASE64.encode(jwk.as_bytes())
}

/// Decode a signing private key from base64(JWK).
///
/// # Errors
///
/// - `KeyImportFailed`: invalid base64, non-UTF-8 JSON, or a JWK that is not
///   a P-256 private key
pub fn decode_signing_key(encoded: &str) -> Result<SigningKey, CryptoError> {
    let jwk = decode_jwk(encoded)?;
    let secret = SecretKey::from_jwk_str(&jwk)
        .map_err(|_| CryptoError::key_import("not a P-256 private JWK"))?;

    Ok(SigningKey::from(secret))
}

/// Encode a verifying (public) key as base64(JWK).
pub fn encode_verifying_key(key: &VerifyingKey) -> String {
    let public = PublicKey::from(key);
    BASE64.encode(public.to_jwk_string().as_bytes())
}

/// Decode a verifying (public) key from base64(JWK).
///
/// # Errors
///
/// - `KeyImportFailed`: invalid base64, non-UTF-8 JSON, or a JWK that is not
///   a P-256 public key
pub fn decode_verifying_key(encoded: &str) -> Result<VerifyingKey, CryptoError> {
    let jwk = decode_jwk(encoded)?;
    let public = PublicKey::from_jwk_str(&jwk)
        .map_err(|_| CryptoError::key_import("not a P-256 public JWK"))?;

    Ok(VerifyingKey::from(public))
}

fn decode_jwk(encoded: &str) -> Result<Zeroizing<String>, CryptoError> {
    let raw = BASE64
        .decode(encoded)
        .map_err(|e| CryptoError::key_import(format!("invalid base64: {e}")))?;

    String::from_utf8(raw)
        .map(Zeroizing::new)
        .map_err(|_| CryptoError::key_import("JWK is not UTF-8"))
}
