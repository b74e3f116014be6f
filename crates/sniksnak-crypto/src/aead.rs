//! Message encryption using AES-256-GCM
//!
//! All functions are pure - the IV must be provided by the caller. The IV is
//! transmitted next to the ciphertext, so the caller MUST draw it from a
//! cryptographically secure source and never reuse it under the same key.

use std::fmt;

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, KeyInit},
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use zeroize::Zeroize;

use crate::error::CryptoError;

/// Size of the AES-256 key (32 bytes)
pub const KEY_SIZE: usize = 32;

/// Size of the AES-GCM IV (12 bytes)
pub const IV_SIZE: usize = 12;

/// GCM tag size (16 bytes)
const TAG_SIZE: usize = 16;

/// Symmetric room encryption key.
///
/// Key bytes are zeroized when the key is dropped.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    bytes: [u8; KEY_SIZE],
}

impl EncryptionKey {
    /// Wrap raw key bytes. The caller supplies the randomness.
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for EncryptionKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}

/// Ciphertext and IV, both base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedPayload {
    /// Ciphertext including the 16-byte GCM tag
    pub ciphertext: String,
    /// The 12-byte IV
    pub iv: String,
}

impl EncryptedPayload {
    /// Plaintext length in bytes, or `None` if the ciphertext is not valid
    /// base64 or shorter than a tag.
    pub fn plaintext_len(&self) -> Option<usize> {
        let raw = BASE64.decode(&self.ciphertext).ok()?;
        raw.len().checked_sub(TAG_SIZE)
    }
}

/// Encrypt a UTF-8 message under `key` with the given IV.
pub fn encrypt(plaintext: &str, key: &EncryptionKey, iv: [u8; IV_SIZE]) -> EncryptedPayload {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&iv), plaintext.as_bytes()) else {
        unreachable!("AES-GCM encryption cannot fail for messages below the 64 GiB limit");
    };

    EncryptedPayload { ciphertext: BASE64.encode(ciphertext), iv: BASE64.encode(iv) }
}

/// Decrypt a payload produced by [`encrypt`].
///
/// # Errors
///
/// - `DecryptionFailed`: malformed base64, IV of the wrong length, tag
///   mismatch (tamper or wrong key), or plaintext that is not UTF-8
pub fn decrypt(payload: &EncryptedPayload, key: &EncryptionKey) -> Result<String, CryptoError> {
    let iv = BASE64
        .decode(&payload.iv)
        .map_err(|e| CryptoError::decryption(format!("invalid iv encoding: {e}")))?;
    if iv.len() != IV_SIZE {
        return Err(CryptoError::decryption(format!(
            "iv length: expected {IV_SIZE}, got {}",
            iv.len()
        )));
    }

    let ciphertext = BASE64
        .decode(&payload.ciphertext)
        .map_err(|e| CryptoError::decryption(format!("invalid ciphertext encoding: {e}")))?;
    if ciphertext.len() < TAG_SIZE {
        return Err(CryptoError::decryption("ciphertext shorter than authentication tag"));
    }

    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key.as_bytes()));
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| CryptoError::decryption("authentication failed"))?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::decryption("plaintext is not UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_key(fill: u8) -> EncryptionKey {
        EncryptionKey::from_bytes([fill; KEY_SIZE])
    }

    fn flip_byte(encoded: &str, index: usize) -> String {
        let mut raw = BASE64.decode(encoded).unwrap();
        raw[index] ^= 0x01;
        BASE64.encode(raw)
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = test_key(7);
        let payload = encrypt("hello", &key, [0xAB; IV_SIZE]);

        assert_eq!(decrypt(&payload, &key).unwrap(), "hello");
    }

    #[test]
    fn encrypt_decrypt_empty_message() {
        let key = test_key(1);
        let payload = encrypt("", &key, [0; IV_SIZE]);

        assert_eq!(payload.plaintext_len(), Some(0));
        assert_eq!(decrypt(&payload, &key).unwrap(), "");
    }

    #[test]
    fn ciphertext_carries_tag() {
        let key = test_key(2);
        let payload = encrypt("test message", &key, [0; IV_SIZE]);

        let raw = BASE64.decode(&payload.ciphertext).unwrap();
        assert_eq!(raw.len(), "test message".len() + TAG_SIZE);
        assert_eq!(payload.plaintext_len(), Some("test message".len()));
    }

    #[test]
    fn iv_is_transmitted_verbatim() {
        let key = test_key(3);
        let payload = encrypt("x", &key, [0x11; IV_SIZE]);

        assert_eq!(BASE64.decode(&payload.iv).unwrap(), vec![0x11; IV_SIZE]);
    }

    #[test]
    fn different_iv_produces_different_ciphertext() {
        let key = test_key(4);
        let a = encrypt("same", &key, [0x00; IV_SIZE]);
        let b = encrypt("same", &key, [0xFF; IV_SIZE]);

        assert_ne!(a.ciphertext, b.ciphertext);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let payload = encrypt("secret", &test_key(5), [0; IV_SIZE]);

        let result = decrypt(&payload, &test_key(6));
        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("authentication")
        ));
    }

    #[test]
    fn tampered_ciphertext_fails_decryption() {
        let key = test_key(8);
        let mut payload = encrypt("original message", &key, [0; IV_SIZE]);
        payload.ciphertext = flip_byte(&payload.ciphertext, 0);

        assert!(decrypt(&payload, &key).is_err());
    }

    #[test]
    fn tampered_iv_fails_decryption() {
        let key = test_key(9);
        let mut payload = encrypt("original message", &key, [0; IV_SIZE]);
        payload.iv = flip_byte(&payload.iv, IV_SIZE - 1);

        assert!(decrypt(&payload, &key).is_err());
    }

    #[test]
    fn short_iv_is_rejected() {
        let key = test_key(10);
        let mut payload = encrypt("hi", &key, [0; IV_SIZE]);
        payload.iv = BASE64.encode([0u8; 8]);

        let result = decrypt(&payload, &key);
        assert!(matches!(
            result,
            Err(CryptoError::DecryptionFailed { reason }) if reason.contains("iv length")
        ));
    }

    #[test]
    fn garbage_encoding_is_rejected() {
        let key = test_key(11);
        let payload = EncryptedPayload { ciphertext: "not base64!".into(), iv: "???".into() };

        assert!(decrypt(&payload, &key).is_err());
    }

    #[test]
    fn truncated_ciphertext_is_rejected() {
        let key = test_key(12);
        let payload =
            EncryptedPayload { ciphertext: BASE64.encode([0u8; 4]), iv: BASE64.encode([0u8; 12]) };

        assert!(decrypt(&payload, &key).is_err());
    }

    #[test]
    fn debug_does_not_leak_key() {
        let key = test_key(0x42);
        assert_eq!(format!("{key:?}"), "EncryptionKey(..)");
    }
}
