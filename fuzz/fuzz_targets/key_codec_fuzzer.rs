//! Fuzz target for key decoding
//!
//! Keys arrive from the link fragment and from local storage. Both are
//! untrusted text.
//!
//! # Invariants
//!
//! - Decoding NEVER panics on arbitrary input
//! - Anything that decodes re-encodes to a string that decodes to the same key
//! - A decoded private key signs messages its derived public key verifies

#![no_main]

use libfuzzer_sys::fuzz_target;
use sniksnak_crypto::{
    decode_encryption_key, decode_signing_key, decode_verifying_key, encode_encryption_key,
    encode_signing_key, encode_verifying_key, sign, verify, verifying_key_for,
};

fuzz_target!(|input: &str| {
    if let Ok(key) = decode_encryption_key(input) {
        let again = decode_encryption_key(&encode_encryption_key(&key)).expect("re-encoded key");
        assert_eq!(again.as_bytes(), key.as_bytes());
    }

    if let Ok(key) = decode_signing_key(input) {
        let again = decode_signing_key(&encode_signing_key(&key)).expect("re-encoded key");
        let public = verifying_key_for(&key);
        assert_eq!(verifying_key_for(&again), public);

        let signature = sign("fuzz", &key).expect("signing with a decoded key");
        assert!(verify("fuzz", &signature, &public));
    }

    if let Ok(key) = decode_verifying_key(input) {
        let again = decode_verifying_key(&encode_verifying_key(&key)).expect("re-encoded key");
        assert_eq!(again, key);
        assert!(!verify("fuzz", input, &key));
    }
});
