//! Fuzz target for link and fragment parsing
//!
//! The fragment comes straight from a URL anyone can craft, so parsing must
//! reject garbage without panicking.
//!
//! # Invariants
//!
//! - `RoomSecrets::parse`, `RoomKeyMaterial::from_fragment` and
//!   `RoomLink::parse` NEVER panic
//! - A parsed fragment has two non-empty fields
//! - A parsed link formats back to a link that parses to the same value

#![no_main]

use libfuzzer_sys::fuzz_target;
use sniksnak_client::{RoomKeyMaterial, RoomLink, RoomSecrets};

fuzz_target!(|input: &str| {
    if let Ok(secrets) = RoomSecrets::parse(input) {
        assert!(!secrets.encryption_key.is_empty());
        assert!(!secrets.signing_private_key.is_empty());
        let _ = secrets.import();
    }

    let _ = RoomKeyMaterial::from_fragment(input);

    if let Ok(link) = RoomLink::parse(input) {
        let reparsed = RoomLink::parse(&link.to_string()).expect("formatted link must parse");
        assert_eq!(reparsed.room_id, link.room_id);
        assert_eq!(reparsed.fragment, link.fragment);
    }
});
