//! Fuzz target for the dual-signed envelope
//!
//! Seals a message, applies an arbitrary tamper, and checks what the store's
//! gate and the reader each make of it.
//!
//! # Invariants
//!
//! - Untampered envelopes pass the gate and open to the original text
//! - Tampered ciphertext or IV NEVER passes the gate
//! - A tampered room signature NEVER passes the gate
//! - Opening NEVER returns text other than the original
//! - NEVER panic on tampered input

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use sniksnak_client::{
    Environment, GeneratedRoomKeys, IdentityKeyStore, MemoryIdentityStorage, MessageId,
    MessageRecord, RoomKeyMaterial, Timestamp, envelope,
};
use sniksnak_harness::SimEnv;

#[derive(Debug, Clone, Arbitrary)]
struct FuzzInput {
    seed: u64,
    text: String,
    tamper: Tamper,
}

#[derive(Debug, Clone, Arbitrary)]
enum Tamper {
    None,
    Ciphertext { offset: u16, replacement: char },
    Iv { offset: u8, replacement: char },
    MessageSignature { offset: u8, replacement: char },
    AuthorSignature { offset: u8, replacement: char },
    SwapSignatures,
}

fn replace_at(field: &mut String, offset: usize, replacement: char) -> bool {
    let Some((index, current)) = field.char_indices().nth(offset % field.len().max(1)) else {
        return false;
    };
    if current == replacement {
        return false;
    }
    field.replace_range(index..index + current.len_utf8(), &replacement.to_string());
    true
}

fuzz_target!(|input: FuzzInput| {
    let text = input.text.trim();
    if text.is_empty() {
        return;
    }

    let env = SimEnv::with_seed(input.seed);
    let keys = GeneratedRoomKeys::generate(&env);
    let room = RoomKeyMaterial::from_fragment(&keys.fragment()).expect("generated fragment");
    let author = IdentityKeyStore::new(MemoryIdentityStorage::new())
        .load_or_create(&env)
        .expect("memory identity");

    let mut message =
        envelope::seal(text, &room, &author, env.random_array()).expect("sealing");

    let (content_changed, room_signature_changed) = match input.tamper {
        Tamper::None => (false, false),
        Tamper::Ciphertext { offset, replacement } => {
            (replace_at(&mut message.ciphertext, offset.into(), replacement), false)
        },
        Tamper::Iv { offset, replacement } => {
            (replace_at(&mut message.iv, offset.into(), replacement), false)
        },
        Tamper::MessageSignature { offset, replacement } => {
            (false, replace_at(&mut message.message_signature, offset.into(), replacement))
        },
        Tamper::AuthorSignature { offset, replacement } => {
            replace_at(&mut message.author_signature, offset.into(), replacement);
            (false, false)
        },
        Tamper::SwapSignatures => {
            std::mem::swap(&mut message.message_signature, &mut message.author_signature);
            (false, true)
        },
    };

    let authentic = envelope::is_room_authentic(&message, room.verifying_key());
    if content_changed || room_signature_changed {
        assert!(!authentic, "tampered envelope passed the gate: {:?}", input.tamper);
    }

    let record = MessageRecord::from_new(MessageId(1), message, Timestamp(1));
    match envelope::open(&record, room.encryption_key(), author.verifying_key()) {
        Ok(opened) => assert_eq!(opened.message, text),
        Err(_) => assert!(content_changed, "untampered content failed to open"),
    }
});
