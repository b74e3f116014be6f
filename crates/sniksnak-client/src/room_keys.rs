//! Room key material and the shareable room link.
//!
//! A room has two secrets: the symmetric encryption key and the private half
//! of the room signing keypair. Both travel only in the link fragment, which
//! is never sent to the store. The store learns only the signing public key.
//!
//! ```text
//! <base>/room/<room-id>#<enc(encryption key)>|<enc(signing private key)>
//! ```
//!
//! `enc` is percent-encoding with the `encodeURIComponent` character set, so
//! the base64 `+`, `/` and `=` never collide with URL syntax.

use std::{borrow::Cow, fmt};

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, percent_decode_str, utf8_percent_encode};
use sniksnak_crypto::{
    EncryptionKey, KEY_SIZE, SEED_SIZE, SigningKey, SigningKeyPair, VerifyingKey,
    decode_encryption_key, decode_signing_key, encode_encryption_key, encode_signing_key,
    encode_verifying_key,
};

use crate::{ClientError, Environment, store::RoomId};

/// Separates the two fragment fields.
pub const FRAGMENT_DELIMITER: char = '|';

/// Characters `encodeURIComponent` leaves alone.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Freshly generated room secrets in transport form.
#[derive(Clone)]
pub struct GeneratedRoomKeys {
    /// base64 room encryption key
    pub encryption_key: String,
    /// base64(JWK) room signing private key
    pub signing_private_key: String,
    /// base64(JWK) room signing public key; the only part sent to the store
    pub signing_public_key: String,
}

impl GeneratedRoomKeys {
    /// Generate a new encryption key and room signing keypair.
    pub fn generate<E: Environment>(env: &E) -> Self {
        let encryption_key = EncryptionKey::from_bytes(env.random_array::<KEY_SIZE>());
        let pair = SigningKeyPair::generate(env.random_array::<SEED_SIZE>());

        Self {
            encryption_key: encode_encryption_key(&encryption_key),
            signing_private_key: encode_signing_key(pair.signing_key()),
            signing_public_key: encode_verifying_key(pair.verifying_key()),
        }
    }

    /// Link fragment carrying both secrets.
    pub fn fragment(&self) -> String {
        format!(
            "{}{FRAGMENT_DELIMITER}{}",
            utf8_percent_encode(&self.encryption_key, URI_COMPONENT),
            utf8_percent_encode(&self.signing_private_key, URI_COMPONENT),
        )
    }
}

impl fmt::Debug for GeneratedRoomKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GeneratedRoomKeys")
            .field("signing_public_key", &self.signing_public_key)
            .finish_non_exhaustive()
    }
}

/// The two secrets parsed out of a fragment, not yet imported.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomSecrets {
    /// base64 room encryption key
    pub encryption_key: String,
    /// base64(JWK) room signing private key
    pub signing_private_key: String,
}

impl RoomSecrets {
    /// Split a fragment into its two URL-decoded fields.
    ///
    /// A leading `#` is ignored.
    ///
    /// # Errors
    ///
    /// - `MalformedKeyMaterial`: a field is absent, empty, not valid percent
    ///   encoding, or there are more than two fields
    pub fn parse(fragment: &str) -> Result<Self, ClientError> {
        let fragment = fragment.strip_prefix('#').unwrap_or(fragment);
        let mut fields = fragment.split(FRAGMENT_DELIMITER);

        let encryption_key = decode_field(fields.next(), "encryption key")?;
        let signing_private_key = decode_field(fields.next(), "room signing key")?;
        if fields.next().is_some() {
            return Err(ClientError::malformed_key("unexpected extra fragment field"));
        }

        Ok(Self { encryption_key, signing_private_key })
    }

    /// Import both keys.
    ///
    /// # Errors
    ///
    /// - `KeyImport`: either string is not a valid key
    pub fn import(&self) -> Result<RoomKeyMaterial, ClientError> {
        let encryption_key = decode_encryption_key(&self.encryption_key)
            .map_err(|source| ClientError::KeyImport { source })?;
        let signing_key = decode_signing_key(&self.signing_private_key)
            .map_err(|source| ClientError::KeyImport { source })?;

        Ok(RoomKeyMaterial {
            encryption_key,
            room_signing: SigningKeyPair::from_signing_key(signing_key),
        })
    }
}

impl fmt::Debug for RoomSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoomSecrets(..)")
    }
}

fn decode_field(field: Option<&str>, name: &str) -> Result<String, ClientError> {
    let raw = field.filter(|f| !f.is_empty()).ok_or_else(|| {
        ClientError::malformed_key(format!("missing {name}"))
    })?;
    let decoded: Cow<'_, str> = percent_decode_str(raw)
        .decode_utf8()
        .map_err(|_| ClientError::malformed_key(format!("{name} is not valid UTF-8")))?;

    if decoded.is_empty() {
        return Err(ClientError::malformed_key(format!("missing {name}")));
    }
    Ok(decoded.into_owned())
}

/// Imported room keys, ready for the envelope.
#[derive(Clone)]
pub struct RoomKeyMaterial {
    encryption_key: EncryptionKey,
    room_signing: SigningKeyPair,
}

impl RoomKeyMaterial {
    /// Parse and import a link fragment.
    ///
    /// # Errors
    ///
    /// - `MalformedKeyMaterial`: see [`RoomSecrets::parse`]
    /// - `KeyImport`: see [`RoomSecrets::import`]
    pub fn from_fragment(fragment: &str) -> Result<Self, ClientError> {
        RoomSecrets::parse(fragment)?.import()
    }

    /// Symmetric room key.
    pub fn encryption_key(&self) -> &EncryptionKey {
        &self.encryption_key
    }

    /// Room signing private key.
    pub fn signing_key(&self) -> &SigningKey {
        self.room_signing.signing_key()
    }

    /// Public half of the room signing key, derived from the private half.
    pub fn verifying_key(&self) -> &VerifyingKey {
        self.room_signing.verifying_key()
    }
}

impl fmt::Debug for RoomKeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RoomKeyMaterial(..)")
    }
}

/// Full shareable link to a room.
#[derive(Clone, PartialEq, Eq)]
pub struct RoomLink {
    /// Origin the link points at, without a trailing slash
    pub base_url: String,
    /// Store-assigned room
    pub room_id: RoomId,
    /// Percent-encoded key fragment, without the `#`
    pub fragment: String,
}

impl RoomLink {
    /// Build the link for a newly created room.
    pub fn new(base_url: &str, room_id: RoomId, keys: &GeneratedRoomKeys) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            room_id,
            fragment: keys.fragment(),
        }
    }

    /// Parse `<base>/room/<room-id>#<fragment>`.
    ///
    /// Only the shape is checked here; the fragment is validated when the
    /// session imports it.
    ///
    /// # Errors
    ///
    /// - `MalformedKeyMaterial`: no fragment, no `/room/` segment, or a room
    ///   ID that is not hex
    pub fn parse(link: &str) -> Result<Self, ClientError> {
        let (location, fragment) = link
            .split_once('#')
            .ok_or_else(|| ClientError::malformed_key("link has no key fragment"))?;
        let (base_url, room) = location
            .rsplit_once("/room/")
            .ok_or_else(|| ClientError::malformed_key("link has no room segment"))?;
        let room_id = room
            .trim_end_matches('/')
            .parse::<RoomId>()
            .map_err(|e| ClientError::malformed_key(e.to_string()))?;

        Ok(Self { base_url: base_url.to_string(), room_id, fragment: fragment.to_string() })
    }
}

impl fmt::Display for RoomLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/room/{}#{}", self.base_url, self.room_id, self.fragment)
    }
}

impl fmt::Debug for RoomLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoomLink")
            .field("base_url", &self.base_url)
            .field("room_id", &self.room_id)
            .finish_non_exhaustive()
    }
}
