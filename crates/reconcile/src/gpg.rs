//! OpenPGP public keys for APT repositories.
//!
//! Keys may be served armored or already binary. Input with no armor block
//! is read as a binary packet stream. Either way the key must parse as an
//! OpenPGP public key, and what gets written is its re-serialized binary
//! form; anything else is an error.

use crate::error::{Error, Result};
use pgp::composed::{Deserializable, SignedPublicKey};
use pgp::ser::Serialize;

const ARMOR_MARKER: &[u8] = b"-----BEGIN PGP ";

fn is_armored(data: &[u8]) -> bool {
    data.windows(ARMOR_MARKER.len()).any(|w| w == ARMOR_MARKER)
}

/// Binary key material from `data` fetched from `uri`.
pub fn dearmor(uri: &str, data: &[u8]) -> Result<Vec<u8>> {
    let fail = |message: String| Error::GpgKey {
        uri: uri.to_string(),
        message,
    };

    let key = if is_armored(data) {
        SignedPublicKey::from_armor_single(data)
            .map(|(key, _headers)| key)
            .map_err(|e| fail(format!("invalid armored public key: {e}")))?
    } else {
        log::debug!("Key from {} is not armored, reading raw packets", uri);
        SignedPublicKey::from_bytes(data)
            .map_err(|e| fail(format!("not an OpenPGP public key: {e}")))?
    };

    key.to_bytes()
        .map_err(|e| fail(format!("cannot serialize public key: {e}")))
}
