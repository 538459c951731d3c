//! Decryption, optionally checking the enclosed signature.

use std::io::Cursor;

use pgp::composed::{Deserializable, Message, SignedPublicKey, SignedSecretKey};
use pgp::types::Password;

use crate::error::{Error, Result};
use crate::internal::fingerprint_to_hex;

/// Parse an OpenPGP message, armored first, then binary.
fn read_message(ciphertext: &[u8]) -> Result<Message<'_>> {
    match Message::from_armor(Cursor::new(ciphertext)) {
        Ok((msg, _headers)) => Ok(msg),
        Err(_) => Ok(Message::from_bytes(ciphertext)?),
    }
}

/// Decrypt with one secret key and unwrap any compression layer.
fn decrypt_with_key<'a>(
    secret_key: &SignedSecretKey,
    ciphertext: &'a [u8],
    password: &Password,
) -> Result<Message<'a>> {
    // Try standard decrypt first, then legacy mode
    let decrypted = match read_message(ciphertext)?.decrypt(password, secret_key) {
        Ok(msg) => msg,
        Err(_) => read_message(ciphertext)?.decrypt_legacy(password, secret_key)?,
    };

    if decrypted.is_compressed() {
        Ok(decrypted.decompress()?)
    } else {
        Ok(decrypted)
    }
}

/// Whether the (already read) message carries a signature by `key`.
fn signed_by(message: &Message<'_>, key: &SignedPublicKey) -> bool {
    message.verify(&key.primary_key).is_ok()
        || key
            .public_subkeys
            .iter()
            .any(|subkey| message.verify(&subkey.key).is_ok())
}

/// Decrypt with the first secret key that works and look for a signature
/// made by one of `verifiers`.
///
/// Returns the plaintext and the primary fingerprint of the signer, if any.
pub(crate) fn decrypt_and_verify_with_keys(
    secret_keys: &[&SignedSecretKey],
    verifiers: &[&SignedPublicKey],
    ciphertext: &[u8],
    password: &Password,
) -> Result<(Vec<u8>, Option<String>)> {
    let mut last_error = None;

    for secret_key in secret_keys {
        let mut message = match decrypt_with_key(secret_key, ciphertext, password) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(key = %fingerprint_to_hex(&secret_key.primary_key), error = %e, "decryption attempt failed");
                last_error = Some(e);
                continue;
            }
        };

        // The data has to be read before signatures can be checked
        let plaintext = message.as_data_vec()?;

        let signer = verifiers
            .iter()
            .find(|key| signed_by(&message, key))
            .map(|key| fingerprint_to_hex(&key.primary_key));

        return Ok((plaintext, signer));
    }

    Err(last_error.unwrap_or(Error::NoSecretKey))
}
