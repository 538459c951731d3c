//! Detached signature verification.

use std::io::Cursor;

use pgp::composed::{Deserializable, DetachedSignature, SignedPublicKey};

use crate::error::{Error, Result};
use crate::internal::fingerprint_to_hex;

/// Parse a detached signature, armored first, then binary.
fn parse_detached_signature(signature: &[u8]) -> Result<DetachedSignature> {
    match DetachedSignature::from_armor_single(Cursor::new(signature)) {
        Ok((sig, _headers)) => Ok(sig),
        Err(_) => DetachedSignature::from_bytes(Cursor::new(signature))
            .map_err(|e| Error::Parse(format!("invalid signature: {}", e))),
    }
}

/// Check `signature` over `data` against each candidate key.
///
/// Returns the primary fingerprint of the first key (primary or any subkey)
/// the signature verifies with. A signature that parses but does not verify
/// yields `None`.
pub(crate) fn verify_detached<'k>(
    candidates: impl IntoIterator<Item = &'k SignedPublicKey>,
    signature: &[u8],
    data: &[u8],
) -> Result<Option<String>> {
    let sig = parse_detached_signature(signature)?;

    for public_key in candidates {
        if sig.verify(&public_key.primary_key, data).is_ok() {
            return Ok(Some(fingerprint_to_hex(&public_key.primary_key)));
        }

        for subkey in &public_key.public_subkeys {
            if sig.verify(&subkey.key, data).is_ok() {
                return Ok(Some(fingerprint_to_hex(&public_key.primary_key)));
            }
        }
    }

    tracing::warn!("signature did not verify against any known key");
    Ok(None)
}
