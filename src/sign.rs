//! Detached signatures.

use std::io::Cursor;

use pgp::composed::{DetachedSignature, SignedSecretKey};
use pgp::types::Password;
use rand::thread_rng;

use crate::error::Result;
use crate::internal::select_hash_for_key;

/// Create an ASCII-armored detached signature over `data` with the primary
/// key of `secret_key`.
pub(crate) fn sign_detached(secret_key: &SignedSecretKey, data: &[u8], password: &Password) -> Result<Vec<u8>> {
    let mut rng = thread_rng();
    let hash_alg = select_hash_for_key(secret_key);

    let signature = DetachedSignature::sign_binary_data(
        &mut rng,
        &secret_key.primary_key,
        password,
        hash_alg,
        Cursor::new(data),
    )?;

    Ok(signature.to_armored_string(None.into())?.into_bytes())
}
