//! Encryption to one or more recipient certificates.

use pgp::composed::{MessageBuilder, SignedPublicKey, SignedSecretKey};
use pgp::crypto::sym::SymmetricKeyAlgorithm;
use pgp::types::Password;
use rand::thread_rng;

use crate::error::{Error, Result};
use crate::internal::{find_valid_encryption_subkeys, select_hash_for_key};

/// Encrypt `plaintext` so that any of `recipients` can decrypt it, signing
/// it first when `signer` is given. Output is ASCII-armored.
pub(crate) fn encrypt_to_keys(
    recipients: &[&SignedPublicKey],
    plaintext: &[u8],
    signer: Option<(&SignedSecretKey, Password)>,
) -> Result<Vec<u8>> {
    if recipients.is_empty() {
        return Err(Error::InvalidInput("No recipients specified".to_string()));
    }

    let mut rng = thread_rng();

    let mut encryption_keys = Vec::new();
    for public_key in recipients {
        encryption_keys.extend(find_valid_encryption_subkeys(public_key)?);
    }

    let mut builder = MessageBuilder::from_bytes("", plaintext.to_vec())
        .seipd_v1(&mut rng, SymmetricKeyAlgorithm::AES256);

    if let Some((secret_key, password)) = signer {
        builder.sign(&secret_key.primary_key, password, select_hash_for_key(secret_key));
    }

    for key in &encryption_keys {
        builder.encrypt_to_key(&mut rng, key)?;
    }

    Ok(builder.to_armored_string(&mut rng, None.into())?.into_bytes())
}
