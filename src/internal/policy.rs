//! Key validation and algorithm policy functions.
//!
//! rpgp doesn't have a policy system like sequoia, so we implement
//! manual validation of key properties here. This includes:
//! - Key expiration and revocation checks
//! - Hash selection for signatures and the matching `micalg` label

use std::time::{Duration, SystemTime};

use pgp::composed::{SignedPublicKey, SignedPublicSubKey, SignedSecretKey};
use pgp::crypto::hash::HashAlgorithm;
use pgp::packet::{Signature, SignatureType};
use pgp::types::{KeyDetails, PublicParams};

use crate::error::{Error, Result};

/// Check if a key has expired based on its creation time and validity period.
pub(crate) fn is_key_expired(creation_time: SystemTime, validity_seconds: Option<u64>) -> bool {
    match expiration_time(creation_time, validity_seconds) {
        Some(expiration) => expiration < SystemTime::now(),
        None => false,
    }
}

/// Absolute expiration for a validity period; zero means no expiration.
fn expiration_time(creation_time: SystemTime, validity_seconds: Option<u64>) -> Option<SystemTime> {
    match validity_seconds {
        Some(0) | None => None,
        Some(validity) => Some(creation_time + Duration::from_secs(validity)),
    }
}

fn validity_seconds(sig: &Signature) -> Option<u64> {
    sig.key_expiration_time().map(|validity| validity.as_secs() as u64)
}

/// Check if a subkey is revoked.
pub(crate) fn is_subkey_revoked(subkey: &SignedPublicSubKey) -> bool {
    subkey
        .signatures
        .iter()
        .any(|sig| sig.typ() == Some(SignatureType::SubkeyRevocation))
}

/// Check if a subkey is valid for use (not expired, not revoked).
pub(crate) fn is_subkey_valid(subkey: &SignedPublicSubKey) -> bool {
    if is_subkey_revoked(subkey) {
        return false;
    }

    let creation_time: SystemTime = subkey.key.created_at().into();
    let validity = subkey.signatures.last().and_then(validity_seconds);
    !is_key_expired(creation_time, validity)
}

/// Get the expiration time for a key (from first user binding signature).
pub(crate) fn get_key_expiration(key: &SignedPublicKey) -> Option<SystemTime> {
    let creation_time: SystemTime = key.primary_key.created_at().into();
    key.details
        .users
        .iter()
        .flat_map(|user| user.signatures.iter())
        .find_map(|sig| validity_seconds(sig))
        .and_then(|validity| expiration_time(creation_time, Some(validity)))
}

/// Get the expiration time for a subkey, from its most recent binding signature.
pub(crate) fn get_subkey_expiration(subkey: &SignedPublicSubKey) -> Option<SystemTime> {
    let creation_time: SystemTime = subkey.key.created_at().into();
    let validity = subkey.signatures.last().and_then(validity_seconds);
    expiration_time(creation_time, validity)
}

/// Find the subkeys of `key` that may be used to encrypt right now.
pub(crate) fn find_valid_encryption_subkeys(key: &SignedPublicKey) -> Result<Vec<SignedPublicSubKey>> {
    let mut valid_keys = Vec::new();

    for subkey in &key.public_subkeys {
        if !subkey.key.algorithm().can_encrypt() {
            continue;
        }

        let has_encryption_flag = subkey.signatures.iter().any(|sig| {
            let flags = sig.key_flags();
            flags.encrypt_comms() || flags.encrypt_storage()
        });
        if !has_encryption_flag {
            continue;
        }

        if !is_subkey_valid(subkey) {
            continue;
        }

        valid_keys.push(subkey.clone());
    }

    if valid_keys.is_empty() {
        return Err(Error::NoEncryptionSubkey);
    }
    Ok(valid_keys)
}

/// Select appropriate hash algorithm based on key type.
/// ECDSA keys require hash algorithms that match or exceed their security level.
pub(crate) fn select_hash_for_key(secret_key: &SignedSecretKey) -> HashAlgorithm {
    use pgp::types::EcdsaPublicParams;

    match secret_key.primary_key.public_params() {
        PublicParams::ECDSA(ecdsa) => match ecdsa {
            EcdsaPublicParams::P256 { .. } => HashAlgorithm::Sha256,
            EcdsaPublicParams::P384 { .. } => HashAlgorithm::Sha384,
            EcdsaPublicParams::P521 { .. } => HashAlgorithm::Sha512,
            _ => HashAlgorithm::Sha256,
        },
        _ => HashAlgorithm::Sha256,
    }
}

/// RFC 3156 `micalg` label for a hash algorithm.
pub(crate) fn micalg_for_hash(hash: HashAlgorithm) -> &'static str {
    match hash {
        HashAlgorithm::Sha1 => "pgp-sha1",
        HashAlgorithm::Sha224 => "pgp-sha224",
        HashAlgorithm::Sha384 => "pgp-sha384",
        HashAlgorithm::Sha512 => "pgp-sha512",
        _ => "pgp-sha256",
    }
}
