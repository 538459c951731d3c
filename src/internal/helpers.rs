//! Internal helper functions.

use std::io::Cursor;

use pgp::composed::{Deserializable, SignedPublicKey, SignedSecretKey};
use pgp::types::KeyDetails;

use crate::error::{Error, Result};

const ARMOR_BEGIN: &[u8] = b"-----BEGIN PGP ";

/// Split key material into chunks rpgp reads in one pass.
///
/// rpgp dearmors a single block per reader, so armored input is cut at every
/// `-----BEGIN PGP` line. Binary input is returned whole.
fn key_blocks(data: &[u8]) -> Vec<&[u8]> {
    let is_binary = data.first().is_some_and(|b| b & 0x80 != 0);
    let starts: Vec<usize> = data
        .windows(ARMOR_BEGIN.len())
        .enumerate()
        .filter(|(_, window)| *window == ARMOR_BEGIN)
        .map(|(i, _)| i)
        .collect();

    if is_binary || starts.is_empty() {
        return vec![data];
    }

    starts
        .iter()
        .enumerate()
        .map(|(n, &start)| {
            let end = starts.get(n + 1).copied().unwrap_or(data.len());
            &data[start..end]
        })
        .collect()
}

/// Every key of type `K` in one block; unparsable entries are skipped.
fn parse_block<K: Deserializable>(block: &[u8], kind: &str) -> Vec<K> {
    let keys_iter = match K::from_reader_many(Cursor::new(block)) {
        Ok((keys_iter, _headers)) => keys_iter,
        Err(e) => {
            tracing::debug!(error = %e, kind, "block holds no readable key");
            return Vec::new();
        }
    };

    let mut keys = Vec::new();
    for key_result in keys_iter {
        match key_result {
            Ok(key) => keys.push(key),
            Err(e) => tracing::warn!(error = %e, kind, "skipping unparsable key"),
        }
    }
    keys
}

/// Parse every secret key in `data` (armored or binary, any number of blocks).
///
/// Entries that fail to parse are skipped with a warning. An input with no
/// usable key at all is an error.
pub(crate) fn parse_secret_keys(data: &[u8]) -> Result<Vec<SignedSecretKey>> {
    let keys: Vec<SignedSecretKey> = key_blocks(data)
        .into_iter()
        .flat_map(|block| parse_block(block, "secret"))
        .collect();

    if keys.is_empty() {
        return Err(Error::Parse("no secret key found".to_string()));
    }
    Ok(keys)
}

/// Parse every public key in `data` (armored or binary, any number of blocks).
/// Secret key blocks are accepted too; only their public parts are returned.
pub(crate) fn parse_public_keys(data: &[u8]) -> Result<Vec<SignedPublicKey>> {
    let mut keys = Vec::new();

    for block in key_blocks(data) {
        let public: Vec<SignedPublicKey> = parse_block(block, "public");
        if public.is_empty() {
            // Maybe it's a secret key - extract the public key from it
            let secret: Vec<SignedSecretKey> = parse_block(block, "secret");
            keys.extend(secret.iter().map(SignedSecretKey::to_public_key));
        } else {
            keys.extend(public);
        }
    }

    if keys.is_empty() {
        return Err(Error::Parse("no public key found".to_string()));
    }
    Ok(keys)
}

/// Get the fingerprint as a hex string (uppercase, no spaces).
pub(crate) fn fingerprint_to_hex(key: &impl KeyDetails) -> String {
    hex::encode_upper(key.fingerprint().as_bytes())
}

/// Get the key ID as a hex string.
pub(crate) fn keyid_to_hex(key: &impl KeyDetails) -> String {
    hex::encode_upper(key.legacy_key_id().as_ref())
}

/// Whether `id` (already normalized) names this key by fingerprint or key ID.
pub(crate) fn key_matches(key: &impl KeyDetails, id: &str) -> bool {
    fingerprint_to_hex(key) == id || keyid_to_hex(key) == id
}

/// Normalize a user-supplied key identifier: drop a `0x` prefix and any
/// whitespace, and upper-case the hex digits.
pub(crate) fn normalize_key_id(id: &str) -> String {
    let id = id.trim();
    let id = id
        .strip_prefix("0x")
        .or_else(|| id.strip_prefix("0X"))
        .unwrap_or(id);
    id.chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_uppercase()
}

/// Convert a SystemTime to chrono DateTime.
pub(crate) fn system_time_to_datetime(st: std::time::SystemTime) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::from(st)
}
