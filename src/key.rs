//! Key generation.
//!
//! Produces Curve25519 keys suitable for PGP/MIME: an EdDSA primary key that
//! certifies and signs, plus an ECDH encryption subkey.

use std::time::SystemTime;

use chrono::{DateTime, Utc};
use pgp::composed::{
    EncryptionCaps, KeyType, SecretKeyParamsBuilder, SignedKeyDetails, SignedSecretKey, SignedSecretSubKey,
    SubkeyParamsBuilder,
};
use pgp::crypto::ecc_curve::ECCCurve;
use pgp::packet::{KeyFlags, PacketTrait, SignatureConfig, SignatureType, Subpacket, SubpacketData};
use pgp::types::{Duration, KeyDetails, KeyVersion, Password, SignedUser, Timestamp};
use rand::thread_rng;

use crate::error::{Error, Result};
use crate::internal::fingerprint_to_hex;

/// A freshly generated key pair.
#[derive(Debug, Clone)]
pub struct GeneratedKey {
    /// ASCII-armored public key
    pub public_key: String,
    /// ASCII-armored secret key
    pub secret_key: String,
    /// Primary key fingerprint as hex string
    pub fingerprint: String,
}

/// Generate a new key pair.
///
/// # Arguments
/// * `user_id` - The user ID, e.g. `"Alice <alice@example.com>"`
/// * `password` - Password protecting the secret key; empty for none
/// * `expires` - Optional expiration for the primary key and the subkey
///
/// # Example
///
/// ```no_run
/// use pgp_mime::generate_key;
///
/// let key = generate_key("Alice <alice@example.com>", "", None).unwrap();
/// assert_eq!(key.fingerprint.len(), 40);
/// ```
pub fn generate_key(user_id: &str, password: &str, expires: Option<DateTime<Utc>>) -> Result<GeneratedKey> {
    if user_id.trim().is_empty() {
        return Err(Error::InvalidInput("A user ID is required".to_string()));
    }
    if let Some(exp) = expires {
        validity_until(Utc::now(), exp)?;
    }

    let mut rng = thread_rng();

    let mut enc_builder = SubkeyParamsBuilder::default();
    enc_builder
        .key_type(KeyType::ECDH(ECCCurve::Curve25519))
        .can_encrypt(EncryptionCaps::All)
        .can_sign(false)
        .can_authenticate(false);
    if !password.is_empty() {
        enc_builder.passphrase(Some(password.to_string()));
    }
    let encryption_subkey = enc_builder.build().map_err(|e| Error::Crypto(e.to_string()))?;

    let mut key_params = SecretKeyParamsBuilder::default();
    key_params
        .key_type(KeyType::Ed25519Legacy)
        .can_certify(true)
        .can_sign(true)
        .can_encrypt(EncryptionCaps::None)
        .primary_user_id(user_id.to_string())
        .subkeys(vec![encryption_subkey]);
    if !password.is_empty() {
        key_params.passphrase(Some(password.to_string()));
    }

    let secret_key = key_params
        .build()
        .map_err(|e| Error::Crypto(e.to_string()))?
        .generate(&mut rng)?;

    // The builder signs without an expiration; re-sign the bindings with one
    let secret_key = match expires {
        Some(exp) => with_expiration(&secret_key, exp, &Password::from(password))?,
        None => secret_key,
    };

    let public_key = secret_key.to_public_key();
    let fingerprint = fingerprint_to_hex(&public_key.primary_key);
    tracing::debug!(%fingerprint, "generated key");

    Ok(GeneratedKey {
        public_key: public_key.to_armored_string(None.into())?,
        secret_key: secret_key.to_armored_string(None.into())?,
        fingerprint,
    })
}

/// Key validity period from `created` until `expires`, as stored in a
/// key expiration subpacket.
fn validity_until(created: DateTime<Utc>, expires: DateTime<Utc>) -> Result<Duration> {
    let seconds = expires.signed_duration_since(created).num_seconds();
    if seconds <= 0 {
        return Err(Error::InvalidInput(
            "Expiration time must be in the future".to_string(),
        ));
    }
    let seconds = u32::try_from(seconds)
        .map_err(|_| Error::InvalidInput("Expiration time is too far in the future".to_string()))?;
    Ok(Duration::from_secs(seconds))
}

fn created_at(key: &impl KeyDetails) -> DateTime<Utc> {
    SystemTime::from(key.created_at()).into()
}

/// Self-signature config carrying `flags` and a key expiration.
fn binding_config(
    key: &SignedSecretKey,
    typ: SignatureType,
    flags: KeyFlags,
    validity: Duration,
) -> Result<SignatureConfig> {
    let mut config = SignatureConfig::from_key(thread_rng(), &key.primary_key, typ)?;
    config.hashed_subpackets = vec![
        Subpacket::regular(SubpacketData::SignatureCreationTime(Timestamp::now()))?,
        Subpacket::regular(SubpacketData::IssuerFingerprint(key.primary_key.fingerprint()))?,
        Subpacket::regular(SubpacketData::KeyFlags(flags))?,
        Subpacket::regular(SubpacketData::KeyExpirationTime(validity))?,
    ];
    if key.primary_key.version() <= KeyVersion::V4 {
        config.unhashed_subpackets = vec![Subpacket::regular(SubpacketData::IssuerKeyId(
            key.primary_key.legacy_key_id(),
        ))?];
    }
    Ok(config)
}

/// Replace the user ID certifications and subkey bindings of a freshly
/// generated key with ones that expire at `expires`.
fn with_expiration(key: &SignedSecretKey, expires: DateTime<Utc>, password: &Password) -> Result<SignedSecretKey> {
    let primary_validity = validity_until(created_at(&key.primary_key), expires)?;

    let mut users = Vec::new();
    for user in &key.details.users {
        let flags = user.signatures.first().map(|sig| sig.key_flags()).unwrap_or_default();
        let sig = binding_config(key, SignatureType::CertPositive, flags, primary_validity)?.sign_certification(
            &key.primary_key,
            key.primary_key.public_key(),
            password,
            user.id.tag(),
            &user.id,
        )?;
        users.push(SignedUser::new(user.id.clone(), vec![sig]));
    }

    let mut secret_subkeys = Vec::new();
    for subkey in &key.secret_subkeys {
        let validity = validity_until(created_at(&subkey.key), expires)?;
        let flags = subkey.signatures.first().map(|sig| sig.key_flags()).unwrap_or_default();
        let sig = binding_config(key, SignatureType::SubkeyBinding, flags, validity)?.sign_subkey_binding(
            &key.primary_key,
            key.primary_key.public_key(),
            password,
            subkey.key.public_key(),
        )?;
        secret_subkeys.push(SignedSecretSubKey {
            key: subkey.key.clone(),
            signatures: vec![sig],
        });
    }

    Ok(SignedSecretKey::new(
        key.primary_key.clone(),
        SignedKeyDetails::new(
            key.details.revocation_signatures.clone(),
            key.details.direct_signatures.clone(),
            users,
            key.details.user_attributes.clone(),
        ),
        key.public_subkeys.clone(),
        secret_subkeys,
    ))
}
