//! [`CryptoEngine`] implementation on top of rpgp.
//!
//! Keys live in an in-memory [keyring](crate::keyring) shared by all threads;
//! transient signing state lives in per-thread [`EngineSession`]s. A
//! recipient key is valid for encryption when its owner trust is
//! [`TrustLevel::Full`] or [`TrustLevel::Ultimate`].
//!
//! Engine-specific settings read from [`Configuration::extensions`]:
//!
//! | Key | Meaning |
//! |-----|---------|
//! | `passphrase` | Password unlocking imported secret keys (default: none) |

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use pgp::composed::SignedSecretKey;
use pgp::types::Password;

use crate::config::Configuration;
use crate::decrypt::decrypt_and_verify_with_keys;
use crate::encrypt::encrypt_to_keys;
use crate::engine::{CryptoEngine, EncryptOptions};
use crate::error::{Error, Result};
use crate::internal::{
    get_key_expiration, get_subkey_expiration, key_matches, micalg_for_hash, normalize_key_id,
    parse_public_keys, parse_secret_keys, select_hash_for_key, system_time_to_datetime,
};
use crate::keyring::Keyring;
use crate::session::{SessionCache, SignerSlot};
use crate::sign::sign_detached;
use crate::trust::TrustLevel;
use crate::verify::verify_detached;

/// Extension key holding the secret-key passphrase.
pub const PASSPHRASE_EXTENSION: &str = "passphrase";

/// Per-thread state of an [`RpgpEngine`].
#[derive(Debug, Default)]
pub struct EngineSession {
    signer: Option<SignedSecretKey>,
    operations: u64,
}

impl EngineSession {
    /// The key currently installed for signing, if any.
    pub fn signer(&self) -> Option<&SignedSecretKey> {
        self.signer.as_ref()
    }

    /// Number of signing operations run in this session.
    pub fn operations(&self) -> u64 {
        self.operations
    }
}

impl SignerSlot for EngineSession {
    type Signer = SignedSecretKey;

    fn signer_slot(&mut self) -> &mut Option<SignedSecretKey> {
        &mut self.signer
    }
}

/// OpenPGP engine backed by rpgp.
///
/// # Example
///
/// ```no_run
/// use pgp_mime::{generate_key, Configuration, CryptoEngine, RpgpEngine, TrustLevel};
///
/// let engine = RpgpEngine::configure(&Configuration::default()).unwrap();
/// let key = generate_key("Bob <bob@example.com>", "", None).unwrap();
///
/// let fingerprints = engine.import_public_key(key.public_key.as_bytes()).unwrap();
/// engine.set_trust(&fingerprints[0], TrustLevel::Full).unwrap();
/// ```
pub struct RpgpEngine {
    keyring: RwLock<Keyring>,
    default_trust: bool,
    passphrase: String,
    sessions: SessionCache<EngineSession>,
}

impl RpgpEngine {
    /// The per-thread session cache.
    pub fn sessions(&self) -> &SessionCache<EngineSession> {
        &self.sessions
    }

    /// Primary fingerprints of every key in the keyring, in import order.
    pub fn fingerprints(&self) -> Vec<String> {
        self.keyring.read().entries().iter().map(|e| e.fingerprint()).collect()
    }

    /// Whether the secret part of `id` has been imported.
    pub fn has_secret_key(&self, id: &str) -> bool {
        self.keyring.read().get_secret(id).is_ok()
    }

    fn password(&self) -> Password {
        Password::from(self.passphrase.as_str())
    }

    fn encrypt_inner(
        &self,
        data: &[u8],
        recipients: &[&str],
        signer: Option<&str>,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>> {
        let keyring = self.keyring.read();

        // An unknown signer is reported before anything about the recipients
        let signer_key = signer.map(|id| keyring.get_secret(id)).transpose()?;

        let entries = recipients
            .iter()
            .map(|id| keyring.get(id))
            .collect::<Result<Vec<_>>>()?;

        let always_trust = options.always_trust_or(self.default_trust);
        if !always_trust {
            if let Some(untrusted) = entries
                .iter()
                .find(|entry| !keyring.trust_of(entry).is_valid_recipient())
            {
                return Err(Error::UntrustedKey(untrusted.fingerprint()));
            }
        }

        let public_keys: Vec<_> = entries.iter().map(|entry| &entry.public).collect();
        tracing::debug!(
            recipients = public_keys.len(),
            signed = signer_key.is_some(),
            always_trust,
            "encrypting"
        );

        match signer_key {
            None => encrypt_to_keys(&public_keys, data, None),
            Some(secret_key) => {
                let session = self.sessions.current();
                let mut session = session.lock();
                let mut scoped = session.with_signer(secret_key.clone());
                scoped.operations += 1;
                let signer = scoped.signer().ok_or(Error::NoSecretKey)?;
                encrypt_to_keys(&public_keys, data, Some((signer, self.password())))
            }
        }
    }

    fn import_and_save(&self, import: impl FnOnce(&mut Keyring) -> Vec<String>) -> Result<Vec<String>> {
        self.update_keyring(|keyring| Ok(import(keyring)))
    }

    /// Apply `change` to a copy of the keyring and keep it only once the
    /// copy has been saved, so a failed write leaves memory untouched.
    fn update_keyring<T>(&self, change: impl FnOnce(&mut Keyring) -> Result<T>) -> Result<T> {
        let mut keyring = self.keyring.write();
        let mut staged = keyring.clone();
        let outcome = change(&mut staged)?;
        staged.save()?;
        *keyring = staged;
        Ok(outcome)
    }
}

impl CryptoEngine for RpgpEngine {
    fn configure(config: &Configuration) -> Result<Self> {
        if let Some(binary) = &config.binary {
            tracing::debug!(binary = %binary.display(), "rpgp engine runs in-process, ignoring binary");
        }

        let keyring = Keyring::open(config.home.as_deref())?;
        tracing::debug!(
            home = ?config.home,
            default_trust = config.default_trust,
            "configured rpgp engine"
        );

        Ok(RpgpEngine {
            keyring: RwLock::new(keyring),
            default_trust: config.default_trust,
            passphrase: config
                .extension(PASSPHRASE_EXTENSION)
                .unwrap_or_default()
                .to_string(),
            sessions: SessionCache::new(EngineSession::default),
        })
    }

    fn sign(&self, data: &[u8], signer: &str) -> Result<Vec<u8>> {
        let secret_key = self.keyring.read().get_secret(signer)?.clone();

        let session = self.sessions.current();
        let mut session = session.lock();
        let mut scoped = session.with_signer(secret_key);
        scoped.operations += 1;
        let key = scoped.signer().ok_or(Error::NoSecretKey)?;
        sign_detached(key, data, &self.password())
    }

    fn encrypt(&self, data: &[u8], recipients: &[&str], options: &EncryptOptions) -> Result<Vec<u8>> {
        self.encrypt_inner(data, recipients, None, options)
    }

    fn sign_and_encrypt(
        &self,
        data: &[u8],
        recipients: &[&str],
        signer: &str,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>> {
        self.encrypt_inner(data, recipients, Some(signer), options)
    }

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        let keyring = self.keyring.read();
        let (plaintext, _) = decrypt_and_verify_with_keys(&keyring.secret_keys(), &[], data, &self.password())?;
        Ok(plaintext)
    }

    fn decrypt_and_verify(&self, data: &[u8]) -> Result<(Vec<u8>, Option<String>)> {
        let keyring = self.keyring.read();
        let (plaintext, signer) = decrypt_and_verify_with_keys(
            &keyring.secret_keys(),
            &keyring.public_keys(),
            data,
            &self.password(),
        )?;
        if signer.is_none() {
            tracing::warn!("decrypted message carries no verifiable signature");
        }
        Ok((plaintext, signer))
    }

    fn verify(&self, signature: &[u8], data: &[u8]) -> Result<Option<String>> {
        let keyring = self.keyring.read();
        verify_detached(keyring.public_keys(), signature, data)
    }

    fn import_public_key(&self, data: &[u8]) -> Result<Vec<String>> {
        let keys = parse_public_keys(data)?;
        let fingerprints = self.import_and_save(|keyring| {
            keys.into_iter().map(|key| keyring.insert_public(key)).collect()
        })?;
        tracing::info!(?fingerprints, "imported public keys");
        Ok(fingerprints)
    }

    fn import_private_key(&self, data: &[u8]) -> Result<Vec<String>> {
        let keys = parse_secret_keys(data)?;
        let fingerprints = self.import_and_save(|keyring| {
            keys.into_iter().map(|key| keyring.insert_secret(key)).collect()
        })?;
        tracing::info!(?fingerprints, "imported secret keys");
        Ok(fingerprints)
    }

    fn set_trust(&self, fingerprint: &str, level: TrustLevel) -> Result<()> {
        let resolved = self.update_keyring(|keyring| keyring.set_trust(fingerprint, level))?;
        tracing::info!(fingerprint = %resolved, %level, "owner trust changed");
        Ok(())
    }

    fn get_trust(&self, fingerprint: &str) -> Result<TrustLevel> {
        self.keyring.read().trust(fingerprint)
    }

    fn key_expiration(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>> {
        let keyring = self.keyring.read();
        let entry = keyring.get(fingerprint)?;
        let id = normalize_key_id(fingerprint);

        let expiration = if key_matches(&entry.public.primary_key, &id) {
            get_key_expiration(&entry.public)
        } else {
            entry
                .public
                .public_subkeys
                .iter()
                .find(|subkey| key_matches(&subkey.key, &id))
                .and_then(get_subkey_expiration)
        };
        Ok(expiration.map(system_time_to_datetime))
    }

    fn micalg(&self, signer: &str) -> Result<String> {
        let keyring = self.keyring.read();
        let secret_key = keyring.get_secret(signer)?;
        Ok(micalg_for_hash(select_hash_for_key(secret_key)).to_string())
    }
}

impl std::fmt::Debug for RpgpEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpgpEngine")
            .field("keys", &self.keyring.read().entries().len())
            .field("default_trust", &self.default_trust)
            .field("sessions", &self.sessions)
            .finish()
    }
}
