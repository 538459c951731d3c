//! The backend facade: one configuration bound to one engine.

use chrono::{DateTime, Utc};

use crate::assembly;
use crate::config::{ConfigOverrides, Configuration};
use crate::engine::{CryptoEngine, EncryptOptions};
use crate::error::Result;
use crate::mime::{Message, MimePart};
use crate::trust::TrustLevel;

/// A configured PGP/MIME backend.
///
/// # Example
///
/// ```no_run
/// use pgp_mime::{Configuration, EncryptOptions, PgpMime, RpgpEngine};
///
/// let backend: PgpMime<RpgpEngine> = PgpMime::new(Configuration::default()).unwrap();
/// let signed = backend.sign_message("Hello!", "A4F388BBB194925AE301F844C52B42177857DD79", true).unwrap();
/// println!("{}", signed);
/// ```
#[derive(Debug)]
pub struct PgpMime<E: CryptoEngine> {
    config: Configuration,
    engine: E,
}

impl<E: CryptoEngine> PgpMime<E> {
    /// Configure a new engine from `config`.
    pub fn new(config: Configuration) -> Result<Self> {
        let engine = E::configure(&config)?;
        Ok(Self { config, engine })
    }

    /// Use an engine that has already been configured.
    pub fn with_engine(config: Configuration, engine: E) -> Self {
        Self { config, engine }
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// A new backend whose configuration is this one with `overrides`
    /// applied. This backend is left as it is.
    pub fn with_settings(&self, overrides: &ConfigOverrides) -> Result<Self> {
        Self::new(self.config.merged(overrides))
    }

    /// See [`assembly::encrypt_message`].
    pub fn encrypt_message(
        &self,
        message: impl Into<Message>,
        recipients: &[&str],
        signer: Option<&str>,
        options: &EncryptOptions,
    ) -> Result<MimePart> {
        assembly::encrypt_message(&self.engine, message, recipients, signer, options)
    }

    /// See [`assembly::build_ciphertext_part`].
    pub fn build_ciphertext_part(
        &self,
        message: impl Into<Message>,
        recipients: &[&str],
        signer: Option<&str>,
        options: &EncryptOptions,
    ) -> Result<MimePart> {
        assembly::build_ciphertext_part(&self.engine, message, recipients, signer, options)
    }

    /// See [`assembly::sign_message`].
    pub fn sign_message(&self, message: impl Into<Message>, signer: &str, canonicalize: bool) -> Result<MimePart> {
        assembly::sign_message(&self.engine, message, signer, canonicalize)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.engine.decrypt(data)
    }

    pub fn decrypt_and_verify(&self, data: &[u8]) -> Result<(Vec<u8>, Option<String>)> {
        self.engine.decrypt_and_verify(data)
    }

    pub fn verify(&self, signature: &[u8], data: &[u8]) -> Result<Option<String>> {
        self.engine.verify(signature, data)
    }

    pub fn import_public_key(&self, data: &[u8]) -> Result<Vec<String>> {
        self.engine.import_public_key(data)
    }

    pub fn import_private_key(&self, data: &[u8]) -> Result<Vec<String>> {
        self.engine.import_private_key(data)
    }

    pub fn set_trust(&self, fingerprint: &str, level: TrustLevel) -> Result<()> {
        self.engine.set_trust(fingerprint, level)
    }

    /// Set trust from a raw value (0-4). Anything else fails with
    /// `InvalidTrustLevel` and the engine is not touched.
    pub fn set_trust_value(&self, fingerprint: &str, value: u8) -> Result<()> {
        let level = TrustLevel::try_from(value)?;
        self.engine.set_trust(fingerprint, level)
    }

    pub fn get_trust(&self, fingerprint: &str) -> Result<TrustLevel> {
        self.engine.get_trust(fingerprint)
    }

    pub fn key_expiration(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>> {
        self.engine.key_expiration(fingerprint)
    }

    /// Look `search` up on a keyserver. See [`crate::fetch_key`].
    #[cfg(feature = "network")]
    pub fn fetch_key(
        &self,
        search: &str,
        keyserver: Option<&str>,
        timeout: Option<std::time::Duration>,
    ) -> Result<String> {
        crate::network::fetch_key(search, keyserver, timeout)
    }

    /// Fetch a key from a keyserver and import it; returns the imported fingerprints.
    #[cfg(feature = "network")]
    pub fn fetch_and_import(
        &self,
        search: &str,
        keyserver: Option<&str>,
        timeout: Option<std::time::Duration>,
    ) -> Result<Vec<String>> {
        let key = self.fetch_key(search, keyserver, timeout)?;
        self.engine.import_public_key(key.as_bytes())
    }
}
