//! The contract every OpenPGP engine implements.
//!
//! The MIME assembly layer only ever talks to an engine through this trait,
//! handing it raw byte buffers and string key identifiers. Engines report
//! two failures in their own terms, [`Error::KeyNotFound`] and
//! [`Error::UntrustedKey`]; anything else the underlying cryptographic
//! subsystem raises is passed through without being reclassified.
//!
//! [`Error::KeyNotFound`]: crate::Error::KeyNotFound
//! [`Error::UntrustedKey`]: crate::Error::UntrustedKey

use chrono::{DateTime, Utc};

use crate::config::Configuration;
use crate::error::Result;
use crate::trust::TrustLevel;

/// Digest label used in `multipart/signed` when an engine does not say otherwise.
pub const DEFAULT_MICALG: &str = "pgp-sha256";

/// Per-call encryption options.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncryptOptions {
    /// Skip recipient validity checks. `None` uses the backend's
    /// `default_trust` setting.
    pub always_trust: Option<bool>,
}

impl EncryptOptions {
    /// Options that trust every recipient.
    pub fn trusted() -> Self {
        Self {
            always_trust: Some(true),
        }
    }

    /// Options that require valid recipient keys.
    pub fn untrusted() -> Self {
        Self {
            always_trust: Some(false),
        }
    }

    /// The effective `always_trust` value given the configured default.
    pub fn always_trust_or(&self, default_trust: bool) -> bool {
        self.always_trust.unwrap_or(default_trust)
    }
}

/// Raw OpenPGP operations over byte buffers.
///
/// Fingerprints are upper-case hex without a `0x` prefix.
pub trait CryptoEngine: Send + Sync {
    /// Build an engine from a configuration.
    fn configure(config: &Configuration) -> Result<Self>
    where
        Self: Sized;

    /// Create a detached signature over `data`.
    ///
    /// Fails with `KeyNotFound` if `signer` is not a known secret key.
    fn sign(&self, data: &[u8], signer: &str) -> Result<Vec<u8>>;

    /// Encrypt `data` to every recipient.
    ///
    /// Fails with `KeyNotFound` for an unknown recipient and with
    /// `UntrustedKey` when trust is not overridden and a recipient key is
    /// not valid.
    fn encrypt(&self, data: &[u8], recipients: &[&str], options: &EncryptOptions) -> Result<Vec<u8>>;

    /// Sign with `signer` and encrypt to every recipient.
    ///
    /// A signer that does not resolve is reported before any trust problem
    /// with the recipients.
    fn sign_and_encrypt(
        &self,
        data: &[u8],
        recipients: &[&str],
        signer: &str,
        options: &EncryptOptions,
    ) -> Result<Vec<u8>>;

    fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt `data` and check the enclosed signature.
    ///
    /// The fingerprint is only returned when every signature verifies
    /// cleanly. A missing or bad signature is not an error: the plaintext is
    /// still returned, with `None` in place of the signer.
    fn decrypt_and_verify(&self, data: &[u8]) -> Result<(Vec<u8>, Option<String>)>;

    /// Check a detached `signature` over `data`.
    ///
    /// Returns the signer's fingerprint, or `None` if the signature does not
    /// verify. Errors are reserved for operational failures such as an
    /// unparsable signature.
    fn verify(&self, signature: &[u8], data: &[u8]) -> Result<Option<String>>;

    /// Import public keys; returns their fingerprints in import order.
    fn import_public_key(&self, data: &[u8]) -> Result<Vec<String>>;

    /// Import secret keys; returns their fingerprints in import order.
    fn import_private_key(&self, data: &[u8]) -> Result<Vec<String>>;

    fn set_trust(&self, fingerprint: &str, level: TrustLevel) -> Result<()>;

    /// Owner trust of a key; engine values outside the five levels read as
    /// [`TrustLevel::Unknown`].
    fn get_trust(&self, fingerprint: &str) -> Result<TrustLevel>;

    /// Expiration of the (sub)key with this fingerprint, `None` if it never expires.
    fn key_expiration(&self, fingerprint: &str) -> Result<Option<DateTime<Utc>>>;

    /// `micalg` label describing the digest `sign` uses for `signer`.
    fn micalg(&self, _signer: &str) -> Result<String> {
        Ok(DEFAULT_MICALG.to_string())
    }
}
