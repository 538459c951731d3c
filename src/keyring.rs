//! The rpgp engine's keyring.
//!
//! Certificates are kept in memory, keyed by primary fingerprint, together
//! with an owner-trust table. When a home directory is configured the
//! keyring is loaded from and written back to three files:
//!
//! | File | Contents |
//! |------|----------|
//! | `pubring.pgp` | public certificates, binary, back to back |
//! | `secring.pgp` | secret keys, binary, back to back |
//! | `ownertrust.txt` | `FINGERPRINT:VALUE:` lines in GnuPG ownertrust format |

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use pgp::composed::{SignedPublicKey, SignedSecretKey};
use pgp::ser::Serialize;

use crate::error::{Error, Result};
use crate::internal::{fingerprint_to_hex, key_matches, normalize_key_id, parse_public_keys, parse_secret_keys};
use crate::trust::{GnupgOwnertrust, TrustLevel};

const PUBRING: &str = "pubring.pgp";
const SECRING: &str = "secring.pgp";
const OWNERTRUST: &str = "ownertrust.txt";

/// A certificate and, if imported, its secret key.
#[derive(Debug, Clone)]
pub(crate) struct KeyEntry {
    pub(crate) public: SignedPublicKey,
    pub(crate) secret: Option<SignedSecretKey>,
}

impl KeyEntry {
    pub(crate) fn fingerprint(&self) -> String {
        fingerprint_to_hex(&self.public.primary_key)
    }

    /// Whether a normalized identifier names the primary key or a subkey.
    fn matches(&self, id: &str) -> bool {
        key_matches(&self.public.primary_key, id)
            || self
                .public
                .public_subkeys
                .iter()
                .any(|subkey| key_matches(&subkey.key, id))
    }
}

#[derive(Debug, Clone, Default)]
pub(crate) struct Keyring {
    entries: Vec<KeyEntry>,
    trust: BTreeMap<String, TrustLevel>,
    home: Option<PathBuf>,
}

impl Keyring {
    /// Open a keyring, loading it from `home` when one is given.
    pub(crate) fn open(home: Option<&Path>) -> Result<Self> {
        let mut keyring = Keyring {
            home: home.map(Path::to_path_buf),
            ..Default::default()
        };

        let Some(home) = home else {
            return Ok(keyring);
        };

        if let Some(data) = read_if_present(&home.join(PUBRING))? {
            for key in parse_public_keys(&data)? {
                keyring.insert_public(key);
            }
        }

        if let Some(data) = read_if_present(&home.join(SECRING))? {
            for key in parse_secret_keys(&data)? {
                keyring.insert_secret(key);
            }
        }

        let ownertrust = home.join(OWNERTRUST);
        if ownertrust.exists() {
            for line in std::fs::read_to_string(&ownertrust)?.lines() {
                if let Some((fingerprint, level)) = GnupgOwnertrust::parse_line(line)? {
                    keyring.trust.insert(fingerprint, level);
                }
            }
        }

        tracing::debug!(
            home = %home.display(),
            keys = keyring.entries.len(),
            "loaded keyring"
        );
        Ok(keyring)
    }

    pub(crate) fn entries(&self) -> &[KeyEntry] {
        &self.entries
    }

    /// Resolve a fingerprint or key ID of a primary key or subkey.
    pub(crate) fn find(&self, id: &str) -> Option<&KeyEntry> {
        let id = normalize_key_id(id);
        self.entries.iter().find(|entry| entry.matches(&id))
    }

    /// Resolve `id` to an entry, or fail with `KeyNotFound`.
    pub(crate) fn get(&self, id: &str) -> Result<&KeyEntry> {
        self.find(id).ok_or_else(|| Error::KeyNotFound(id.to_string()))
    }

    /// Resolve `id` to a secret key. Keys known only by their public part
    /// count as not found.
    pub(crate) fn get_secret(&self, id: &str) -> Result<&SignedSecretKey> {
        self.find(id)
            .and_then(|entry| entry.secret.as_ref())
            .ok_or_else(|| Error::KeyNotFound(id.to_string()))
    }

    pub(crate) fn secret_keys(&self) -> Vec<&SignedSecretKey> {
        self.entries.iter().filter_map(|e| e.secret.as_ref()).collect()
    }

    pub(crate) fn public_keys(&self) -> Vec<&SignedPublicKey> {
        self.entries.iter().map(|e| &e.public).collect()
    }

    /// Add or replace a certificate. An existing secret key is kept.
    pub(crate) fn insert_public(&mut self, key: SignedPublicKey) -> String {
        let fingerprint = fingerprint_to_hex(&key.primary_key);
        match self.entries.iter_mut().find(|e| e.fingerprint() == fingerprint) {
            Some(entry) => entry.public = key,
            None => self.entries.push(KeyEntry {
                public: key,
                secret: None,
            }),
        }
        fingerprint
    }

    /// Add or replace a secret key along with its certificate.
    pub(crate) fn insert_secret(&mut self, key: SignedSecretKey) -> String {
        let fingerprint = fingerprint_to_hex(&key.primary_key);
        let public = key.to_public_key();
        match self.entries.iter_mut().find(|e| e.fingerprint() == fingerprint) {
            Some(entry) => {
                entry.public = public;
                entry.secret = Some(key);
            }
            None => self.entries.push(KeyEntry {
                public,
                secret: Some(key),
            }),
        }
        fingerprint
    }

    /// Owner trust of the certificate `id` resolves to.
    pub(crate) fn trust(&self, id: &str) -> Result<TrustLevel> {
        let fingerprint = self.get(id)?.fingerprint();
        Ok(self.trust.get(&fingerprint).copied().unwrap_or_default())
    }

    pub(crate) fn trust_of(&self, entry: &KeyEntry) -> TrustLevel {
        self.trust.get(&entry.fingerprint()).copied().unwrap_or_default()
    }

    pub(crate) fn set_trust(&mut self, id: &str, level: TrustLevel) -> Result<String> {
        let fingerprint = self.get(id)?.fingerprint();
        self.trust.insert(fingerprint.clone(), level);
        Ok(fingerprint)
    }

    /// Write the keyring back to its home directory, if it has one.
    pub(crate) fn save(&self) -> Result<()> {
        let Some(home) = &self.home else {
            return Ok(());
        };
        std::fs::create_dir_all(home)?;

        std::fs::write(home.join(PUBRING), concat_binary(self.entries.iter().map(|e| &e.public))?)?;
        std::fs::write(
            home.join(SECRING),
            concat_binary(self.entries.iter().filter_map(|e| e.secret.as_ref()))?,
        )?;

        let mut ownertrust = String::from("# List of assigned trustvalues\n");
        for (fingerprint, level) in &self.trust {
            ownertrust.push_str(&GnupgOwnertrust::format_line(fingerprint, *level));
            ownertrust.push('\n');
        }
        std::fs::write(home.join(OWNERTRUST), ownertrust)?;

        tracing::debug!(home = %home.display(), "saved keyring");
        Ok(())
    }
}

/// Contents of a keyring file; `None` if it is missing or empty.
fn read_if_present(path: &Path) -> Result<Option<Vec<u8>>> {
    if !path.exists() {
        return Ok(None);
    }
    let data = std::fs::read(path)?;
    Ok((!data.is_empty()).then_some(data))
}

/// Serialize keys back to back in binary form.
fn concat_binary<'a, K>(keys: impl Iterator<Item = &'a K>) -> Result<Vec<u8>>
where
    K: Serialize + 'a,
{
    let mut out = Vec::new();
    for key in keys {
        key.to_writer(&mut out)?;
    }
    Ok(out)
}
