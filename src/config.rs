//! Backend configuration.
//!
//! A [`Configuration`] is fixed for the lifetime of a backend. Scoped
//! variants are made by merging [`ConfigOverrides`] into a copy.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Settings shared by all engines.
///
/// # Example
///
/// ```
/// use pgp_mime::Configuration;
///
/// let config = Configuration::from_toml_str(r#"
///     home = "/var/lib/mailer/gnupg"
///     default_trust = true
/// "#).unwrap();
/// assert!(config.default_trust);
/// assert!(config.binary.is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Engine home directory (the equivalent of `GNUPGHOME`)
    pub home: Option<PathBuf>,
    /// Path to the engine binary; engines that do not run one ignore it
    pub binary: Option<PathBuf>,
    /// Trust every recipient key unless an operation says otherwise
    pub default_trust: bool,
    /// Engine-specific settings that have no field of their own
    pub extensions: BTreeMap<String, String>,
}

/// Fields to replace when deriving a configuration; `None` keeps the original.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub home: Option<PathBuf>,
    pub binary: Option<PathBuf>,
    pub default_trust: Option<bool>,
    /// Merged key by key into the original extensions
    pub extensions: BTreeMap<String, String>,
}

impl ConfigOverrides {
    pub fn home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = Some(home.into());
        self
    }

    pub fn binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn default_trust(mut self, default_trust: bool) -> Self {
        self.default_trust = Some(default_trust);
        self
    }

    pub fn extension(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extensions.insert(key.into(), value.into());
        self
    }
}

impl Configuration {
    /// Parse a configuration from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Return a copy with the given fields replaced. `self` is left untouched.
    pub fn merged(&self, overrides: &ConfigOverrides) -> Self {
        let mut merged = self.clone();
        if let Some(home) = &overrides.home {
            merged.home = Some(home.clone());
        }
        if let Some(binary) = &overrides.binary {
            merged.binary = Some(binary.clone());
        }
        if let Some(default_trust) = overrides.default_trust {
            merged.default_trust = default_trust;
        }
        for (key, value) in &overrides.extensions {
            merged.extensions.insert(key.clone(), value.clone());
        }
        merged
    }

    /// Look up an engine-specific setting.
    pub fn extension(&self, key: &str) -> Option<&str> {
        self.extensions.get(key).map(String::as_str)
    }
}
