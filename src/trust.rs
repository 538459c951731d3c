//! Owner-trust levels and their mapping to engine-native representations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Confidence a keyring holder places in a key's ownership claim.
///
/// The numeric values are stable and match the constants callers used to pass
/// around as plain integers (`0` = unknown up to `4` = ultimate).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum TrustLevel {
    /// No trust decision has been made
    #[default]
    Unknown = 0,
    /// The key owner is never trusted
    Never = 1,
    /// The key owner is marginally trusted
    Marginal = 2,
    /// The key owner is fully trusted
    Full = 3,
    /// The key belongs to the keyring holder
    Ultimate = 4,
}

impl TrustLevel {
    /// All five levels, in ascending order.
    pub const ALL: [TrustLevel; 5] = [
        TrustLevel::Unknown,
        TrustLevel::Never,
        TrustLevel::Marginal,
        TrustLevel::Full,
        TrustLevel::Ultimate,
    ];

    /// Lowercase name of the level.
    pub fn name(&self) -> &'static str {
        match self {
            TrustLevel::Unknown => "unknown",
            TrustLevel::Never => "never",
            TrustLevel::Marginal => "marginal",
            TrustLevel::Full => "full",
            TrustLevel::Ultimate => "ultimate",
        }
    }

    /// Whether a key with this owner trust is valid as an encryption recipient.
    pub fn is_valid_recipient(&self) -> bool {
        matches!(self, TrustLevel::Full | TrustLevel::Ultimate)
    }
}

impl From<TrustLevel> for u8 {
    fn from(level: TrustLevel) -> Self {
        level as u8
    }
}

impl TryFrom<u8> for TrustLevel {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0 => Ok(TrustLevel::Unknown),
            1 => Ok(TrustLevel::Never),
            2 => Ok(TrustLevel::Marginal),
            3 => Ok(TrustLevel::Full),
            4 => Ok(TrustLevel::Ultimate),
            other => Err(Error::InvalidTrustLevel(format!("unknown trust value {}", other))),
        }
    }
}

impl FromStr for TrustLevel {
    type Err = Error;

    /// Parse a trust level from its name (case-insensitive).
    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unknown" => Ok(TrustLevel::Unknown),
            "never" => Ok(TrustLevel::Never),
            "marginal" => Ok(TrustLevel::Marginal),
            "full" => Ok(TrustLevel::Full),
            "ultimate" => Ok(TrustLevel::Ultimate),
            _ => Err(Error::InvalidTrustLevel(format!("unknown trust name '{}'", s))),
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A bidirectional mapping between [`TrustLevel`] and an engine's own trust values.
///
/// `from_native` must be total: values the engine defines beyond the five
/// levels come back as [`TrustLevel::Unknown`].
pub trait TrustModel {
    /// The engine's representation of a trust value.
    type Native;

    /// Map a trust level to the engine's value.
    fn to_native(level: TrustLevel) -> Self::Native;

    /// Map an engine value back to a trust level.
    fn from_native(native: Self::Native) -> TrustLevel;
}

/// GnuPG owner-trust values as written by `gpg --export-ownertrust`.
#[derive(Debug, Clone, Copy)]
pub struct GnupgOwnertrust;

impl TrustModel for GnupgOwnertrust {
    type Native = u8;

    fn to_native(level: TrustLevel) -> u8 {
        match level {
            TrustLevel::Unknown => 2,
            TrustLevel::Never => 3,
            TrustLevel::Marginal => 4,
            TrustLevel::Full => 5,
            TrustLevel::Ultimate => 6,
        }
    }

    fn from_native(native: u8) -> TrustLevel {
        // gpg keeps flag bits above the low nibble
        match native & 0x0f {
            3 => TrustLevel::Never,
            4 => TrustLevel::Marginal,
            5 => TrustLevel::Full,
            6 => TrustLevel::Ultimate,
            _ => TrustLevel::Unknown,
        }
    }
}

impl GnupgOwnertrust {
    /// Format one line of an owner-trust file: `FINGERPRINT:VALUE:`.
    pub fn format_line(fingerprint: &str, level: TrustLevel) -> String {
        format!("{}:{}:", fingerprint, Self::to_native(level))
    }

    /// Parse one line of an owner-trust file.
    ///
    /// Comment and blank lines yield `None`; malformed lines are an error.
    pub fn parse_line(line: &str) -> Result<Option<(String, TrustLevel)>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }

        let mut fields = line.split(':');
        let fingerprint = fields.next().unwrap_or_default();
        let value = fields.next().unwrap_or_default();

        if fingerprint.is_empty() || !fingerprint.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidInput(format!("Malformed owner-trust line: {}", line)));
        }
        let native: u8 = value
            .parse()
            .map_err(|_| Error::InvalidInput(format!("Malformed owner-trust value: {}", line)))?;

        Ok(Some((fingerprint.to_uppercase(), Self::from_native(native))))
    }
}
