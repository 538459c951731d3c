//! Error types for the pgp-mime library.
//!
//! Engines classify two failures themselves ([`Error::KeyNotFound`] and
//! [`Error::UntrustedKey`]). Anything else the underlying OpenPGP subsystem
//! reports is passed through as-is via [`Error::OpenPgp`] or [`Error::Engine`].

use thiserror::Error;

/// The main error type for pgp-mime operations.
#[derive(Error, Debug)]
pub enum Error {
    /// A signer or recipient key identifier did not resolve
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Encryption refused because a recipient key is not trusted enough
    #[error("Key not trusted: {0}")]
    UntrustedKey(String),

    /// A trust value outside the five defined levels
    #[error("Invalid trust level: {0}")]
    InvalidTrustLevel(String),

    /// Invalid input provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No suitable encryption subkey found
    #[error("No suitable encryption subkey found")]
    NoEncryptionSubkey,

    /// Certificate does not contain secret key material
    #[error("Certificate does not contain secret key material")]
    NoSecretKey,

    /// Key material could not be parsed
    #[error("Key parsing failed: {0}")]
    Parse(String),

    /// Cryptographic operation failed
    #[error("Cryptographic operation failed: {0}")]
    Crypto(String),

    /// File I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed configuration file
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// Network error (network feature)
    #[error("Network error: {0}")]
    Network(String),

    /// rpgp OpenPGP error, passed through unmodified
    #[error(transparent)]
    OpenPgp(#[from] pgp::errors::Error),

    /// Opaque fault from a third-party engine
    #[error(transparent)]
    Engine(Box<dyn std::error::Error + Send + Sync>),
}

/// A specialized Result type for pgp-mime operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Wrap an engine-specific error without reclassifying it.
    pub fn engine<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Engine(Box::new(err))
    }
}
