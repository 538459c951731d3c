//! # pgp-mime
//!
//! PGP/MIME (RFC 3156) for Rust: encrypt, sign, decrypt and verify message
//! bodies and package the results as `multipart/encrypted` and
//! `multipart/signed` entities that mail clients understand.
//!
//! The library is split in two layers:
//!
//! - **Engines** implement the [`CryptoEngine`] trait: raw OpenPGP
//!   operations over byte buffers and key fingerprints. [`RpgpEngine`], built
//!   on [rpgp](https://docs.rs/pgp), ships with the crate.
//! - **Assembly** functions ([`encrypt_message`], [`sign_message`], ...) turn
//!   engine output into MIME trees. They never do cryptography themselves.
//!
//! [`PgpMime`] binds a [`Configuration`] to an engine and exposes both.
//!
//! ## Quick Start
//!
//! ```no_run
//! use pgp_mime::*;
//!
//! let backend: PgpMime<RpgpEngine> = PgpMime::new(Configuration::default()).unwrap();
//!
//! let bob = generate_key("Bob <bob@example.com>", "", None).unwrap();
//! backend.import_private_key(bob.secret_key.as_bytes()).unwrap();
//! backend.set_trust(&bob.fingerprint, TrustLevel::Ultimate).unwrap();
//!
//! let envelope = backend
//!     .encrypt_message("Hello!", &[bob.fingerprint.as_str()], None, &EncryptOptions::default())
//!     .unwrap();
//!
//! let ciphertext = envelope.parts()[1].payload().unwrap();
//! let plaintext = backend.decrypt(ciphertext).unwrap();
//! assert!(String::from_utf8_lossy(&plaintext).ends_with("Hello!"));
//! ```
//!
//! ## Features
//!
//! - `network`: Fetch keys from HKP keyservers (requires `reqwest`)

// Modules
mod error;
mod config;
mod trust;
mod session;
mod engine;
mod mime;
mod assembly;
mod backend;

// rpgp engine
mod internal;
mod keyring;
mod encrypt;
mod decrypt;
mod sign;
mod verify;
mod key;
mod rpgp;

#[cfg(feature = "network")]
mod network;

// Re-export error types
pub use error::{Error, Result};

// Re-export configuration
pub use config::{ConfigOverrides, Configuration};

// Re-export trust mapping
pub use trust::{GnupgOwnertrust, TrustLevel, TrustModel};

// Re-export the engine contract
pub use engine::{CryptoEngine, EncryptOptions, DEFAULT_MICALG};

// Re-export session handling
pub use session::{SessionCache, SessionScope, SignerScope, SignerSlot};

// Re-export the MIME model
pub use mime::{
    Message, MimeBody, MimePart, CONTENT_DESCRIPTION, CONTENT_DISPOSITION,
    CONTENT_TRANSFER_ENCODING, CONTENT_TYPE, MIME_VERSION,
};

// Re-export assembly functions
pub use assembly::{
    build_ciphertext_part,
    build_control_part,
    build_encrypted_envelope,
    build_octet_stream,
    build_signature_part,
    build_signed_envelope,
    canonicalize_newlines,
    carry_outer_headers,
    encrypt_message,
    sign_message,
    text_part,
    CONTROL_BODY,
    ENCRYPTED_PROTOCOL,
    SIGNATURE_PROTOCOL,
};

// Re-export the backend facade
pub use backend::PgpMime;

// Re-export the rpgp engine
pub use rpgp::{EngineSession, RpgpEngine, PASSPHRASE_EXTENSION};
pub use key::{generate_key, GeneratedKey};

// Re-export network functions when feature is enabled
#[cfg(feature = "network")]
pub use network::{fetch_key, DEFAULT_KEYSERVER, DEFAULT_TIMEOUT};
