//! PGP/MIME message assembly (RFC 3156).
//!
//! These functions turn engine output into `multipart/encrypted` and
//! `multipart/signed` entities. Apart from the engine call in
//! [`build_ciphertext_part`], [`encrypt_message`] and [`sign_message`] they
//! are pure. Engine errors are returned to the caller unchanged; the only
//! errors raised here are for messages that cannot be serialized.
//!
//! # Example
//!
//! ```no_run
//! use pgp_mime::{encrypt_message, EncryptOptions, RpgpEngine, CryptoEngine, Configuration};
//!
//! let engine = RpgpEngine::configure(&Configuration::default()).unwrap();
//! let envelope = encrypt_message(
//!     &engine,
//!     "Hello!",
//!     &["A4F388BBB194925AE301F844C52B42177857DD79"],
//!     None,
//!     &EncryptOptions::trusted(),
//! ).unwrap();
//! assert_eq!(envelope.parts().len(), 2);
//! ```

use crate::engine::{CryptoEngine, EncryptOptions};
use crate::error::Result;
use crate::mime::{
    Message, MimePart, CONTENT_DESCRIPTION, CONTENT_DISPOSITION, CONTENT_TRANSFER_ENCODING,
    CONTENT_TYPE, MIME_VERSION,
};

/// `protocol` of `multipart/encrypted` and type of its control part.
pub const ENCRYPTED_PROTOCOL: &str = "application/pgp-encrypted";
/// `protocol` of `multipart/signed` and type of its signature part.
pub const SIGNATURE_PROTOCOL: &str = "application/pgp-signature";
/// Body of the control part, RFC 3156 section 4.
pub const CONTROL_BODY: &str = "Version: 1\n";

const CIPHERTEXT_NAME: &str = "encrypted.asc";
const SIGNATURE_NAME: &str = "signature.asc";

/// The `application/pgp-encrypted` control part.
pub fn build_control_part() -> MimePart {
    let mut part = MimePart::leaf(ENCRYPTED_PROTOCOL, CONTROL_BODY);
    part.add_header(CONTENT_DESCRIPTION, "PGP/MIME version identification");
    part
}

/// Wrap ciphertext bytes into the `application/octet-stream` part.
pub fn build_octet_stream(ciphertext: Vec<u8>) -> MimePart {
    let mut part = MimePart::leaf(
        &format!("application/octet-stream; name=\"{}\"", CIPHERTEXT_NAME),
        ciphertext,
    );
    part.add_header(CONTENT_DESCRIPTION, "OpenPGP encrypted message");
    part.add_header(
        CONTENT_DISPOSITION,
        &format!("inline; filename=\"{}\"", CIPHERTEXT_NAME),
    );
    part
}

/// Build `multipart/encrypted` from a ciphertext part: control part first,
/// ciphertext second.
pub fn build_encrypted_envelope(ciphertext_part: MimePart) -> MimePart {
    let mut envelope = MimePart::multipart("encrypted", vec![build_control_part(), ciphertext_part]);
    envelope.set_param("protocol", ENCRYPTED_PROTOCOL);
    envelope
}

/// Serialize `message`, encrypt it (signing as well when `signer` is given)
/// and wrap the result into the octet-stream part.
pub fn build_ciphertext_part<E>(
    engine: &E,
    message: impl Into<Message>,
    recipients: &[&str],
    signer: Option<&str>,
    options: &EncryptOptions,
) -> Result<MimePart>
where
    E: CryptoEngine + ?Sized,
{
    let (part, _) = message.into().into_part()?;
    let data = part.to_bytes();

    let ciphertext = match signer {
        None => engine.encrypt(&data, recipients, options)?,
        Some(signer) => engine.sign_and_encrypt(&data, recipients, signer, options)?,
    };

    tracing::debug!(
        recipients = recipients.len(),
        signed = signer.is_some(),
        bytes = ciphertext.len(),
        "built ciphertext part"
    );
    Ok(build_octet_stream(ciphertext))
}

/// Encrypt a message into a complete `multipart/encrypted` entity.
pub fn encrypt_message<E>(
    engine: &E,
    message: impl Into<Message>,
    recipients: &[&str],
    signer: Option<&str>,
    options: &EncryptOptions,
) -> Result<MimePart>
where
    E: CryptoEngine + ?Sized,
{
    let ciphertext_part = build_ciphertext_part(engine, message, recipients, signer, options)?;
    Ok(build_encrypted_envelope(ciphertext_part))
}

/// Wrap a detached signature into the `application/pgp-signature` part.
///
/// The part carries neither `MIME-Version` nor `Content-Transfer-Encoding`.
pub fn build_signature_part(signature: Vec<u8>) -> MimePart {
    let mut part = MimePart::leaf(
        &format!("{}; name=\"{}\"", SIGNATURE_PROTOCOL, SIGNATURE_NAME),
        signature,
    );
    part.add_header(CONTENT_DESCRIPTION, "OpenPGP digital signature");
    part.add_header(
        CONTENT_DISPOSITION,
        &format!("attachment; filename=\"{}\"", SIGNATURE_NAME),
    );
    part.remove_header(MIME_VERSION);
    part.remove_header(CONTENT_TRANSFER_ENCODING);
    part
}

/// Build `multipart/signed` from the signed part and its signature part.
pub fn build_signed_envelope(message_part: MimePart, signature_part: MimePart, micalg: &str) -> MimePart {
    let mut envelope = MimePart::multipart("signed", vec![message_part, signature_part]);
    envelope.set_param("protocol", SIGNATURE_PROTOCOL);
    envelope.set_param("micalg", micalg);
    envelope
}

/// Sign a message into a complete `multipart/signed` entity.
///
/// Plain text is wrapped into a text part without a `MIME-Version` header.
/// With `canonicalize` set, the engine signs a copy of the serialized part
/// with every bare `\n` turned into `\r\n`; the part embedded in the
/// envelope keeps its original line endings.
pub fn sign_message<E>(
    engine: &E,
    message: impl Into<Message>,
    signer: &str,
    canonicalize: bool,
) -> Result<MimePart>
where
    E: CryptoEngine + ?Sized,
{
    let (mut part, wrapped) = message.into().into_part()?;
    if wrapped {
        part.remove_header(MIME_VERSION);
    }

    let serialized = part.to_bytes();
    let signature = if canonicalize {
        engine.sign(&canonicalize_newlines(&serialized), signer)?
    } else {
        engine.sign(&serialized, signer)?
    };
    let micalg = engine.micalg(signer)?;

    tracing::debug!(%micalg, canonicalize, "built signed envelope");
    Ok(build_signed_envelope(part, build_signature_part(signature), &micalg))
}

/// The minimal `text/plain` part plain-text messages are wrapped into.
pub fn text_part(text: &str) -> MimePart {
    MimePart::text(text)
}

/// Replace every bare `\n` with `\r\n`. Existing `\r\n` pairs are kept.
pub fn canonicalize_newlines(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() + data.len() / 32);
    let mut previous = None;
    for &byte in data {
        if byte == b'\n' && previous != Some(b'\r') {
            out.push(b'\r');
        }
        out.push(byte);
        previous = Some(byte);
    }
    out
}

/// Copy envelope-level headers (`From`, `To`, `Subject`, ...) from the
/// original message onto a built envelope.
///
/// Content headers describe the original body, not the envelope, and are
/// skipped.
pub fn carry_outer_headers(source: &MimePart, envelope: &mut MimePart) {
    for (name, value) in source.headers() {
        let skip = [CONTENT_TYPE, CONTENT_TRANSFER_ENCODING, MIME_VERSION]
            .iter()
            .any(|h| h.eq_ignore_ascii_case(name));
        if !skip {
            envelope.add_header(name, value);
        }
    }
}
