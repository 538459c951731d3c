// Run with: cargo run --example write_test_mails -- [output-dir]
//
// Writes signed-only, encrypted-only and signed-and-encrypted messages as
// .eml files, for checking how mail clients render them. The keys used are
// written next to them so they can be imported into the client.
use std::fs;
use std::path::PathBuf;

use anyhow::Context;
use pgp_mime::{
    carry_outer_headers, generate_key, Configuration, EncryptOptions, MimePart, PgpMime,
    RpgpEngine, TrustLevel,
};

const BODY: &str = "Hi Bob,\n\nthis message was written by pgp-mime.\n\nAlice\n";

fn headers(subject: &str) -> MimePart {
    let mut part = MimePart::leaf("text/plain", Vec::new());
    part.add_header("From", "Alice <alice@example.com>");
    part.add_header("To", "Bob <bob@example.com>");
    part.add_header("Subject", subject);
    part
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let out_dir = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("test-mails"));
    fs::create_dir_all(&out_dir).with_context(|| format!("creating {}", out_dir.display()))?;

    let backend: PgpMime<RpgpEngine> = PgpMime::new(Configuration::default())?;

    println!("Generating keys...");
    let alice = generate_key("Alice <alice@example.com>", "", None)?;
    let bob = generate_key("Bob <bob@example.com>", "", None)?;
    backend.import_private_key(alice.secret_key.as_bytes())?;
    backend.import_private_key(bob.secret_key.as_bytes())?;
    backend.set_trust(&bob.fingerprint, TrustLevel::Full)?;

    fs::write(out_dir.join("alice_secret.asc"), &alice.secret_key)?;
    fs::write(out_dir.join("bob_secret.asc"), &bob.secret_key)?;

    let recipients = [bob.fingerprint.as_str()];
    let options = EncryptOptions::default();

    let mut signed = backend.sign_message(BODY, &alice.fingerprint, true)?;
    carry_outer_headers(&headers("pgp-mime: signed only"), &mut signed);

    let mut encrypted = backend.encrypt_message(BODY, &recipients, None, &options)?;
    carry_outer_headers(&headers("pgp-mime: encrypted only"), &mut encrypted);

    let mut both = backend.encrypt_message(BODY, &recipients, Some(&alice.fingerprint), &options)?;
    carry_outer_headers(&headers("pgp-mime: signed and encrypted"), &mut both);

    for (name, message) in [
        ("signed-only.eml", &signed),
        ("encrypted-only.eml", &encrypted),
        ("signed-encrypted.eml", &both),
    ] {
        let path = out_dir.join(name);
        fs::write(&path, message.to_bytes()).with_context(|| format!("writing {}", path.display()))?;
        println!("  wrote {}", path.display());
    }

    println!("Done!");
    Ok(())
}
