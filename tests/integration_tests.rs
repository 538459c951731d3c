//! Integration tests for pgp-mime.
//!
//! These tests drive the full stack with the rpgp engine: key import and
//! trust, PGP/MIME envelope assembly, and the decrypt/verify round trips.

use std::sync::Arc;
use std::thread;

use chrono::{Duration, Utc};
use pgp_mime::{
    canonicalize_newlines, carry_outer_headers, generate_key, ConfigOverrides, Configuration,
    CryptoEngine, EncryptOptions, Error, GeneratedKey, MimePart, PgpMime, RpgpEngine, TrustLevel,
};

const ALICE_UID: &str = "Alice <alice@example.com>";
const BOB_UID: &str = "Bob <bob@example.com>";
const MISSING_FP: &str = "0123456789ABCDEF0123456789ABCDEF01234567";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn new_engine() -> RpgpEngine {
    init_tracing();
    RpgpEngine::configure(&Configuration::default()).unwrap()
}

fn new_key(uid: &str) -> GeneratedKey {
    generate_key(uid, "", None).unwrap()
}

/// An engine holding one secret key with the given owner trust.
fn engine_with_key(uid: &str, trust: TrustLevel) -> (RpgpEngine, GeneratedKey) {
    let engine = new_engine();
    let key = new_key(uid);
    engine.import_private_key(key.secret_key.as_bytes()).unwrap();
    engine.set_trust(&key.fingerprint, trust).unwrap();
    (engine, key)
}

fn ciphertext_of(envelope: &MimePart) -> Vec<u8> {
    envelope.parts()[1].payload().unwrap().to_vec()
}

// =============================================================================
// Key Generation and Import Tests
// =============================================================================

mod keys {
    use super::*;

    #[test]
    fn test_generate_key() {
        let key = new_key(ALICE_UID);
        assert_eq!(key.fingerprint.len(), 40);
        assert!(key.public_key.contains("BEGIN PGP PUBLIC KEY BLOCK"));
        assert!(key.secret_key.contains("BEGIN PGP PRIVATE KEY BLOCK"));
    }

    #[test]
    fn test_generate_key_requires_user_id() {
        assert!(matches!(generate_key("  ", "", None), Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_import_returns_fingerprints() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);

        assert_eq!(
            engine.import_public_key(alice.public_key.as_bytes()).unwrap(),
            vec![alice.fingerprint.clone()]
        );
        assert_eq!(
            engine.import_private_key(bob.secret_key.as_bytes()).unwrap(),
            vec![bob.fingerprint.clone()]
        );
        assert_eq!(engine.fingerprints(), vec![alice.fingerprint.clone(), bob.fingerprint.clone()]);
        assert!(!engine.has_secret_key(&alice.fingerprint));
        assert!(engine.has_secret_key(&bob.fingerprint));
    }

    #[test]
    fn test_import_several_keys_at_once() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);
        let both = format!("{}\n{}", alice.public_key, bob.public_key);

        let imported = engine.import_public_key(both.as_bytes()).unwrap();
        assert_eq!(imported, vec![alice.fingerprint.clone(), bob.fingerprint.clone()]);
        assert_eq!(engine.fingerprints().len(), 2);
    }

    #[test]
    fn test_import_several_secret_keys_at_once() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);
        let carol = new_key("Carol <carol@example.com>");
        let all = format!("{}\n\n{}{}", alice.secret_key, bob.secret_key, carol.secret_key);

        let imported = engine.import_private_key(all.as_bytes()).unwrap();
        assert_eq!(
            imported,
            vec![alice.fingerprint.clone(), bob.fingerprint.clone(), carol.fingerprint.clone()]
        );
        for key in [&alice, &bob, &carol] {
            assert!(engine.has_secret_key(&key.fingerprint));
        }
    }

    #[test]
    fn test_import_public_and_secret_blocks_together() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);
        let mixed = format!("{}\n{}", alice.public_key, bob.secret_key);

        let imported = engine.import_public_key(mixed.as_bytes()).unwrap();
        assert_eq!(imported, vec![alice.fingerprint.clone(), bob.fingerprint.clone()]);
        assert!(!engine.has_secret_key(&bob.fingerprint));
    }

    #[test]
    fn test_import_garbage_fails() {
        let engine = new_engine();
        assert!(engine.import_public_key(b"not a key").is_err());
        assert!(engine.import_private_key(b"not a key").is_err());
        assert!(engine.fingerprints().is_empty());
    }

    #[test]
    fn test_reimport_does_not_duplicate() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();
        engine.import_private_key(alice.secret_key.as_bytes()).unwrap();
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();

        assert_eq!(engine.fingerprints().len(), 1);
        assert!(engine.has_secret_key(&alice.fingerprint));
    }

    #[test]
    fn test_lookup_accepts_loose_identifiers() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Full);
        let lower = alice.fingerprint.to_lowercase();
        let prefixed = format!("0x{}", alice.fingerprint);
        let key_id = &alice.fingerprint[24..];

        for id in [lower.as_str(), prefixed.as_str(), key_id] {
            assert_eq!(engine.get_trust(id).unwrap(), TrustLevel::Full, "lookup by {}", id);
        }
    }

    #[test]
    fn test_key_expiration() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Full);
        assert_eq!(engine.key_expiration(&alice.fingerprint).unwrap(), None);

        let expires = Utc::now() + Duration::days(30);
        let bob = generate_key(BOB_UID, "", Some(expires)).unwrap();
        engine.import_public_key(bob.public_key.as_bytes()).unwrap();

        let expiration = engine.key_expiration(&bob.fingerprint).unwrap().unwrap();
        assert!((expiration - expires).num_seconds().abs() < 60);

        assert!(matches!(engine.key_expiration(MISSING_FP), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_expiration_in_the_past_is_rejected() {
        let result = generate_key(ALICE_UID, "", Some(Utc::now() - Duration::days(1)));
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}

// =============================================================================
// Trust Tests
// =============================================================================

mod trust {
    use super::*;

    #[test]
    fn test_set_and_get_every_level() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Unknown);
        for level in TrustLevel::ALL {
            engine.set_trust(&alice.fingerprint, level).unwrap();
            assert_eq!(engine.get_trust(&alice.fingerprint).unwrap(), level);
        }
    }

    #[test]
    fn test_new_keys_have_unknown_trust() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();
        assert_eq!(engine.get_trust(&alice.fingerprint).unwrap(), TrustLevel::Unknown);
    }

    #[test]
    fn test_invalid_value_leaves_trust_alone() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Marginal);
        let backend = PgpMime::with_engine(Configuration::default(), engine);

        for value in [5u8, 7, 255] {
            let err = backend.set_trust_value(&alice.fingerprint, value).unwrap_err();
            assert!(matches!(err, Error::InvalidTrustLevel(_)));
        }
        assert_eq!(backend.get_trust(&alice.fingerprint).unwrap(), TrustLevel::Marginal);

        backend.set_trust_value(&alice.fingerprint, 4).unwrap();
        assert_eq!(backend.get_trust(&alice.fingerprint).unwrap(), TrustLevel::Ultimate);
    }

    #[test]
    fn test_unknown_key() {
        let engine = new_engine();
        assert!(matches!(engine.set_trust(MISSING_FP, TrustLevel::Full), Err(Error::KeyNotFound(_))));
        assert!(matches!(engine.get_trust(MISSING_FP), Err(Error::KeyNotFound(_))));
    }
}

// =============================================================================
// Encryption Tests
// =============================================================================

mod encryption {
    use super::*;

    #[test]
    fn test_hello_envelope() {
        let (engine, bob) = engine_with_key(BOB_UID, TrustLevel::Ultimate);
        let backend = PgpMime::with_engine(Configuration::default(), engine);

        let envelope = backend
            .encrypt_message("hello", &[bob.fingerprint.as_str()], None, &EncryptOptions::default())
            .unwrap();

        assert_eq!(envelope.media_type().as_deref(), Some("multipart/encrypted"));
        assert_eq!(envelope.param("protocol").as_deref(), Some("application/pgp-encrypted"));
        let parts = envelope.parts();
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].payload(), Some(&b"Version: 1\n"[..]));
        assert!(parts[1].payload().unwrap().starts_with(b"-----BEGIN PGP MESSAGE-----"));
    }

    #[test]
    fn test_round_trip() {
        let (engine, bob) = engine_with_key(BOB_UID, TrustLevel::Full);
        let backend = PgpMime::with_engine(Configuration::default(), engine);
        let body = "Dear Bob,\n\nsee you at noon.\n";

        let envelope = backend
            .encrypt_message(body, &[bob.fingerprint.as_str()], None, &EncryptOptions::untrusted())
            .unwrap();
        let plaintext = backend.decrypt(&ciphertext_of(&envelope)).unwrap();

        assert_eq!(plaintext, MimePart::text(body).to_bytes());
    }

    #[test]
    fn test_multiple_recipients() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();
        engine.import_public_key(bob.public_key.as_bytes()).unwrap();

        let ciphertext = engine
            .encrypt(
                b"to both",
                &[alice.fingerprint.as_str(), bob.fingerprint.as_str()],
                &EncryptOptions::trusted(),
            )
            .unwrap();

        for key in [&alice, &bob] {
            let reader = new_engine();
            reader.import_private_key(key.secret_key.as_bytes()).unwrap();
            assert_eq!(reader.decrypt(&ciphertext).unwrap(), b"to both");
        }
    }

    #[test]
    fn test_unknown_recipient() {
        let (engine, bob) = engine_with_key(BOB_UID, TrustLevel::Ultimate);
        let err = engine
            .encrypt(b"x", &[bob.fingerprint.as_str(), MISSING_FP], &EncryptOptions::trusted())
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(fp) if fp == MISSING_FP));
    }

    #[test]
    fn test_untrusted_recipient() {
        for level in [TrustLevel::Unknown, TrustLevel::Never, TrustLevel::Marginal] {
            let (engine, bob) = engine_with_key(BOB_UID, level);
            let err = engine
                .encrypt(b"x", &[bob.fingerprint.as_str()], &EncryptOptions::untrusted())
                .unwrap_err();
            assert!(matches!(err, Error::UntrustedKey(ref fp) if *fp == bob.fingerprint));

            assert!(engine
                .encrypt(b"x", &[bob.fingerprint.as_str()], &EncryptOptions::trusted())
                .is_ok());
        }
    }

    #[test]
    fn test_default_trust_from_configuration() {
        let bob = new_key(BOB_UID);

        let strict = RpgpEngine::configure(&Configuration::default()).unwrap();
        strict.import_public_key(bob.public_key.as_bytes()).unwrap();
        assert!(matches!(
            strict.encrypt(b"x", &[bob.fingerprint.as_str()], &EncryptOptions::default()),
            Err(Error::UntrustedKey(_))
        ));

        let lenient = RpgpEngine::configure(&Configuration {
            default_trust: true,
            ..Default::default()
        })
        .unwrap();
        lenient.import_public_key(bob.public_key.as_bytes()).unwrap();
        assert!(lenient
            .encrypt(b"x", &[bob.fingerprint.as_str()], &EncryptOptions::default())
            .is_ok());
        assert!(matches!(
            lenient.encrypt(b"x", &[bob.fingerprint.as_str()], &EncryptOptions::untrusted()),
            Err(Error::UntrustedKey(_))
        ));
    }

    #[test]
    fn test_unknown_signer_reported_before_trust() {
        let engine = new_engine();
        let bob = new_key(BOB_UID);
        engine.import_public_key(bob.public_key.as_bytes()).unwrap();

        let err = engine
            .sign_and_encrypt(b"x", &[bob.fingerprint.as_str()], MISSING_FP, &EncryptOptions::untrusted())
            .unwrap_err();
        assert!(matches!(err, Error::KeyNotFound(fp) if fp == MISSING_FP));
    }

    #[test]
    fn test_public_only_signer_is_not_found() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();

        assert!(matches!(engine.sign(b"x", &alice.fingerprint), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn test_decrypt_without_secret_key() {
        let engine = new_engine();
        let bob = new_key(BOB_UID);
        engine.import_public_key(bob.public_key.as_bytes()).unwrap();
        let ciphertext = engine
            .encrypt(b"x", &[bob.fingerprint.as_str()], &EncryptOptions::trusted())
            .unwrap();

        assert!(engine.decrypt(&ciphertext).is_err());
    }
}

// =============================================================================
// Signing and Verification Tests
// =============================================================================

mod signing {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let data = b"Important message";

        let signature = engine.sign(data, &alice.fingerprint).unwrap();
        assert!(signature.starts_with(b"-----BEGIN PGP SIGNATURE-----"));
        assert_eq!(engine.verify(&signature, data).unwrap(), Some(alice.fingerprint.clone()));
    }

    #[test]
    fn test_tampered_data_does_not_verify() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let signature = engine.sign(b"Important message", &alice.fingerprint).unwrap();

        assert_eq!(engine.verify(&signature, b"Important message!").unwrap(), None);
    }

    #[test]
    fn test_unknown_signer_does_not_verify() {
        let (signer_engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let signature = signer_engine.sign(b"data", &alice.fingerprint).unwrap();

        assert_eq!(new_engine().verify(&signature, b"data").unwrap(), None);
    }

    #[test]
    fn test_garbage_signature_is_an_error() {
        let engine = new_engine();
        assert!(engine.verify(b"not a signature", b"data").is_err());
    }

    #[test]
    fn test_signed_envelope_verifies_canonical_form() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let backend = PgpMime::with_engine(Configuration::default(), engine);

        let envelope = backend
            .sign_message("line one\nline two\n", &alice.fingerprint, true)
            .unwrap();

        assert_eq!(envelope.media_type().as_deref(), Some("multipart/signed"));
        assert_eq!(envelope.param("micalg").as_deref(), Some("pgp-sha256"));
        assert_eq!(envelope.param("protocol").as_deref(), Some("application/pgp-signature"));

        let embedded = &envelope.parts()[0];
        assert_eq!(embedded.payload(), Some(&b"line one\nline two\n"[..]));
        assert!(embedded.header("MIME-Version").is_none());

        let signature = envelope.parts()[1].payload().unwrap();
        let canonical = canonicalize_newlines(&embedded.to_bytes());
        assert_eq!(backend.verify(signature, &canonical).unwrap(), Some(alice.fingerprint.clone()));
        assert_eq!(backend.verify(signature, &embedded.to_bytes()).unwrap(), None);
    }

    #[test]
    fn test_signed_envelope_without_canonicalization() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let backend = PgpMime::with_engine(Configuration::default(), engine);

        let envelope = backend.sign_message("a\nb\n", &alice.fingerprint, false).unwrap();
        let embedded = envelope.parts()[0].to_bytes();
        let signature = envelope.parts()[1].payload().unwrap();

        assert_eq!(backend.verify(signature, &embedded).unwrap(), Some(alice.fingerprint.clone()));
    }

    #[test]
    fn test_decrypt_and_verify_signed() {
        let engine = new_engine();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);
        engine.import_private_key(alice.secret_key.as_bytes()).unwrap();
        engine.import_private_key(bob.secret_key.as_bytes()).unwrap();
        engine.set_trust(&bob.fingerprint, TrustLevel::Full).unwrap();

        let backend = PgpMime::with_engine(Configuration::default(), engine);
        let envelope = backend
            .encrypt_message(
                "signed and sealed",
                &[bob.fingerprint.as_str()],
                Some(&alice.fingerprint),
                &EncryptOptions::default(),
            )
            .unwrap();

        let (plaintext, signer) = backend.decrypt_and_verify(&ciphertext_of(&envelope)).unwrap();
        assert_eq!(plaintext, MimePart::text("signed and sealed").to_bytes());
        assert_eq!(signer, Some(alice.fingerprint.clone()));
    }

    #[test]
    fn test_decrypt_and_verify_unsigned() {
        let (engine, bob) = engine_with_key(BOB_UID, TrustLevel::Full);
        let ciphertext = engine
            .encrypt(b"no signature here", &[bob.fingerprint.as_str()], &EncryptOptions::default())
            .unwrap();

        let (plaintext, signer) = engine.decrypt_and_verify(&ciphertext).unwrap();
        assert_eq!(plaintext, b"no signature here");
        assert_eq!(signer, None);
    }

    #[test]
    fn test_decrypt_and_verify_unknown_signer() {
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);

        let sender = new_engine();
        sender.import_private_key(alice.secret_key.as_bytes()).unwrap();
        sender.import_public_key(bob.public_key.as_bytes()).unwrap();
        let ciphertext = sender
            .sign_and_encrypt(b"from alice", &[bob.fingerprint.as_str()], &alice.fingerprint, &EncryptOptions::trusted())
            .unwrap();

        let receiver = new_engine();
        receiver.import_private_key(bob.secret_key.as_bytes()).unwrap();
        let (plaintext, signer) = receiver.decrypt_and_verify(&ciphertext).unwrap();
        assert_eq!(plaintext, b"from alice");
        assert_eq!(signer, None);
    }

    /// Sign `data` as `signer`, optionally corrupting the signature value,
    /// and encrypt the result to `recipient`'s encryption subkey.
    fn signed_and_encrypted(signer: &GeneratedKey, recipient: &GeneratedKey, data: &[u8], damage: bool) -> Vec<u8> {
        use pgp::composed::{Deserializable, MessageBuilder, SignedPublicKey, SignedSecretKey};
        use pgp::crypto::hash::HashAlgorithm;
        use pgp::crypto::sym::SymmetricKeyAlgorithm;
        use pgp::packet::{PacketTrait, PublicKeyEncryptedSessionKey, SymEncryptedProtectedData};
        use pgp::types::Password;

        let mut rng = rand::thread_rng();
        let (secret_key, _) = SignedSecretKey::from_string(&signer.secret_key).unwrap();
        let (public_key, _) = SignedPublicKey::from_string(&recipient.public_key).unwrap();

        let mut builder = MessageBuilder::from_bytes("", data.to_vec());
        builder.sign(&secret_key.primary_key, Password::empty(), HashAlgorithm::Sha256);
        let mut inner = builder.to_vec(&mut rng).unwrap();
        if damage {
            // The trailing signature packet ends with the EdDSA `s` value
            *inner.last_mut().unwrap() ^= 0x01;
        }

        let alg = SymmetricKeyAlgorithm::AES256;
        let session_key = alg.new_session_key(&mut rng);
        let pkesk =
            PublicKeyEncryptedSessionKey::from_session_key_v3(&mut rng, &session_key, alg, &public_key.public_subkeys[0])
                .unwrap();
        let seipd = SymEncryptedProtectedData::encrypt_seipdv1(&mut rng, alg, session_key.as_ref(), &inner).unwrap();

        let mut out = Vec::new();
        pkesk.to_writer_with_header(&mut out).unwrap();
        seipd.to_writer_with_header(&mut out).unwrap();
        out
    }

    #[test]
    fn test_decrypt_and_verify_damaged_signature() {
        let (engine, bob) = engine_with_key(BOB_UID, TrustLevel::Ultimate);
        let alice = new_key(ALICE_UID);
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();

        let intact = signed_and_encrypted(&alice, &bob, b"from alice", false);
        assert_eq!(
            engine.decrypt_and_verify(&intact).unwrap(),
            (b"from alice".to_vec(), Some(alice.fingerprint.clone()))
        );

        // Decryption still succeeds; the signer is just not reported
        let damaged = signed_and_encrypted(&alice, &bob, b"from alice", true);
        assert_eq!(engine.decrypt_and_verify(&damaged).unwrap(), (b"from alice".to_vec(), None));
        assert_eq!(engine.decrypt(&damaged).unwrap(), b"from alice");
    }

    #[test]
    fn test_passphrase_protected_key() {
        init_tracing();
        let alice = generate_key(ALICE_UID, "correct horse", None).unwrap();
        let config = Configuration::default().merged(
            &ConfigOverrides::default().extension("passphrase", "correct horse"),
        );
        let engine = RpgpEngine::configure(&config).unwrap();
        engine.import_private_key(alice.secret_key.as_bytes()).unwrap();

        let signature = engine.sign(b"data", &alice.fingerprint).unwrap();
        assert_eq!(engine.verify(&signature, b"data").unwrap(), Some(alice.fingerprint.clone()));
    }
}

// =============================================================================
// Backend, Persistence and Session Tests
// =============================================================================

mod backend {
    use super::*;

    #[test]
    fn test_with_settings_leaves_original() {
        init_tracing();
        let backend: PgpMime<RpgpEngine> = PgpMime::new(Configuration::default()).unwrap();
        let derived = backend
            .with_settings(&ConfigOverrides::default().default_trust(true))
            .unwrap();

        assert!(derived.config().default_trust);
        assert!(!backend.config().default_trust);
    }

    #[test]
    fn test_home_directory_persistence() {
        init_tracing();
        let home = tempfile::tempdir().unwrap();
        let config = Configuration {
            home: Some(home.path().to_path_buf()),
            binary: Some("/usr/bin/gpg".into()),
            ..Default::default()
        };
        let bob = new_key(BOB_UID);

        let ciphertext = {
            let engine = RpgpEngine::configure(&config).unwrap();
            engine.import_private_key(bob.secret_key.as_bytes()).unwrap();
            engine.set_trust(&bob.fingerprint, TrustLevel::Full).unwrap();
            engine
                .encrypt(b"persisted", &[bob.fingerprint.as_str()], &EncryptOptions::default())
                .unwrap()
        };

        let ownertrust = std::fs::read_to_string(home.path().join("ownertrust.txt")).unwrap();
        assert!(ownertrust.contains(&format!("{}:5:", bob.fingerprint)));

        let reopened = RpgpEngine::configure(&config).unwrap();
        assert_eq!(reopened.fingerprints(), vec![bob.fingerprint.clone()]);
        assert!(reopened.has_secret_key(&bob.fingerprint));
        assert_eq!(reopened.get_trust(&bob.fingerprint).unwrap(), TrustLevel::Full);
        assert_eq!(reopened.decrypt(&ciphertext).unwrap(), b"persisted");
    }

    #[test]
    fn test_failed_save_leaves_keyring_unchanged() {
        init_tracing();
        let dir = tempfile::tempdir().unwrap();
        let home = dir.path().join("home");
        let engine = RpgpEngine::configure(&Configuration {
            home: Some(home.clone()),
            ..Default::default()
        })
        .unwrap();
        let alice = new_key(ALICE_UID);
        let bob = new_key(BOB_UID);
        engine.import_public_key(alice.public_key.as_bytes()).unwrap();
        engine.set_trust(&alice.fingerprint, TrustLevel::Full).unwrap();

        // A plain file where the home directory should be makes every save fail
        std::fs::remove_dir_all(&home).unwrap();
        std::fs::write(&home, b"in the way").unwrap();

        assert!(engine.set_trust(&alice.fingerprint, TrustLevel::Never).is_err());
        assert_eq!(engine.get_trust(&alice.fingerprint).unwrap(), TrustLevel::Full);

        assert!(engine.import_public_key(bob.public_key.as_bytes()).is_err());
        assert!(engine.import_private_key(alice.secret_key.as_bytes()).is_err());
        assert_eq!(engine.fingerprints(), vec![alice.fingerprint.clone()]);
        assert!(!engine.has_secret_key(&alice.fingerprint));
    }

    #[test]
    fn test_with_settings_shares_home() {
        init_tracing();
        let home = tempfile::tempdir().unwrap();
        let backend: PgpMime<RpgpEngine> = PgpMime::new(Configuration {
            home: Some(home.path().to_path_buf()),
            ..Default::default()
        })
        .unwrap();
        let bob = new_key(BOB_UID);
        backend.import_public_key(bob.public_key.as_bytes()).unwrap();

        let lenient = backend
            .with_settings(&ConfigOverrides::default().default_trust(true))
            .unwrap();
        assert!(lenient
            .encrypt_message("hi", &[bob.fingerprint.as_str()], None, &EncryptOptions::default())
            .is_ok());
        assert!(matches!(
            backend.encrypt_message("hi", &[bob.fingerprint.as_str()], None, &EncryptOptions::default()),
            Err(Error::UntrustedKey(_))
        ));
    }

    #[test]
    fn test_carry_outer_headers_onto_envelope() {
        let (engine, bob) = engine_with_key(BOB_UID, TrustLevel::Full);
        let backend = PgpMime::with_engine(Configuration::default(), engine);

        let original = b"From: alice@example.com\nTo: bob@example.com\nSubject: Lunch\nContent-Type: text/plain\n\nnoon?\n".to_vec();
        let source = MimePart::from_serialized(&original).unwrap();

        let mut envelope = backend
            .encrypt_message(original, &[bob.fingerprint.as_str()], None, &EncryptOptions::default())
            .unwrap();
        carry_outer_headers(&source, &mut envelope);

        assert_eq!(envelope.header("Subject"), Some("Lunch"));
        assert_eq!(envelope.header("To"), Some("bob@example.com"));
        assert_eq!(envelope.media_type().as_deref(), Some("multipart/encrypted"));

        let plaintext = backend.decrypt(&ciphertext_of(&envelope)).unwrap();
        assert_eq!(plaintext, source.to_bytes());
    }

    #[test]
    fn test_sessions_are_per_thread_and_signer_is_cleared() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..3)
            .map(|_| {
                let engine = engine.clone();
                let signer = alice.fingerprint.clone();
                thread::spawn(move || {
                    engine.sign(b"data", &signer).unwrap();
                    engine.sign(b"more data", &signer).unwrap();
                    engine
                        .sessions()
                        .with_current(|s| (s.operations(), s.signer().is_none()))
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), (2, true));
        }
        // Each worker's session went away with its thread
        assert!(engine.sessions().is_empty());
        assert!(!engine.sessions().has_current());
    }

    #[test]
    fn test_sessions_do_not_outlive_their_threads() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        let bob = new_key(BOB_UID);
        engine.import_public_key(bob.public_key.as_bytes()).unwrap();
        let engine = Arc::new(engine);

        let handles: Vec<_> = (0..50)
            .map(|i| {
                let engine = engine.clone();
                let signer = alice.fingerprint.clone();
                let recipient = bob.fingerprint.clone();
                thread::spawn(move || {
                    if i % 2 == 0 {
                        engine.sign(b"data", &signer).unwrap();
                    } else {
                        engine
                            .sign_and_encrypt(b"data", &[recipient.as_str()], &signer, &EncryptOptions::trusted())
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(engine.sessions().len(), 0);

        // The calling thread keeps its own session until it releases it
        engine.sign(b"data", &alice.fingerprint).unwrap();
        assert_eq!(engine.sessions().len(), 1);
        assert!(engine.sessions().release_current());
        assert!(engine.sessions().is_empty());
    }

    #[test]
    fn test_session_scope_releases() {
        let (engine, alice) = engine_with_key(ALICE_UID, TrustLevel::Ultimate);
        {
            let _scope = engine.sessions().enter();
            engine.sign(b"data", &alice.fingerprint).unwrap();
            assert!(engine.sessions().has_current());
        }
        assert!(!engine.sessions().has_current());
    }
}
