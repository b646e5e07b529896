//! Loader scenarios: PEM region scanning, encrypted keys, PKCS#12 containers

mod common;

use common::*;

use speaks_for::bundle::{load_certificate_pem, public_id, CredentialBundle};
use speaks_for::{KeyFormat, SpeaksForError};

#[test]
fn test_plain_pem_loads_with_chain_in_order() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);

    let pem = plain_pem(&key, &[&cert, &ca.cert]);
    let bundle = CredentialBundle::load(&pem, KeyFormat::Pem, None).unwrap();

    assert_eq!(bundle.chain().len(), 2);
    assert_eq!(
        bundle.chain()[0].to_der().unwrap(),
        cert.to_der().unwrap(),
        "PEM order defines chain order"
    );
    assert!(bundle.private_key().public_eq(&cert.public_key().unwrap()));
}

#[test]
fn test_pem_without_key_is_rejected() {
    let ca = make_ca("Loader CA");
    let pem = ca.cert.to_pem().unwrap();

    let err = CredentialBundle::load(&pem, KeyFormat::Pem, None).unwrap_err();
    assert!(matches!(err, SpeaksForError::InputParse(_)), "{err:?}");
}

#[test]
fn test_pem_with_two_keys_is_ambiguous() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);

    let mut pem = plain_pem(&key, &[&cert]);
    pem.extend_from_slice(&rsa_key().private_key_to_pem_pkcs8().unwrap());

    let err = CredentialBundle::load(&pem, KeyFormat::Pem, None).unwrap_err();
    assert!(matches!(err, SpeaksForError::KeyAmbiguity(_)), "{err:?}");
}

#[test]
fn test_pem_key_certificate_mismatch_is_rejected() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);

    // key in the blob differs from the certificate's
    let pem = plain_pem(&rsa_key(), &[&cert]);
    let err = CredentialBundle::load(&pem, KeyFormat::Pem, None).unwrap_err();
    assert!(matches!(err, SpeaksForError::InputParse(_)), "{err:?}");
}

#[test]
fn test_encrypted_pkcs5_pem_decrypts_with_password() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);

    let pem = encrypted_pem(&key, &[&cert], "hunter2");
    assert!(String::from_utf8_lossy(&pem).contains("Proc-Type: 4,ENCRYPTED"));

    let bundle = CredentialBundle::load(&pem, KeyFormat::Pem, Some("hunter2")).unwrap();
    assert!(bundle.private_key().public_eq(&cert.public_key().unwrap()));
}

#[test]
fn test_encrypted_pkcs8_pem_decrypts_with_password() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);

    let pem = encrypted_pkcs8_pem(&key, &[&cert], "hunter2");
    assert!(String::from_utf8_lossy(&pem).contains("BEGIN ENCRYPTED PRIVATE KEY"));

    let bundle = CredentialBundle::load(&pem, KeyFormat::Pem, Some("hunter2")).unwrap();
    assert!(bundle.private_key().public_eq(&cert.public_key().unwrap()));
}

#[test]
fn test_encrypted_pem_with_wrong_password_fails() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);
    let pem = encrypted_pem(&key, &[&cert], "right");

    let err = CredentialBundle::load(&pem, KeyFormat::Pem, Some("wrong")).unwrap_err();
    assert!(matches!(err, SpeaksForError::KeyDecryption(_)), "{err:?}");
}

#[test]
fn test_pkcs12_loads_key_and_chain() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);

    let blob = pkcs12_blob(&key, &cert, &[&ca.cert], "123456");
    let bundle = CredentialBundle::load(&blob, KeyFormat::P12, Some("123456")).unwrap();

    assert_eq!(bundle.chain().len(), 2);
    assert_eq!(bundle.chain()[0].to_der().unwrap(), cert.to_der().unwrap());
    assert!(bundle.private_key().public_eq(&cert.public_key().unwrap()));
}

#[test]
fn test_pkcs12_wrong_password_fails() {
    let ca = make_ca("Loader CA");
    let key = rsa_key();
    let cert = issue_cert(&ca, "user@example.org", &key, None);
    let blob = pkcs12_blob(&key, &cert, &[], "123456");

    let err = CredentialBundle::load(&blob, KeyFormat::P12, Some("654321")).unwrap_err();
    assert!(matches!(err, SpeaksForError::KeyDecryption(_)), "{err:?}");
}

#[test]
fn test_pkcs12_garbage_is_input_parse() {
    let err = CredentialBundle::load(b"not a pkcs12", KeyFormat::P12, None).unwrap_err();
    assert!(matches!(err, SpeaksForError::InputParse(_)), "{err:?}");
}

#[test]
fn test_public_id_extraction() {
    let ca = make_ca("Loader CA");
    let tool_key = rsa_key();
    let uri = "urn:publicid:IDN+example.org+tool+demo";
    let with_id = issue_cert(&ca, "tool.example.org", &tool_key, Some(uri));
    let without_id = issue_cert(&ca, "plain.example.org", &tool_key, None);

    assert_eq!(public_id(&with_id).as_deref(), Some(uri));
    assert_eq!(public_id(&without_id), None);
}

#[test]
fn test_load_certificate_pem_round_trips() {
    let ca = make_ca("Loader CA");
    let pem = ca.cert.to_pem().unwrap();
    let reloaded = load_certificate_pem(&pem).unwrap();
    assert_eq!(reloaded.to_der().unwrap(), ca.cert.to_der().unwrap());
}
