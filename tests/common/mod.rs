//! Common test fixtures: openssl-generated keys, certificates and CA folders

// not every test binary exercises every fixture
#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::Path;

use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::rsa::Rsa;
use openssl::stack::Stack;
use openssl::symm::Cipher;
use openssl::x509::extension::{BasicConstraints, SubjectAlternativeName};
use openssl::x509::{X509Name, X509NameBuilder, X509};

use speaks_for::trust::TrustStore;

/// A certificate authority: certificate plus signing key
pub struct TestCa {
    pub cert: X509,
    pub key: PKey<Private>,
}

pub fn rsa_key() -> PKey<Private> {
    PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap()
}

fn subject(cn: &str) -> X509Name {
    let mut builder = X509NameBuilder::new().unwrap();
    builder.append_entry_by_nid(Nid::COMMONNAME, cn).unwrap();
    builder.build()
}

fn random_serial() -> openssl::asn1::Asn1Integer {
    let mut serial = BigNum::new().unwrap();
    serial.rand(64, MsbOption::MAYBE_ZERO, false).unwrap();
    serial.to_asn1_integer().unwrap()
}

/// Self-signed CA valid for ten years
pub fn make_ca(cn: &str) -> TestCa {
    make_ca_with_validity(
        cn,
        Asn1Time::days_from_now(0).unwrap(),
        Asn1Time::days_from_now(3650).unwrap(),
    )
}

/// Self-signed CA that expired yesterday
pub fn make_expired_ca(cn: &str) -> TestCa {
    let now = chrono::Utc::now().timestamp();
    make_ca_with_validity(
        cn,
        Asn1Time::from_unix(now - 2 * 365 * 86_400).unwrap(),
        Asn1Time::from_unix(now - 86_400).unwrap(),
    )
}

fn make_ca_with_validity(cn: &str, not_before: Asn1Time, not_after: Asn1Time) -> TestCa {
    let key = rsa_key();
    let name = subject(cn);

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&random_serial()).unwrap();
    builder.set_subject_name(&name).unwrap();
    builder.set_issuer_name(&name).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder.sign(&key, MessageDigest::sha256()).unwrap();

    TestCa {
        cert: builder.build(),
        key,
    }
}

/// Intermediate CA signed by `parent`
pub fn make_intermediate(parent: &TestCa, cn: &str) -> TestCa {
    let key = rsa_key();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&random_serial()).unwrap();
    builder.set_subject_name(&subject(cn)).unwrap();
    builder.set_issuer_name(parent.cert.subject_name()).unwrap();
    builder.set_pubkey(&key).unwrap();
    builder
        .set_not_before(&Asn1Time::days_from_now(0).unwrap())
        .unwrap();
    builder
        .set_not_after(&Asn1Time::days_from_now(1825).unwrap())
        .unwrap();
    builder
        .append_extension(BasicConstraints::new().critical().ca().build().unwrap())
        .unwrap();
    builder.sign(&parent.key, MessageDigest::sha256()).unwrap();

    TestCa {
        cert: builder.build(),
        key,
    }
}

/// End-entity certificate signed by `ca`; `public_id` lands in a
/// SubjectAltName URI when given
pub fn issue_cert(ca: &TestCa, cn: &str, key: &PKey<Private>, public_id: Option<&str>) -> X509 {
    issue_cert_with_validity(ca, cn, key, public_id, 365)
}

/// End-entity certificate already past its validity window
pub fn issue_expired_cert(ca: &TestCa, cn: &str, key: &PKey<Private>) -> X509 {
    issue_cert_with_validity(ca, cn, key, None, -1)
}

fn issue_cert_with_validity(
    ca: &TestCa,
    cn: &str,
    key: &PKey<Private>,
    public_id: Option<&str>,
    valid_days: i64,
) -> X509 {
    let now = chrono::Utc::now().timestamp();
    let not_before = Asn1Time::from_unix(now - 365 * 86_400).unwrap();
    let not_after = Asn1Time::from_unix(now + valid_days * 86_400).unwrap();

    let mut builder = X509::builder().unwrap();
    builder.set_version(2).unwrap();
    builder.set_serial_number(&random_serial()).unwrap();
    builder.set_subject_name(&subject(cn)).unwrap();
    builder.set_issuer_name(ca.cert.subject_name()).unwrap();
    builder.set_pubkey(key).unwrap();
    builder.set_not_before(&not_before).unwrap();
    builder.set_not_after(&not_after).unwrap();
    if let Some(uri) = public_id {
        let san = SubjectAlternativeName::new()
            .uri(uri)
            .build(&builder.x509v3_context(Some(&ca.cert), None))
            .unwrap();
        builder.append_extension(san).unwrap();
    }
    builder.sign(&ca.key, MessageDigest::sha256()).unwrap();
    builder.build()
}

/// Plain PKCS#8 key plus certificate chain as one PEM blob
pub fn plain_pem(key: &PKey<Private>, chain: &[&X509]) -> Vec<u8> {
    let mut out = key.private_key_to_pem_pkcs8().unwrap();
    for cert in chain {
        out.extend_from_slice(&cert.to_pem().unwrap());
    }
    out
}

/// Password-encrypted PKCS#5 key (`Proc-Type: 4,ENCRYPTED`) plus chain
pub fn encrypted_pem(key: &PKey<Private>, chain: &[&X509], password: &str) -> Vec<u8> {
    let mut out = key
        .rsa()
        .unwrap()
        .private_key_to_pem_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
        .unwrap();
    for cert in chain {
        out.extend_from_slice(&cert.to_pem().unwrap());
    }
    out
}

/// Password-encrypted PKCS#8 key plus chain
pub fn encrypted_pkcs8_pem(key: &PKey<Private>, chain: &[&X509], password: &str) -> Vec<u8> {
    let mut out = key
        .private_key_to_pem_pkcs8_passphrase(Cipher::aes_256_cbc(), password.as_bytes())
        .unwrap();
    for cert in chain {
        out.extend_from_slice(&cert.to_pem().unwrap());
    }
    out
}

/// DER PKCS#12 container with key, end-entity certificate and extra chain
pub fn pkcs12_blob(key: &PKey<Private>, cert: &X509, chain: &[&X509], password: &str) -> Vec<u8> {
    let mut ca_stack = Stack::new().unwrap();
    for extra in chain {
        ca_stack.push((*extra).clone()).unwrap();
    }

    let mut builder = Pkcs12::builder();
    builder.name("speaks-for test");
    builder.pkey(key);
    builder.cert(cert);
    builder.ca(ca_stack);
    builder.build2(password).unwrap().to_der().unwrap()
}

/// Populate a CA folder with subject-hash-named anchors
pub fn write_ca_folder(dir: &Path, anchors: &[&X509]) {
    let mut collisions: HashMap<String, usize> = HashMap::new();
    for anchor in anchors {
        let hash_key = TrustStore::anchor_file_name(anchor, 0)
            .split('.')
            .next()
            .unwrap()
            .to_string();
        let n = collisions.entry(hash_key).or_default();
        let path = dir.join(TrustStore::anchor_file_name(anchor, *n));
        fs::write(path, anchor.to_pem().unwrap()).unwrap();
        *n += 1;
    }
}
