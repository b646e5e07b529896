//! Public-key fingerprints and XML-DSig byte encodings
//!
//! The ABAC principal identifier ("keyid") is the lowercase hex SHA-1 digest
//! of the DER-encoded SubjectPublicKeyInfo, matching
//! `openssl x509 -pubkey | openssl rsa -pubin -outform DER | sha1`.

use openssl::bn::BigNumRef;
use openssl::pkey::{HasPublic, PKeyRef};
use openssl::sha::sha1;
use openssl::x509::X509Ref;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::{Result, SpeaksForError};

/// Base64 output is wrapped at this column, `\n` separators only
const B64_LINE_WIDTH: usize = 64;

/// ABAC principal identifier: lowercase hex SHA-1 of a public key's SPKI DER
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyId(String);

impl KeyId {
    /// Wrap a caller-supplied hex digest, normalizing to lowercase
    pub fn from_hex(hex_digest: &str) -> Result<Self> {
        let normalized = hex_digest.trim().to_ascii_lowercase();
        if normalized.is_empty() || !normalized.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(SpeaksForError::InputParse(format!(
                "not a hex key identifier: {hex_digest:?}"
            )));
        }
        Ok(KeyId(normalized))
    }

    /// The lowercase hex digest
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for KeyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Compute the keyid of a certificate's public key
pub fn key_id(cert: &X509Ref) -> Result<KeyId> {
    let pubkey = cert.public_key()?;
    key_id_of_public(&pubkey)
}

/// Compute the keyid of a bare public key
pub fn key_id_of_public<T: HasPublic>(key: &PKeyRef<T>) -> Result<KeyId> {
    let spki_der = key.public_key_to_der()?;
    Ok(KeyId(hex::encode(sha1(&spki_der))))
}

/// Encode an RSA modulus or exponent for an `RSAKeyValue` element
///
/// The big-endian magnitude gets a leading `0x00` when its high bit is set,
/// so the two's-complement reading is unambiguously non-negative.
pub fn positive_int_b64(n: &BigNumRef) -> String {
    let mut bytes = n.to_vec();
    if bytes.is_empty() {
        bytes.push(0);
    }
    if bytes[0] & 0x80 != 0 {
        bytes.insert(0, 0);
    }
    wrap_b64(&STANDARD.encode(&bytes))
}

/// Encode raw bytes as column-wrapped base64 (for `SignatureValue`)
pub fn bytes_b64(data: &[u8]) -> String {
    wrap_b64(&STANDARD.encode(data))
}

/// Extract the DER-base64 body of a PEM certificate for an `X509Certificate`
/// element: armor lines stripped, LF-normalized, surrounding whitespace
/// trimmed.
pub fn certificate_body(cert_pem: &str) -> String {
    cert_pem
        .replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

fn wrap_b64(encoded: &str) -> String {
    let mut wrapped = String::with_capacity(encoded.len() + encoded.len() / B64_LINE_WIDTH + 1);
    for (i, ch) in encoded.chars().enumerate() {
        if i > 0 && i % B64_LINE_WIDTH == 0 {
            wrapped.push('\n');
        }
        wrapped.push(ch);
    }
    wrapped
}
