//! Key and certificate loading
//!
//! Turns a caller-supplied byte blob (PEM or PKCS#12) into a
//! [`CredentialBundle`]: one RSA private key plus the certificate chain whose
//! first element carries the matching public key. Loading enforces that
//! invariant; everything downstream relies on it.

use std::fmt;

use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::x509::{X509Ref, X509};
use tracing::debug;
use zeroize::Zeroizing;

use crate::{Result, SpeaksForError};

const DECRYPT_FAILED: &str = "Private key decryption failed. Invalid password?";
const ONE_KEY_ID: &str = "PKCS#12 credential can only contain one single key ID";

/// Input format hint for [`CredentialBundle::load`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    /// PEM armor regions: PKCS#5 / PKCS#8 key (plain or encrypted) plus
    /// certificates in chain order
    Pem,
    /// DER-encoded PKCS#12 container
    P12,
}

impl fmt::Display for KeyFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyFormat::Pem => f.write_str("pem"),
            KeyFormat::P12 => f.write_str("p12"),
        }
    }
}

/// A signer: private RSA key and the certificate chain it belongs to
///
/// Invariant: `public_key(chain[0])` equals the private key's public half.
#[derive(Debug)]
pub struct CredentialBundle {
    key: PKey<Private>,
    chain: Vec<X509>,
}

impl CredentialBundle {
    /// Load a bundle from raw bytes
    ///
    /// The password applies to encrypted PEM keys and to the PKCS#12
    /// container; it is ignored for plain keys.
    pub fn load(blob: &[u8], format: KeyFormat, password: Option<&str>) -> Result<Self> {
        let bundle = match format {
            KeyFormat::Pem => Self::from_pem(blob, password)?,
            KeyFormat::P12 => Self::from_pkcs12(blob, password)?,
        };

        let chain0_pubkey = bundle.chain[0].public_key()?;
        if !bundle.key.public_eq(&chain0_pubkey) {
            return Err(SpeaksForError::InputParse(
                "certificate does not match private key".to_string(),
            ));
        }
        debug!(
            chain_len = bundle.chain.len(),
            "credential bundle loaded"
        );
        Ok(bundle)
    }

    fn from_pem(blob: &[u8], password: Option<&str>) -> Result<Self> {
        let regions = pem::parse_many(blob)
            .map_err(|e| SpeaksForError::InputParse(format!("invalid PEM input: {e}")))?;

        let mut key_regions: Vec<&pem::Pem> = Vec::new();
        let mut chain: Vec<X509> = Vec::new();
        for region in &regions {
            match region.tag() {
                "RSA PRIVATE KEY" | "PRIVATE KEY" | "ENCRYPTED PRIVATE KEY" => {
                    key_regions.push(region)
                }
                "CERTIFICATE" => {
                    let cert = X509::from_der(region.contents()).map_err(|e| {
                        SpeaksForError::InputParse(format!("invalid certificate in PEM: {e}"))
                    })?;
                    chain.push(cert);
                }
                other => debug!(tag = other, "ignoring unrecognized PEM region"),
            }
        }

        let key_region = match key_regions.len() {
            0 => {
                return Err(SpeaksForError::InputParse(
                    "no private key found in PEM input".to_string(),
                ))
            }
            1 => key_regions[0],
            n => {
                return Err(SpeaksForError::KeyAmbiguity(format!(
                    "PEM credential contains {n} private keys, expected exactly one"
                )))
            }
        };
        if chain.is_empty() {
            return Err(SpeaksForError::InputParse(
                "no certificate found in PEM input".to_string(),
            ));
        }

        // PKCS#5 regions flag encryption through the RFC 1421 Proc-Type
        // header; PKCS#8 uses a distinct armor tag.
        let encrypted = key_region.tag() == "ENCRYPTED PRIVATE KEY"
            || key_region
                .headers()
                .get("Proc-Type")
                .is_some_and(|v| v.contains("ENCRYPTED"));

        let armored = Zeroizing::new(pem::encode(key_region).into_bytes());
        let key = if encrypted {
            let password = match password {
                Some(p) if !p.is_empty() => p,
                _ => return Err(SpeaksForError::KeyDecryption(DECRYPT_FAILED.to_string())),
            };
            PKey::private_key_from_pem_passphrase(&armored, password.as_bytes())
                .map_err(|_| SpeaksForError::KeyDecryption(DECRYPT_FAILED.to_string()))?
        } else {
            PKey::private_key_from_pem(&armored)
                .map_err(|e| SpeaksForError::InputParse(format!("invalid private key: {e}")))?
        };

        Ok(CredentialBundle { key, chain })
    }

    fn from_pkcs12(blob: &[u8], password: Option<&str>) -> Result<Self> {
        let container = Pkcs12::from_der(blob)
            .map_err(|e| SpeaksForError::InputParse(format!("invalid PKCS#12 input: {e}")))?;
        let parsed = container
            .parse2(password.unwrap_or(""))
            .map_err(|_| SpeaksForError::KeyDecryption(DECRYPT_FAILED.to_string()))?;

        let key = parsed.pkey.ok_or_else(|| {
            SpeaksForError::InputParse("PKCS#12 contains no private key".to_string())
        })?;
        let end_entity = parsed.cert.ok_or_else(|| {
            SpeaksForError::InputParse("PKCS#12 contains no certificate".to_string())
        })?;

        // The safe bags bind key and certificate through their localKeyId
        // attributes; a container whose end-entity certificate does not match
        // the shrouded key carried divergent key IDs.
        let end_entity_pubkey = end_entity.public_key()?;
        if !key.public_eq(&end_entity_pubkey) {
            return Err(SpeaksForError::KeyAmbiguity(ONE_KEY_ID.to_string()));
        }

        let mut chain = vec![end_entity];
        if let Some(ca) = parsed.ca {
            for cert in ca {
                chain.push(cert);
            }
        }
        Ok(CredentialBundle { key, chain })
    }

    /// The private signing key
    pub fn private_key(&self) -> &PKey<Private> {
        &self.key
    }

    /// Certificate chain, end-entity first
    pub fn chain(&self) -> &[X509] {
        &self.chain
    }

    /// The end-entity certificate matching the private key
    pub fn end_entity(&self) -> &X509Ref {
        &self.chain[0]
    }
}

/// Parse a single PEM certificate (e.g. the tool certificate)
pub fn load_certificate_pem(blob: &[u8]) -> Result<X509> {
    X509::from_pem(blob)
        .map_err(|e| SpeaksForError::InputParse(format!("invalid certificate PEM: {e}")))
}

/// The tool's `urn:publicid:` identity from its SubjectAltName URIs, if any
pub fn public_id(cert: &X509Ref) -> Option<String> {
    cert.subject_alt_names()?.iter().find_map(|name| {
        name.uri()
            .filter(|uri| uri.starts_with("urn:publicid:"))
            .map(str::to_string)
    })
}
