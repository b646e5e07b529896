//! The credential verification pipeline
//!
//! Five strictly ordered stages — schema, XML signature, trust chain,
//! expiration, head binding — plus an optional sixth for the tail binding.
//! A failing stage stops the run; its error kind names the outcome. The
//! whole pipeline is a pure function of the credential bytes, the trust
//! store, the expected tool identity and the current instant.

use chrono::{DateTime, Utc};
use openssl::hash::MessageDigest;
use openssl::sha::sha1;
use openssl::sign::Verifier;
use openssl::x509::{X509Ref, X509};
use roxmltree::{Document, Node};
use tracing::{debug, warn};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::fingerprint::{key_id, KeyId};
use crate::trust::{ChainOutcome, TrustStore};
use crate::xml::c14n::{canonicalize, EXC_C14N_URI};
use crate::xml::{self, DSIG_NS};
use crate::{ChainError, Result, SpeaksForError};

use super::schema::CredentialSchema;
use super::{dsig, signature_element, SpeaksForDocument};

/// Expected tool identity for the optional tail-binding stage
pub enum ExpectedTail {
    /// A tool certificate; its keyid must equal the rule tail
    Tool(X509),
    /// A raw keyid in hex
    KeyId(KeyId),
}

/// Successful verification outcome
#[derive(Debug)]
pub struct Verification {
    /// Keyid of the delegating user, equal to the signing certificate's
    pub head_keyid: KeyId,
    /// Keyid of the authorized tool
    pub tail_keyid: KeyId,
    /// Credential expiration instant
    pub expires: DateTime<Utc>,
    /// False when no tool identity was supplied and the tail stage was
    /// skipped with a warning
    pub tail_checked: bool,
}

/// Run the verification pipeline over credential XML
pub fn verify(
    credential_xml: &str,
    schema: &CredentialSchema,
    store: &TrustStore,
    expected_tail: Option<&ExpectedTail>,
    now: DateTime<Utc>,
) -> Result<Verification> {
    // Stage 1: schema
    schema.validate(credential_xml)?;
    debug!("stage 1 passed: schema");

    let document = SpeaksForDocument::parse(credential_xml)?;
    let signing_cert = &document.signing_chain()[0];

    // Stage 2: XML signature
    verify_signature(credential_xml, signing_cert)?;
    debug!("stage 2 passed: XML signature");

    // Stage 3: trust chain
    match store.evaluate_pem(&document.signing_chain_pem()?, now) {
        ChainOutcome::Trusted => {}
        ChainOutcome::NotTrusted(reason) => return Err(ChainError::NotTrusted(reason).into()),
        ChainOutcome::Expired(reason) => return Err(ChainError::CertExpired(reason).into()),
        ChainOutcome::Malformed(reason) => return Err(ChainError::Malformed(reason).into()),
    }
    debug!("stage 3 passed: trust chain");

    // Stage 4: expiration
    if now >= document.expires() {
        return Err(SpeaksForError::Expired(format!(
            "credential expired at {}",
            document.expires().format("%Y-%m-%dT%H:%M:%S%.3fZ")
        )));
    }
    debug!("stage 4 passed: expiration");

    // Stage 5: head binding, the cryptographic link from ABAC rule to signer
    let signer_keyid = key_id(signing_cert)?;
    if document.head_keyid() != &signer_keyid {
        return Err(SpeaksForError::KeyBindingMismatch(format!(
            "rule head {} does not match signing certificate {signer_keyid}",
            document.head_keyid()
        )));
    }
    debug!("stage 5 passed: head binding");

    // Stage 6: tail binding, only with a caller-supplied tool identity
    let tail_checked = match expected_tail {
        Some(expected) => {
            let expected_keyid = match expected {
                ExpectedTail::Tool(cert) => key_id(cert)?,
                ExpectedTail::KeyId(keyid) => keyid.clone(),
            };
            if document.tail_keyid() != &expected_keyid {
                return Err(SpeaksForError::KeyBindingMismatch(format!(
                    "rule tail {} does not match expected tool {expected_keyid}",
                    document.tail_keyid()
                )));
            }
            debug!("stage 6 passed: tail binding");
            true
        }
        None => {
            warn!("no tool certificate or keyid supplied, tail binding not verified");
            false
        }
    };

    Ok(Verification {
        head_keyid: signer_keyid,
        tail_keyid: document.tail_keyid().clone(),
        expires: document.expires(),
        tail_checked,
    })
}

/// Stage 2: digest and signature checks against the key material carried in
/// the signature itself
fn verify_signature(credential_xml: &str, signing_cert: &X509Ref) -> Result<()> {
    let doc = Document::parse(credential_xml)
        .map_err(|e| SpeaksForError::SignatureInvalid(format!("credential does not parse: {e}")))?;
    let root = doc.root_element();
    let signature = signature_element(root)?;

    let signed_info = signature
        .children()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == "SignedInfo"
                && n.tag_name().namespace() == Some(DSIG_NS)
        })
        .ok_or_else(|| SpeaksForError::SignatureInvalid("SignedInfo missing".to_string()))?;

    check_algorithm(signed_info, "CanonicalizationMethod", EXC_C14N_URI)?;
    check_algorithm(signed_info, "SignatureMethod", dsig::RSA_SHA1)?;

    let references: Vec<Node> = signed_info
        .children()
        .filter(|n| n.is_element() && n.tag_name().name() == "Reference")
        .collect();
    let reference = match references.as_slice() {
        [single] => *single,
        other => {
            return Err(SpeaksForError::SignatureInvalid(format!(
                "expected exactly one Reference, found {}",
                other.len()
            )))
        }
    };
    for transform in reference
        .descendants()
        .filter(|n| n.is_element() && n.tag_name().name() == "Transform")
    {
        if transform.attribute("Algorithm") != Some(EXC_C14N_URI) {
            return Err(SpeaksForError::SignatureInvalid(format!(
                "unsupported Transform {:?}",
                transform.attribute("Algorithm")
            )));
        }
    }
    check_algorithm(reference, "DigestMethod", dsig::SHA1)?;

    // Resolve the reference through the id attribute and require it to
    // select the credential element.
    let uri = reference.attribute("URI").unwrap_or("");
    let ref_id = uri.strip_prefix('#').ok_or_else(|| {
        SpeaksForError::SignatureInvalid(format!("unsupported Reference URI {uri:?}"))
    })?;
    let target = super::element_by_ref_id(root, ref_id).ok_or_else(|| {
        SpeaksForError::SignatureInvalid(format!("Reference target {ref_id:?} not found"))
    })?;
    if target.tag_name().name() != "credential" {
        return Err(SpeaksForError::SignatureInvalid(format!(
            "Reference selects {:?}, expected the credential element",
            target.tag_name().name()
        )));
    }

    let digest_value = decode_b64_text(reference, "DigestValue")?;
    let computed = sha1(canonicalize(target).as_bytes());
    if digest_value != computed {
        return Err(SpeaksForError::SignatureInvalid(
            "DigestValue does not match the credential element".to_string(),
        ));
    }

    let signature_value = decode_b64_text(signature, "SignatureValue")?;
    let public_key = signing_cert.public_key()?;
    let mut verifier = Verifier::new(MessageDigest::sha1(), &public_key)?;
    verifier.update(canonicalize(signed_info).as_bytes())?;
    if !verifier.verify(&signature_value)? {
        return Err(SpeaksForError::SignatureInvalid(
            "SignatureValue does not verify against the signing certificate".to_string(),
        ));
    }
    Ok(())
}

fn check_algorithm(parent: Node<'_, '_>, method: &str, expected: &str) -> Result<()> {
    let found = xml::child(parent, method)
        .and_then(|n| n.attribute("Algorithm"))
        .unwrap_or("");
    if found != expected {
        return Err(SpeaksForError::SignatureInvalid(format!(
            "{method} must be {expected}, got {found:?}"
        )));
    }
    Ok(())
}

fn decode_b64_text(parent: Node<'_, '_>, element: &str) -> Result<Vec<u8>> {
    let text: String = xml::descendant(parent, element)
        .map(xml::text)
        .unwrap_or_default()
        .split_whitespace()
        .collect();
    STANDARD
        .decode(&text)
        .map_err(|e| SpeaksForError::SignatureInvalid(format!("{element} is not base64: {e}")))
}
