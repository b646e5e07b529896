//! Credential assembly and signing
//!
//! Renders the ABAC credential document, computes the SHA-1 digest of the
//! canonicalized `credential` element, signs the canonicalized `SignedInfo`
//! with RSA-SHA1, and splices the complete `Signature` (KeyValue plus the
//! whole X509 chain) into the `signatures` element.

use chrono::{DateTime, Duration, Utc};
use openssl::hash::MessageDigest;
use openssl::sha::sha1;
use openssl::sign::Signer;
use openssl::x509::X509Ref;
use roxmltree::Document;
use tracing::{debug, info, warn};

use crate::bundle::{public_id, CredentialBundle};
use crate::fingerprint::{bytes_b64, certificate_body, key_id, positive_int_b64};
use crate::xml::c14n::{canonicalize, EXC_C14N_URI};
use crate::xml::DSIG_NS;
use crate::{Result, SpeaksForError};

use super::{dsig, render_credential, CREDENTIAL_REF_ID};

/// Default credential validity when the caller does not pick one
pub const DEFAULT_VALIDITY_DAYS: i64 = 120;

/// Sign a speaks-for credential delegating to `tool_cert`, valid for
/// `days` whole days from now
pub fn sign(bundle: &CredentialBundle, tool_cert: &X509Ref, days: i64) -> Result<String> {
    sign_at(bundle, tool_cert, days, Utc::now())
}

/// Like [`sign`], with an explicit current instant
pub fn sign_at(
    bundle: &CredentialBundle,
    tool_cert: &X509Ref,
    days: i64,
    now: DateTime<Utc>,
) -> Result<String> {
    let expires = now + Duration::milliseconds(days * 86_400_000);
    let expires_text = expires.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();

    let user_keyhash = key_id(bundle.end_entity())?;
    let tool_keyhash = key_id(tool_cert)?;
    match public_id(tool_cert) {
        Some(id) => info!(public_id = %id, "delegating to tool"),
        None => warn!("tool certificate carries no urn:publicid: SubjectAltName"),
    }
    debug!(user = %user_keyhash, tool = %tool_keyhash, %expires_text, "assembling credential");

    let unsigned = render_credential(&expires_text, &user_keyhash, &tool_keyhash);

    // Digest of the canonicalized credential element, exactly as a verifier
    // will recompute it from the signed document.
    let doc = Document::parse(&unsigned)
        .map_err(|e| SpeaksForError::InputParse(format!("credential does not parse: {e}")))?;
    let credential = super::element_by_ref_id(doc.root_element(), CREDENTIAL_REF_ID)
        .ok_or_else(|| {
            SpeaksForError::SignatureInvalid("credential element not found by id".to_string())
        })?;
    let digest = bytes_b64(&sha1(canonicalize(credential).as_bytes()));

    let signed_info = canonical_signed_info(&digest)?;

    let mut signer = Signer::new(MessageDigest::sha1(), bundle.private_key())?;
    signer.update(signed_info.as_bytes())?;
    let signature_value = bytes_b64(&signer.sign_to_vec()?);

    let key_info = build_key_info(bundle)?;
    let signature = format!(
        "<Signature xmlns=\"{DSIG_NS}\">{signed_info}\
         <SignatureValue>{signature_value}</SignatureValue>{key_info}</Signature>"
    );

    Ok(unsigned.replace(
        "<signatures></signatures>",
        &format!("<signatures>{signature}</signatures>"),
    ))
}

/// Build `SignedInfo` and return its canonical byte form, so the signed
/// bytes are byte-identical to what the verifier recomputes
fn canonical_signed_info(digest_b64: &str) -> Result<String> {
    let signed_info = format!(
        "<SignedInfo xmlns=\"{DSIG_NS}\">\
         <CanonicalizationMethod Algorithm=\"{EXC_C14N_URI}\"></CanonicalizationMethod>\
         <SignatureMethod Algorithm=\"{rsa_sha1}\"></SignatureMethod>\
         <Reference URI=\"#{ref_id}\">\
         <Transforms><Transform Algorithm=\"{EXC_C14N_URI}\"></Transform></Transforms>\
         <DigestMethod Algorithm=\"{sha1_uri}\"></DigestMethod>\
         <DigestValue>{digest_b64}</DigestValue>\
         </Reference></SignedInfo>",
        rsa_sha1 = dsig::RSA_SHA1,
        sha1_uri = dsig::SHA1,
        ref_id = CREDENTIAL_REF_ID,
    );
    let doc = Document::parse(&signed_info)
        .map_err(|e| SpeaksForError::SignatureInvalid(format!("SignedInfo does not parse: {e}")))?;
    Ok(canonicalize(doc.root_element()))
}

/// KeyInfo builder: RSAKeyValue of the signing key plus the full chain as
/// X509Certificate elements
fn build_key_info(bundle: &CredentialBundle) -> Result<String> {
    let rsa = bundle.private_key().rsa()?;
    let modulus = positive_int_b64(rsa.n());
    let exponent = positive_int_b64(rsa.e());

    let mut x509_data = String::new();
    for cert in bundle.chain() {
        let pem = String::from_utf8(cert.to_pem()?)
            .map_err(|_| SpeaksForError::InputParse("non-UTF8 PEM output".to_string()))?;
        x509_data.push_str("<X509Certificate>");
        x509_data.push_str(&certificate_body(&pem));
        x509_data.push_str("</X509Certificate>");
    }

    Ok(format!(
        "<KeyInfo><KeyValue><RSAKeyValue>\
         <Modulus>{modulus}</Modulus><Exponent>{exponent}</Exponent>\
         </RSAKeyValue></KeyValue><X509Data>{x509_data}</X509Data></KeyInfo>"
    ))
}
