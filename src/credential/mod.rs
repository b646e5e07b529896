//! The speaks-for credential document
//!
//! A speaks-for credential is a `signed-credential` XML document carrying one
//! ABAC RT0 rule — *userKey speaks_for userKey → toolKey* — an expiration
//! instant, and an enveloped XML-DSig signature whose `X509Data` holds the
//! signer's full certificate chain. This module owns the document template,
//! the parsed [`SpeaksForDocument`] view, and the signing/verification
//! submodules.

pub mod builder;
pub mod schema;
pub mod verifier;

use chrono::{DateTime, Utc};
use openssl::x509::X509;
use roxmltree::{Document, Node};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

use crate::fingerprint::KeyId;
use crate::xml::{self, DSIG_NS};
use crate::{Result, SpeaksForError};

/// XML-DSig algorithm identifiers of the deployed profile
///
/// Verification checks the URIs announced by an incoming signature against
/// these constants, so moving to a stronger profile is a change here plus the
/// matching digest calls, not a rewrite of the pipeline.
pub mod dsig {
    /// `SignatureMethod` for the deployed profile
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";
    /// `DigestMethod` for the deployed profile
    pub const SHA1: &str = "http://www.w3.org/2000/09/xmldsig#sha1";
}

/// The id attribute value binding the signature reference to the
/// `credential` element
pub const CREDENTIAL_REF_ID: &str = "ref0";

/// Document skeleton; `@EXPIRES@`, `@USER_KEYHASH@` and `@TOOL_KEYHASH@` are
/// substituted literally, the signature lands inside `signatures`
const CREDENTIAL_TEMPLATE: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<signed-credential>
 <credential xml:id="ref0" id="ref0">
  <type>abac</type>
  <serial/>
  <owner_gid/>
  <target_gid/>
  <uuid/>
  <expires>@EXPIRES@</expires>
  <abac>
   <rt0>
    <version>1.1</version>
    <head>
     <ABACprincipal><keyid>@USER_KEYHASH@</keyid></ABACprincipal>
     <role>speaks_for_@USER_KEYHASH@</role>
    </head>
    <tail>
     <ABACprincipal><keyid>@TOOL_KEYHASH@</keyid></ABACprincipal>
    </tail>
   </rt0>
  </abac>
 </credential>
 <signatures></signatures>
</signed-credential>
"#;

/// Render the unsigned credential document
pub(crate) fn render_credential(expires: &str, user_keyhash: &KeyId, tool_keyhash: &KeyId) -> String {
    CREDENTIAL_TEMPLATE
        .replace("@EXPIRES@", expires)
        .replace("@USER_KEYHASH@", user_keyhash.as_str())
        .replace("@TOOL_KEYHASH@", tool_keyhash.as_str())
}

/// Parsed view of a signed credential
///
/// Extraction is eager; the raw text stays around because signature checks
/// re-canonicalize subtrees of the original bytes.
pub struct SpeaksForDocument {
    raw: String,
    expires: DateTime<Utc>,
    head_keyid: KeyId,
    tail_keyid: KeyId,
    signing_chain: Vec<X509>,
}

impl SpeaksForDocument {
    /// Extract the structured view from credential XML
    pub fn parse(credential_xml: &str) -> Result<Self> {
        let doc = Document::parse(credential_xml)
            .map_err(|e| SpeaksForError::InputParse(format!("invalid credential XML: {e}")))?;
        let root = doc.root_element();

        let credential = xml::child(root, "credential").ok_or_else(|| {
            SpeaksForError::InputParse("credential element missing".to_string())
        })?;

        let expires_text = xml::child(credential, "expires")
            .map(xml::text)
            .unwrap_or_default();
        let expires = parse_expires(&expires_text)?;

        let abac = xml::child(credential, "abac").ok_or_else(|| {
            SpeaksForError::InputParse("abac element missing".to_string())
        })?;
        let head_keyid = principal_keyid(abac, "head")?;
        let tail_keyid = principal_keyid(abac, "tail")?;

        let signing_chain = extract_signing_chain(root)?;

        Ok(SpeaksForDocument {
            raw: credential_xml.to_string(),
            expires,
            head_keyid,
            tail_keyid,
            signing_chain,
        })
    }

    /// The raw credential XML
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Credential expiration instant
    pub fn expires(&self) -> DateTime<Utc> {
        self.expires
    }

    /// Keyid of the delegating user (ABAC rule head)
    pub fn head_keyid(&self) -> &KeyId {
        &self.head_keyid
    }

    /// Keyid of the authorized tool (ABAC rule tail)
    pub fn tail_keyid(&self) -> &KeyId {
        &self.tail_keyid
    }

    /// Certificate chain carried in the signature's `X509Data`, signing
    /// certificate first
    pub fn signing_chain(&self) -> &[X509] {
        &self.signing_chain
    }

    /// The signing chain re-wrapped in PEM armor, ready for the trust store
    pub fn signing_chain_pem(&self) -> Result<String> {
        let mut out = String::new();
        for cert in &self.signing_chain {
            out.push_str(
                std::str::from_utf8(&cert.to_pem()?)
                    .map_err(|_| SpeaksForError::InputParse("non-UTF8 PEM output".to_string()))?,
            );
        }
        Ok(out)
    }
}

/// Parse the `expires` text as an ISO-8601 UTC instant
pub(crate) fn parse_expires(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SpeaksForError::InputParse(format!("invalid expires instant {text:?}: {e}")))
}

fn principal_keyid(abac: Node<'_, '_>, end: &str) -> Result<KeyId> {
    let node = xml::descendant(abac, end)
        .and_then(|n| xml::descendant(n, "keyid"))
        .ok_or_else(|| {
            SpeaksForError::InputParse(format!("abac rule carries no {end} keyid"))
        })?;
    KeyId::from_hex(&xml::text(node))
}

/// Locate the enveloped `Signature` element:
/// `/*/signatures/*[local-name()='Signature' and dsig namespace]`
pub(crate) fn signature_element<'a, 'i>(root: Node<'a, 'i>) -> Result<Node<'a, 'i>> {
    let signatures = xml::child(root, "signatures").ok_or_else(|| {
        SpeaksForError::SignatureInvalid("signatures element missing".to_string())
    })?;
    signatures
        .children()
        .find(|n| {
            n.is_element()
                && n.tag_name().name() == "Signature"
                && n.tag_name().namespace() == Some(DSIG_NS)
        })
        .ok_or_else(|| {
            SpeaksForError::SignatureInvalid("no XML-DSig Signature element".to_string())
        })
}

/// Pull the certificate chain out of the signature's `X509Data`
fn extract_signing_chain(root: Node<'_, '_>) -> Result<Vec<X509>> {
    let signature = signature_element(root)?;
    let x509_data = xml::descendant(signature, "X509Data").ok_or_else(|| {
        SpeaksForError::SignatureInvalid("signature carries no X509Data".to_string())
    })?;

    let mut chain = Vec::new();
    for node in x509_data.children().filter(|n| {
        n.is_element() && n.tag_name().name() == "X509Certificate"
    }) {
        let body: String = xml::text(node).split_whitespace().collect();
        let der = STANDARD.decode(&body).map_err(|e| {
            SpeaksForError::SignatureInvalid(format!("X509Certificate is not base64: {e}"))
        })?;
        let cert = X509::from_der(&der).map_err(|e| {
            SpeaksForError::SignatureInvalid(format!("X509Certificate does not parse: {e}"))
        })?;
        chain.push(cert);
    }
    if chain.is_empty() {
        return Err(SpeaksForError::SignatureInvalid(
            "X509Data carries no certificates".to_string(),
        ));
    }
    Ok(chain)
}

/// Resolve a `Reference` URI fragment through the authoritative `id`
/// attribute, falling back to `xml:id`
pub(crate) fn element_by_ref_id<'a, 'i>(root: Node<'a, 'i>, ref_id: &str) -> Option<Node<'a, 'i>> {
    root.descendants()
        .find(|n| n.is_element() && n.attribute("id") == Some(ref_id))
        .or_else(|| {
            root.descendants().find(|n| {
                n.is_element()
                    && n.attribute(("http://www.w3.org/XML/1998/namespace", "id")) == Some(ref_id)
            })
        })
}
