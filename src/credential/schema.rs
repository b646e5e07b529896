//! Stage-1 schema validation
//!
//! The normative schema ships as `resources/credential.xsd`; this module
//! loads it from an explicit path and enforces its rules on incoming
//! documents: the element vocabulary comes out of the XSD's declarations,
//! the content-model checks mirror its sequences. Elements outside the
//! no-namespace vocabulary are rejected, except under `signatures`, which
//! admits foreign-namespace content (the XML-DSig subtree).

use std::collections::HashSet;
use std::path::Path;

use roxmltree::{Document, Node};

use crate::xml;
use crate::{Result, SpeaksForError};

/// Children of `credential` in schema order; optional ones are marked
const CREDENTIAL_SEQUENCE: &[(&str, bool)] = &[
    ("type", true),
    ("serial", true),
    ("owner_gid", true),
    ("owner_urn", false),
    ("target_gid", true),
    ("target_urn", false),
    ("uuid", true),
    ("expires", true),
    ("abac", true),
];

/// The credential schema, loaded from its bundled XSD
pub struct CredentialSchema {
    vocabulary: HashSet<String>,
}

impl CredentialSchema {
    /// Load the schema from an explicit path
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let doc = Document::parse(&text)
            .map_err(|e| SpeaksForError::InputParse(format!("schema does not parse: {e}")))?;

        let vocabulary: HashSet<String> = doc
            .descendants()
            .filter(|n| n.is_element() && n.tag_name().name() == "element")
            .filter_map(|n| n.attribute("name"))
            .map(str::to_string)
            .collect();
        if !vocabulary.contains("signed-credential") {
            return Err(SpeaksForError::InputParse(format!(
                "{} does not declare signed-credential",
                path.display()
            )));
        }
        Ok(CredentialSchema { vocabulary })
    }

    /// Validate credential XML against the schema rules
    pub fn validate(&self, credential_xml: &str) -> Result<()> {
        let doc = Document::parse(credential_xml)
            .map_err(|e| SpeaksForError::SchemaInvalid(format!("not well-formed XML: {e}")))?;
        let root = doc.root_element();

        if root.tag_name().name() != "signed-credential" || root.tag_name().namespace().is_some() {
            return Err(SpeaksForError::SchemaInvalid(
                "document element is not signed-credential".to_string(),
            ));
        }

        self.check_vocabulary(root)?;

        let credential = xml::child(root, "credential").ok_or_else(|| {
            SpeaksForError::SchemaInvalid("credential element missing".to_string())
        })?;
        check_credential_sequence(credential)?;

        let credential_type = xml::child(credential, "type").map(xml::text).unwrap_or_default();
        if credential_type != "abac" {
            return Err(SpeaksForError::SchemaInvalid(format!(
                "credential type must be abac, got {credential_type:?}"
            )));
        }

        let expires = xml::child(credential, "expires").map(xml::text).unwrap_or_default();
        super::parse_expires(&expires)
            .map_err(|_| SpeaksForError::SchemaInvalid(format!(
                "expires is not a valid xs:dateTime: {expires:?}"
            )))?;

        check_abac_rule(credential)?;

        if xml::child(root, "signatures").is_none() {
            return Err(SpeaksForError::SchemaInvalid(
                "signatures element missing".to_string(),
            ));
        }
        Ok(())
    }

    /// Every no-namespace element must be declared by the schema; foreign
    /// namespaces are only admitted inside `signatures`
    fn check_vocabulary(&self, root: Node<'_, '_>) -> Result<()> {
        for node in root.descendants().filter(|n| n.is_element()) {
            let inside_signatures = node
                .ancestors()
                .any(|a| a.is_element() && a.tag_name().name() == "signatures");
            if inside_signatures {
                continue;
            }
            match node.tag_name().namespace() {
                Some(ns) => {
                    return Err(SpeaksForError::SchemaInvalid(format!(
                        "unexpected namespaced element {{{ns}}}{}",
                        node.tag_name().name()
                    )))
                }
                None => {
                    let name = node.tag_name().name();
                    if !self.vocabulary.contains(name) {
                        return Err(SpeaksForError::SchemaInvalid(format!(
                            "element {name} not allowed by credential schema"
                        )));
                    }
                }
            }
        }
        Ok(())
    }
}

fn check_credential_sequence(credential: Node<'_, '_>) -> Result<()> {
    let children: Vec<&str> = credential
        .children()
        .filter(|n| n.is_element())
        .map(|n| n.tag_name().name())
        .collect();

    let mut position = 0usize;
    for (name, required) in CREDENTIAL_SEQUENCE {
        match children[position..].iter().position(|c| c == name) {
            Some(offset) => position += offset + 1,
            None if *required => {
                return Err(SpeaksForError::SchemaInvalid(format!(
                    "credential is missing required element {name} (or it is out of order)"
                )))
            }
            None => {}
        }
    }
    Ok(())
}

fn check_abac_rule(credential: Node<'_, '_>) -> Result<()> {
    let abac = xml::child(credential, "abac")
        .ok_or_else(|| SpeaksForError::SchemaInvalid("abac element missing".to_string()))?;
    let rt0 = xml::child(abac, "rt0")
        .ok_or_else(|| SpeaksForError::SchemaInvalid("abac rule carries no rt0".to_string()))?;

    for end in ["head", "tail"] {
        let keyid = xml::child(rt0, end)
            .and_then(|n| xml::descendant(n, "ABACprincipal"))
            .and_then(|n| xml::child(n, "keyid"))
            .map(xml::text)
            .unwrap_or_default();
        if keyid.is_empty() {
            return Err(SpeaksForError::SchemaInvalid(format!(
                "rt0 {end} carries no ABACprincipal keyid"
            )));
        }
    }
    Ok(())
}
