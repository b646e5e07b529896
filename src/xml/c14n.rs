//! Exclusive XML canonicalization
//!
//! Implements Exclusive XML Canonicalization 1.0 without comments
//! (`http://www.w3.org/2001/10/xml-exc-c14n#`) plus the `xml:id` namespace
//! rewrite this ecosystem depends on: `xml:id` is not a simple inheritable
//! attribute per XML C14N 1.1 and must never receive an empty-namespace
//! declaration, yet widely deployed signers emit `xmlns:xml="" xml:id` and
//! then patch it out. Signatures only round-trip when both sides produce the
//! patched byte form, so [`canonicalize`] applies the rewrite on every path.

use std::collections::BTreeMap;

use roxmltree::{Node, NodeType};

/// Canonicalization algorithm URI carried in `CanonicalizationMethod` and
/// `Transform` elements
pub const EXC_C14N_URI: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonicalize an element subtree to its exclusive-C14N byte form
///
/// Deterministic, no I/O, idempotent: canonical output re-parses and
/// canonicalizes to itself.
pub fn canonicalize(node: Node<'_, '_>) -> String {
    let mut out = String::new();
    let rendered: BTreeMap<String, String> = BTreeMap::new();
    write_node(node, &rendered, &mut out);
    fixup_xml_id(out)
}

/// Rewrite `xmlns:xml="" xml:id` to `xml:id` in canonical output
///
/// The serializer in this module never produces the broken sequence itself;
/// the rewrite stays as the last step so the canonical bytes are identical
/// no matter which side of the wire produced them.
pub(crate) fn fixup_xml_id(canonical: String) -> String {
    canonical.replace("xmlns:xml=\"\" xml:id", "xml:id")
}

fn write_node(node: Node<'_, '_>, rendered: &BTreeMap<String, String>, out: &mut String) {
    match node.node_type() {
        NodeType::Root => {
            for child in node.children() {
                write_node(child, rendered, out);
            }
        }
        NodeType::Element => write_element(node, rendered, out),
        NodeType::Text => {
            if let Some(text) = node.text() {
                escape_text(text, out);
            }
        }
        NodeType::PI => {
            if let Some(pi) = node.pi() {
                out.push_str("<?");
                out.push_str(pi.target);
                if let Some(value) = pi.value {
                    out.push(' ');
                    out.push_str(value);
                }
                out.push_str("?>");
            }
        }
        // canonical form without comments
        NodeType::Comment => {}
    }
}

fn write_element(el: Node<'_, '_>, rendered: &BTreeMap<String, String>, out: &mut String) {
    let local = el.tag_name().name();
    let element_ns = el.tag_name().namespace().unwrap_or("");
    let element_prefix = prefix_of_element(el, element_ns);
    let qname = if element_prefix.is_empty() {
        local.to_string()
    } else {
        format!("{element_prefix}:{local}")
    };

    // Visibly utilized prefixes: the element's own plus each qualified
    // attribute's. The reserved xml prefix is bound by the XML spec itself
    // and never gets a declaration.
    let mut utilized: BTreeMap<String, String> = BTreeMap::new();
    utilized.insert(element_prefix.clone(), element_ns.to_string());
    for attr in el.attributes() {
        if let Some(ns) = attr.namespace() {
            if ns == XML_NS {
                continue;
            }
            if let Some(prefix) = prefix_of_attribute(el, ns) {
                utilized.insert(prefix, ns.to_string());
            }
        }
    }

    let mut scope = rendered.clone();
    let mut declarations: Vec<(String, String)> = Vec::new();
    for (prefix, uri) in &utilized {
        let current = rendered.get(prefix).map(String::as_str).unwrap_or("");
        if current != uri {
            declarations.push((prefix.clone(), uri.clone()));
            scope.insert(prefix.clone(), uri.clone());
        }
    }

    // Attributes sort with the namespace URI as primary key, so unqualified
    // attributes (empty URI) come first, then by local name.
    let mut attrs: Vec<(&str, &str, String)> = el
        .attributes()
        .map(|a| {
            let ns = a.namespace().unwrap_or("");
            let qname = match a.namespace().and_then(|uri| prefix_of_attribute(el, uri)) {
                Some(prefix) => format!("{prefix}:{}", a.name()),
                None => a.name().to_string(),
            };
            (ns, a.name(), format!("{qname}=\"{}\"", escape_attr(a.value())))
        })
        .collect();
    attrs.sort_by(|a, b| (a.0, a.1).cmp(&(b.0, b.1)));

    out.push('<');
    out.push_str(&qname);
    for (prefix, uri) in &declarations {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attr(uri));
        out.push('"');
    }
    for (_, _, rendered_attr) in &attrs {
        out.push(' ');
        out.push_str(rendered_attr);
    }
    out.push('>');

    for child in el.children() {
        write_node(child, &scope, out);
    }

    out.push_str("</");
    out.push_str(&qname);
    out.push('>');
}

/// Prefix the element was written with: empty for no namespace or a default
/// binding, otherwise the in-scope prefix bound to its namespace
fn prefix_of_element(el: Node<'_, '_>, ns: &str) -> String {
    if ns.is_empty() {
        return String::new();
    }
    // prefer the default binding when both a default and a prefixed one
    // resolve to the same URI
    if el.namespaces().any(|n| n.name().is_none() && n.uri() == ns) {
        return String::new();
    }
    el.namespaces()
        .find(|n| n.uri() == ns && n.name().is_some())
        .and_then(|n| n.name())
        .unwrap_or("")
        .to_string()
}

/// Prefix bound to a qualified attribute's namespace; attributes never use
/// the default namespace
fn prefix_of_attribute(el: Node<'_, '_>, ns: &str) -> Option<String> {
    if ns == XML_NS {
        return Some("xml".to_string());
    }
    el.namespaces()
        .find(|n| n.uri() == ns && n.name().is_some())
        .and_then(|n| n.name())
        .map(str::to_string)
}

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            other => out.push(other),
        }
    }
}

fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '"' => escaped.push_str("&quot;"),
            '\t' => escaped.push_str("&#x9;"),
            '\n' => escaped.push_str("&#xA;"),
            '\r' => escaped.push_str("&#xD;"),
            other => escaped.push(other),
        }
    }
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn c14n(xml: &str) -> String {
        let doc = roxmltree::Document::parse(xml).unwrap();
        canonicalize(doc.root_element())
    }

    #[test]
    fn test_attributes_sort_unqualified_first() {
        let out = c14n(r#"<a xmlns:x="urn:x" x:b="2" zz="3" aa="1"></a>"#);
        assert_eq!(out, r#"<a xmlns:x="urn:x" aa="1" zz="3" x:b="2"></a>"#);
    }

    #[test]
    fn test_self_closing_becomes_start_end_pair() {
        assert_eq!(c14n("<a><b/></a>"), "<a><b></b></a>");
    }

    #[test]
    fn test_default_namespace_rendered_once() {
        let out = c14n(r#"<a xmlns="urn:d"><b><c>x</c></b></a>"#);
        assert_eq!(out, r#"<a xmlns="urn:d"><b><c>x</c></b></a>"#);
    }

    #[test]
    fn test_unused_namespace_not_rendered() {
        // exclusive c14n drops declarations no descendant visibly utilizes
        let out = c14n(r#"<a xmlns:unused="urn:u"><b>x</b></a>"#);
        assert_eq!(out, "<a><b>x</b></a>");
    }

    #[test]
    fn test_subtree_inherits_utilized_namespace_only() {
        let doc = roxmltree::Document::parse(
            r#"<root xmlns:s="urn:sig" xmlns:other="urn:o"><s:info s:x="1">t</s:info></root>"#,
        )
        .unwrap();
        let info = doc
            .descendants()
            .find(|n| n.tag_name().name() == "info")
            .unwrap();
        assert_eq!(
            canonicalize(info),
            r#"<s:info xmlns:s="urn:sig" s:x="1">t</s:info>"#
        );
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(c14n("<a>x &amp; y &lt; z</a>"), "<a>x &amp; y &lt; z</a>");
        assert_eq!(c14n("<a>1 > 0</a>"), "<a>1 &gt; 0</a>");
    }

    #[test]
    fn test_comments_dropped() {
        assert_eq!(c14n("<a><!-- hidden -->x</a>"), "<a>x</a>");
    }

    #[test]
    fn test_xml_id_never_gets_empty_declaration() {
        let out = c14n(r#"<a><b xml:id="ref0" id="ref0">x</b></a>"#);
        assert_eq!(out, r#"<a><b id="ref0" xml:id="ref0">x</b></a>"#);
        assert!(!out.contains("xmlns:xml"));
    }

    #[test]
    fn test_fixup_rewrites_broken_sequence() {
        let broken = r#"<b xmlns:xml="" xml:id="ref0">x</b>"#.to_string();
        let fixed = fixup_xml_id(broken.clone());
        assert_eq!(fixed, r#"<b xml:id="ref0">x</b>"#);
        // digests over the two byte forms differ, so a signer and verifier
        // disagreeing about the rewrite can never validate each other
        assert_ne!(
            openssl::sha::sha1(broken.as_bytes()),
            openssl::sha::sha1(fixed.as_bytes())
        );
    }

    #[test]
    fn test_idempotence() {
        let inputs = [
            r#"<a xmlns="urn:d" xml:id="r"><b  z="1"   a="2">t&amp;t</b><c/></a>"#,
            r#"<root xmlns:s="urn:sig"><s:x s:q="v">1</s:x></root>"#,
        ];
        for xml in inputs {
            let once = c14n(xml);
            let twice = c14n(&once);
            assert_eq!(once, twice);
        }
    }
}
