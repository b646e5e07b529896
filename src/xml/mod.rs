//! XML document helpers
//!
//! Thin lookup helpers over `roxmltree` shared by the schema check, the
//! builder and the verifier. Canonicalization lives in [`c14n`].

pub mod c14n;

use roxmltree::Node;

/// XML-DSig namespace
pub const DSIG_NS: &str = "http://www.w3.org/2000/09/xmldsig#";

/// First child element with the given local name, any namespace
pub fn child<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
    node.children()
        .find(|n| n.is_element() && n.tag_name().name() == local)
}

/// First descendant element with the given local name, document order
pub fn descendant<'a, 'i>(node: Node<'a, 'i>, local: &str) -> Option<Node<'a, 'i>> {
    node.descendants()
        .find(|n| n.is_element() && n.tag_name().name() == local)
}

/// Trimmed text content of an element, empty string when absent
pub fn text(node: Node<'_, '_>) -> String {
    node.text().unwrap_or("").trim().to_string()
}
