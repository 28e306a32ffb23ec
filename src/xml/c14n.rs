use std::collections::{BTreeMap, BTreeSet};

use crate::xml::{Document, Error, NodeId, Result, split_qname};

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";
const DEFAULT_TOKEN: &str = "#default";

/// Namespace bindings keyed by prefix (`""` is the default namespace).
type NsMap = BTreeMap<String, String>;

/// Exclusive XML Canonicalization (without comments) of the subtree rooted at
/// `node`, evaluated against the namespace context of the whole document.
///
/// Prefixes in `inclusive_prefixes` are treated as in inclusive
/// canonicalization: any binding in scope for them is rendered on the first
/// output element, even when declared on an ancestor outside the subtree.
/// `#default` names the default namespace.
pub fn canonicalize(doc: &Document, node: NodeId, inclusive_prefixes: &[&str]) -> Result<String> {
    if !doc.is_element(node) {
        return Err(Error::NotAnElement);
    }

    let inclusive: BTreeSet<&str> = inclusive_prefixes
        .iter()
        .map(|p| if *p == DEFAULT_TOKEN { "" } else { *p })
        .collect();
    let parent_scope = doc
        .parent(node)
        .map(|parent| doc.in_scope_namespaces(parent))
        .unwrap_or_default();

    let mut out = String::new();
    write_element(doc, node, &parent_scope, &NsMap::new(), &inclusive, &mut out)?;
    Ok(out)
}

/// Canonicalize the root element of a standalone XML string
pub fn canonicalize_str(xml: impl AsRef<str>, inclusive_prefixes: &[&str]) -> Result<String> {
    let doc = Document::parse(xml.as_ref())?;
    canonicalize(&doc, doc.root(), inclusive_prefixes)
}

fn write_element(
    doc: &Document,
    id: NodeId,
    parent_scope: &NsMap,
    rendered: &NsMap,
    inclusive: &BTreeSet<&str>,
    out: &mut String,
) -> Result<()> {
    let name = doc.name(id).ok_or(Error::NotAnElement)?;

    let mut scope = parent_scope.clone();
    let mut regular_attrs = Vec::new();
    for attr in doc.attributes(id) {
        match attr.declared_prefix() {
            Some(prefix) if attr.value.is_empty() => {
                scope.remove(prefix);
            }
            Some(prefix) => {
                scope.insert(prefix.to_string(), attr.value.clone());
            }
            None => regular_attrs.push(attr),
        }
    }

    // Visibly utilized prefixes plus the inclusive ones that are in scope
    let mut utilized: BTreeSet<&str> = BTreeSet::new();
    utilized.insert(split_qname(name).0.unwrap_or(""));
    for attr in &regular_attrs {
        if let Some(prefix) = attr.prefix() {
            utilized.insert(prefix);
        }
    }
    for prefix in inclusive {
        if scope.contains_key(*prefix) {
            utilized.insert(*prefix);
        }
    }

    let mut render_ns: Vec<(&str, &str)> = Vec::new();
    for prefix in utilized {
        if prefix == "xml" {
            continue;
        }
        match scope.get(prefix) {
            Some(uri) => {
                if rendered.get(prefix) != Some(uri) {
                    render_ns.push((prefix, uri.as_str()));
                }
            }
            None if prefix.is_empty() => {
                // An output ancestor put a default namespace in effect
                if rendered.get("").is_some_and(|uri| !uri.is_empty()) {
                    render_ns.push(("", ""));
                }
            }
            None => {
                return Err(Error::UnboundPrefix {
                    prefix: prefix.to_string(),
                    element: name.to_string(),
                });
            }
        }
    }

    let mut attr_info = Vec::with_capacity(regular_attrs.len());
    for attr in &regular_attrs {
        let ns_uri = match attr.prefix() {
            Some("xml") => XML_NS,
            Some(prefix) => scope.get(prefix).map(String::as_str).unwrap_or_default(),
            None => "",
        };
        attr_info.push((ns_uri, attr.local_name(), attr));
    }
    attr_info.sort_by(|a, b| a.0.cmp(b.0).then_with(|| a.1.cmp(b.1)));

    out.push('<');
    out.push_str(name);
    for (prefix, uri) in &render_ns {
        if prefix.is_empty() {
            out.push_str(" xmlns=\"");
        } else {
            out.push_str(" xmlns:");
            out.push_str(prefix);
            out.push_str("=\"");
        }
        out.push_str(&escape_attr_value(uri));
        out.push('"');
    }
    for (_, _, attr) in &attr_info {
        out.push(' ');
        out.push_str(&attr.name);
        out.push_str("=\"");
        out.push_str(&escape_attr_value(&attr.value));
        out.push('"');
    }
    out.push('>');

    let mut now_rendered = rendered.clone();
    for (prefix, uri) in &render_ns {
        now_rendered.insert(prefix.to_string(), uri.to_string());
    }

    for child in doc.children(id) {
        match doc.text_content(*child) {
            Some(text) => out.push_str(&escape_text_value(text)),
            None => write_element(doc, *child, &scope, &now_rendered, inclusive, out)?,
        }
    }

    out.push_str("</");
    out.push_str(name);
    out.push('>');
    Ok(())
}

/// Escape attribute value per C14N rules.
fn escape_attr_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}

/// Escape text node value per C14N rules.
fn escape_text_value(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + s.len() / 4);
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            _ => out.push(ch),
        }
    }
    out
}
