use std::borrow::Cow;
use std::collections::BTreeMap;

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

use crate::xml::{Error, Result, split_qname};

/// Handle to a node inside a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// An attribute as written in the source, namespace declarations included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl Attribute {
    pub fn prefix(&self) -> Option<&str> {
        split_qname(&self.name).0
    }

    pub fn local_name(&self) -> &str {
        split_qname(&self.name).1
    }

    /// Returns the declared prefix if this attribute is a namespace
    /// declaration (`""` for the default namespace).
    pub fn declared_prefix(&self) -> Option<&str> {
        if self.name == "xmlns" {
            Some("")
        } else {
            self.name.strip_prefix("xmlns:")
        }
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Element {
        name: String,
        attributes: Vec<Attribute>,
        children: Vec<NodeId>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeId>,
    kind: NodeKind,
}

/// A parsed XML document held as an arena of element and text nodes.
///
/// Whitespace-only text is dropped while parsing, comments and processing
/// instructions are discarded, and entity references are resolved.
#[derive(Debug, Clone)]
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
}

impl Document {
    /// Parse a document from a string
    pub fn parse(xml: &str) -> Result<Self> {
        let mut reader = Reader::from_str(xml);
        reader.config_mut().trim_text(false);

        let mut nodes: Vec<Node> = Vec::new();
        let mut stack: Vec<NodeId> = Vec::new();
        let mut root = None;

        loop {
            match reader.read_event()? {
                Event::Start(e) => {
                    let id = push_element(&mut nodes, &stack, &mut root, &e)?;
                    stack.push(id);
                }
                Event::Empty(e) => {
                    push_element(&mut nodes, &stack, &mut root, &e)?;
                }
                Event::End(_) => {
                    stack
                        .pop()
                        .ok_or_else(|| Error::Malformed("unexpected closing tag".into()))?;
                }
                Event::Text(e) => {
                    let raw = normalize_line_endings(std::str::from_utf8(&e)?);
                    let text = unescape(&raw)?;
                    push_text(&mut nodes, &stack, &text)?;
                }
                Event::CData(e) => {
                    let raw = std::str::from_utf8(&e)?;
                    push_text(&mut nodes, &stack, &normalize_line_endings(raw))?;
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::Malformed("unclosed element at end of input".into()));
        }
        let root = root.ok_or_else(|| Error::Malformed("document has no root element".into()))?;
        Ok(Self { nodes, root })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes.get(id.0).and_then(|n| n.parent)
    }

    pub fn is_element(&self, id: NodeId) -> bool {
        matches!(
            self.nodes.get(id.0).map(|n| &n.kind),
            Some(NodeKind::Element { .. })
        )
    }

    /// Qualified name of an element
    pub fn name(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Element { name, .. } => Some(name),
            NodeKind::Text(_) => None,
        }
    }

    pub fn local_name(&self, id: NodeId) -> Option<&str> {
        self.name(id).map(|name| split_qname(name).1)
    }

    pub fn prefix(&self, id: NodeId) -> Option<&str> {
        self.name(id).and_then(|name| split_qname(name).0)
    }

    pub fn attributes(&self, id: NodeId) -> &[Attribute] {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element { attributes, .. }) => attributes,
            _ => &[],
        }
    }

    /// Value of the attribute with the given qualified name
    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.attributes(id)
            .iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        match self.nodes.get(id.0).map(|n| &n.kind) {
            Some(NodeKind::Element { children, .. }) => children,
            _ => &[],
        }
    }

    /// Text of a text node, `None` for elements
    pub fn text_content(&self, id: NodeId) -> Option<&str> {
        match &self.nodes.get(id.0)?.kind {
            NodeKind::Text(text) => Some(text),
            NodeKind::Element { .. } => None,
        }
    }

    /// Concatenated direct text children of an element.
    pub fn text(&self, id: NodeId) -> String {
        self.children(id)
            .iter()
            .filter_map(|child| self.text_content(*child))
            .collect()
    }

    /// Resolve a prefix (`""` for the default namespace) to its URI as seen
    /// from the given element.
    pub fn resolve_prefix(&self, id: NodeId, prefix: &str) -> Option<&str> {
        let mut current = Some(id);
        while let Some(node) = current {
            let declared = self
                .attributes(node)
                .iter()
                .find(|a| a.declared_prefix() == Some(prefix));
            if let Some(attr) = declared {
                return Some(attr.value.as_str()).filter(|uri| !uri.is_empty());
            }
            current = self.parent(node);
        }
        None
    }

    /// Namespace URI of an element
    pub fn namespace(&self, id: NodeId) -> Option<&str> {
        let prefix = self.prefix(id).unwrap_or("");
        self.resolve_prefix(id, prefix)
    }

    /// Whether the element has the given expanded name
    pub fn matches(&self, id: NodeId, ns: &str, local: &str) -> bool {
        self.local_name(id) == Some(local) && self.namespace(id) == Some(ns)
    }

    /// All namespace bindings in scope at the given element, innermost wins.
    pub fn in_scope_namespaces(&self, id: NodeId) -> BTreeMap<String, String> {
        let mut chain = vec![id];
        let mut current = self.parent(id);
        while let Some(node) = current {
            chain.push(node);
            current = self.parent(node);
        }

        let mut scope = BTreeMap::new();
        for node in chain.into_iter().rev() {
            for attr in self.attributes(node) {
                if let Some(prefix) = attr.declared_prefix() {
                    if attr.value.is_empty() {
                        scope.remove(prefix);
                    } else {
                        scope.insert(prefix.to_string(), attr.value.clone());
                    }
                }
            }
        }
        scope
    }

    /// Elements below `id` in document order, `id` included.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_> {
        Descendants {
            doc: self,
            stack: vec![id],
        }
    }

    /// First element with the given expanded name in document order.
    pub fn find(&self, ns: &str, local: &str) -> Option<NodeId> {
        self.find_in(self.root, ns, local)
    }

    pub fn find_in(&self, scope: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.descendants(scope)
            .find(|node| self.matches(*node, ns, local))
    }

    /// First direct child element with the given expanded name
    pub fn child(&self, parent: NodeId, ns: &str, local: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|child| self.matches(*child, ns, local))
    }

    /// Element carrying an `Id` attribute (prefixed or not) with the given value
    pub fn find_by_id(&self, id: &str) -> Option<NodeId> {
        self.descendants(self.root).find(|node| {
            self.attributes(*node)
                .iter()
                .any(|a| a.declared_prefix().is_none() && a.local_name() == "Id" && a.value == id)
        })
    }

    /// Replace all children of an element with a single text node.
    pub fn set_text(&mut self, id: NodeId, text: impl Into<String>) -> Result<()> {
        let text_id = NodeId(self.nodes.len());
        match self.nodes.get_mut(id.0).map(|n| &mut n.kind) {
            Some(NodeKind::Element { children, .. }) => {
                children.clear();
                children.push(text_id);
            }
            _ => return Err(Error::NotAnElement),
        }
        // Detached children stay in the arena but are no longer reachable.
        self.nodes.push(Node {
            parent: Some(id),
            kind: NodeKind::Text(text.into()),
        });
        Ok(())
    }

    /// Serialize the document without an XML declaration.
    pub fn to_xml(&self) -> String {
        let mut out = String::new();
        self.write_node(self.root, &mut out);
        out
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        match &self.nodes[id.0].kind {
            NodeKind::Text(text) => out.push_str(&escape(text, false)),
            NodeKind::Element {
                name,
                attributes,
                children,
            } => {
                out.push('<');
                out.push_str(name);
                for attr in attributes {
                    out.push(' ');
                    out.push_str(&attr.name);
                    out.push_str("=\"");
                    out.push_str(&escape(&attr.value, true));
                    out.push('"');
                }
                if children.is_empty() {
                    out.push_str("/>");
                    return;
                }
                out.push('>');
                for child in children {
                    self.write_node(*child, out);
                }
                out.push_str("</");
                out.push_str(name);
                out.push('>');
            }
        }
    }
}

/// Pre-order iterator over the elements of a subtree
pub struct Descendants<'a> {
    doc: &'a Document,
    stack: Vec<NodeId>,
}

impl Iterator for Descendants<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(id) = self.stack.pop() {
            if self.doc.is_element(id) {
                self.stack
                    .extend(self.doc.children(id).iter().rev().copied());
                return Some(id);
            }
        }
        None
    }
}

fn push_element(
    nodes: &mut Vec<Node>,
    stack: &[NodeId],
    root: &mut Option<NodeId>,
    e: &BytesStart,
) -> Result<NodeId> {
    let name = std::str::from_utf8(e.name().as_ref())?.to_string();
    let mut attributes = Vec::new();
    for attr in e.attributes() {
        let attr = attr?;
        let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
        let raw = std::str::from_utf8(&attr.value)?;
        let value = unescape(&normalize_attr_whitespace(raw))?.into_owned();
        attributes.push(Attribute { name: key, value });
    }

    let id = NodeId(nodes.len());
    let parent = stack.last().copied();
    match parent {
        Some(parent) => {
            if let NodeKind::Element { children, .. } = &mut nodes[parent.0].kind {
                children.push(id);
            }
        }
        None if root.is_some() => {
            return Err(Error::Malformed("more than one root element".into()));
        }
        None => *root = Some(id),
    }
    nodes.push(Node {
        parent,
        kind: NodeKind::Element {
            name,
            attributes,
            children: Vec::new(),
        },
    });
    Ok(id)
}

fn push_text(nodes: &mut Vec<Node>, stack: &[NodeId], text: &str) -> Result<()> {
    if text.trim().is_empty() {
        return Ok(());
    }
    let Some(parent) = stack.last().copied() else {
        return Err(Error::Malformed("text outside of the root element".into()));
    };
    let last_child = match &nodes[parent.0].kind {
        NodeKind::Element { children, .. } => children.last().copied(),
        NodeKind::Text(_) => None,
    };
    if let Some(last) = last_child {
        if let NodeKind::Text(existing) = &mut nodes[last.0].kind {
            existing.push_str(text);
            return Ok(());
        }
    }

    let id = NodeId(nodes.len());
    if let NodeKind::Element { children, .. } = &mut nodes[parent.0].kind {
        children.push(id);
    }
    nodes.push(Node {
        parent: Some(parent),
        kind: NodeKind::Text(text.to_string()),
    });
    Ok(())
}

/// Normalize line endings to LF as an XML processor would
fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// Attribute-value normalization: literal whitespace becomes a space.
/// Character references are resolved afterwards and keep their value.
fn normalize_attr_whitespace(raw: &str) -> Cow<'_, str> {
    if !raw.contains(['\t', '\n', '\r']) {
        return Cow::Borrowed(raw);
    }
    Cow::Owned(
        normalize_line_endings(raw)
            .chars()
            .map(|ch| if matches!(ch, '\t' | '\n') { ' ' } else { ch })
            .collect(),
    )
}

fn unescape(raw: &str) -> Result<Cow<'_, str>> {
    quick_xml::escape::unescape(raw).map_err(|e| Error::Parse(e.to_string()))
}

/// Escape for output. Carriage returns, and tabs and newlines inside
/// attribute values, become character references so a reparse keeps them.
fn escape(value: &str, attribute: bool) -> Cow<'_, str> {
    let special = |ch: char| match ch {
        '&' | '<' | '>' | '"' | '\r' => true,
        '\t' | '\n' => attribute,
        _ => false,
    };
    if !value.contains(special) {
        return Cow::Borrowed(value);
    }
    let mut out = String::with_capacity(value.len() + value.len() / 4);
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' if !attribute => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            '\r' => out.push_str("&#xD;"),
            '\t' if attribute => out.push_str("&#x9;"),
            '\n' if attribute => out.push_str("&#xA;"),
            _ => out.push(ch),
        }
    }
    Cow::Owned(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"<?xml version="1.0"?>
        <a:root xmlns:a="urn:a" xmlns:b="urn:b">
            <!-- comment -->
            <b:item b:Id="one">first &amp; second</b:item>
            <a:item Id="two"><![CDATA[<raw>]]></a:item>
            <a:empty/>
        </a:root>"#;

    #[test]
    fn test_parse_drops_blank_text_and_comments() {
        let doc = Document::parse(SAMPLE).unwrap();
        let root = doc.root();
        assert_eq!(doc.name(root), Some("a:root"));
        assert_eq!(doc.children(root).len(), 3);
        assert!(doc.children(root).iter().all(|c| doc.is_element(*c)));
    }

    #[test]
    fn test_namespace_resolution() {
        let doc = Document::parse(SAMPLE).unwrap();
        let item = doc.find("urn:b", "item").unwrap();
        assert_eq!(doc.namespace(item), Some("urn:b"));
        assert_eq!(doc.resolve_prefix(item, "a"), Some("urn:a"));
        assert_eq!(doc.resolve_prefix(item, "missing"), None);
        assert_eq!(doc.in_scope_namespaces(item).len(), 2);
    }

    #[test]
    fn test_text_is_unescaped() {
        let doc = Document::parse(SAMPLE).unwrap();
        let first = doc.find_by_id("one").unwrap();
        assert_eq!(doc.text(first), "first & second");
        let second = doc.find_by_id("two").unwrap();
        assert_eq!(doc.text(second), "<raw>");
    }

    #[test]
    fn test_find_by_id_ignores_namespace_declarations() {
        let doc = Document::parse(r#"<r xmlns:Id="urn:x"><c Id="x"/></r>"#).unwrap();
        let found = doc.find_by_id("x").unwrap();
        assert_eq!(doc.name(found), Some("c"));
        assert!(doc.find_by_id("urn:x").is_none());
    }

    #[test]
    fn test_set_text_replaces_children() {
        let mut doc = Document::parse(SAMPLE).unwrap();
        let empty = doc.find("urn:a", "empty").unwrap();
        doc.set_text(empty, "filled").unwrap();
        assert_eq!(doc.text(empty), "filled");
        doc.set_text(empty, "again").unwrap();
        assert_eq!(doc.text(empty), "again");
        assert_eq!(doc.children(empty).len(), 1);
    }

    #[test]
    fn test_to_xml_roundtrips_structure() {
        let doc = Document::parse(SAMPLE).unwrap();
        let xml = doc.to_xml();
        assert_eq!(
            xml,
            r#"<a:root xmlns:a="urn:a" xmlns:b="urn:b"><b:item b:Id="one">first &amp; second</b:item><a:item Id="two">&lt;raw&gt;</a:item><a:empty/></a:root>"#
        );
        let reparsed = Document::parse(&xml).unwrap();
        assert_eq!(reparsed.to_xml(), xml);
    }

    #[test]
    fn test_to_xml_keeps_control_whitespace() {
        let mut doc = Document::parse(r#"<r a="x&#9;y&#10;z&#13;"><t/></r>"#).unwrap();
        let root = doc.root();
        assert_eq!(doc.attribute(root, "a"), Some("x\ty\nz\r"));
        let t = doc.children(root)[0];
        doc.set_text(t, "line\r\nnext").unwrap();

        let xml = doc.to_xml();
        assert_eq!(
            xml,
            "<r a=\"x&#x9;y&#xA;z&#xD;\"><t>line&#xD;\nnext</t></r>"
        );
        let reparsed = Document::parse(&xml).unwrap();
        let root = reparsed.root();
        assert_eq!(reparsed.attribute(root, "a"), Some("x\ty\nz\r"));
        assert_eq!(reparsed.text(reparsed.children(root)[0]), "line\r\nnext");
    }

    #[test]
    fn test_rejects_malformed_input() {
        assert!(Document::parse("<a><b></a>").is_err());
        assert!(Document::parse("<a/><b/>").is_err());
        assert!(Document::parse("").is_err());
    }
}
