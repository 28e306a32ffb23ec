use std::collections::BTreeSet;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, error, info};

use crate::crypto::HashAlg;
use crate::soap::ns;
use crate::wsse::{Digested, Error, Populated, Result, SignableDocument, SignedElement};
use crate::xml::{Document, NodeId, canonicalize};

/// Digest written into one `ds:Reference`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceDigest {
    pub element: SignedElement,
    /// Identifier of the referenced element, without the leading `#`
    pub id: String,
    /// Base64 SHA-256 of the canonical form
    pub value: String,
}

/// A `ds:Reference` resolved to the element it covers
struct ResolvedReference {
    element: SignedElement,
    id: String,
    target: NodeId,
    digest_value: NodeId,
}

impl SignableDocument<Populated> {
    /// Canonicalize each referenced element and store its SHA-256 digest.
    ///
    /// All four references are resolved and checked before any digest is
    /// written, so a broken envelope is rejected without side effects.
    pub fn digest(mut self) -> Result<SignableDocument<Digested>> {
        let references = resolve_references(&self.doc)?;

        let mut digests = Vec::with_capacity(references.len());
        for reference in references {
            let value = digest_element(&self.doc, reference.target, reference.element)?;
            debug!(
                id = %reference.id,
                element = %reference.element,
                digest = %value,
                "Updated DigestValue"
            );
            self.doc.set_text(reference.digest_value, value.as_str())?;
            digests.push(ReferenceDigest {
                element: reference.element,
                id: reference.id,
                value,
            });
        }

        info!(references = digests.len(), "Computed reference digests");
        Ok(SignableDocument {
            doc: self.doc,
            ids: self.ids,
            state: Digested {
                values: self.state.values,
                digests,
            },
        })
    }
}

/// Base64 SHA-256 of the exclusive canonical form of `node`
pub(crate) fn digest_element(doc: &Document, node: NodeId, element: SignedElement) -> Result<String> {
    let prefixes = element.inclusive_prefixes();
    debug!(%element, ?prefixes, "Canonicalizing referenced element");

    let canonical = canonicalize(doc, node, prefixes).map_err(|source| {
        error!(%element, "Canonicalization failed: {source}");
        Error::Digest { element, source }
    })?;
    let hash = HashAlg::Sha256.hash(canonical.as_bytes()).map_err(|source| {
        error!(%element, "Hashing canonical form failed: {source}");
        Error::Hash { element, source }
    })?;
    Ok(BASE64.encode(hash))
}

fn resolve_references(doc: &Document) -> Result<Vec<ResolvedReference>> {
    let signed_info = doc
        .find(ns::DS, "SignedInfo")
        .ok_or(Error::MissingNode("ds:SignedInfo"))?;
    let reference_nodes: Vec<NodeId> = doc
        .children(signed_info)
        .iter()
        .copied()
        .filter(|node| doc.matches(*node, ns::DS, "Reference"))
        .collect();

    if reference_nodes.len() != SignedElement::ALL.len() {
        error!(found = reference_nodes.len(), "Unexpected number of references");
        return Err(Error::ReferenceCount(reference_nodes.len()));
    }

    let mut seen = BTreeSet::new();
    let mut resolved = Vec::with_capacity(reference_nodes.len());
    for node in reference_nodes {
        let uri = doc.attribute(node, "URI").unwrap_or_default();
        let id = uri
            .strip_prefix('#')
            .filter(|id| !id.is_empty())
            .ok_or_else(|| unresolved(uri))?;
        let target = doc.find_by_id(id).ok_or_else(|| unresolved(uri))?;

        let name = doc.local_name(target).unwrap_or_default();
        let element = SignedElement::from_local_name(name).ok_or_else(|| {
            error!(uri, name, "Reference points to an element that is not signed");
            Error::UnexpectedTarget {
                uri: uri.to_string(),
                name: name.to_string(),
            }
        })?;
        if !seen.insert(element) {
            error!(%element, "Element is referenced more than once");
            return Err(Error::DuplicateReference { element });
        }

        let digest_value = doc
            .child(node, ns::DS, "DigestValue")
            .ok_or(Error::MissingNode("ds:DigestValue"))?;
        resolved.push(ResolvedReference {
            element,
            id: id.to_string(),
            target,
            digest_value,
        });
    }
    Ok(resolved)
}

fn unresolved(uri: &str) -> Error {
    error!(uri, "Referenced element not found");
    Error::UnresolvedReference {
        uri: uri.to_string(),
    }
}
