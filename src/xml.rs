//! Owned XML element tree and Exclusive XML Canonicalization.
//!
//! The signing pipeline needs two things a streaming reader cannot give it:
//! stable handles to elements that are mutated in place between phases, and
//! the namespace context of an element's ancestors when that element is
//! canonicalized on its own.

mod c14n;
mod tree;

pub use c14n::{canonicalize, canonicalize_str};
pub use tree::{Attribute, Descendants, Document, NodeId};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("XML parse error: {0}")]
    Parse(String),

    #[error("Malformed document: {0}")]
    Malformed(String),

    #[error("Prefix '{prefix}' is not bound on <{element}>")]
    UnboundPrefix { prefix: String, element: String },

    #[error("Node is not an element")]
    NotAnElement,

    #[error("UTF-8 error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
}

impl From<quick_xml::Error> for Error {
    fn from(err: quick_xml::Error) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<quick_xml::events::attributes::AttrError> for Error {
    fn from(err: quick_xml::events::attributes::AttrError) -> Self {
        Error::Parse(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for Error {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Error::Utf8(err.utf8_error())
    }
}

/// Split a qualified name into its optional prefix and local part.
pub(crate) fn split_qname(name: &str) -> (Option<&str>, &str) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix), local),
        None => (None, name),
    }
}
