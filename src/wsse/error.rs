use crate::wsse::SignedElement;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Envelope template error: {0}")]
    Template(String),

    #[error("Required element {0} is missing from the envelope")]
    MissingNode(&'static str),

    #[error("SignedInfo must hold exactly four references, found {0}")]
    ReferenceCount(usize),

    #[error("Reference {uri} does not point to an element in the envelope")]
    UnresolvedReference { uri: String },

    #[error("{element} is referenced more than once")]
    DuplicateReference { element: SignedElement },

    #[error("Reference {uri} points to <{name}>, which is not a signable element")]
    UnexpectedTarget { uri: String, name: String },

    #[error("Failed to digest {element}: {source}")]
    Digest {
        element: SignedElement,
        #[source]
        source: crate::xml::Error,
    },

    #[error("Failed to hash canonical {element}: {source}")]
    Hash {
        element: SignedElement,
        #[source]
        source: crate::crypto::Error,
    },

    #[error("Failed to canonicalize SignedInfo: {0}")]
    SignedInfo(#[source] crate::xml::Error),

    #[error("Failed to sign SignedInfo: {0}")]
    Signature(#[source] crate::crypto::Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("XML processing error: {0}")]
    Xml(#[from] crate::xml::Error),
}

impl From<quick_xml::SeError> for Error {
    fn from(err: quick_xml::SeError) -> Self {
        Error::Template(err.to_string())
    }
}
