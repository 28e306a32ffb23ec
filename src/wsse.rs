//! WS-Security signing of VetStat requests.
//!
//! A request goes through a fixed sequence of phases, each one a distinct
//! type so that no phase can be skipped or repeated:
//!
//! ```text
//! SignableDocument<Built> -> <Populated> -> <Digested> -> <Signed>
//! ```
//!
//! * [`SignableDocument::build`] creates the envelope skeleton with fresh
//!   element identifiers.
//! * [`SignableDocument::populate`] writes the certificate, username token,
//!   nonce and timestamps.
//! * [`SignableDocument::digest`] canonicalizes the four referenced elements
//!   and stores their SHA-256 digests in `SignedInfo`.
//! * [`SignableDocument::sign`] canonicalizes `SignedInfo` and signs it with
//!   RSA-SHA1.
//!
//! Every transition consumes the previous state. A failure discards the
//! document, and a retry starts again from `build`.

mod digest;
mod error;
mod populate;
mod signature;
mod template;
mod timestamp;

pub use digest::ReferenceDigest;
pub use error::Error;
pub use signature::canonical_signed_info;
pub use template::SecurityIds;
pub use timestamp::{SecurityValues, format_instant, parse_instant, timestamp_ttl};

use std::fmt;

use tracing::{info, instrument};

use crate::credential::Credential;
use crate::crypto::rsa::RsaSignature;
use crate::request::AntibioticsQuery;
use crate::xml::Document;

pub type Result<T> = std::result::Result<T, Error>;

pub mod algorithms {
    /// Reference digests
    pub const SHA256: &str = "http://www.w3.org/2001/04/xmlenc#sha256";

    /// Signature over `SignedInfo`
    pub const RSA_SHA1: &str = "http://www.w3.org/2000/09/xmldsig#rsa-sha1";

    pub const EXCLUSIVE_C14N: &str = "http://www.w3.org/2001/10/xml-exc-c14n#";
}

pub mod token_types {
    pub const BASE64_BINARY: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-soap-message-security-1.0#Base64Binary";
    pub const X509_V3: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-x509-token-profile-1.0#X509v3";
    pub const PASSWORD_TEXT: &str =
        "http://docs.oasis-open.org/wss/2004/01/oasis-200401-wss-username-token-profile-1.0#PasswordText";
}

/// Inclusive prefixes used when canonicalizing `SignedInfo` for the signature
pub const SIGNED_INFO_PREFIXES: &[&str] = &["ds", "ec", "eks", "glr", "soapenv", "wsse", "wsu"];

/// Elements covered by a signature reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SignedElement {
    Body,
    Timestamp,
    UsernameToken,
    BinarySecurityToken,
}

impl SignedElement {
    /// All signed elements in the order their references appear in `SignedInfo`
    pub const ALL: [SignedElement; 4] = [
        SignedElement::Body,
        SignedElement::Timestamp,
        SignedElement::UsernameToken,
        SignedElement::BinarySecurityToken,
    ];

    /// Prefixes the service's validator declares inclusively when it
    /// canonicalizes this element. They cannot be derived from the document.
    pub fn inclusive_prefixes(self) -> &'static [&'static str] {
        match self {
            SignedElement::Body => &["ds", "ec", "eks", "glr", "wsse"],
            SignedElement::Timestamp => &["wsse", "ds", "ec", "eks", "glr", "soapenv"],
            SignedElement::UsernameToken => &["ds", "ec", "eks", "glr", "soapenv", "wsse"],
            SignedElement::BinarySecurityToken => &[],
        }
    }

    pub fn local_name(self) -> &'static str {
        match self {
            SignedElement::Body => "Body",
            SignedElement::Timestamp => "Timestamp",
            SignedElement::UsernameToken => "UsernameToken",
            SignedElement::BinarySecurityToken => "BinarySecurityToken",
        }
    }

    pub fn from_local_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|e| e.local_name() == name)
    }
}

impl fmt::Display for SignedElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.local_name())
    }
}

/// Envelope skeleton with business fields only
#[derive(Debug)]
pub struct Built;

/// Security header filled in; referenced elements are final
#[derive(Debug)]
pub struct Populated {
    values: SecurityValues,
}

/// All four reference digests written into `SignedInfo`
#[derive(Debug)]
pub struct Digested {
    values: SecurityValues,
    digests: Vec<ReferenceDigest>,
}

/// `SignatureValue` written; the document is complete
#[derive(Debug)]
pub struct Signed {
    values: SecurityValues,
    digests: Vec<ReferenceDigest>,
    signature: RsaSignature,
}

/// One SOAP envelope on its way to being signed.
///
/// Owned by a single signing run and never reused.
#[derive(Debug)]
pub struct SignableDocument<S> {
    doc: Document,
    ids: SecurityIds,
    state: S,
}

impl<S> SignableDocument<S> {
    pub fn document(&self) -> &Document {
        &self.doc
    }

    pub fn ids(&self) -> &SecurityIds {
        &self.ids
    }

    /// Serialize the envelope in its current state
    pub fn to_xml(&self) -> String {
        self.doc.to_xml()
    }
}

impl SignableDocument<Populated> {
    pub fn values(&self) -> &SecurityValues {
        &self.state.values
    }
}

impl SignableDocument<Digested> {
    pub fn values(&self) -> &SecurityValues {
        &self.state.values
    }

    pub fn digests(&self) -> &[ReferenceDigest] {
        &self.state.digests
    }
}

impl SignableDocument<Signed> {
    pub fn values(&self) -> &SecurityValues {
        &self.state.values
    }

    pub fn digests(&self) -> &[ReferenceDigest] {
        &self.state.digests
    }

    pub fn signature(&self) -> &RsaSignature {
        &self.state.signature
    }

    /// UTF-8 bytes of the signed envelope, ready for transport
    pub fn into_bytes(self) -> Vec<u8> {
        self.doc.to_xml().into_bytes()
    }
}

/// Run the whole pipeline for one request with fresh identifiers, nonce and
/// timestamps.
#[instrument(skip_all, fields(chr = query.chr_number, species = query.species_code))]
pub fn sign_envelope(
    credential: &Credential,
    query: &AntibioticsQuery,
    client_id: &str,
) -> Result<SignableDocument<Signed>> {
    let signed = SignableDocument::build(credential.username(), query, client_id)?
        .populate(credential)?
        .digest()?
        .sign(credential.private_key())?;

    info!(signature_id = %signed.ids().signature, "Signed VetStat request");
    Ok(signed)
}
