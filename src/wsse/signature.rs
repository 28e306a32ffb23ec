use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use tracing::{debug, error, info};

use crate::crypto::HashAlg;
use crate::crypto::rsa::{self, RsaPrivateKey};
use crate::soap::ns;
use crate::wsse::{Digested, Error, Result, SIGNED_INFO_PREFIXES, SignableDocument, Signed};
use crate::xml::{Document, canonicalize};

impl SignableDocument<Digested> {
    /// Sign the canonical form of `SignedInfo` with RSASSA-PKCS1-v1_5 and
    /// SHA-1, and write the base64 signature into `SignatureValue`.
    pub fn sign(mut self, private_key: &RsaPrivateKey) -> Result<SignableDocument<Signed>> {
        let signature_value = self
            .doc
            .find(ns::DS, "SignatureValue")
            .ok_or(Error::MissingNode("ds:SignatureValue"))?;

        info!("Canonicalizing SignedInfo and generating signature");
        let canonical = canonical_signed_info(&self.doc)?;
        let signature = rsa::sign(private_key, canonical.as_bytes(), HashAlg::Sha1).map_err(|e| {
            error!("Signing SignedInfo failed: {e}");
            Error::Signature(e)
        })?;

        self.doc
            .set_text(signature_value, BASE64.encode(signature.as_bytes()))?;
        debug!(len = signature.len(), "Inserted SignatureValue");

        Ok(SignableDocument {
            doc: self.doc,
            ids: self.ids,
            state: Signed {
                values: self.state.values,
                digests: self.state.digests,
                signature,
            },
        })
    }
}

/// Exclusive canonical form of `SignedInfo` as it is signed
pub fn canonical_signed_info(doc: &Document) -> Result<String> {
    let signed_info = doc
        .find(ns::DS, "SignedInfo")
        .ok_or(Error::MissingNode("ds:SignedInfo"))?;
    canonicalize(doc, signed_info, SIGNED_INFO_PREFIXES).map_err(|source| {
        error!("Canonicalizing SignedInfo failed: {source}");
        Error::SignedInfo(source)
    })
}
