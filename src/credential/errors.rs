use std::path::PathBuf;

use openssl::error::ErrorStack;
use thiserror::Error;

/// Errors raised while assembling a signing credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Missing credential setting: {0}")]
    Missing(&'static str),

    #[error("Failed to decode base64 certificate bundle: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("Failed to read certificate bundle {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to open PKCS#12 bundle with the provided password: {0}")]
    Pkcs12(ErrorStack),

    #[error("PKCS#12 bundle does not contain a private key")]
    MissingPrivateKey,

    #[error("PKCS#12 bundle does not contain a certificate")]
    MissingCertificate,

    #[error("Certificate public key does not match the private key")]
    KeyMismatch,

    #[error("X.509 error: {0}")]
    X509(#[from] x509_parser::error::X509Error),

    #[error("Crypto error: {0}")]
    Crypto(#[from] crate::crypto::Error),

    #[error("OpenSSL error: {0}")]
    OpenSsl(#[from] ErrorStack),
}
