//! Signing credentials: the service username and password plus the X.509
//! certificate and RSA key used for the message signature.

mod cert_utils;
mod errors;

pub use cert_utils::{TestBundle, generate_test_bundle, generate_test_credential};
pub use errors::CredentialError;

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Utc};
use openssl::pkcs12::Pkcs12;
use openssl::x509::X509;
use secrecy::{ExposeSecret, SecretString};
use tracing::{debug, error, info, warn};
use x509_parser::prelude::*;

use crate::config::CredentialConfig;
use crate::crypto::rsa::RsaPrivateKey;

/// Everything needed to authenticate one request.
///
/// Cloning is cheap and the value is read-only, so one credential can be
/// shared by every concurrent signing run.
#[derive(Clone)]
pub struct Credential {
    username: String,
    password: SecretString,
    certificate_der: Arc<Vec<u8>>,
    private_key: RsaPrivateKey,
}

impl Credential {
    /// Assemble a credential, checking that the certificate belongs to the key.
    pub fn new(
        username: impl Into<String>,
        password: SecretString,
        certificate_der: Vec<u8>,
        private_key: RsaPrivateKey,
    ) -> Result<Self, CredentialError> {
        let cert = X509::from_der(&certificate_der)?;
        if !cert.public_key()?.public_eq(private_key.pkey()) {
            return Err(CredentialError::KeyMismatch);
        }

        Ok(Self {
            username: username.into(),
            password,
            certificate_der: Arc::new(certificate_der),
            private_key,
        })
    }

    /// Load the certificate and private key from a PKCS#12 bundle.
    pub fn from_pkcs12(
        username: impl Into<String>,
        password: SecretString,
        bundle: &[u8],
        bundle_password: &SecretString,
    ) -> Result<Self, CredentialError> {
        let parsed = Pkcs12::from_der(bundle)
            .and_then(|p12| p12.parse2(bundle_password.expose_secret()))
            .map_err(|e| {
                error!("Failed to load certificate with provided password");
                CredentialError::Pkcs12(e)
            })?;

        let pkey = parsed.pkey.ok_or(CredentialError::MissingPrivateKey)?;
        let cert = parsed.cert.ok_or(CredentialError::MissingCertificate)?;
        debug!("Loaded private key and certificate from PKCS#12 bundle");

        let private_key = RsaPrivateKey::from_pkey(pkey)?;
        let credential = Self::new(username, password, cert.to_der()?, private_key)?;

        let info = credential.certificate_info()?;
        if info.expired {
            warn!(
                subject = %info.subject,
                not_after = %info.not_after,
                "Signing certificate has expired"
            );
        } else if info.not_yet_valid {
            warn!(
                subject = %info.subject,
                not_before = %info.not_before,
                "Signing certificate is not valid yet"
            );
        } else {
            info!(
                subject = %info.subject,
                serial = %info.serial_number,
                not_after = %info.not_after,
                "Loaded signing certificate"
            );
        }
        Ok(credential)
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// DER encoding of the signing certificate
    pub fn certificate_der(&self) -> &[u8] {
        &self.certificate_der
    }

    pub fn private_key(&self) -> &RsaPrivateKey {
        &self.private_key
    }

    /// Metadata of the signing certificate
    pub fn certificate_info(&self) -> Result<CertificateInfo, CredentialError> {
        CertificateInfo::from_der(self.certificate_der.as_slice())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("certificate_len", &self.certificate_der.len())
            .field("private_key", &self.private_key)
            .finish()
    }
}

/// Certificate metadata used for diagnostics.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub serial_number: String,
    pub subject: String,
    pub issuer: String,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// `not_after` lies in the past
    pub expired: bool,
    /// `not_before` lies in the future
    pub not_yet_valid: bool,
}

impl CertificateInfo {
    pub fn from_der(der: impl AsRef<[u8]>) -> Result<Self, CredentialError> {
        let (_, cert) = X509Certificate::from_der(der.as_ref())
            .map_err(|e| CredentialError::X509(e.into()))?;

        let validity = cert.validity();
        let not_before = DateTime::from_timestamp(validity.not_before.timestamp(), 0)
            .unwrap_or(DateTime::<Utc>::MIN_UTC);
        let not_after = DateTime::from_timestamp(validity.not_after.timestamp(), 0)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let now = Utc::now();

        Ok(Self {
            serial_number: cert.tbs_certificate.serial.to_string(),
            subject: cert.subject().to_string(),
            issuer: cert.issuer().to_string(),
            not_before,
            not_after,
            expired: not_after < now,
            not_yet_valid: now < not_before,
        })
    }
}

/// Source of signing credentials.
pub trait CredentialProvider: Send + Sync + 'static {
    /// Produce a complete credential or fail before any signing starts.
    fn credential(&self) -> impl Future<Output = Result<Credential, CredentialError>> + Send;
}

impl CredentialProvider for Credential {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        Ok(self.clone())
    }
}

/// Provider backed by the `credentials` configuration section.
///
/// The PKCS#12 bundle is taken from the base64 `certificate` value when it
/// decodes, and read from `certificate_path` otherwise.
#[derive(Debug, Clone)]
pub struct ConfigCredentialProvider {
    config: CredentialConfig,
}

impl ConfigCredentialProvider {
    pub fn new(config: CredentialConfig) -> Self {
        Self { config }
    }

    async fn bundle(&self) -> Result<Vec<u8>, CredentialError> {
        if let Some(encoded) = &self.config.certificate {
            match BASE64.decode(encoded.expose_secret().trim()) {
                Ok(bytes) if !bytes.is_empty() => {
                    debug!(len = bytes.len(), "Decoded base64 certificate bundle");
                    return Ok(bytes);
                }
                Ok(_) => warn!("Base64 certificate bundle is empty"),
                Err(e) => {
                    error!("Failed to decode base64 certificate bundle: {e}");
                    if self.config.certificate_path.is_none() {
                        return Err(e.into());
                    }
                }
            }
        }

        let path: &PathBuf = self
            .config
            .certificate_path
            .as_ref()
            .ok_or(CredentialError::Missing("certificate or certificate_path"))?;
        debug!(path = %path.display(), "Reading certificate bundle from file");
        tokio::fs::read(path)
            .await
            .map_err(|source| CredentialError::Io {
                path: path.clone(),
                source,
            })
    }
}

impl CredentialProvider for ConfigCredentialProvider {
    async fn credential(&self) -> Result<Credential, CredentialError> {
        debug!(
            username = presence(!self.config.username.is_empty()),
            certificate = presence(self.config.certificate.is_some()),
            certificate_path = presence(self.config.certificate_path.is_some()),
            "Credential settings"
        );
        if self.config.username.is_empty() {
            return Err(CredentialError::Missing("username"));
        }

        let bundle = self.bundle().await?;
        Credential::from_pkcs12(
            self.config.username.clone(),
            self.config.password.clone(),
            &bundle,
            &self.config.certificate_password,
        )
    }
}

fn presence(set: bool) -> &'static str {
    if set { "[SET]" } else { "[MISSING]" }
}
