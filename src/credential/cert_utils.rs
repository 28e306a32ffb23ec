use openssl::asn1::{Asn1Integer, Asn1Time};
use openssl::bn::{BigNum, MsbOption};
use openssl::error::ErrorStack;
use openssl::hash::MessageDigest;
use openssl::pkcs12::Pkcs12;
use openssl::x509::extension::{BasicConstraints, KeyUsage};
use openssl::x509::{X509, X509Builder, X509Name, X509NameBuilder};
use secrecy::SecretString;

use crate::credential::{Credential, CredentialError};
use crate::crypto::rsa::{RsaKeySize, RsaPrivateKey};

const TEST_FRIENDLY_NAME: &str = "vetstat-test";

/// A self-signed client certificate packaged the way VetStat issues them.
#[derive(Debug, Clone)]
pub struct TestBundle {
    pub pkcs12_der: Vec<u8>,
    pub certificate_der: Vec<u8>,
}

/// Generate a PKCS#12 bundle with a fresh RSA-2048 key and a self-signed
/// certificate, protected by `password`.
pub fn generate_test_bundle(password: &str) -> Result<TestBundle, CredentialError> {
    let (cert, key) = generate_client_certificate(validity_from_now()?)?;
    let pkcs12 = Pkcs12::builder()
        .name(TEST_FRIENDLY_NAME)
        .pkey(key.pkey())
        .cert(&cert)
        .build2(password)?;

    Ok(TestBundle {
        pkcs12_der: pkcs12.to_der()?,
        certificate_der: cert.to_der()?,
    })
}

/// Generate a ready-to-use credential backed by a self-signed certificate.
pub fn generate_test_credential(
    username: &str,
    password: &str,
) -> Result<Credential, CredentialError> {
    let (cert, key) = generate_client_certificate(validity_from_now()?)?;
    Credential::new(
        username,
        SecretString::from(password.to_string()),
        cert.to_der()?,
        key,
    )
}

/// Validity window of a generated certificate
pub(crate) struct Validity {
    pub not_before: Asn1Time,
    pub not_after: Asn1Time,
}

fn validity_from_now() -> Result<Validity, ErrorStack> {
    Ok(Validity {
        not_before: Asn1Time::days_from_now(0)?,
        not_after: Asn1Time::days_from_now(365)?,
    })
}

pub(crate) fn generate_client_certificate(
    validity: Validity,
) -> Result<(X509, RsaPrivateKey), CredentialError> {
    let key = RsaPrivateKey::generate(RsaKeySize::RSA_2048)?;
    let key_pair = key.pkey();

    let mut cert_builder = X509Builder::new()?;
    cert_builder.set_version(2)?;

    let serial_number = generate_serial_number()?;
    cert_builder.set_serial_number(&serial_number)?;

    let subject_name = create_x509_name(&[
        ("C", "DK"),
        ("O", "Test Organization"),
        ("CN", "VetStat Test Client"),
    ])?;
    cert_builder.set_subject_name(&subject_name)?;
    cert_builder.set_issuer_name(&subject_name)?;
    cert_builder.set_pubkey(key_pair)?;

    cert_builder.set_not_before(&validity.not_before)?;
    cert_builder.set_not_after(&validity.not_after)?;

    cert_builder.append_extension(BasicConstraints::new().build()?)?;
    cert_builder.append_extension(
        KeyUsage::new()
            .critical()
            .digital_signature()
            .non_repudiation()
            .build()?,
    )?;

    cert_builder.sign(key_pair, MessageDigest::sha256())?;
    Ok((cert_builder.build(), key))
}

fn generate_serial_number() -> Result<Asn1Integer, ErrorStack> {
    let mut serial = BigNum::new()?;
    serial.rand(128, MsbOption::MAYBE_ZERO, false)?;
    serial.to_asn1_integer()
}

fn create_x509_name(entries: &[(&str, &str)]) -> Result<X509Name, ErrorStack> {
    let mut name_builder = X509NameBuilder::new()?;
    for (key, value) in entries {
        name_builder.append_entry_by_text(key, value)?;
    }
    Ok(name_builder.build())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_test_bundle() {
        let bundle = generate_test_bundle("secret").unwrap();

        let parsed = Pkcs12::from_der(&bundle.pkcs12_der)
            .unwrap()
            .parse2("secret")
            .unwrap();
        assert_eq!(parsed.cert.unwrap().to_der().unwrap(), bundle.certificate_der);
        let key = RsaPrivateKey::from_pkey(parsed.pkey.unwrap()).unwrap();
        assert_eq!(key.key_size(), RsaKeySize::RSA_2048);
    }

    #[test]
    fn test_generated_credentials_are_distinct() {
        let a = generate_test_credential("user", "pass").unwrap();
        let b = generate_test_credential("user", "pass").unwrap();
        assert_ne!(a.certificate_der(), b.certificate_der());
    }
}
