use crate::crypto::HashAlg;
use crate::crypto::errors::{CryptoResult, Error};
use openssl::pkey::{HasPublic, PKey, Private, Public};
use openssl::rsa::Rsa;
use openssl::sign::{Signer, Verifier};
use openssl::x509::X509;
use std::fmt;

/// Modulus size of an RSA key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct RsaKeySize(u32);

impl RsaKeySize {
    /// Smallest modulus accepted for signing credentials
    pub const MIN_BITS: u32 = 1024;

    pub const RSA_2048: Self = Self(2048);

    /// Get the key size in bits
    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Get the key size in bytes, which is also the signature length
    pub fn bytes(&self) -> usize {
        self.0.div_ceil(8) as usize
    }

    fn of(rsa: &Rsa<impl HasPublic>) -> CryptoResult<Self> {
        Self::try_from(rsa.n().num_bits().unsigned_abs())
    }
}

impl TryFrom<u32> for RsaKeySize {
    type Error = Error;

    fn try_from(bits: u32) -> Result<Self, Self::Error> {
        if bits < Self::MIN_BITS {
            return Err(Error::UnsupportedKey(format!(
                "{bits}-bit RSA key is below the {} bit minimum",
                Self::MIN_BITS
            )));
        }
        Ok(Self(bits))
    }
}

/// A PKCS#1 v1.5 RSA signature
#[derive(Clone, PartialEq, Eq)]
pub struct RsaSignature {
    key_size: RsaKeySize,
    data: Vec<u8>,
}

impl RsaSignature {
    pub fn new(key_size: RsaKeySize, data: impl Into<Vec<u8>>) -> Self {
        Self {
            key_size,
            data: data.into(),
        }
    }

    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.data)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for RsaSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaSignature")
            .field("key_size", &self.key_size)
            .field("size", &self.len())
            .field("hex", &self.to_hex())
            .finish()
    }
}

/// RSA private key wrapper
#[derive(Clone)]
pub struct RsaPrivateKey {
    key: PKey<Private>,
    key_size: RsaKeySize,
}

impl RsaPrivateKey {
    /// Generate a new RSA private key
    pub fn generate(key_size: RsaKeySize) -> CryptoResult<Self> {
        let rsa = Rsa::generate(key_size.bits())?;
        Self::from_pkey(PKey::from_rsa(rsa)?)
    }

    /// Wrap an OpenSSL key, rejecting anything that is not a supported RSA key.
    pub(crate) fn from_pkey(key: PKey<Private>) -> CryptoResult<Self> {
        let rsa = key
            .rsa()
            .map_err(|_| Error::UnsupportedKey("private key is not an RSA key".into()))?;
        let key_size = RsaKeySize::of(&rsa)?;
        Ok(Self { key, key_size })
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> CryptoResult<RsaPublicKey> {
        let pub_key = PKey::public_key_from_der(&self.key.public_key_to_der()?)?;

        Ok(RsaPublicKey {
            key: pub_key,
            key_size: self.key_size,
        })
    }

    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    pub(crate) fn pkey(&self) -> &PKey<Private> {
        &self.key
    }
}

impl fmt::Debug for RsaPrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaPrivateKey")
            .field("key_size", &self.key_size)
            .finish_non_exhaustive()
    }
}

/// RSA public key wrapper
#[derive(Debug, Clone)]
pub struct RsaPublicKey {
    key: PKey<Public>,
    key_size: RsaKeySize,
}

impl RsaPublicKey {
    /// Extract the subject public key from a DER-encoded X.509 certificate.
    pub fn from_certificate_der(der: impl AsRef<[u8]>) -> CryptoResult<Self> {
        let cert = X509::from_der(der.as_ref())?;
        let key = cert.public_key()?;
        let rsa = key
            .rsa()
            .map_err(|_| Error::UnsupportedKey("certificate key is not an RSA key".into()))?;
        let key_size = RsaKeySize::of(&rsa)?;
        Ok(Self { key, key_size })
    }

    pub fn key_size(&self) -> RsaKeySize {
        self.key_size
    }

    pub(crate) fn pkey(&self) -> &PKey<Public> {
        &self.key
    }
}

/// Sign data with RSASSA-PKCS1-v1_5.
///
/// The data is hashed with `hash_alg` and the digest is wrapped in a
/// DigestInfo structure before the private key operation.
pub fn sign(
    private_key: &RsaPrivateKey,
    data: impl AsRef<[u8]>,
    hash_alg: HashAlg,
) -> CryptoResult<RsaSignature> {
    let mut signer = Signer::new((&hash_alg).into(), private_key.pkey())?;
    let signature_data = signer.sign_oneshot_to_vec(data.as_ref())?;

    Ok(RsaSignature::new(private_key.key_size(), signature_data))
}

/// Verify an RSASSA-PKCS1-v1_5 signature
pub fn verify(
    public_key: &RsaPublicKey,
    data: impl AsRef<[u8]>,
    signature: &RsaSignature,
    hash_alg: HashAlg,
) -> CryptoResult<bool> {
    if signature.len() != public_key.key_size().bytes() {
        return Err(Error::Invalid(
            "Signature length does not match key size".to_string(),
        ));
    }

    let mut verifier = Verifier::new((&hash_alg).into(), public_key.pkey())?;
    Ok(verifier.verify_oneshot(signature.as_bytes(), data.as_ref())?)
}
