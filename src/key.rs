use rsa::{
    RsaPrivateKey, RsaPublicKey,
    pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey},
    pkcs1v15::SigningKey as RsaSigningKey,
    pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePublicKey},
    signature::{SignatureEncoding, Signer},
};
use sha1::Sha1;
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::CryptoError;
use crate::pem_utils;

pub type Result<T> = std::result::Result<T, CryptoError>;

pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
pub const PKCS8_PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";

/// RSA modulus sizes accepted for newly generated keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum KeyStrength {
    Rsa2048,
    #[default]
    Rsa4096,
}

impl KeyStrength {
    pub const ALL: [KeyStrength; 2] = [KeyStrength::Rsa2048, KeyStrength::Rsa4096];

    pub fn bits(self) -> usize {
        match self {
            KeyStrength::Rsa2048 => 2048,
            KeyStrength::Rsa4096 => 4096,
        }
    }

    pub fn from_bits(bits: usize) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.bits() == bits)
    }
}

/// An RSA key pair used either as a certificate subject key or as an issuer key.
#[derive(Clone)]
pub struct KeyPair {
    private: Box<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

impl KeyPair {
    /// Generate an RSA key pair of the given strength.
    pub fn generate(strength: KeyStrength) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, strength.bits())?;
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }

    /// Load a private key from PEM. Both PKCS#1 (`RSA PRIVATE KEY`) and
    /// PKCS#8 (`PRIVATE KEY`) containers are accepted.
    pub fn from_pem(text: &str) -> Result<Self> {
        let (label, der) = pem_utils::decode(text)?;
        let private = match label.as_str() {
            RSA_PRIVATE_KEY_LABEL => RsaPrivateKey::from_pkcs1_der(&der)?,
            PKCS8_PRIVATE_KEY_LABEL => RsaPrivateKey::from_pkcs8_der(&der)?,
            other => {
                return Err(CryptoError::DecodingError(format!(
                    "unexpected PEM label {other:?} for a private key"
                )));
            }
        };
        let public = RsaPublicKey::from(&private);
        Ok(KeyPair {
            private: Box::new(private),
            public,
        })
    }

    /// PKCS#1 PEM encoding of the private key.
    pub fn to_pkcs1_pem(&self) -> Result<String> {
        let der = self
            .private
            .to_pkcs1_der()
            .map_err(|e| CryptoError::EncodingError(e.to_string()))?;
        Ok(pem_utils::encode(RSA_PRIVATE_KEY_LABEL, der.as_bytes()))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey(self.public.clone())
    }

    /// Signs `data` with RSASSA-PKCS1-v1_5 over SHA-256.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = RsaSigningKey::<Sha256>::new((*self.private).clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| CryptoError::Signing(e.to_string()))?;
        Ok(signature.to_vec())
    }
}

/// The public half of a [`KeyPair`], as carried in a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublicKey(RsaPublicKey);

impl PublicKey {
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        let der = der::Encode::to_der(spki)?;
        let public = RsaPublicKey::from_public_key_der(&der).map_err(|e| {
            CryptoError::DecodingError(format!("unsupported subject public key: {e}"))
        })?;
        Ok(PublicKey(public))
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        let der = self.0.to_public_key_der()?;
        Ok(der::Decode::from_der(der.as_bytes())?)
    }

    /// SHA-1 over the subjectPublicKey bits (RFC 5280 4.2.1.2, method 1).
    pub fn key_identifier(&self) -> Result<Vec<u8>> {
        let spki = self.to_spki()?;
        let digest = <Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes());
        Ok(digest.to_vec())
    }

    /// Checks a PKCS#1 v1.5 SHA-256 signature over `data`.
    pub fn verify(&self, data: &[u8], signature: &[u8]) -> Result<()> {
        use rsa::signature::Verifier;

        let verifying_key = rsa::pkcs1v15::VerifyingKey::<Sha256>::new(self.0.clone());
        let signature = rsa::pkcs1v15::Signature::try_from(signature)
            .map_err(|e| CryptoError::InvalidInput(e.to_string()))?;
        verifying_key
            .verify(data, &signature)
            .map_err(|e| CryptoError::InvalidInput(format!("signature mismatch: {e}")))
    }
}
