pub mod extensions;
pub mod params;

use der::{Decode, Encode};
use extensions::{BasicConstraints, SubjectAltName, ToAndFromX509Extension};
use params::{DistinguishedName, Validity};
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::error::CryptoError;
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::pem_utils;
use crate::serial::SerialNumber;
use crate::tbs_certificate::offset_date_time;

pub type Result<T> = std::result::Result<T, CryptoError>;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";

/// Represents an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)?;
        Ok(Certificate { inner })
    }

    /// Parses a `CERTIFICATE` PEM block.
    pub fn from_pem(text: &str) -> Result<Self> {
        let der = pem_utils::decode_expecting(text, &[CERTIFICATE_LABEL])?;
        Self::from_der(&der)
    }

    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| CryptoError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        Ok(pem_utils::encode(CERTIFICATE_LABEL, &self.to_der()?))
    }

    pub fn subject_name(&self) -> &Name {
        &self.inner.tbs_certificate.subject
    }

    pub fn issuer_name(&self) -> &Name {
        &self.inner.tbs_certificate.issuer
    }

    pub fn subject(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.subject_name())
    }

    pub fn issuer(&self) -> DistinguishedName {
        DistinguishedName::from_x509_name(self.issuer_name())
    }

    pub fn serial_number(&self) -> SerialNumber {
        SerialNumber::from_x509(&self.inner.tbs_certificate.serial_number)
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: offset_date_time(&validity.not_before),
            not_after: offset_date_time(&validity.not_after),
        }
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    /// Decodes the extension `E` if the certificate carries it.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }

    pub fn is_ca(&self) -> Result<bool> {
        Ok(self
            .extension::<BasicConstraints>()?
            .is_some_and(|bc| bc.is_ca))
    }

    pub fn dns_names(&self) -> Result<Vec<String>> {
        Ok(self
            .extension::<SubjectAltName>()?
            .map(|san| san.names)
            .unwrap_or_default())
    }

    /// Checks that this certificate was signed by the holder of `issuer_key`.
    pub fn verify_signed_by(&self, issuer_key: &PublicKey) -> Result<()> {
        if self.inner.signature_algorithm.oid != const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION
        {
            return Err(CryptoError::InvalidInput(format!(
                "unsupported signature algorithm {}",
                self.inner.signature_algorithm.oid
            )));
        }
        let tbs_der = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| CryptoError::EncodingError(e.to_string()))?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            CryptoError::DecodingError("signature has unused bits".to_string())
        })?;
        issuer_key.verify(&tbs_der, signature)
    }
}

/// A CA certificate together with its private key.
#[derive(Debug, Clone)]
pub struct CertificateAuthority {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl CertificateAuthority {
    /// Loads a CA from PEM and checks that the key belongs to the certificate.
    ///
    /// Every failure is reported as [`CryptoError::InvalidCaKeyMaterial`].
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self> {
        let invalid = |what: &str, e: CryptoError| {
            CryptoError::InvalidCaKeyMaterial(format!("{what}: {e}"))
        };

        let cert = Certificate::from_pem(cert_pem).map_err(|e| invalid("certificate", e))?;
        let key = KeyPair::from_pem(key_pem).map_err(|e| invalid("private key", e))?;
        let cert_key = cert
            .public_key()
            .map_err(|e| invalid("certificate public key", e))?;

        if cert_key != key.public_key() {
            return Err(CryptoError::InvalidCaKeyMaterial(
                "private key does not match certificate public key".to_string(),
            ));
        }

        Ok(CertificateAuthority { cert, key })
    }
}

impl Issuer for CertificateAuthority {
    // The CA subject exactly as encoded in its certificate.
    fn issuer_name(&self) -> Result<Name> {
        Ok(self.cert.subject_name().clone())
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::CertificateTemplate;
    use crate::issuer::SelfIssuer;
    use crate::key::KeyStrength;

    fn self_signed(common_name: &str) -> (Certificate, KeyPair) {
        let key = KeyPair::generate(KeyStrength::Rsa2048).unwrap();
        let subject = DistinguishedName::builder().common_name(common_name).build();
        let now = time::OffsetDateTime::now_utc();
        let template = CertificateTemplate::builder()
            .subject(subject.clone())
            .subject_public_key(key.public_key())
            .serial_number(SerialNumber::from(7))
            .validity(Validity {
                not_before: now,
                not_after: now + time::Duration::days(1),
            })
            .is_ca(true)
            .build();
        let issuer = SelfIssuer {
            name: subject.as_x509_name().unwrap(),
            key: &key,
        };
        (issuer.issue(&template).unwrap(), key)
    }

    #[test]
    fn pem_round_trip_preserves_certificate() {
        let (cert, _) = self_signed("pem.test.local");
        let reparsed = Certificate::from_pem(&cert.to_pem().unwrap()).unwrap();
        assert_eq!(reparsed, cert);
        assert_eq!(reparsed.serial_number(), SerialNumber::from(7));
        assert!(reparsed.is_ca().unwrap());
        assert!(reparsed.dns_names().unwrap().is_empty());
    }

    #[test]
    fn self_signed_certificate_verifies_with_own_key() {
        let (cert, key) = self_signed("verify.test.local");
        cert.verify_signed_by(&key.public_key()).unwrap();

        let other = KeyPair::generate(KeyStrength::Rsa2048).unwrap();
        assert!(cert.verify_signed_by(&other.public_key()).is_err());
    }

    #[test]
    fn authority_rejects_mismatched_key() {
        let (cert, _) = self_signed("mismatch.test.local");
        let other = KeyPair::generate(KeyStrength::Rsa2048).unwrap();
        let err = CertificateAuthority::from_pem(
            &cert.to_pem().unwrap(),
            &other.to_pkcs1_pem().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidCaKeyMaterial(_)));
    }

    #[test]
    fn authority_rejects_garbage() {
        let (cert, _) = self_signed("garbage.test.local");
        let err = CertificateAuthority::from_pem(&cert.to_pem().unwrap(), "invalid_key")
            .unwrap_err();
        assert!(matches!(err, CryptoError::InvalidCaKeyMaterial(_)));

        let err = CertificateAuthority::from_pem("invalid_cert", "invalid_key").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidCaKeyMaterial(_)));
    }
}
