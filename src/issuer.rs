use der::Encode;
use x509_cert::certificate::CertificateInner;
use x509_cert::name::Name;

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, KeyUsage, SubjectAltName,
    SubjectKeyIdentifier,
};
use crate::cert::params::{CertificateTemplate, ExtensionParam};
use crate::error::CryptoError;
use crate::key::KeyPair;
use crate::tbs_certificate::{TbsCertificate, signature_algorithm};

/// Represents an entity capable of issuing certificates.
pub trait Issuer {
    /// Returns the name written into the `issuer` field of issued certificates.
    fn issuer_name(&self) -> Result<Name, CryptoError>;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Issues a certificate for `template`, signed with [`Issuer::signing_key`].
    ///
    /// Basic constraints are always written (critical); key usage, extended key
    /// usage and subject alternative names only when the template asks for them.
    /// An authority key identifier is added whenever the subject key differs from
    /// the signing key.
    fn issue(&self, template: &CertificateTemplate) -> Result<Certificate, CryptoError> {
        let subject_key_id = template.subject_public_key.key_identifier()?;
        let issuer_key_id = self.signing_key().public_key().key_identifier()?;

        let mut extensions = vec![
            ExtensionParam::from_extension(
                BasicConstraints {
                    is_ca: template.is_ca,
                    max_path_length: None,
                },
                true,
            )?,
            ExtensionParam::from_extension(SubjectKeyIdentifier(subject_key_id.clone()), false)?,
        ];

        if subject_key_id != issuer_key_id {
            extensions.push(ExtensionParam::from_extension(
                AuthorityKeyIdentifier {
                    key_identifier: issuer_key_id,
                },
                false,
            )?);
        }

        if !template.key_usage.is_empty() {
            extensions.push(ExtensionParam::from_extension(
                KeyUsage(template.key_usage),
                true,
            )?);
        }

        if !template.usages.is_empty() {
            extensions.push(ExtensionParam::from_extension(
                ExtendedKeyUsage {
                    usage: template.usages.clone(),
                },
                false,
            )?);
        }

        if !template.dns_names.is_empty() {
            extensions.push(ExtensionParam::from_extension(
                SubjectAltName {
                    names: template.dns_names.clone(),
                },
                false,
            )?);
        }

        let tbs_cert = TbsCertificate {
            serial_number: template.serial_number.clone(),
            issuer: self.issuer_name()?,
            not_before: template.validity.not_before,
            not_after: template.validity.not_after,
            subject: template.subject.clone(),
            subject_public_key: template.subject_public_key.clone(),
            extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let tbs_der = tbs_cert_inner
            .to_der()
            .map_err(|e| CryptoError::EncodingError(e.to_string()))?;
        let signature = self.signing_key().sign_data(&tbs_der)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algorithm(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// Issuer of a self-signed certificate: the subject signs itself.
pub struct SelfIssuer<'a> {
    pub name: Name,
    pub key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> Result<Name, CryptoError> {
        Ok(self.name.clone())
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }
}
