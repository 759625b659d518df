use std::time::SystemTime;

use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::name::Name;
use x509_cert::spki::AlgorithmIdentifierOwned;

use crate::cert::params::{DistinguishedName, ExtensionParam};
use crate::error::CryptoError;
use crate::key::PublicKey;
use crate::serial::SerialNumber;

/// `sha256WithRSAEncryption` with the NULL parameters RFC 4055 requires.
pub fn signature_algorithm() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        parameters: Some(der::Any::null()),
    }
}

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
///
/// # Fields
/// * `serial_number` - The serial of the certificate being issued.
/// * `issuer` - The issuer name, copied verbatim from the issuing certificate.
/// * `not_before` - The start of the certificate's validity period.
/// * `not_after` - The end of the certificate's validity period.
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - X.509 extensions for the certificate.
pub struct TbsCertificate {
    pub serial_number: SerialNumber,
    pub issuer: Name,
    pub not_before: time::OffsetDateTime,
    pub not_after: time::OffsetDateTime,
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<ExtensionParam>,
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner, CryptoError> {
        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>, CryptoError>>()?;

        let validity = x509_cert::time::Validity {
            not_before: x509_time(self.not_before)?,
            not_after: x509_time(self.not_after)?,
        };

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number: self.serial_number.to_x509()?,
            signature: signature_algorithm(),
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.as_x509_name()?,
            subject_public_key_info: self.subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: if extensions.is_empty() {
                None
            } else {
                Some(extensions)
            },
        })
    }
}

/// UTCTime through 2049, GeneralizedTime from 2050 on (RFC 5280 4.1.2.5).
fn x509_time(at: time::OffsetDateTime) -> Result<x509_cert::time::Time, CryptoError> {
    let system_time: SystemTime = at.into();
    let date_time = der::DateTime::from_system_time(system_time)
        .map_err(|e| CryptoError::InvalidInput(format!("validity bound {at}: {e}")))?;
    if date_time.year() < 2050 {
        Ok(x509_cert::time::Time::UtcTime(UtcTime::from_date_time(
            date_time,
        )?))
    } else {
        Ok(x509_cert::time::Time::GeneralTime(
            GeneralizedTime::from_date_time(date_time),
        ))
    }
}

pub(crate) fn offset_date_time(at: &x509_cert::time::Time) -> time::OffsetDateTime {
    time::OffsetDateTime::from(at.to_system_time())
}
