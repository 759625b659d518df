use bon::Builder;
use const_oid::ObjectIdentifier;
use der::asn1::SetOfVec;
use der::{Any, Tag, Tagged};
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::ToAndFromX509Extension;
pub use crate::cert::extensions::ExtendedKeyUsageOption;
use crate::cert::extensions::KeyUsages;
use crate::error::CryptoError;
use crate::key::PublicKey;
use crate::serial::SerialNumber;

/// Everything needed to build the to-be-signed part of a certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `serial_number` - The certificate serial.
/// * `validity` - The `notBefore`/`notAfter` window.
/// * `is_ca` - Indicates if the certificate may sign other certificates.
/// * `key_usage` - Key usage bits; omitted from the certificate when empty.
/// * `usages` - A list of extended key usage options.
/// * `dns_names` - Subject alternative DNS names.
#[derive(Clone, Debug, Builder)]
pub struct CertificateTemplate {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    pub serial_number: SerialNumber,
    pub validity: Validity,
    #[builder(default)]
    pub is_ca: bool,
    #[builder(default)]
    pub key_usage: der::flagset::FlagSet<KeyUsages>,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub dns_names: Vec<String>,
}

mod attr {
    use const_oid::ObjectIdentifier;

    pub const COMMON_NAME: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.3");
    pub const SERIAL_NUMBER: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.5");
    pub const COUNTRY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.6");
    pub const LOCALITY: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.7");
    pub const PROVINCE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.8");
    pub const STREET_ADDRESS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.9");
    pub const ORGANIZATION: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.10");
    pub const POSTAL_CODE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.4.17");
}

/// Distinguished name of a certificate subject or issuer.
///
/// An attribute is either present with exactly one non-empty value or absent.
/// The common name is the only attribute that is always written.
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(into)]
    pub common_name: String,
    #[builder(into)]
    pub country: Option<String>,
    #[builder(into)]
    pub province: Option<String>,
    #[builder(into)]
    pub locality: Option<String>,
    #[builder(into)]
    pub street_address: Option<String>,
    #[builder(into)]
    pub postal_code: Option<String>,
    #[builder(into)]
    pub organization: Option<String>,
    /// Subject-level serial number (2.5.4.5), distinct from the certificate serial.
    #[builder(into)]
    pub serial_number: Option<String>,
}

impl DistinguishedName {
    /// Attributes in wire order, skipping absent and empty ones.
    fn attributes(&self) -> Vec<(ObjectIdentifier, &str)> {
        [
            (attr::COUNTRY, self.country.as_deref()),
            (attr::PROVINCE, self.province.as_deref()),
            (attr::LOCALITY, self.locality.as_deref()),
            (attr::STREET_ADDRESS, self.street_address.as_deref()),
            (attr::POSTAL_CODE, self.postal_code.as_deref()),
            (attr::ORGANIZATION, self.organization.as_deref()),
            (attr::COMMON_NAME, Some(self.common_name.as_str())),
            (attr::SERIAL_NUMBER, self.serial_number.as_deref()),
        ]
        .into_iter()
        .filter_map(|(oid, value)| value.filter(|v| !v.is_empty()).map(|v| (oid, v)))
        .collect()
    }

    /// Converts the distinguished name to an X.509 `Name`, one attribute per RDN.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::Name, CryptoError> {
        let mut rdns = Vec::new();
        for (oid, value) in self.attributes() {
            let atv = AttributeTypeAndValue {
                oid,
                value: directory_string(value)?,
            };
            let set = SetOfVec::try_from(vec![atv])?;
            rdns.push(RelativeDistinguishedName(set));
        }
        Ok(RdnSequence(rdns))
    }

    /// Creates a `DistinguishedName` from an X.509 `Name`.
    ///
    /// Unknown attributes are ignored. When an attribute repeats, the first value wins.
    pub fn from_x509_name(x509dn: &x509_cert::name::Name) -> Self {
        let mut dn = DistinguishedName::default();

        for atv in x509dn.0.iter().flat_map(|rdn| rdn.0.iter()) {
            let Some(value) = attribute_text(&atv.value) else {
                continue;
            };
            let slot = match atv.oid {
                attr::COMMON_NAME => {
                    if dn.common_name.is_empty() {
                        dn.common_name = value;
                    }
                    continue;
                }
                attr::COUNTRY => &mut dn.country,
                attr::PROVINCE => &mut dn.province,
                attr::LOCALITY => &mut dn.locality,
                attr::STREET_ADDRESS => &mut dn.street_address,
                attr::POSTAL_CODE => &mut dn.postal_code,
                attr::ORGANIZATION => &mut dn.organization,
                attr::SERIAL_NUMBER => &mut dn.serial_number,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value);
            }
        }

        dn
    }
}

fn is_printable(value: &str) -> bool {
    value
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || " '()+,-./:=?".contains(c))
}

/// PrintableString when the value fits that alphabet, UTF8String otherwise.
fn directory_string(value: &str) -> Result<Any, CryptoError> {
    let tag = if is_printable(value) {
        Tag::PrintableString
    } else {
        Tag::Utf8String
    };
    Ok(Any::new(tag, value.as_bytes())?)
}

fn attribute_text(value: &Any) -> Option<String> {
    match value.tag() {
        Tag::Utf8String | Tag::PrintableString | Tag::Ia5String | Tag::TeletexString => {
            String::from_utf8(value.value().to_vec()).ok()
        }
        _ => None,
    }
}

/// Certificate validity period.
///
/// # Fields
/// * `not_before` - The start of the validity period.
/// * `not_after` - The end of the validity period.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(
        extension: E,
        critical: bool,
    ) -> Result<Self, CryptoError> {
        Ok(Self {
            oid: E::OID,
            critical,
            value: extension.to_x509_extension_value()?,
        })
    }
}
