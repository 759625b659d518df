//! Turns a PKCS#10 certificate signing request into an issuance [`Request`].

use const_oid::AssociatedOid;
use der::{Decode, Encode};
use x509_cert::request::{CertReq, ExtensionReq};

use crate::cert::extensions::{SubjectAltName, ToAndFromX509Extension};
use crate::cert::params::DistinguishedName;
use crate::error::CryptoError;
use crate::pem_utils;
use crate::request::Request;
use crate::subject::request_from_subject;

pub const CSR_LABELS: [&str; 2] = ["CERTIFICATE REQUEST", "NEW CERTIFICATE REQUEST"];

fn invalid(e: impl std::fmt::Display) -> CryptoError {
    CryptoError::InvalidCsr(e.to_string())
}

/// Decodes `csr_pem` and maps its subject and DNS alternative names into a
/// [`Request`]. The serial number is left unset.
///
/// The public key and signature of the request are not used: issuance always
/// generates a fresh key pair.
pub fn read_csr(csr_pem: &str) -> Result<Request, CryptoError> {
    let der = pem_utils::decode_expecting(csr_pem, &CSR_LABELS).map_err(invalid)?;
    let csr = CertReq::from_der(&der).map_err(invalid)?;

    let subject = DistinguishedName::from_x509_name(&csr.info.subject);
    let mut request = request_from_subject(&subject);
    request.subject_alt_names = requested_dns_names(&csr)?;
    Ok(request)
}

/// DNS names from the subjectAltName inside the extensionRequest attribute.
fn requested_dns_names(csr: &CertReq) -> Result<Vec<String>, CryptoError> {
    let mut names = Vec::new();
    for attribute in csr.info.attributes.iter() {
        if attribute.oid != ExtensionReq::OID {
            continue;
        }
        for value in attribute.values.iter() {
            let requested = ExtensionReq::from_der(&value.to_der().map_err(invalid)?)
                .map_err(invalid)?;
            for ext in requested.0.iter().filter(|ext| ext.extn_id == SubjectAltName::OID) {
                let san = SubjectAltName::from_x509_extension_value(ext.extn_value.as_bytes())
                    .map_err(invalid)?;
                names.extend(san.names);
            }
        }
    }
    Ok(names)
}
