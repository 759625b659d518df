//! Maps request fields onto the certificate subject.

use crate::cert::params::DistinguishedName;
use crate::request::Request;

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

/// Builds the subject distinguished name of `request`.
///
/// Empty fields are left out; `name_serial_number` becomes the DN serialNumber
/// attribute when set.
pub fn build_subject(request: &Request) -> DistinguishedName {
    DistinguishedName {
        common_name: request.common_name.clone(),
        country: non_empty(&request.country),
        province: non_empty(&request.province),
        locality: non_empty(&request.locality),
        street_address: non_empty(&request.street_address),
        postal_code: non_empty(&request.postal_code),
        organization: non_empty(&request.organization),
        serial_number: non_empty(&request.name_serial_number),
    }
}

/// Inverse of [`build_subject`] for the subject fields; everything else keeps
/// the [`Request::new`] defaults.
pub fn request_from_subject(subject: &DistinguishedName) -> Request {
    let field = |value: &Option<String>| value.clone().unwrap_or_default();
    Request {
        common_name: subject.common_name.clone(),
        country: field(&subject.country),
        province: field(&subject.province),
        locality: field(&subject.locality),
        street_address: field(&subject.street_address),
        postal_code: field(&subject.postal_code),
        organization: field(&subject.organization),
        name_serial_number: field(&subject.serial_number),
        ..Request::new()
    }
}
