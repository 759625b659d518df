#![allow(dead_code)]

use certledger::cert::extensions::{SubjectAltName, ToAndFromX509Extension};
use certledger::cert::params::DistinguishedName;
use certledger::engine::{self, IssuedCertificate};
use certledger::key::{KeyPair, KeyStrength};
use certledger::pem_utils;
use certledger::request::Request;
use certledger::tbs_certificate::signature_algorithm;
use const_oid::AssociatedOid;
use der::asn1::{Any, BitString, OctetString, SetOfVec};
use der::Encode;
use x509_cert::attr::Attribute;
use x509_cert::ext::Extension;
use x509_cert::request::{CertReq, CertReqInfo, ExtensionReq, Version};

/// A request with a fast key size.
pub fn request(common_name: &str) -> Request {
    Request {
        key_strength: KeyStrength::Rsa2048.bits(),
        ..Request::with_common_name(common_name)
    }
}

pub fn issue_ca() -> IssuedCertificate {
    engine::issue_ca(Request {
        organization: "Test Org".to_string(),
        country: "NL".to_string(),
        ..request("test.local")
    })
    .unwrap()
}

/// Builds a signed PKCS#10 request for `subject` asking for `dns_names`.
pub fn build_csr(subject: &DistinguishedName, dns_names: &[&str]) -> String {
    let key = KeyPair::generate(KeyStrength::Rsa2048).unwrap();

    let mut attributes = SetOfVec::new();
    if !dns_names.is_empty() {
        let san = SubjectAltName {
            names: dns_names.iter().map(|name| name.to_string()).collect(),
        };
        let request = ExtensionReq(vec![Extension {
            extn_id: SubjectAltName::OID,
            critical: false,
            extn_value: OctetString::new(san.to_x509_extension_value().unwrap()).unwrap(),
        }]);
        let mut values = SetOfVec::new();
        values.insert(Any::encode_from(&request).unwrap()).unwrap();
        attributes
            .insert(Attribute {
                oid: ExtensionReq::OID,
                values,
            })
            .unwrap();
    }

    let info = CertReqInfo {
        version: Version::V1,
        subject: subject.as_x509_name().unwrap(),
        public_key: key.public_key().to_spki().unwrap(),
        attributes,
    };
    let signature = key.sign_data(&info.to_der().unwrap()).unwrap();
    let csr = CertReq {
        info,
        algorithm: signature_algorithm(),
        signature: BitString::from_bytes(&signature).unwrap(),
    };

    pem_utils::encode("CERTIFICATE REQUEST", &csr.to_der().unwrap())
}
