//! The issuance workflow: validate, build the subject, resolve the serial,
//! build the template, sign, encode.
//!
//! Every call is independent and either returns both PEM blobs or an error.
//! Nothing is retried.

use der::flagset::FlagSet;
use tracing::{debug, trace};

use crate::cert::extensions::{ExtendedKeyUsageOption, KeyUsages};
use crate::cert::params::{CertificateTemplate, Validity};
use crate::cert::{Certificate, CertificateAuthority};
use crate::csr::read_csr;
use crate::error::{CryptoError, IssueError, IssueResult};
use crate::issuer::{Issuer, SelfIssuer};
use crate::key::KeyPair;
use crate::request::Request;
use crate::serial::next_serial;
use crate::subject::build_subject;

/// Progress of a single issuance call, reported through `tracing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Received,
    Validated,
    SubjectBuilt,
    SerialResolved,
    TemplateBuilt,
    Signed,
    Encoded,
    Failed,
}

fn enter(stage: Stage, request: &Request) {
    trace!(?stage, common_name = %request.common_name, "issuance stage");
}

fn failed(err: &IssueError) {
    trace!(stage = ?Stage::Failed, error = %err, "issuance stage");
}

/// Output of a successful issuance.
#[derive(Debug, Clone)]
pub struct IssuedCertificate {
    request: Request,
    pub certificate_pem: String,
    pub private_key_pem: String,
}

impl IssuedCertificate {
    /// The request as issued, with its serial number resolved.
    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn certificate(&self) -> Result<Certificate, CryptoError> {
        Certificate::from_pem(&self.certificate_pem)
    }
}

/// The kind of certificate being issued.
enum Profile {
    Authority,
    Leaf,
}

impl Profile {
    fn key_usage(&self) -> FlagSet<KeyUsages> {
        match self {
            Profile::Authority => KeyUsages::DigitalSignature | KeyUsages::KeyCertSign,
            Profile::Leaf => KeyUsages::DigitalSignature.into(),
        }
    }
}

/// Runs every step up to and including the template. The serial is resolved
/// in place so the returned request is the one that gets issued.
fn prepare(
    mut request: Request,
    profile: &Profile,
) -> IssueResult<(Request, KeyPair, CertificateTemplate)> {
    enter(Stage::Received, &request);
    request.validate()?;
    enter(Stage::Validated, &request);

    let subject = build_subject(&request);
    enter(Stage::SubjectBuilt, &request);

    if request.serial_number.is_none() {
        request.serial_number = Some(next_serial()?);
    }
    let serial_number = request
        .serial_number
        .clone()
        .ok_or_else(|| CryptoError::InvalidInput("serial number unresolved".to_string()))?;
    enter(Stage::SerialResolved, &request);

    let key = KeyPair::generate(request.resolved_key_strength()?)?;

    let dns_names = match profile {
        Profile::Authority => Vec::new(),
        Profile::Leaf => request.subject_alt_names.clone(),
    };

    let template = CertificateTemplate::builder()
        .subject(subject)
        .subject_public_key(key.public_key())
        .serial_number(serial_number)
        .validity(Validity {
            not_before: request.not_before,
            not_after: request.not_after,
        })
        .is_ca(matches!(profile, Profile::Authority))
        .key_usage(profile.key_usage())
        .usages(vec![
            ExtendedKeyUsageOption::ClientAuth,
            ExtendedKeyUsageOption::ServerAuth,
        ])
        .dns_names(dns_names)
        .build();
    enter(Stage::TemplateBuilt, &request);

    Ok((request, key, template))
}

fn finish(request: Request, key: &KeyPair, cert: Certificate) -> IssueResult<IssuedCertificate> {
    enter(Stage::Signed, &request);

    let issued = IssuedCertificate {
        certificate_pem: cert.to_pem()?,
        private_key_pem: key.to_pkcs1_pem()?,
        request,
    };
    enter(Stage::Encoded, &issued.request);

    debug!(
        common_name = %issued.request.common_name,
        serial_number = ?issued.request.serial_number.as_ref().map(ToString::to_string),
        "certificate issued"
    );
    Ok(issued)
}

/// Issues a self-signed CA certificate and its private key.
///
/// Only the common name is required. Subject alternative names are ignored.
pub fn issue_ca(request: Request) -> IssueResult<IssuedCertificate> {
    let issue = || -> IssueResult<IssuedCertificate> {
        let (request, key, template) = prepare(request, &Profile::Authority)?;

        let issuer = SelfIssuer {
            name: template.subject.as_x509_name()?,
            key: &key,
        };
        let cert = issuer.issue(&template)?;

        finish(request, &key, cert)
    };
    issue().inspect_err(failed)
}

/// Issues a leaf certificate signed by the CA in `ca_cert_pem` / `ca_key_pem`.
///
/// The request is validated before the CA material is loaded, so a malformed
/// request is reported as a validation error even when the CA is unusable.
pub fn issue_leaf(
    request: Request,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> IssueResult<IssuedCertificate> {
    let issue = || -> IssueResult<IssuedCertificate> {
        let request = request.validated()?;
        let authority = CertificateAuthority::from_pem(ca_cert_pem, ca_key_pem)?;

        let (request, key, template) = prepare(request, &Profile::Leaf)?;
        let cert = authority.issue(&template)?;

        finish(request, &key, cert)
    };
    issue().inspect_err(failed)
}

/// Decodes `csr_pem` into a request and issues it as [`issue_leaf`] does.
///
/// A fresh key pair is generated; the public key in the CSR is not used.
pub fn issue_leaf_from_csr(
    csr_pem: &str,
    ca_cert_pem: &str,
    ca_key_pem: &str,
) -> IssueResult<IssuedCertificate> {
    let request = read_csr(csr_pem).map_err(IssueError::from).inspect_err(failed)?;
    issue_leaf(request, ca_cert_pem, ca_key_pem)
}
