//! The issuance request and its validation rules.

use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::error::ValidationError;
use crate::key::KeyStrength;
use crate::serial::SerialNumber;

/// Everything needed to issue a CA or a leaf certificate.
///
/// Empty subject fields are left out of the certificate subject.
/// `subject_alt_names` is ignored for CA issuance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub organization: String,
    pub country: String,
    pub province: String,
    pub locality: String,
    pub street_address: String,
    pub postal_code: String,
    pub common_name: String,

    /// Certificate serial. Filled by the serial allocator at issuance when absent.
    pub serial_number: Option<SerialNumber>,
    /// Subject-level serial (DN serialNumber); also the ledger lookup key.
    pub name_serial_number: String,

    pub subject_alt_names: Vec<String>,

    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,

    /// RSA key size in bits. 0 means [`KeyStrength::default`].
    pub key_strength: usize,
}

impl Default for Request {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    /// A request valid from now until one day from now, with the default key strength.
    pub fn new() -> Self {
        let now = OffsetDateTime::now_utc();
        Request {
            organization: String::new(),
            country: String::new(),
            province: String::new(),
            locality: String::new(),
            street_address: String::new(),
            postal_code: String::new(),
            common_name: String::new(),
            serial_number: None,
            name_serial_number: String::new(),
            subject_alt_names: Vec::new(),
            not_before: now,
            not_after: now + Duration::days(1),
            key_strength: KeyStrength::default().bits(),
        }
    }

    pub fn with_common_name(common_name: impl Into<String>) -> Self {
        Request {
            common_name: common_name.into(),
            ..Self::new()
        }
    }

    /// Checks the request before any key material is generated.
    ///
    /// Checks run in order and the first failure wins: common name, key
    /// strength, subject alternative names.
    ///
    /// A `key_strength` of 0 is **rewritten** to the default (4096) before the
    /// key strength check. That is the only mutation this method performs.
    pub fn validate(&mut self) -> Result<(), ValidationError> {
        if self.common_name.is_empty() {
            return Err(ValidationError::InvalidCommonName);
        }

        if self.key_strength == 0 {
            self.key_strength = KeyStrength::default().bits();
        }

        if KeyStrength::from_bits(self.key_strength).is_none() {
            return Err(ValidationError::InvalidKeyStrength(self.key_strength));
        }

        if self.subject_alt_names.iter().any(String::is_empty) {
            return Err(ValidationError::InvalidSubjectAltName);
        }

        Ok(())
    }

    /// By-value form of [`Request::validate`], returning the adjusted request.
    pub fn validated(mut self) -> Result<Self, ValidationError> {
        self.validate()?;
        Ok(self)
    }

    /// Key strength of a validated request.
    pub fn resolved_key_strength(&self) -> Result<KeyStrength, ValidationError> {
        match self.key_strength {
            0 => Ok(KeyStrength::default()),
            bits => KeyStrength::from_bits(bits).ok_or(ValidationError::InvalidKeyStrength(bits)),
        }
    }

    /// Sets `name_serial_number` to a random UUID if it is empty, and returns it.
    ///
    /// Call before issuance so the value lands in the certificate subject.
    pub fn assign_name_serial_number(&mut self) -> &str {
        if self.name_serial_number.is_empty() {
            self.name_serial_number = Uuid::new_v4().to_string();
        }
        &self.name_serial_number
    }
}
