//! The certificate ledger: a metadata record per issued certificate, keyed by
//! its name serial number.
//!
//! The ledger never stores key material or certificate bytes.

pub mod file;
pub mod sql;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::engine::IssuedCertificate;
use crate::error::{LedgerError, LedgerResult};

pub use file::FileLedger;
pub use sql::SqlLedger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateStatus {
    Valid,
    Revoked,
}

impl CertificateStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            CertificateStatus::Valid => "valid",
            CertificateStatus::Revoked => "revoked",
        }
    }
}

impl fmt::Display for CertificateStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateStatus {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "valid" => Ok(CertificateStatus::Valid),
            "revoked" => Ok(CertificateStatus::Revoked),
            other => Err(LedgerError::Database(format!(
                "unknown certificate status {other:?}"
            ))),
        }
    }
}

/// Metadata about one issued certificate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateRecord {
    pub uuid: Uuid,
    pub status: CertificateStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub expiration_date: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub revocation_date: Option<OffsetDateTime>,
    /// Uniqueness and lookup key.
    pub name_serial_number: String,
    /// Decimal certificate serial. Informational, not unique.
    #[serde(default)]
    pub serial_number: Option<String>,
    pub common_name: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl CertificateRecord {
    /// A fresh `valid` record with a random UUID.
    pub fn new(
        name_serial_number: impl Into<String>,
        common_name: impl Into<String>,
        expiration_date: OffsetDateTime,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        CertificateRecord {
            uuid: Uuid::new_v4(),
            status: CertificateStatus::Valid,
            expiration_date: expiration_date.to_offset(time::UtcOffset::UTC),
            revocation_date: None,
            name_serial_number: name_serial_number.into(),
            serial_number: None,
            common_name: common_name.into(),
            created_at: now,
            updated_at: now,
        }
    }

    /// The record to persist for a successful issuance.
    ///
    /// Call [`Request::assign_name_serial_number`](crate::request::Request::assign_name_serial_number)
    /// before issuing so the record has a lookup key. Ledgers refuse a record
    /// without one.
    pub fn from_issued(issued: &IssuedCertificate) -> Self {
        let request = issued.request();
        CertificateRecord {
            serial_number: request.serial_number.as_ref().map(ToString::to_string),
            ..CertificateRecord::new(
                request.name_serial_number.clone(),
                request.common_name.clone(),
                request.not_after,
            )
        }
    }

    /// Rejects a record with an empty name serial number.
    pub(crate) fn check_key(&self) -> LedgerResult<()> {
        if self.name_serial_number.is_empty() {
            return Err(LedgerError::InvalidRecord(format!(
                "certificate {} has no name serial number",
                self.uuid
            )));
        }
        Ok(())
    }

    pub fn is_revoked(&self) -> bool {
        self.status == CertificateStatus::Revoked
    }

    /// Applies a revocation at `at`. A revoked record is left untouched.
    pub(crate) fn mark_revoked(&mut self, at: OffsetDateTime) {
        if self.is_revoked() {
            return;
        }
        self.status = CertificateStatus::Revoked;
        self.revocation_date = Some(at);
        self.updated_at = OffsetDateTime::now_utc();
    }
}

/// Persistent store of [`CertificateRecord`]s.
///
/// `name_serial_number` is unique: creating a second record with the same key
/// fails with [`LedgerError::DuplicateRecord`] and leaves the first one in place,
/// also when two creates race. An empty key is refused with
/// [`LedgerError::InvalidRecord`].
pub trait Ledger: Send + Sync {
    fn open(&self) -> LedgerResult<()>;

    fn close(&self) -> LedgerResult<()>;

    /// Prepares the backing storage. Safe to call more than once.
    fn provision(&self) -> LedgerResult<()>;

    fn create(&self, record: &CertificateRecord) -> LedgerResult<()>;

    fn get_by_name_serial_number(&self, name_serial_number: &str)
    -> LedgerResult<CertificateRecord>;

    /// Removes the record. Fails with [`LedgerError::NotFound`] if there is none.
    fn delete_by_name_serial_number(&self, name_serial_number: &str) -> LedgerResult<()>;

    /// Marks the record revoked at `at` and returns it.
    ///
    /// Revoking a revoked record returns it unchanged.
    fn revoke(&self, name_serial_number: &str, at: OffsetDateTime)
    -> LedgerResult<CertificateRecord>;

    /// All records, ordered by name serial number.
    fn list(&self) -> LedgerResult<Vec<CertificateRecord>> {
        Err(LedgerError::NotImplemented("list"))
    }

    fn get_by_uuid(&self, _uuid: Uuid) -> LedgerResult<CertificateRecord> {
        Err(LedgerError::NotImplemented("get_by_uuid"))
    }
}
