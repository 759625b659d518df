//! SQLite ledger.

use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, ffi, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;
use uuid::Uuid;

use super::{CertificateRecord, Ledger};
use crate::error::{LedgerError, LedgerResult};

/// SQL dialects the ledger can speak.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
}

const CREATE_TABLE: &str = "CREATE TABLE IF NOT EXISTS certificates (
    uuid TEXT NOT NULL PRIMARY KEY,
    status TEXT NOT NULL,
    expiration_date TEXT NOT NULL,
    revocation_date TEXT,
    name_serial_number TEXT NOT NULL UNIQUE,
    serial_number TEXT,
    common_name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
)";

const COLUMNS: &str = "uuid, status, expiration_date, revocation_date, name_serial_number, \
                       serial_number, common_name, created_at, updated_at";

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref e, ref message)
                if e.extended_code == ffi::SQLITE_CONSTRAINT_UNIQUE =>
            {
                LedgerError::DuplicateRecord(message.clone().unwrap_or_else(|| err.to_string()))
            }
            rusqlite::Error::QueryReturnedNoRows => LedgerError::NotFound(err.to_string()),
            other => LedgerError::Database(other.to_string()),
        }
    }
}

fn format_time(value: OffsetDateTime) -> LedgerResult<String> {
    value
        .format(&Rfc3339)
        .map_err(|e| LedgerError::Database(format!("cannot format timestamp: {e}")))
}

fn parse_time(value: &str) -> LedgerResult<OffsetDateTime> {
    OffsetDateTime::parse(value, &Rfc3339)
        .map_err(|e| LedgerError::Database(format!("bad timestamp {value:?}: {e}")))
}

/// Columns as stored, before conversion into a [`CertificateRecord`].
struct StoredRow {
    uuid: String,
    status: String,
    expiration_date: String,
    revocation_date: Option<String>,
    name_serial_number: String,
    serial_number: Option<String>,
    common_name: String,
    created_at: String,
    updated_at: String,
}

impl StoredRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(StoredRow {
            uuid: row.get(0)?,
            status: row.get(1)?,
            expiration_date: row.get(2)?,
            revocation_date: row.get(3)?,
            name_serial_number: row.get(4)?,
            serial_number: row.get(5)?,
            common_name: row.get(6)?,
            created_at: row.get(7)?,
            updated_at: row.get(8)?,
        })
    }

    fn into_record(self) -> LedgerResult<CertificateRecord> {
        Ok(CertificateRecord {
            uuid: Uuid::parse_str(&self.uuid)
                .map_err(|e| LedgerError::Database(format!("bad uuid {:?}: {e}", self.uuid)))?,
            status: self.status.parse()?,
            expiration_date: parse_time(&self.expiration_date)?,
            revocation_date: self.revocation_date.as_deref().map(parse_time).transpose()?,
            name_serial_number: self.name_serial_number,
            serial_number: self.serial_number,
            common_name: self.common_name,
            created_at: parse_time(&self.created_at)?,
            updated_at: parse_time(&self.updated_at)?,
        })
    }
}

/// Ledger stored in an SQL database.
///
/// All statements run on one connection behind a mutex; uniqueness of
/// `name_serial_number` is enforced by the table constraint.
pub struct SqlLedger {
    dialect: SqlDialect,
    connection_string: String,
    conn: Mutex<Option<Connection>>,
}

impl SqlLedger {
    /// A closed ledger. `connection_string` is a file path or `:memory:`.
    pub fn new(dialect: SqlDialect, connection_string: impl Into<String>) -> Self {
        SqlLedger {
            dialect,
            connection_string: connection_string.into(),
            conn: Mutex::new(None),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    fn lock(&self) -> LedgerResult<MutexGuard<'_, Option<Connection>>> {
        self.conn
            .lock()
            .map_err(|_| LedgerError::Database("ledger lock poisoned".to_string()))
    }

    /// Runs `f` with the open connection.
    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> LedgerResult<T>) -> LedgerResult<T> {
        let guard = self.lock()?;
        let conn = guard.as_ref().ok_or(LedgerError::ConnectionUnavailable)?;
        f(conn)
    }

    fn find(conn: &Connection, name_serial_number: &str) -> LedgerResult<CertificateRecord> {
        conn.query_row(
            &format!("SELECT {COLUMNS} FROM certificates WHERE name_serial_number = ?1"),
            params![name_serial_number],
            StoredRow::from_row,
        )
        .optional()?
        .ok_or_else(|| LedgerError::NotFound(name_serial_number.to_string()))?
        .into_record()
    }
}

impl Ledger for SqlLedger {
    fn open(&self) -> LedgerResult<()> {
        let mut guard = self.lock()?;
        let conn = match self.dialect {
            SqlDialect::Sqlite => Connection::open(&self.connection_string)?,
        };
        *guard = Some(conn);
        debug!(dialect = ?self.dialect, "sql ledger opened");
        Ok(())
    }

    fn close(&self) -> LedgerResult<()> {
        let mut guard = self.lock()?;
        if let Some(conn) = guard.take() {
            conn.close().map_err(|(_, e)| LedgerError::from(e))?;
        }
        debug!(dialect = ?self.dialect, "sql ledger closed");
        Ok(())
    }

    fn provision(&self) -> LedgerResult<()> {
        self.with_conn(|conn| {
            conn.execute_batch(CREATE_TABLE)?;
            debug!(dialect = ?self.dialect, "sql ledger provisioned");
            Ok(())
        })
    }

    fn create(&self, record: &CertificateRecord) -> LedgerResult<()> {
        record.check_key()?;
        self.with_conn(|conn| {
            let inserted = conn.execute(
                &format!(
                    "INSERT INTO certificates ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    record.uuid.to_string(),
                    record.status.as_str(),
                    format_time(record.expiration_date)?,
                    record.revocation_date.map(format_time).transpose()?,
                    record.name_serial_number,
                    record.serial_number,
                    record.common_name,
                    format_time(record.created_at)?,
                    format_time(record.updated_at)?,
                ],
            );
            match inserted {
                Ok(_) => Ok(()),
                Err(e) => match LedgerError::from(e) {
                    LedgerError::DuplicateRecord(_) => Err(LedgerError::DuplicateRecord(
                        record.name_serial_number.clone(),
                    )),
                    other => Err(other),
                },
            }
        })
    }

    fn get_by_name_serial_number(
        &self,
        name_serial_number: &str,
    ) -> LedgerResult<CertificateRecord> {
        self.with_conn(|conn| Self::find(conn, name_serial_number))
    }

    fn delete_by_name_serial_number(&self, name_serial_number: &str) -> LedgerResult<()> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM certificates WHERE name_serial_number = ?1",
                params![name_serial_number],
            )?;
            if deleted == 0 {
                return Err(LedgerError::NotFound(name_serial_number.to_string()));
            }
            Ok(())
        })
    }

    fn revoke(
        &self,
        name_serial_number: &str,
        at: OffsetDateTime,
    ) -> LedgerResult<CertificateRecord> {
        self.with_conn(|conn| {
            let mut record = Self::find(conn, name_serial_number)?;
            if record.is_revoked() {
                return Ok(record);
            }
            record.mark_revoked(at);
            conn.execute(
                "UPDATE certificates SET status = ?1, revocation_date = ?2, updated_at = ?3 \
                 WHERE name_serial_number = ?4",
                params![
                    record.status.as_str(),
                    record.revocation_date.map(format_time).transpose()?,
                    format_time(record.updated_at)?,
                    name_serial_number,
                ],
            )?;
            Ok(record)
        })
    }

    fn list(&self) -> LedgerResult<Vec<CertificateRecord>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM certificates ORDER BY name_serial_number"
            ))?;
            let rows = stmt.query_map([], StoredRow::from_row)?;
            rows.map(|row| row?.into_record()).collect()
        })
    }

    fn get_by_uuid(&self, uuid: Uuid) -> LedgerResult<CertificateRecord> {
        self.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {COLUMNS} FROM certificates WHERE uuid = ?1"),
                params![uuid.to_string()],
                StoredRow::from_row,
            )
            .optional()?
            .ok_or_else(|| LedgerError::NotFound(uuid.to_string()))?
            .into_record()
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn memory() -> SqlLedger {
        let ledger = SqlLedger::new(SqlDialect::Sqlite, ":memory:");
        ledger.open().unwrap();
        ledger.provision().unwrap();
        ledger
    }

    #[test]
    fn provision_is_idempotent() {
        let ledger = memory();
        ledger.provision().unwrap();
        ledger.provision().unwrap();
    }

    #[test]
    fn unopened_ledger_is_unavailable() {
        let ledger = SqlLedger::new(SqlDialect::Sqlite, ":memory:");
        assert!(matches!(
            ledger.provision(),
            Err(LedgerError::ConnectionUnavailable)
        ));
    }

    #[test]
    fn closed_ledger_is_unavailable() {
        let ledger = memory();
        ledger.close().unwrap();
        assert!(matches!(
            ledger.get_by_name_serial_number("x"),
            Err(LedgerError::ConnectionUnavailable)
        ));
        // closing twice is harmless
        ledger.close().unwrap();
    }

    #[test]
    fn duplicate_is_reported_with_key() {
        let ledger = memory();
        let record = CertificateRecord::new("dup", "cn", datetime!(2031-01-01 00:00 UTC));
        ledger.create(&record).unwrap();

        let again = CertificateRecord::new("dup", "other", datetime!(2031-01-01 00:00 UTC));
        match ledger.create(&again) {
            Err(LedgerError::DuplicateRecord(key)) => assert_eq!(key, "dup"),
            other => panic!("expected duplicate, got {other:?}"),
        }
        assert_eq!(ledger.get_by_name_serial_number("dup").unwrap(), record);
    }

    #[test]
    fn uuid_collision_is_not_a_duplicate() {
        let ledger = memory();
        let record = CertificateRecord::new("first", "cn", datetime!(2031-01-01 00:00 UTC));
        ledger.create(&record).unwrap();

        let same_uuid = CertificateRecord {
            name_serial_number: "second".to_string(),
            ..record.clone()
        };
        assert!(matches!(
            ledger.create(&same_uuid),
            Err(LedgerError::Database(_))
        ));
        assert!(matches!(
            ledger.get_by_name_serial_number("second"),
            Err(LedgerError::NotFound(_))
        ));
    }

    #[test]
    fn no_rows_maps_to_not_found() {
        assert!(matches!(
            LedgerError::from(rusqlite::Error::QueryReturnedNoRows),
            LedgerError::NotFound(_)
        ));
    }

    #[test]
    fn unknown_status_is_a_database_error() {
        let ledger = memory();
        ledger
            .with_conn(|conn| {
                conn.execute(
                    &format!("INSERT INTO certificates ({COLUMNS}) VALUES ('00000000-0000-0000-0000-000000000000', 'expired', '2031-01-01T00:00:00Z', NULL, 'odd', NULL, 'cn', '2030-01-01T00:00:00Z', '2030-01-01T00:00:00Z')"),
                    [],
                )?;
                Ok(())
            })
            .unwrap();
        assert!(matches!(
            ledger.get_by_name_serial_number("odd"),
            Err(LedgerError::Database(_))
        ));
    }
}
