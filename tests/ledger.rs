use std::sync::Arc;
use std::thread;

use certledger::config::{LedgerConfig, SqlDialect};
use certledger::error::LedgerError;
use certledger::ledger::{CertificateRecord, CertificateStatus, FileLedger, Ledger, SqlLedger};
use tempfile::TempDir;
use time::macros::datetime;
use time::OffsetDateTime;

fn record(key: &str) -> CertificateRecord {
    CertificateRecord::new(key, format!("{key}.test.local"), datetime!(2031-05-01 12:00 UTC))
}

fn file_ledger(dir: &TempDir) -> Box<dyn Ledger> {
    LedgerConfig::File {
        path: dir.path().join("file.db"),
    }
    .connect()
    .unwrap()
}

fn sql_ledger(dir: &TempDir) -> Box<dyn Ledger> {
    LedgerConfig::Sql {
        dialect: SqlDialect::Sqlite,
        connection_string: dir.path().join("ledger.sqlite").display().to_string(),
    }
    .connect()
    .unwrap()
}

/// Runs `check` once against each backend.
fn each_backend(check: impl Fn(&dyn Ledger)) {
    for build in [file_ledger, sql_ledger] {
        let dir = tempfile::tempdir().unwrap();
        let ledger = build(&dir);
        check(ledger.as_ref());
    }
}

#[test]
fn create_then_get() {
    each_backend(|ledger| {
        let created = record("one");
        ledger.create(&created).unwrap();
        assert_eq!(ledger.get_by_name_serial_number("one").unwrap(), created);
        assert_eq!(ledger.get_by_uuid(created.uuid).unwrap(), created);
    });
}

#[test]
fn duplicate_create_keeps_original() {
    each_backend(|ledger| {
        let first = record("dup");
        ledger.create(&first).unwrap();

        let second = CertificateRecord {
            common_name: "other.test.local".to_string(),
            ..record("dup")
        };
        let err = ledger.create(&second).unwrap_err();
        assert!(err.is_duplicate(), "{err:?}");
        assert_eq!(ledger.get_by_name_serial_number("dup").unwrap(), first);
    });
}

#[test]
fn empty_key_is_refused() {
    each_backend(|ledger| {
        let err = ledger.create(&record("")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidRecord(_)), "{err:?}");
        assert!(matches!(
            ledger.get_by_name_serial_number(""),
            Err(LedgerError::NotFound(_))
        ));
        assert!(ledger.list().unwrap().is_empty());
    });
}

#[test]
fn missing_record_is_not_found() {
    each_backend(|ledger| {
        assert!(matches!(
            ledger.get_by_name_serial_number("absent"),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.get_by_uuid(uuid::Uuid::new_v4()),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.delete_by_name_serial_number("absent"),
            Err(LedgerError::NotFound(_))
        ));
        assert!(matches!(
            ledger.revoke("absent", OffsetDateTime::now_utc()),
            Err(LedgerError::NotFound(_))
        ));
    });
}

#[test]
fn delete_removes_record() {
    each_backend(|ledger| {
        ledger.create(&record("gone")).unwrap();
        ledger.delete_by_name_serial_number("gone").unwrap();
        assert!(matches!(
            ledger.get_by_name_serial_number("gone"),
            Err(LedgerError::NotFound(_))
        ));
        // the key is free again
        ledger.create(&record("gone")).unwrap();
    });
}

#[test]
fn revoke_sets_status_and_date() {
    each_backend(|ledger| {
        let created = record("rev");
        ledger.create(&created).unwrap();

        let at = datetime!(2030-02-03 04:05:06 UTC);
        let revoked = ledger.revoke("rev", at).unwrap();
        assert_eq!(revoked.status, CertificateStatus::Revoked);
        assert_eq!(revoked.revocation_date, Some(at));
        assert!(revoked.updated_at >= created.updated_at);
        assert_eq!(ledger.get_by_name_serial_number("rev").unwrap(), revoked);

        let again = ledger.revoke("rev", datetime!(2030-03-01 00:00 UTC)).unwrap();
        assert_eq!(again, revoked);
    });
}

#[test]
fn list_is_ordered_by_key() {
    each_backend(|ledger| {
        for key in ["c", "a", "b"] {
            ledger.create(&record(key)).unwrap();
        }
        let keys: Vec<String> = ledger
            .list()
            .unwrap()
            .into_iter()
            .map(|r| r.name_serial_number)
            .collect();
        assert_eq!(keys, ["a", "b", "c"]);
    });
}

#[test]
fn concurrent_creates_admit_one() {
    for build in [file_ledger, sql_ledger] {
        let dir = tempfile::tempdir().unwrap();
        let ledger: Arc<dyn Ledger> = Arc::from(build(&dir));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let ledger = Arc::clone(&ledger);
                thread::spawn(move || ledger.create(&record("race")))
            })
            .collect();
        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(
            results
                .iter()
                .filter_map(|r| r.as_ref().err())
                .all(LedgerError::is_duplicate)
        );
    }
}

#[test]
fn concurrent_distinct_creates_all_persist() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.db");
    let ledger = Arc::new(FileLedger::new(&path));
    ledger.open().unwrap();

    let handles: Vec<_> = (0..16)
        .map(|i| {
            let ledger = Arc::clone(&ledger);
            thread::spawn(move || ledger.create(&record(&format!("k{i:02}"))))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap().unwrap();
    }
    ledger.close().unwrap();

    let reopened = FileLedger::new(&path);
    reopened.open().unwrap();
    assert_eq!(reopened.list().unwrap().len(), 16);
}

#[test]
fn file_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.db");

    let stored = {
        let ledger = FileLedger::new(&path);
        ledger.open().unwrap();
        ledger.create(&record("persist")).unwrap();
        let stored = ledger
            .revoke("persist", datetime!(2030-01-01 00:00 UTC))
            .unwrap();
        ledger.close().unwrap();
        stored
    };

    let ledger = FileLedger::new(&path);
    ledger.open().unwrap();
    assert_eq!(ledger.get_by_name_serial_number("persist").unwrap(), stored);
}

#[test]
fn sql_ledger_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.sqlite").display().to_string();

    let ledger = SqlLedger::new(SqlDialect::Sqlite, path.clone());
    ledger.open().unwrap();
    ledger.provision().unwrap();
    let created = record("persist");
    ledger.create(&created).unwrap();
    ledger.close().unwrap();

    let ledger = SqlLedger::new(SqlDialect::Sqlite, path);
    ledger.open().unwrap();
    ledger.provision().unwrap();
    assert_eq!(ledger.get_by_name_serial_number("persist").unwrap(), created);
}

#[test]
fn snapshot_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("file.db");
    let ledger = FileLedger::new(&path);
    ledger.open().unwrap();
    let created = record("layout");
    ledger.create(&created).unwrap();

    let json: serde_json::Value =
        serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
    let last_sync = json["last_sync"].as_str().unwrap();
    assert!(
        OffsetDateTime::parse(last_sync, &time::format_description::well_known::Rfc3339).is_ok()
    );
    let entry = &json["certificates"]["layout"];
    assert_eq!(entry["uuid"], created.uuid.to_string());
    assert_eq!(entry["status"], "valid");
    assert_eq!(entry["common_name"], "layout.test.local");
    assert_eq!(entry["expiration_date"], "2031-05-01T12:00:00Z");
    assert!(entry["revocation_date"].is_null());
}
