//! JSON snapshot ledger.
//!
//! All records live in memory behind the state lock. Every mutation serializes
//! a full snapshot while still holding it, then writes the bytes under a
//! separate file lock. Snapshots carry a generation number and a writer that
//! finds a newer generation already on disk drops its own.
//!
//! Not safe to share one file between processes.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::{CertificateRecord, Ledger};
use crate::error::{LedgerError, LedgerResult};

#[derive(Serialize)]
struct SnapshotRef<'a> {
    #[serde(with = "time::serde::rfc3339")]
    last_sync: OffsetDateTime,
    certificates: &'a HashMap<String, CertificateRecord>,
}

#[derive(Deserialize)]
struct Snapshot {
    #[serde(default)]
    certificates: HashMap<String, CertificateRecord>,
}

#[derive(Default)]
struct State {
    open: bool,
    records: HashMap<String, CertificateRecord>,
    generation: u64,
}

impl State {
    fn records(&mut self) -> LedgerResult<&mut HashMap<String, CertificateRecord>> {
        if !self.open {
            return Err(LedgerError::ConnectionUnavailable);
        }
        Ok(&mut self.records)
    }
}

/// Ledger stored as a single JSON file.
pub struct FileLedger {
    path: PathBuf,
    state: Mutex<State>,
    /// Generation of the last snapshot written to disk.
    file: Mutex<u64>,
}

fn lock<T>(mutex: &Mutex<T>) -> LedgerResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| LedgerError::Database("ledger lock poisoned".to_string()))
}

impl FileLedger {
    /// A closed ledger backed by `path`. Nothing is touched until [`Ledger::open`].
    pub fn new(path: impl AsRef<Path>) -> Self {
        FileLedger {
            path: path.as_ref().to_path_buf(),
            state: Mutex::new(State::default()),
            file: Mutex::new(0),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(records: &HashMap<String, CertificateRecord>) -> LedgerResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(&SnapshotRef {
            last_sync: OffsetDateTime::now_utc(),
            certificates: records,
        })?)
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    /// Writes `bytes` unless a later generation is already on disk.
    fn write_snapshot(&self, generation: u64, bytes: &[u8]) -> LedgerResult<()> {
        let mut written = lock(&self.file)?;
        if generation <= *written {
            return Ok(());
        }

        let temp = self.temp_path();
        fs::write(&temp, bytes)?;
        fs::rename(&temp, &self.path)?;
        *written = generation;

        debug!(path = %self.path.display(), generation, "ledger snapshot written");
        Ok(())
    }

    /// Runs `f` on the open record map and persists the result.
    ///
    /// `f` may only change the entry under `key`. If the snapshot cannot be
    /// written that entry is put back as it was, unless another mutation has
    /// changed it since.
    fn mutate<T>(
        &self,
        key: &str,
        f: impl FnOnce(&mut HashMap<String, CertificateRecord>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let (value, previous, applied, generation, bytes) = {
            let mut state = lock(&self.state)?;
            let records = state.records()?;
            let previous = records.get(key).cloned();
            let value = f(records)?;
            let applied = records.get(key).cloned();
            state.generation += 1;
            let bytes = Self::encode(&state.records)?;
            (value, previous, applied, state.generation, bytes)
        };

        if let Err(err) = self.write_snapshot(generation, &bytes) {
            self.undo(key, previous, applied.as_ref());
            return Err(err);
        }
        Ok(value)
    }

    fn undo(
        &self,
        key: &str,
        previous: Option<CertificateRecord>,
        applied: Option<&CertificateRecord>,
    ) {
        let Ok(mut state) = lock(&self.state) else {
            return;
        };
        if state.records.get(key) != applied {
            return;
        }
        match previous {
            Some(record) => state.records.insert(key.to_string(), record),
            None => state.records.remove(key),
        };
        debug!(path = %self.path.display(), key, "ledger mutation rolled back");
    }

    fn read<T>(
        &self,
        f: impl FnOnce(&HashMap<String, CertificateRecord>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut state = lock(&self.state)?;
        f(&*state.records()?)
    }
}

impl Ledger for FileLedger {
    /// Loads the snapshot, creating an empty one if the file does not exist.
    fn open(&self) -> LedgerResult<()> {
        let mut state = lock(&self.state)?;

        if !self.path.exists() {
            let bytes = Self::encode(&HashMap::new())?;
            let temp = self.temp_path();
            fs::write(&temp, bytes)?;
            fs::rename(&temp, &self.path)?;
        }

        let snapshot: Snapshot = serde_json::from_slice(&fs::read(&self.path)?)?;
        state.records = snapshot.certificates;
        state.open = true;

        debug!(
            path = %self.path.display(),
            records = state.records.len(),
            "file ledger opened"
        );
        Ok(())
    }

    fn close(&self) -> LedgerResult<()> {
        let mut state = lock(&self.state)?;
        state.open = false;
        state.records.clear();
        debug!(path = %self.path.display(), "file ledger closed");
        Ok(())
    }

    /// The snapshot file is the whole schema; `open` already created it.
    fn provision(&self) -> LedgerResult<()> {
        let mut state = lock(&self.state)?;
        state.records()?;
        debug!(path = %self.path.display(), "file ledger provisioned");
        Ok(())
    }

    fn create(&self, record: &CertificateRecord) -> LedgerResult<()> {
        record.check_key()?;
        self.mutate(&record.name_serial_number, |records| {
            if records.contains_key(&record.name_serial_number) {
                return Err(LedgerError::DuplicateRecord(
                    record.name_serial_number.clone(),
                ));
            }
            records.insert(record.name_serial_number.clone(), record.clone());
            Ok(())
        })
    }

    fn get_by_name_serial_number(
        &self,
        name_serial_number: &str,
    ) -> LedgerResult<CertificateRecord> {
        self.read(|records| {
            records
                .get(name_serial_number)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(name_serial_number.to_string()))
        })
    }

    fn delete_by_name_serial_number(&self, name_serial_number: &str) -> LedgerResult<()> {
        self.mutate(name_serial_number, |records| {
            records
                .remove(name_serial_number)
                .map(|_| ())
                .ok_or_else(|| LedgerError::NotFound(name_serial_number.to_string()))
        })
    }

    fn revoke(
        &self,
        name_serial_number: &str,
        at: OffsetDateTime,
    ) -> LedgerResult<CertificateRecord> {
        self.mutate(name_serial_number, |records| {
            let record = records
                .get_mut(name_serial_number)
                .ok_or_else(|| LedgerError::NotFound(name_serial_number.to_string()))?;
            record.mark_revoked(at);
            Ok(record.clone())
        })
    }

    fn list(&self) -> LedgerResult<Vec<CertificateRecord>> {
        self.read(|records| {
            let mut all: Vec<_> = records.values().cloned().collect();
            all.sort_by(|a, b| a.name_serial_number.cmp(&b.name_serial_number));
            Ok(all)
        })
    }

    fn get_by_uuid(&self, uuid: Uuid) -> LedgerResult<CertificateRecord> {
        self.read(|records| {
            records
                .values()
                .find(|record| record.uuid == uuid)
                .cloned()
                .ok_or_else(|| LedgerError::NotFound(uuid.to_string()))
        })
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn record(key: &str) -> CertificateRecord {
        CertificateRecord::new(key, "file.test.local", datetime!(2031-01-01 00:00 UTC))
    }

    #[test]
    fn open_creates_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.db");
        let ledger = FileLedger::new(&path);
        ledger.open().unwrap();

        let json: serde_json::Value = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert!(json["last_sync"].is_string());
        assert_eq!(json["certificates"], serde_json::json!({}));
    }

    #[test]
    fn closed_ledger_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("file.db"));
        assert!(matches!(
            ledger.create(&record("a")),
            Err(LedgerError::ConnectionUnavailable)
        ));

        ledger.open().unwrap();
        ledger.create(&record("a")).unwrap();
        ledger.close().unwrap();
        assert!(matches!(
            ledger.get_by_name_serial_number("a"),
            Err(LedgerError::ConnectionUnavailable)
        ));
    }

    #[test]
    fn stale_generation_is_not_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.db");
        let ledger = FileLedger::new(&path);
        ledger.open().unwrap();
        ledger.create(&record("kept")).unwrap();
        let current = fs::read(&path).unwrap();

        ledger.write_snapshot(0, b"stale").unwrap();
        assert_eq!(fs::read(&path).unwrap(), current);
    }

    #[test]
    fn no_temp_file_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("file.db"));
        ledger.open().unwrap();
        ledger.create(&record("x")).unwrap();
        assert!(!ledger.temp_path().exists());
    }

    /// A directory at the temp path makes every snapshot write fail.
    fn block_writes(ledger: &FileLedger) {
        fs::create_dir(ledger.temp_path()).unwrap();
    }

    fn unblock_writes(ledger: &FileLedger) {
        fs::remove_dir(ledger.temp_path()).unwrap();
    }

    #[test]
    fn failed_create_leaves_no_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("file.db"));
        ledger.open().unwrap();

        block_writes(&ledger);
        assert!(matches!(
            ledger.create(&record("k")),
            Err(LedgerError::Io(_))
        ));
        assert!(matches!(
            ledger.get_by_name_serial_number("k"),
            Err(LedgerError::NotFound(_))
        ));

        unblock_writes(&ledger);
        ledger.create(&record("k")).unwrap();
        ledger.get_by_name_serial_number("k").unwrap();
    }

    #[test]
    fn failed_revoke_and_delete_restore_record() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = FileLedger::new(dir.path().join("file.db"));
        ledger.open().unwrap();
        let created = record("k");
        ledger.create(&created).unwrap();

        block_writes(&ledger);
        assert!(ledger.revoke("k", datetime!(2030-01-01 00:00 UTC)).is_err());
        assert_eq!(ledger.get_by_name_serial_number("k").unwrap(), created);

        assert!(ledger.delete_by_name_serial_number("k").is_err());
        assert_eq!(ledger.get_by_name_serial_number("k").unwrap(), created);

        unblock_writes(&ledger);
        ledger.delete_by_name_serial_number("k").unwrap();
    }

    #[test]
    fn corrupt_snapshot_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file.db");
        fs::write(&path, b"{ not json").unwrap();
        assert!(matches!(
            FileLedger::new(&path).open(),
            Err(LedgerError::Serialization(_))
        ));
    }
}
