//! Append-only attendance log on top of a `KeyValueStore`.
//!
//! The whole collection lives as one JSON array under a single key and is
//! rewritten on every append. Appends through one `RecordStore` are
//! serialized; two processes sharing a database still race, and the last
//! writer wins.

use crate::kv::{KeyValueStore, StoreError};
use rollcall_core::{AttendanceRecord, RecordFilter, ValidationError};
use std::sync::Mutex;
use thiserror::Error;

/// Storage key holding the serialized record array.
pub const RECORDS_KEY: &str = "attendanceRecords";

#[derive(Error, Debug)]
pub enum RecordStoreError {
    #[error("invalid record: {0}")]
    Validation(#[from] ValidationError),
    #[error("storage: {0}")]
    Storage(#[from] StoreError),
    #[error("failed to encode records: {0}")]
    Encode(serde_json::Error),
    #[error("stored records are corrupt: {0}")]
    Corrupt(serde_json::Error),
}

pub struct RecordStore<S> {
    kv: S,
    write_lock: Mutex<()>,
}

impl<S: KeyValueStore> RecordStore<S> {
    pub fn new(kv: S) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }

    /// Validate and append `record`. Existing entries are never touched;
    /// duplicates for the same student and day are kept.
    pub fn append(&self, record: AttendanceRecord) -> Result<(), RecordStoreError> {
        record.validate()?;

        let _guard = match self.write_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        // Raw entries are carried over untouched, unreadable ones included.
        let mut entries = self.load_raw_or_empty()?;
        entries.push(serde_json::to_value(&record).map_err(RecordStoreError::Encode)?);
        let encoded = serde_json::to_string(&entries).map_err(RecordStoreError::Encode)?;
        self.kv.set(RECORDS_KEY, &encoded)?;

        tracing::info!(
            student_id = %record.student_id,
            date = %record.date,
            method = %record.method,
            status = %record.status,
            total = entries.len(),
            "attendance record appended"
        );
        Ok(())
    }

    /// Every record, oldest first. Unreadable storage yields an empty list.
    pub fn query_all(&self) -> Vec<AttendanceRecord> {
        match self.load() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "treating attendance log as empty");
                Vec::new()
            }
        }
    }

    /// Records whose `date` equals `date` exactly.
    pub fn query_by_date(&self, date: &str) -> Vec<AttendanceRecord> {
        self.query_all()
            .into_iter()
            .filter(|r| r.date == date)
            .collect()
    }

    /// Records dated today in local time.
    pub fn query_today(&self) -> Vec<AttendanceRecord> {
        let today = chrono::Local::now()
            .date_naive()
            .format(rollcall_core::types::DATE_FORMAT)
            .to_string();
        self.query_by_date(&today)
    }

    pub fn query_filtered(&self, filter: &RecordFilter) -> Vec<AttendanceRecord> {
        self.query_all()
            .into_iter()
            .filter(|r| filter.matches(r))
            .collect()
    }

    fn load(&self) -> Result<Vec<AttendanceRecord>, RecordStoreError> {
        let records: Vec<AttendanceRecord> = self
            .load_raw()?
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(record) => Some(record),
                Err(err) => {
                    tracing::warn!(index, error = %err, "skipping unreadable attendance record");
                    None
                }
            })
            .collect();
        Ok(records)
    }

    fn load_raw(&self) -> Result<Vec<serde_json::Value>, RecordStoreError> {
        match self.kv.get(RECORDS_KEY)? {
            None => Ok(Vec::new()),
            Some(raw) => serde_json::from_str(&raw).map_err(RecordStoreError::Corrupt),
        }
    }

    /// Like `load_raw`, but a document that is not a JSON array is replaced
    /// instead of blocking writes. Backend errors still propagate.
    fn load_raw_or_empty(&self) -> Result<Vec<serde_json::Value>, RecordStoreError> {
        match self.load_raw() {
            Err(RecordStoreError::Corrupt(err)) => {
                tracing::warn!(error = %err, "overwriting corrupt attendance log");
                Ok(Vec::new())
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kv::{MemoryStore, SqliteStore};
    use rollcall_core::{Method, MethodFilter, Status};

    fn record(id: &str, name: &str, class: &str, method: Method) -> AttendanceRecord {
        AttendanceRecord {
            student_id: id.into(),
            student_name: name.into(),
            class: class.into(),
            date: "2024-01-15".into(),
            time: "08:15:30".into(),
            method,
            confidence: 98.5,
            status: Status::Present,
        }
    }

    fn emma() -> AttendanceRecord {
        record("ST001234", "Emma Thompson", "10-A", Method::Face)
    }

    #[test]
    fn test_append_then_query_all_round_trips() {
        let store = RecordStore::new(MemoryStore::new());
        store
            .append(record("ST000001", "James Wilson", "10-A", Method::Fingerprint))
            .unwrap();
        store.append(emma()).unwrap();

        let all = store.query_all();
        assert_eq!(all.len(), 2);
        assert_eq!(all.last(), Some(&emma()));
        assert_eq!(all[0].student_id, "ST000001");
    }

    #[test]
    fn test_invalid_records_are_not_stored() {
        let store = RecordStore::new(MemoryStore::new());
        store.append(emma()).unwrap();
        let before = store.query_all();

        for confidence in [150.0, -5.0] {
            let mut bad = emma();
            bad.confidence = confidence;
            assert!(matches!(
                store.append(bad),
                Err(RecordStoreError::Validation(ValidationError::ConfidenceOutOfRange(_)))
            ));
        }
        let mut bad = emma();
        bad.date = "2024-13-01".into();
        assert!(matches!(
            store.append(bad),
            Err(RecordStoreError::Validation(ValidationError::InvalidDate(_)))
        ));

        assert_eq!(store.query_all(), before);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let store = RecordStore::new(MemoryStore::new());
        store.append(emma()).unwrap();
        store.append(emma()).unwrap();
        assert_eq!(store.query_all(), vec![emma(), emma()]);
    }

    #[test]
    fn test_corrupt_storage_reads_as_empty() {
        let kv = MemoryStore::new();
        kv.set(RECORDS_KEY, "{not json").unwrap();
        let store = RecordStore::new(kv);
        assert!(store.query_all().is_empty());
        assert!(store.query_by_date("2024-01-15").is_empty());
    }

    #[test]
    fn test_append_recovers_from_corrupt_storage() {
        let kv = MemoryStore::new();
        kv.set(RECORDS_KEY, "{not json").unwrap();
        let store = RecordStore::new(kv);
        store.append(emma()).unwrap();
        assert_eq!(store.query_all(), vec![emma()]);
    }

    #[test]
    fn test_unreadable_entry_does_not_hide_or_erase_others() {
        let mut bad = serde_json::to_value(emma()).unwrap();
        bad["studentId"] = "ST000666".into();
        bad["confidence"] = serde_json::Value::Null;
        let doc = serde_json::Value::Array(vec![serde_json::to_value(emma()).unwrap(), bad]);

        let kv = MemoryStore::new();
        kv.set(RECORDS_KEY, &doc.to_string()).unwrap();
        let store = RecordStore::new(kv);
        assert_eq!(store.query_all(), vec![emma()]);

        let mut next = emma();
        next.student_id = "ST000777".into();
        store.append(next.clone()).unwrap();
        assert_eq!(store.query_all(), vec![emma(), next]);

        let raw: Vec<serde_json::Value> =
            serde_json::from_str(&store.kv.get(RECORDS_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(raw.len(), 3);
        assert_eq!(raw[1]["studentId"], "ST000666");
    }

    #[test]
    fn test_query_by_date() {
        let store = RecordStore::new(MemoryStore::new());
        store.append(emma()).unwrap();
        let mut next_day = emma();
        next_day.date = "2024-01-16".into();
        store.append(next_day.clone()).unwrap();

        assert_eq!(store.query_by_date("2024-01-16"), vec![next_day]);
        assert!(store.query_by_date("2024-01-17").is_empty());
    }

    #[test]
    fn test_query_filtered() {
        let store = RecordStore::new(MemoryStore::new());
        store.append(emma()).unwrap();
        store
            .append(record("ST000002", "Liam Chen", "10-A", Method::Fingerprint))
            .unwrap();
        store
            .append(record("ST000003", "Sofia Garcia", "10-B", Method::Face))
            .unwrap();

        let face = store.query_filtered(&RecordFilter::by_method(Method::Face));
        assert_eq!(face.len(), 2);
        assert!(face.iter().all(|r| r.method == Method::Face));

        let by_name = store.query_filtered(&RecordFilter::by_search("emma"));
        assert_eq!(by_name, vec![emma()]);

        let none = store.query_filtered(&RecordFilter::new(
            "liam",
            MethodFilter::Only(Method::Motion),
        ));
        assert!(none.is_empty());

        assert_eq!(store.query_filtered(&RecordFilter::default()).len(), 3);
    }

    #[test]
    fn test_query_today() {
        let store = RecordStore::new(MemoryStore::new());
        store.append(emma()).unwrap();
        let mut today = emma();
        today.date = chrono::Local::now().date_naive().format("%Y-%m-%d").to_string();
        store.append(today.clone()).unwrap();
        assert_eq!(store.query_today(), vec![today]);
    }

    #[test]
    fn test_concurrent_appends_lose_nothing() {
        let store = std::sync::Arc::new(RecordStore::new(MemoryStore::new()));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for j in 0..10 {
                        let mut r = emma();
                        r.student_id = format!("ST{i}{j:02}");
                        store.append(r).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(store.query_all().len(), 80);
    }

    #[test]
    fn test_sqlite_log_is_durable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance.db");
        {
            let store = RecordStore::new(SqliteStore::open(&path).unwrap());
            store.append(emma()).unwrap();
        }
        let store = RecordStore::new(SqliteStore::open(&path).unwrap());
        assert_eq!(store.query_all(), vec![emma()]);
    }
}
