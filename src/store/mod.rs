//! Durable, deduplicating, order-preserving record storage.
//!
//! One in-process mutex serializes every read-modify-persist sequence. An
//! advisory file lock, held only while writing, keeps a second process
//! instance pointed at the same data directory from interleaving writes.
//! Every persistence cycle writes a temp file and atomically renames it over
//! the target, so a reader never observes a partially-written file and a
//! crash mid-write leaves the previous complete file in place.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde_json::{Map, Value};

use crate::config::StorePaths;
use crate::errors::MetaError;
use crate::models::{PaperRecord, CSV_COLUMNS, EDITABLE_COLUMNS};

/// Authoritative collection of [`PaperRecord`]s, shared across concurrent
/// requests within one process.
pub struct RecordStore {
    paths: StorePaths,
    records: Mutex<Vec<PaperRecord>>,
    file_lock: FileLock,
}

impl RecordStore {
    /// Load the store from its canonical JSON snapshot. Malformed or missing
    /// JSON degrades to an empty store; the load immediately re-persists,
    /// self-healing the companion export files.
    pub fn open(paths: StorePaths) -> Result<Self, MetaError> {
        let records = load_snapshot(&paths.records_json);
        tracing::info!(
            "loaded {} record(s) from {}",
            records.len(),
            paths.records_json.display()
        );
        let store = Self {
            file_lock: FileLock::new(paths.lock_file.clone()),
            paths,
            records: Mutex::new(records),
        };
        {
            let records = store.lock_records();
            store.persist(&records)?;
        }
        Ok(store)
    }

    /// Insert, or replace the record with the same id. Persists and returns
    /// the stored value.
    pub fn upsert(&self, record: PaperRecord) -> Result<PaperRecord, MetaError> {
        let mut records = self.lock_records();
        match records.iter_mut().find(|existing| existing.id == record.id) {
            Some(existing) => *existing = record.clone(),
            None => records.push(record.clone()),
        }
        self.persist(&records)?;
        Ok(record)
    }

    /// Exact-id lookup.
    pub fn get_by_id(&self, record_id: &str) -> Option<PaperRecord> {
        self.lock_records()
            .iter()
            .find(|record| record.id == record_id)
            .cloned()
    }

    /// Normalized (trim + lowercase) exact DOI match; `None` for an empty DOI.
    pub fn find_by_doi(&self, doi: &str) -> Option<PaperRecord> {
        let normalized = normalize_doi(doi);
        if normalized.is_empty() {
            return None;
        }
        self.lock_records()
            .iter()
            .find(|record| normalize_doi(&record.doi) == normalized)
            .cloned()
    }

    /// Remove a record by id. Returns whether anything was removed.
    pub fn delete(&self, record_id: &str) -> Result<bool, MetaError> {
        let mut records = self.lock_records();
        let before = records.len();
        records.retain(|record| record.id != record_id);
        if records.len() == before {
            return Ok(false);
        }
        self.persist(&records)?;
        Ok(true)
    }

    /// Total reordering: known ids first in the requested order, unknown ids
    /// ignored, records missing from the request appended in their current
    /// relative order.
    pub fn reorder(&self, order: &[String]) -> Result<(), MetaError> {
        let mut records = self.lock_records();
        let mut reordered: Vec<PaperRecord> = Vec::with_capacity(records.len());
        for record_id in order {
            if reordered.iter().any(|record| &record.id == record_id) {
                continue;
            }
            if let Some(record) = records.iter().find(|record| &record.id == record_id) {
                reordered.push(record.clone());
            }
        }
        for record in records.iter() {
            if !reordered.iter().any(|kept| kept.id == record.id) {
                reordered.push(record.clone());
            }
        }
        *records = reordered;
        self.persist(&records)
    }

    /// Merge edits onto a record's legacy representation and rebuild it.
    /// Update keys are restricted to [`EDITABLE_COLUMNS`]; validation happens
    /// before any mutation.
    pub fn update_fields(
        &self,
        record_id: &str,
        updates: &Map<String, Value>,
    ) -> Result<PaperRecord, MetaError> {
        if updates.is_empty() {
            return Err(MetaError::Validation("no updates provided".to_string()));
        }
        for field in updates.keys() {
            if !EDITABLE_COLUMNS.contains(&field.as_str()) {
                return Err(MetaError::Validation(format!(
                    "field {field} is not editable"
                )));
            }
        }

        let mut records = self.lock_records();
        let position = records
            .iter()
            .position(|record| record.id == record_id)
            .ok_or_else(|| MetaError::RecordNotFound(record_id.to_string()))?;

        let mut legacy = match records[position].to_legacy() {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        for (key, value) in updates {
            legacy.insert(key.clone(), value.clone());
        }
        let updated = PaperRecord::from_legacy(&legacy);
        records[position] = updated.clone();
        self.persist(&records)?;
        Ok(updated)
    }

    /// Legacy-shaped rows in store order.
    pub fn snapshot(&self) -> Vec<Value> {
        self.lock_records()
            .iter()
            .map(PaperRecord::to_legacy)
            .collect()
    }

    /// Legacy-shaped rows newest-first, for listings.
    pub fn reversed_snapshot(&self) -> Vec<Value> {
        self.lock_records()
            .iter()
            .rev()
            .map(PaperRecord::to_legacy)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock_records().is_empty()
    }

    /// Force a persistence cycle with no logical change, so the on-disk copy
    /// matches in-memory state before an export file is served.
    pub fn flush(&self) -> Result<(), MetaError> {
        let records = self.lock_records();
        self.persist(&records)
    }

    /// Render the full record set to the fixed-column spreadsheet file and
    /// atomically replace the target path.
    pub fn export_spreadsheet(&self) -> Result<PathBuf, MetaError> {
        let records = self.lock_records();
        let data = csv_bytes(&records)?;
        let _guard = self.file_lock.acquire()?;
        atomic_write(&self.paths.export_csv, &data)?;
        Ok(self.paths.export_csv.clone())
    }

    fn lock_records(&self) -> MutexGuard<'_, Vec<PaperRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Write the JSON snapshot and its CSV companion. Caller holds the record
    /// mutex; the advisory file lock is scoped to this write step.
    fn persist(&self, records: &[PaperRecord]) -> Result<(), MetaError> {
        let rows: Vec<Value> = records.iter().map(PaperRecord::to_legacy).collect();
        let json = serde_json::to_vec_pretty(&rows)?;
        let csv = csv_bytes(records)?;

        let _guard = self.file_lock.acquire()?;
        atomic_write(&self.paths.records_json, &json)?;
        atomic_write(&self.paths.records_csv, &csv)?;
        tracing::debug!("persisted {} record(s)", records.len());
        Ok(())
    }
}

fn normalize_doi(doi: &str) -> String {
    doi.trim().to_lowercase()
}

fn load_snapshot(path: &Path) -> Vec<PaperRecord> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => return Vec::new(),
    };
    let rows: Vec<Value> = match serde_json::from_str(&raw) {
        Ok(Value::Array(rows)) => rows,
        Ok(_) | Err(_) => {
            tracing::warn!("malformed snapshot at {}, starting empty", path.display());
            return Vec::new();
        }
    };
    rows.iter()
        .filter_map(Value::as_object)
        .map(PaperRecord::from_legacy)
        .collect()
}

fn csv_bytes(records: &[PaperRecord]) -> Result<Vec<u8>, MetaError> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(CSV_COLUMNS)?;
    for record in records {
        let year = record
            .publication_year
            .map(|year| year.to_string())
            .unwrap_or_default();
        writer.write_record([
            record.title.as_str(),
            record.venue.as_str(),
            year.as_str(),
            record.author_list.as_str(),
            record.abstract_text.as_str(),
            record.doi.as_str(),
        ])?;
    }
    writer
        .into_inner()
        .map_err(|err| MetaError::Storage(err.to_string()))
}

/// Write `data` to a sibling temp path, then rename over the target. Rename
/// is the only step that makes the new version visible.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), MetaError> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&tmp, data)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Advisory cross-process lock on a dedicated lock file. Guards only the
/// write step; in-process serialization is the record mutex's job.
struct FileLock {
    path: PathBuf,
}

impl FileLock {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn acquire(&self) -> Result<FileLockGuard, MetaError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(&self.path)?;
        file.lock()
            .map_err(|err| MetaError::Storage(format!("failed to acquire file lock: {err}")))?;
        Ok(FileLockGuard { file })
    }
}

struct FileLockGuard {
    file: File,
}

impl Drop for FileLockGuard {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            tracing::warn!("failed to release file lock: {err}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::generate_record_id;
    use chrono::{Timelike, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn record(doi: &str, file_name: &str) -> PaperRecord {
        let now = Utc::now();
        PaperRecord {
            id: generate_record_id(doi, file_name),
            title: format!("Title for {file_name}"),
            venue: "SAC".to_string(),
            publication_year: Some(2019),
            author_list: "Ada Lovelace".to_string(),
            abstract_text: "Things.".to_string(),
            doi: doi.to_string(),
            file_name: file_name.to_string(),
            source_url: String::new(),
            saved_at: now.with_nanosecond(0).unwrap_or(now),
        }
    }

    fn open_store(dir: &TempDir) -> RecordStore {
        RecordStore::open(StorePaths::new(dir.path())).unwrap()
    }

    #[test]
    fn round_trip_preserves_count_and_order() {
        let dir = TempDir::new().unwrap();
        let (a, b, c) = (
            record("10.1/a", "a.pdf"),
            record("10.1/b", "b.pdf"),
            record("10.1/c", "c.pdf"),
        );
        {
            let store = open_store(&dir);
            store.upsert(a.clone()).unwrap();
            store.upsert(b.clone()).unwrap();
            store.upsert(c.clone()).unwrap();
        }

        let reloaded = open_store(&dir);
        assert_eq!(reloaded.len(), 3);
        let ids: Vec<String> = reloaded
            .snapshot()
            .iter()
            .map(|row| row["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec![a.id.clone(), b.id.clone(), c.id.clone()]);
        assert_eq!(reloaded.get_by_id(&b.id).unwrap(), b);
    }

    #[test]
    fn upsert_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = record("10.1/a", "a.pdf");
        store.upsert(r.clone()).unwrap();
        store.upsert(r.clone()).unwrap();
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_id(&r.id).unwrap(), r);
    }

    #[test]
    fn upsert_replaces_in_place() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let first = record("10.1/a", "a.pdf");
        store.upsert(first.clone()).unwrap();
        store.upsert(record("10.1/b", "b.pdf")).unwrap();

        let mut replacement = record("10.1/a", "second-upload.pdf");
        replacement.id = first.id.clone();
        replacement.title = "Replaced".to_string();
        store.upsert(replacement).unwrap();

        assert_eq!(store.len(), 2);
        let rows = store.snapshot();
        assert_eq!(rows[0]["Title"], "Replaced");
        assert_eq!(rows[0]["id"], json!(first.id));
    }

    #[test]
    fn reorder_applies_a_permutation() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let a = record("10.1/a", "a.pdf");
        let b = record("10.1/b", "b.pdf");
        store.upsert(a.clone()).unwrap();
        store.upsert(b.clone()).unwrap();

        store.reorder(&[b.id.clone(), a.id.clone()]).unwrap();
        let ids: Vec<String> = store
            .snapshot()
            .iter()
            .map(|row| row["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec![b.id, a.id]);
    }

    #[test]
    fn reorder_ignores_unknown_ids_and_appends_missing_ones() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let a = record("10.1/a", "a.pdf");
        let b = record("10.1/b", "b.pdf");
        store.upsert(a.clone()).unwrap();
        store.upsert(b.clone()).unwrap();

        store.reorder(&["doi:10.1/unknown".to_string()]).unwrap();
        let ids: Vec<String> = store
            .snapshot()
            .iter()
            .map(|row| row["id"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);
    }

    #[test]
    fn find_by_doi_normalizes_and_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = record("10.1145/X.Y", "a.pdf");
        store.upsert(r.clone()).unwrap();

        assert_eq!(store.find_by_doi(" 10.1145/x.y ").unwrap().id, r.id);
        assert!(store.find_by_doi("").is_none());
        assert!(store.find_by_doi("   ").is_none());
        assert!(store.find_by_doi("10.1/other").is_none());
    }

    #[test]
    fn delete_reports_whether_something_was_removed() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = record("10.1/a", "a.pdf");
        store.upsert(r.clone()).unwrap();

        assert!(store.delete(&r.id).unwrap());
        assert!(!store.delete(&r.id).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn update_fields_rejects_unknown_keys_before_mutating() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = record("10.1/a", "a.pdf");
        store.upsert(r.clone()).unwrap();

        let mut updates = Map::new();
        updates.insert("Unknown".to_string(), json!("x"));
        updates.insert("Title".to_string(), json!("New"));
        let err = store.update_fields(&r.id, &updates).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(store.get_by_id(&r.id).unwrap(), r);
    }

    #[test]
    fn update_fields_rejects_an_empty_update_set() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = record("10.1/a", "a.pdf");
        store.upsert(r.clone()).unwrap();

        let err = store.update_fields(&r.id, &Map::new()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn update_fields_merges_and_keeps_identity() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let r = record("10.1/a", "a.pdf");
        store.upsert(r.clone()).unwrap();

        let mut updates = Map::new();
        updates.insert("Title".to_string(), json!("Edited"));
        updates.insert("Publication year".to_string(), json!("2021"));
        let updated = store.update_fields(&r.id, &updates).unwrap();

        assert_eq!(updated.title, "Edited");
        assert_eq!(updated.publication_year, Some(2021));
        assert_eq!(updated.id, r.id);
        assert_eq!(updated.file_name, r.file_name);
        assert_eq!(updated.saved_at, r.saved_at);
    }

    #[test]
    fn update_fields_on_an_unknown_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        let mut updates = Map::new();
        updates.insert("Title".to_string(), json!("x"));
        let err = store.update_fields("doi:10.1/nope", &updates).unwrap_err();
        assert_eq!(err.code(), "RECORD_NOT_FOUND");
    }

    #[test]
    fn malformed_snapshot_degrades_to_empty_and_self_heals() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::new(dir.path());
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(&paths.records_json, b"{ not json").unwrap();

        let store = RecordStore::open(paths.clone()).unwrap();
        assert!(store.is_empty());
        // The load re-persisted a valid snapshot and the CSV companion.
        let healed = fs::read_to_string(&paths.records_json).unwrap();
        assert_eq!(healed.trim(), "[]");
        assert!(paths.records_csv.exists());
    }

    #[test]
    fn export_writes_the_fixed_columns_in_store_order() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.upsert(record("10.1/a", "a.pdf")).unwrap();
        let mut no_year = record("10.1/b", "b.pdf");
        no_year.publication_year = None;
        store.upsert(no_year).unwrap();

        let path = store.export_spreadsheet().unwrap();
        let text = fs::read_to_string(path).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next().unwrap(),
            "Title,Venue,Publication year,Author list,Abstract,DOI"
        );
        assert!(lines.next().unwrap().contains("10.1/a"));
        assert!(lines.next().unwrap().contains("10.1/b"));
    }

    #[test]
    fn flush_rewrites_the_snapshot() {
        let dir = TempDir::new().unwrap();
        let paths = StorePaths::new(dir.path());
        let store = RecordStore::open(paths.clone()).unwrap();
        store.upsert(record("10.1/a", "a.pdf")).unwrap();
        fs::remove_file(&paths.records_json).unwrap();

        store.flush().unwrap();
        assert!(paths.records_json.exists());
    }
}
