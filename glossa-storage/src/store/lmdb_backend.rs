//! LMDB-backed record store.
//!
//! Uses the heed crate (Rust bindings for LMDB). One environment per cache
//! with two named databases:
//! - `records`: title -> JSON-encoded [`Record`]
//! - `meta`: `watermark` -> JSON-encoded [`Watermark`]
//!
//! Each `put_batch`/`delete_batch` call is a single write transaction, so a
//! batch is either fully persisted or not at all.

use std::path::Path;

use glossa_core::{GlossaError, GlossaResult, Record, StorageError, Timestamp};
use heed::types::{Bytes, Str};
use heed::{Database, Env, EnvOpenOptions, RoTxn};

use super::traits::{RecordFilter, RecordStore, Stamps};
use crate::watermark::Watermark;

const RECORDS_DB: &str = "records";
const META_DB: &str = "meta";
const WATERMARK_KEY: &str = "watermark";

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open a database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    #[error("Transaction error: {0}")]
    Transaction(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for GlossaError {
    fn from(e: LmdbStoreError) -> Self {
        match e {
            LmdbStoreError::Serialization(reason) => {
                GlossaError::Storage(StorageError::Serialization { reason })
            }
            other => GlossaError::Storage(StorageError::TransactionFailed {
                reason: other.to_string(),
            }),
        }
    }
}

fn txn_err(e: heed::Error) -> LmdbStoreError {
    LmdbStoreError::Transaction(e.to_string())
}

/// On-disk record store for one cache.
pub struct LmdbRecordStore {
    env: Env,
    records: Database<Str, Bytes>,
    meta: Database<Str, Bytes>,
}

impl LmdbRecordStore {
    /// Open (or create) a store under `path`.
    ///
    /// `max_size_mb` bounds the memory map; LMDB refuses writes beyond it.
    pub fn open<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(2)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_err)?;
        let records: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(RECORDS_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        let meta: Database<Str, Bytes> = env
            .create_database(&mut wtxn, Some(META_DB))
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_err)?;

        Ok(Self { env, records, meta })
    }

    fn decode(bytes: &[u8]) -> Result<Record, LmdbStoreError> {
        serde_json::from_slice(bytes).map_err(|e| LmdbStoreError::Serialization(e.to_string()))
    }

    fn read(&self, rtxn: &RoTxn, title: &str) -> Result<Option<Record>, LmdbStoreError> {
        match self.records.get(rtxn, title).map_err(txn_err)? {
            Some(bytes) => Ok(Some(Self::decode(bytes)?)),
            None => Ok(None),
        }
    }

    /// Visit every stored record in key order.
    fn for_each(
        &self,
        mut visit: impl FnMut(Record) -> Result<(), LmdbStoreError>,
    ) -> Result<(), LmdbStoreError> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        for entry in self.records.iter(&rtxn).map_err(txn_err)? {
            let (_, bytes) = entry.map_err(txn_err)?;
            visit(Self::decode(bytes)?)?;
        }
        Ok(())
    }
}

impl RecordStore for LmdbRecordStore {
    fn get(&self, title: &str) -> GlossaResult<Option<Record>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        Ok(self.read(&rtxn, title)?)
    }

    fn get_many(&self, titles: &[String]) -> GlossaResult<Vec<Record>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let mut found = Vec::with_capacity(titles.len());
        for title in titles {
            if let Some(record) = self.read(&rtxn, title)? {
                found.push(record);
            }
        }
        Ok(found)
    }

    fn put_batch(&self, records: &[Record]) -> GlossaResult<()> {
        if records.is_empty() {
            return Ok(());
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        for record in records {
            let bytes = serde_json::to_vec(record)
                .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
            self.records
                .put(&mut wtxn, &record.title, &bytes)
                .map_err(txn_err)?;
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn delete_batch(&self, titles: &[String]) -> GlossaResult<usize> {
        if titles.is_empty() {
            return Ok(0);
        }
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        let mut deleted = 0;
        for title in titles {
            if self.records.delete(&mut wtxn, title).map_err(txn_err)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_err)?;
        Ok(deleted)
    }

    fn scan(&self, filter: &RecordFilter) -> GlossaResult<Vec<Record>> {
        let mut out = Vec::new();
        self.for_each(|record| {
            if filter.matches(&record) {
                out.push(record);
            }
            Ok(())
        })?;
        Ok(out)
    }

    fn stamps(&self, since: Option<Timestamp>) -> GlossaResult<Stamps> {
        let mut out = Stamps::new();
        self.for_each(|record| {
            let keep = match since {
                Some(since) => record.timestamp.is_some_and(|ts| ts > since),
                None => true,
            };
            if keep {
                out.insert(record.title, record.timestamp);
            }
            Ok(())
        })?;
        Ok(out)
    }

    fn watermark(&self) -> GlossaResult<Option<Watermark>> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        match self.meta.get(&rtxn, WATERMARK_KEY).map_err(txn_err)? {
            Some(bytes) => {
                let wm = serde_json::from_slice(bytes)
                    .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
                Ok(Some(wm))
            }
            None => Ok(None),
        }
    }

    fn set_watermark(&self, watermark: &Watermark) -> GlossaResult<()> {
        let bytes = serde_json::to_vec(watermark)
            .map_err(|e| LmdbStoreError::Serialization(e.to_string()))?;
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.meta
            .put(&mut wtxn, WATERMARK_KEY, &bytes)
            .map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn clear_watermark(&self) -> GlossaResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_err)?;
        self.meta.delete(&mut wtxn, WATERMARK_KEY).map_err(txn_err)?;
        wtxn.commit().map_err(txn_err)?;
        Ok(())
    }

    fn len(&self) -> GlossaResult<usize> {
        let rtxn = self.env.read_txn().map_err(txn_err)?;
        let len = self.records.len(&rtxn).map_err(txn_err)?;
        Ok(len as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbRecordStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbRecordStore::open(temp_dir.path(), 10).expect("store should open");
        (store, temp_dir)
    }

    fn ts(minute: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 2, 1, 0, minute, 0).unwrap()
    }

    #[test]
    fn test_put_get_round_trip() {
        let (store, _dir) = create_test_store();
        let record = Record::new("кошка", ts(1), "{{сущ ru f a 3a}}")
            .with_namespace(0)
            .with_revision(7);
        store.put_batch(&[record.clone()]).expect("put should succeed");
        assert_eq!(store.get("кошка").unwrap(), Some(record));
        assert_eq!(store.get("пёс").unwrap(), None);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_get_many_keeps_request_order_and_skips_missing() {
        let (store, _dir) = create_test_store();
        store
            .put_batch(&[Record::new("a", ts(1), "1"), Record::new("b", ts(2), "2")])
            .unwrap();
        let titles = vec!["b".to_string(), "zz".to_string(), "a".to_string()];
        let found: Vec<String> = store
            .get_many(&titles)
            .unwrap()
            .into_iter()
            .map(|r| r.title)
            .collect();
        assert_eq!(found, vec!["b", "a"]);
    }

    #[test]
    fn test_delete_batch_counts_existing() {
        let (store, _dir) = create_test_store();
        store.put_batch(&[Record::new("a", ts(1), "1")]).unwrap();
        let deleted = store
            .delete_batch(&["a".to_string(), "missing".to_string()])
            .unwrap();
        assert_eq!(deleted, 1);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn test_stamps_since_filters_by_timestamp() {
        let (store, _dir) = create_test_store();
        store
            .put_batch(&[
                Record::new("old", ts(1), ""),
                Record::new("new", ts(5), ""),
                Record::redirect_to("alias", "new", None),
            ])
            .unwrap();
        let all = store.stamps(None).unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all.get("alias"), Some(&None));
        let recent = store.stamps(Some(ts(2))).unwrap();
        assert_eq!(recent.keys().collect::<Vec<_>>(), vec!["new"]);
    }

    #[test]
    fn test_watermark_persists_across_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let wm = Watermark::with_observed_at(ts(3), ts(4));
        {
            let store = LmdbRecordStore::open(temp_dir.path(), 10).unwrap();
            assert_eq!(store.watermark().unwrap(), None);
            store.set_watermark(&wm).unwrap();
        }
        let store = LmdbRecordStore::open(temp_dir.path(), 10).unwrap();
        assert_eq!(store.watermark().unwrap(), Some(wm));
        store.clear_watermark().unwrap();
        assert_eq!(store.watermark().unwrap(), None);
    }

    #[test]
    fn test_scan_with_prefix() {
        let (store, _dir) = create_test_store();
        store
            .put_batch(&[
                Record::new("Шаблон:-", ts(1), "&nbsp;—"),
                Record::new("кот", ts(1), ""),
            ])
            .unwrap();
        let found = store
            .scan(&RecordFilter::new().with_prefix("Шаблон:"))
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "Шаблон:-");
    }
}
