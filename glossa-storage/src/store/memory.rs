//! In-memory record store for tests and throwaway pipelines.

use std::collections::BTreeMap;
use std::sync::RwLock;

use glossa_core::{GlossaResult, Record, StorageError, Timestamp};

use super::traits::{RecordFilter, RecordStore, Stamps};
use crate::watermark::Watermark;

#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    records: RwLock<BTreeMap<String, Record>>,
    watermark: RwLock<Option<Watermark>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a store with records, bypassing the cache layer.
    pub fn with_records(records: impl IntoIterator<Item = Record>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.records.write() {
            map.extend(records.into_iter().map(|r| (r.title.clone(), r)));
        }
        store
    }
}

impl RecordStore for InMemoryRecordStore {
    fn get(&self, title: &str) -> GlossaResult<Option<Record>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.get(title).cloned())
    }

    fn get_many(&self, titles: &[String]) -> GlossaResult<Vec<Record>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(titles.iter().filter_map(|t| records.get(t).cloned()).collect())
    }

    fn put_batch(&self, batch: &[Record]) -> GlossaResult<()> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        for record in batch {
            records.insert(record.title.clone(), record.clone());
        }
        Ok(())
    }

    fn delete_batch(&self, titles: &[String]) -> GlossaResult<usize> {
        let mut records = self.records.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(titles.iter().filter(|t| records.remove(*t).is_some()).count())
    }

    fn scan(&self, filter: &RecordFilter) -> GlossaResult<Vec<Record>> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.values().filter(|r| filter.matches(r)).cloned().collect())
    }

    fn stamps(&self, since: Option<Timestamp>) -> GlossaResult<Stamps> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records
            .values()
            .filter(|r| match since {
                Some(since) => r.timestamp.is_some_and(|ts| ts > since),
                None => true,
            })
            .map(|r| (r.title.clone(), r.timestamp))
            .collect())
    }

    fn watermark(&self) -> GlossaResult<Option<Watermark>> {
        let wm = self.watermark.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(*wm)
    }

    fn set_watermark(&self, watermark: &Watermark) -> GlossaResult<()> {
        let mut wm = self.watermark.write().map_err(|_| StorageError::LockPoisoned)?;
        *wm = Some(*watermark);
        Ok(())
    }

    fn clear_watermark(&self) -> GlossaResult<()> {
        let mut wm = self.watermark.write().map_err(|_| StorageError::LockPoisoned)?;
        *wm = None;
        Ok(())
    }

    fn len(&self) -> GlossaResult<usize> {
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(records.len())
    }
}
