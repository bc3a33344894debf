//! Record store trait and filters.
//!
//! A record store is the persistence behind one content cache: a keyed table
//! of records plus a single watermark. Implementations must make
//! `put_batch` atomic; nothing else needs transactions because one process
//! drives the pipeline sequentially.

use std::collections::BTreeMap;

use glossa_core::{GlossaResult, Record, Timestamp};

use crate::watermark::Watermark;

/// Restricts which records a scan returns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordFilter {
    /// Only records with a timestamp strictly after this instant.
    pub changed_since: Option<Timestamp>,
    pub namespace: Option<i32>,
    pub title_prefix: Option<String>,
}

impl RecordFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn changed_since(mut self, since: Timestamp) -> Self {
        self.changed_since = Some(since);
        self
    }

    pub fn in_namespace(mut self, namespace: i32) -> Self {
        self.namespace = Some(namespace);
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.title_prefix = Some(prefix.into());
        self
    }

    pub fn matches(&self, record: &Record) -> bool {
        if let Some(since) = self.changed_since {
            match record.timestamp {
                Some(ts) if ts > since => {}
                _ => return false,
            }
        }
        if let Some(ns) = self.namespace {
            if record.namespace != Some(ns) {
                return false;
            }
        }
        if let Some(prefix) = &self.title_prefix {
            if !record.title.starts_with(prefix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Title to last-modified map used to diff two stores.
pub type Stamps = BTreeMap<String, Option<Timestamp>>;

/// Keyed persistence for records.
pub trait RecordStore: Send + Sync {
    fn get(&self, title: &str) -> GlossaResult<Option<Record>>;

    /// Records found for `titles`, in request order. Unknown titles are skipped.
    fn get_many(&self, titles: &[String]) -> GlossaResult<Vec<Record>>;

    /// Upsert all records in one transaction.
    fn put_batch(&self, records: &[Record]) -> GlossaResult<()>;

    /// Delete the titles in one transaction, returning how many existed.
    fn delete_batch(&self, titles: &[String]) -> GlossaResult<usize>;

    fn scan(&self, filter: &RecordFilter) -> GlossaResult<Vec<Record>>;

    /// Titles with their timestamps. With `since`, only records modified
    /// strictly after it.
    fn stamps(&self, since: Option<Timestamp>) -> GlossaResult<Stamps>;

    fn watermark(&self) -> GlossaResult<Option<Watermark>>;

    fn set_watermark(&self, watermark: &Watermark) -> GlossaResult<()>;

    fn clear_watermark(&self) -> GlossaResult<()>;

    fn len(&self) -> GlossaResult<usize>;

    fn is_empty(&self) -> GlossaResult<bool> {
        Ok(self.len()? == 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_filter_changed_since_excludes_untimed_records() {
        let since = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = RecordFilter::new().changed_since(since);
        let newer = Record::new("a", since + chrono::Duration::seconds(1), "x");
        let same = Record::new("b", since, "x");
        assert!(filter.matches(&newer));
        assert!(!filter.matches(&same));
        assert!(!filter.matches(&Record::redirect_to("c", "a", None)));
    }

    #[test]
    fn test_filter_namespace_and_prefix() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let filter = RecordFilter::new().in_namespace(10).with_prefix("Шаблон:");
        assert!(filter.matches(&Record::new("Шаблон:-", ts, "").with_namespace(10)));
        assert!(!filter.matches(&Record::new("Шаблон:-", ts, "").with_namespace(0)));
        assert!(!filter.matches(&Record::new("кот", ts, "").with_namespace(10)));
    }
}
