//! In-memory leaf source for tests.
//!
//! Behaves like a remote wiki: records can be inserted, edited and removed
//! between refreshes, redirects are resolved the way a wiki API resolves
//! them, and every call is counted so tests can assert on upstream traffic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, RwLock};

use glossa_core::{Force, GlossaResult, Record, SourceError, StorageError, Timestamp};

use crate::source::{is_current, ScanSink, SourceCapability, SourceDescriptor};
use crate::store::Stamps;

const SCAN_BATCH: usize = 50;

pub struct MockSource {
    descriptor: SourceDescriptor,
    refreshable: bool,
    records: RwLock<BTreeMap<String, Record>>,
    /// Deletions as (title, when), reported by change discovery.
    deletions: RwLock<Vec<(String, Timestamp)>>,
    fetch_calls: AtomicUsize,
    discover_calls: AtomicUsize,
    scan_calls: AtomicUsize,
    fetched: Mutex<Vec<Vec<String>>>,
    fail_next: Mutex<Option<String>>,
}

impl MockSource {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            descriptor: SourceDescriptor::new(name),
            refreshable: true,
            records: RwLock::new(BTreeMap::new()),
            deletions: RwLock::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            discover_calls: AtomicUsize::new(0),
            scan_calls: AtomicUsize::new(0),
            fetched: Mutex::new(Vec::new()),
            fail_next: Mutex::new(None),
        }
    }

    pub fn with_descriptor(mut self, descriptor: SourceDescriptor) -> Self {
        self.descriptor = descriptor;
        self
    }

    pub fn with_refresh(mut self, refreshable: bool) -> Self {
        self.refreshable = refreshable;
        self
    }

    /// Create or edit a record upstream.
    pub fn insert(&self, record: Record) {
        if let Ok(mut records) = self.records.write() {
            records.insert(record.title.clone(), record);
        }
    }

    /// Delete a record upstream, as of `at`.
    pub fn remove(&self, title: &str, at: Timestamp) {
        if let Ok(mut records) = self.records.write() {
            records.remove(title);
        }
        if let Ok(mut deletions) = self.deletions.write() {
            deletions.push((title.to_string(), at));
        }
    }

    /// Make the next `fetch` fail like a dropped connection.
    pub fn fail_next_fetch(&self, message: &str) {
        if let Ok(mut fail) = self.fail_next.lock() {
            *fail = Some(message.to_string());
        }
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn discover_calls(&self) -> usize {
        self.discover_calls.load(Ordering::SeqCst)
    }

    pub fn scan_calls(&self) -> usize {
        self.scan_calls.load(Ordering::SeqCst)
    }

    pub fn total_calls(&self) -> usize {
        self.fetch_calls() + self.discover_calls() + self.scan_calls()
    }

    /// Titles requested by each `fetch` call, in call order.
    pub fn fetched_titles(&self) -> Vec<Vec<String>> {
        self.fetched.lock().map(|f| f.clone()).unwrap_or_default()
    }

    /// Resolve one title the way a wiki API does: follow the redirect,
    /// report the redirected title as a marker or a tombstone.
    fn resolve(&self, records: &BTreeMap<String, Record>, title: &str, out: &mut Vec<Record>) {
        match records.get(title) {
            None => out.push(Record::tombstone(title)),
            Some(record) => match &record.redirect {
                Some(target) if self.descriptor.follows_redirects => {
                    if self.descriptor.retains_redirects {
                        out.push(record.clone());
                    } else {
                        out.push(Record::tombstone(title));
                    }
                    match records.get(target) {
                        Some(target) if !target.is_redirect() => out.push(target.clone()),
                        _ => out.push(Record::tombstone(target.as_str())),
                    }
                }
                _ => out.push(record.clone()),
            },
        }
    }
}

impl SourceCapability for MockSource {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn supports_refresh(&self) -> bool {
        self.refreshable
    }

    fn discover_changes(&self, since: Timestamp) -> GlossaResult<Vec<(String, Timestamp)>> {
        self.discover_calls.fetch_add(1, Ordering::SeqCst);
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        let deletions = self.deletions.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut changes: Vec<(String, Timestamp)> = records
            .values()
            .filter_map(|r| r.timestamp.filter(|ts| *ts > since).map(|ts| (r.title.clone(), ts)))
            .chain(
                deletions
                    .iter()
                    .filter(|(_, at)| *at > since)
                    .cloned(),
            )
            .collect();
        changes.sort_by(|a, b| a.1.cmp(&b.1));
        Ok(changes)
    }

    fn fetch(&self, titles: &[String], _force: Force) -> GlossaResult<Vec<Record>> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut fetched) = self.fetched.lock() {
            fetched.push(titles.to_vec());
        }
        let failure = self.fail_next.lock().ok().and_then(|mut f| f.take());
        if let Some(message) = failure {
            return Err(SourceError::RetriesExhausted {
                endpoint: self.descriptor.name.clone(),
                attempts: 1,
                last: message,
            }
            .into());
        }
        let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
        let mut out = Vec::new();
        for title in titles {
            self.resolve(&records, title, &mut out);
        }
        Ok(out)
    }

    fn full_scan(
        &self,
        exclude: &Stamps,
        sink: &mut ScanSink<'_>,
    ) -> GlossaResult<BTreeSet<String>> {
        self.scan_calls.fetch_add(1, Ordering::SeqCst);
        let snapshot: Vec<Record> = {
            let records = self.records.read().map_err(|_| StorageError::LockPoisoned)?;
            records.values().cloned().collect()
        };
        let present: BTreeSet<String> = snapshot.iter().map(|r| r.title.clone()).collect();
        let wanted: Vec<Record> = snapshot
            .into_iter()
            .filter(|r| !is_current(exclude.get(&r.title), r.timestamp))
            .collect();
        for batch in wanted.chunks(SCAN_BATCH) {
            sink(batch.to_vec())?;
        }
        Ok(present)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn ts(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_fetch_tombstones_missing_and_redirected_titles() {
        let source = MockSource::new("remote");
        source.insert(Record::redirect_to("alias", "target", Some(ts(1))));
        source.insert(Record::new("target", ts(1), "body"));
        let out = source
            .fetch(&["alias".to_string(), "nope".to_string()], Force::UseCache)
            .unwrap();
        let titles: Vec<(&str, bool)> = out.iter().map(|r| (r.title.as_str(), r.is_tombstone())).collect();
        assert_eq!(titles, vec![("alias", true), ("target", false), ("nope", true)]);
    }

    #[test]
    fn test_retained_redirects_come_back_as_markers() {
        let source = MockSource::new("remote").with_descriptor(
            SourceDescriptor::new("remote").with_retain_redirects(true),
        );
        source.insert(Record::redirect_to("alias", "target", Some(ts(1))));
        source.insert(Record::new("target", ts(1), "body"));
        let out = source.fetch(&["alias".to_string()], Force::UseCache).unwrap();
        assert!(out[0].is_redirect());
        assert_eq!(out[1].title, "target");
    }

    #[test]
    fn test_discover_reports_edits_and_deletions() {
        let source = MockSource::new("remote");
        source.insert(Record::new("old", ts(1), ""));
        source.insert(Record::new("new", ts(5), ""));
        source.remove("old", ts(6));
        let changes = source.discover_changes(ts(2)).unwrap();
        assert_eq!(
            changes,
            vec![("new".to_string(), ts(5)), ("old".to_string(), ts(6))]
        );
        assert_eq!(source.discover_calls(), 1);
    }
}
