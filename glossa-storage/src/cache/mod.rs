//! Content cache: records keyed by title, backed by a record store and fed
//! by a source capability.
//!
//! Reads are served locally when possible and escalated to the source in
//! bulk otherwise. Everything fetched is persisted before it is returned, so
//! a second identical lookup never reaches the source.
//!
//! # Example
//!
//! ```ignore
//! let cache = ContentCache::new("pages", Box::new(store), source, CacheConfig::default());
//! let page = cache.get("кошка")?;
//! let touched = cache.refresh()?;
//! ```

mod refresh;

pub use refresh::RefreshMode;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use glossa_core::{CacheConfig, Force, GlossaResult, Record, StorageError, Timestamp};

use crate::source::SourceCapability;
use crate::store::{RecordFilter, RecordStore, Stamps};
use crate::watermark::Watermark;

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Titles answered from the local store.
    pub hits: u64,
    /// Titles escalated to the source.
    pub misses: u64,
    /// Calls made to `SourceCapability::fetch`.
    pub upstream_fetches: u64,
    pub saved: u64,
    pub deleted: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    upstream_fetches: AtomicU64,
    saved: AtomicU64,
    deleted: AtomicU64,
}

impl Counters {
    fn add(counter: &AtomicU64, n: usize) {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

/// What one `save_records` call did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SaveOutcome {
    /// Records upserted (live records and redirect markers).
    pub saved: Vec<Record>,
    /// Titles removed because the source tombstoned them.
    pub deleted: Vec<String>,
}

pub struct ContentCache {
    name: String,
    store: Box<dyn RecordStore>,
    source: Arc<dyn SourceCapability>,
    config: CacheConfig,
    counters: Counters,
}

impl std::fmt::Debug for ContentCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentCache")
            .field("name", &self.name)
            .field("source", &self.source.descriptor().name)
            .finish()
    }
}

impl ContentCache {
    pub fn new(
        name: impl Into<String>,
        store: Box<dyn RecordStore>,
        source: Arc<dyn SourceCapability>,
        config: CacheConfig,
    ) -> Self {
        Self {
            name: name.into(),
            store,
            source,
            config,
            counters: Counters::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn store(&self) -> &dyn RecordStore {
        self.store.as_ref()
    }

    pub fn source(&self) -> &Arc<dyn SourceCapability> {
        &self.source
    }

    pub fn watermark(&self) -> GlossaResult<Option<Watermark>> {
        self.store.watermark()
    }

    pub fn stamps(&self, since: Option<Timestamp>) -> GlossaResult<Stamps> {
        self.store.stamps(since)
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            upstream_fetches: self.counters.upstream_fetches.load(Ordering::Relaxed),
            saved: self.counters.saved.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
        }
    }

    /// Look up one title, chasing redirects.
    ///
    /// Fails with `NotFound` when the title (or a redirect target) does not
    /// exist, `RedirectLoop` when a title repeats in the chain, and
    /// `RedirectDepthExceeded` past `max_redirect_hops`.
    pub fn get(&self, title: &str) -> GlossaResult<Record> {
        let follow = self.source.descriptor().follows_redirects;
        let mut chain: Vec<String> = Vec::new();
        let mut current = title.to_string();
        loop {
            if chain.contains(&current) {
                chain.push(current);
                return Err(StorageError::RedirectLoop {
                    title: title.to_string(),
                    chain,
                }
                .into());
            }
            if chain.len() > self.config.max_redirect_hops {
                return Err(StorageError::RedirectDepthExceeded {
                    title: title.to_string(),
                    hops: self.config.max_redirect_hops,
                }
                .into());
            }
            chain.push(current.clone());

            let record = match self.store.get(&current)? {
                Some(record) => {
                    Counters::add(&self.counters.hits, 1);
                    record
                }
                None => {
                    Counters::add(&self.counters.misses, 1);
                    self.fetch_one(&current)?
                        .ok_or_else(|| StorageError::NotFound {
                            title: current.clone(),
                        })?
                }
            };

            match &record.redirect {
                Some(target) if follow => current = target.clone(),
                _ => return Ok(record),
            }
        }
    }

    /// Fetch one missing title. The source may answer with the record it
    /// resolved the title to instead of the title itself.
    fn fetch_one(&self, title: &str) -> GlossaResult<Option<Record>> {
        let mut saved = self.fetch_and_save(&[title.to_string()], Force::UseCache)?.saved;
        if let Some(pos) = saved.iter().position(|r| r.title == title) {
            return Ok(Some(saved.swap_remove(pos)));
        }
        Ok(saved.into_iter().find(|r| !r.is_redirect()))
    }

    /// Batched lookup.
    ///
    /// Local hits are returned first, batch by batch; misses (including
    /// redirect targets not stored locally) are escalated to the source
    /// whenever `fetch_flush_threshold` of them accumulate, and once more at
    /// the end. When `force` bypasses this cache every title goes to the
    /// source. Only live records are returned, each title once.
    pub fn get_multiple(&self, titles: &[String], force: Force) -> GlossaResult<Vec<Record>> {
        let follow = self.source.descriptor().follows_redirects;
        let mut out = Vec::new();
        let mut emitted: HashSet<String> = HashSet::new();

        if force.bypasses(self.source.kind()) {
            Counters::add(&self.counters.misses, titles.len());
            for chunk in titles.chunks(self.config.fetch_flush_threshold.max(1)) {
                let outcome = self.fetch_and_save(chunk, force)?;
                emit(outcome.saved, follow, &mut out, &mut emitted);
            }
            return Ok(out);
        }

        let mut not_found: Vec<String> = Vec::new();
        let mut pending: HashSet<String> = HashSet::new();
        for batch in titles.chunks(self.config.lookup_batch_size.max(1)) {
            let mut tried: HashSet<String> = HashSet::new();
            let mut to_try = dedup(batch.iter().cloned(), &tried);
            while !to_try.is_empty() {
                tried.extend(to_try.iter().cloned());
                let found = self.store.get_many(&to_try)?;
                Counters::add(&self.counters.hits, found.len());

                let found_titles: HashSet<&str> = found.iter().map(|r| r.title.as_str()).collect();
                for title in &to_try {
                    if !found_titles.contains(title.as_str()) && pending.insert(title.clone()) {
                        not_found.push(title.clone());
                    }
                }

                let mut targets = Vec::new();
                for record in found {
                    match &record.redirect {
                        Some(target) if follow => targets.push(target.clone()),
                        _ => {
                            if emitted.insert(record.title.clone()) {
                                out.push(record);
                            }
                        }
                    }
                }
                let looped = targets.iter().filter(|t| tried.contains(*t)).count();
                if looped > 0 {
                    tracing::warn!(cache = %self.name, looped, "redirect loop in batch lookup");
                }
                to_try = dedup(targets.into_iter(), &tried);
            }

            if not_found.len() >= self.config.fetch_flush_threshold {
                Counters::add(&self.counters.misses, not_found.len());
                let outcome = self.fetch_and_save(&not_found, force)?;
                emit(outcome.saved, follow, &mut out, &mut emitted);
                not_found.clear();
                pending.clear();
            }
        }

        if !not_found.is_empty() {
            Counters::add(&self.counters.misses, not_found.len());
            let outcome = self.fetch_and_save(&not_found, force)?;
            emit(outcome.saved, follow, &mut out, &mut emitted);
        }
        Ok(out)
    }

    /// All stored records matching `filter`.
    pub fn get_all(&self, filter: &RecordFilter) -> GlossaResult<Vec<Record>> {
        self.store.scan(filter)
    }

    /// Stored records matching `filter`, handed to `visit` in title order
    /// at most `batch` at a time. Only titles are held for the whole scan.
    pub fn for_each_batch<F>(&self, filter: &RecordFilter, batch: usize, mut visit: F) -> GlossaResult<()>
    where
        F: FnMut(Vec<Record>) -> GlossaResult<()>,
    {
        let titles: Vec<String> = self
            .store
            .stamps(filter.changed_since)?
            .into_keys()
            .filter(|title| {
                filter
                    .title_prefix
                    .as_deref()
                    .map_or(true, |prefix| title.starts_with(prefix))
            })
            .collect();
        for chunk in titles.chunks(batch.max(1)) {
            let records: Vec<Record> = self
                .store
                .get_many(chunk)?
                .into_iter()
                .filter(|record| filter.matches(record))
                .collect();
            if !records.is_empty() {
                visit(records)?;
            }
        }
        Ok(())
    }

    fn fetch_and_save(&self, titles: &[String], force: Force) -> GlossaResult<SaveOutcome> {
        if titles.is_empty() {
            return Ok(SaveOutcome::default());
        }
        Counters::add(&self.counters.upstream_fetches, 1);
        tracing::debug!(cache = %self.name, count = titles.len(), ?force, "fetching from source");
        let records = self.source.fetch(titles, force)?;
        self.save_records(records)
    }

    /// Persist records in batches of `save_batch_size`: live records and
    /// redirect markers are upserted, tombstones deleted.
    pub fn save_records(&self, records: Vec<Record>) -> GlossaResult<SaveOutcome> {
        let mut outcome = SaveOutcome::default();
        let mut tombstoned: Vec<String> = Vec::new();
        for chunk in records.chunks(self.config.save_batch_size.max(1)) {
            let (dead, live): (Vec<&Record>, Vec<&Record>) =
                chunk.iter().partition(|r| r.is_tombstone());
            tombstoned.extend(dead.into_iter().map(|r| r.title.clone()));
            let live: Vec<Record> = live.into_iter().cloned().collect();
            self.store.put_batch(&live)?;
            Counters::add(&self.counters.saved, live.len());
            outcome.saved.extend(live);
        }

        let kept: HashSet<&str> = outcome.saved.iter().map(|r| r.title.as_str()).collect();
        let mut seen = HashSet::new();
        let doomed: Vec<String> = tombstoned
            .into_iter()
            .filter(|t| !kept.contains(t.as_str()) && seen.insert(t.clone()))
            .collect();
        outcome.deleted = self.delete_titles(&doomed)?;
        Ok(outcome)
    }

    /// Delete titles in batches; returns the titles that existed.
    fn delete_titles(&self, titles: &[String]) -> GlossaResult<Vec<String>> {
        let mut removed = Vec::new();
        for chunk in titles.chunks(self.config.save_batch_size.max(1)) {
            let existing: Vec<String> = self
                .store
                .get_many(chunk)?
                .into_iter()
                .map(|r| r.title)
                .collect();
            let count = self.store.delete_batch(&existing)?;
            Counters::add(&self.counters.deleted, count);
            removed.extend(existing);
        }
        Ok(removed)
    }
}

fn dedup(titles: impl Iterator<Item = String>, skip: &HashSet<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    titles
        .filter(|t| !skip.contains(t) && seen.insert(t.clone()))
        .collect()
}

fn emit(records: Vec<Record>, follow: bool, out: &mut Vec<Record>, emitted: &mut HashSet<String>) {
    for record in records {
        if record.is_tombstone() || (follow && record.is_redirect()) {
            continue;
        }
        if emitted.insert(record.title.clone()) {
            out.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockSource;
    use crate::store::InMemoryRecordStore;
    use chrono::{TimeZone, Utc};

    fn ts(day: u32) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 4, day, 0, 0, 0).unwrap()
    }

    fn cache_over(source: Arc<MockSource>, local: Vec<Record>) -> ContentCache {
        ContentCache::new(
            "test",
            Box::new(InMemoryRecordStore::with_records(local)),
            source,
            CacheConfig::default(),
        )
    }

    #[test]
    fn test_get_follows_redirect_chain() {
        let source = Arc::new(MockSource::new("remote"));
        let cache = cache_over(
            source.clone(),
            vec![
                Record::redirect_to("A", "B", None),
                Record::redirect_to("B", "C", None),
                Record::new("C", ts(1), "live"),
            ],
        );
        let record = cache.get("A").unwrap();
        assert_eq!(record.title, "C");
        assert_eq!(record.content.as_deref(), Some("live"));
        assert_eq!(source.fetch_calls(), 0);
    }

    #[test]
    fn test_get_detects_redirect_loop() {
        let source = Arc::new(MockSource::new("remote"));
        let cache = cache_over(
            source,
            vec![
                Record::redirect_to("X", "Y", None),
                Record::redirect_to("Y", "X", None),
            ],
        );
        let err = cache.get("X").unwrap_err();
        match err {
            glossa_core::GlossaError::Storage(StorageError::RedirectLoop { chain, .. }) => {
                assert_eq!(chain, vec!["X", "Y", "X"]);
            }
            other => panic!("expected redirect loop, got {other:?}"),
        }
    }

    #[test]
    fn test_get_missing_everywhere_is_not_found() {
        let source = Arc::new(MockSource::new("remote"));
        let cache = cache_over(source.clone(), vec![]);
        let err = cache.get("nothing").unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(source.fetch_calls(), 1);
    }

    #[test]
    fn test_get_multiple_second_call_is_local() {
        let source = Arc::new(MockSource::new("remote"));
        source.insert(Record::new("a", ts(1), "1"));
        source.insert(Record::new("b", ts(1), "2"));
        let cache = cache_over(source.clone(), vec![]);
        let titles = vec!["a".to_string(), "b".to_string(), "gone".to_string()];

        let first = cache.get_multiple(&titles, Force::UseCache).unwrap();
        let calls = source.fetch_calls();
        let second = cache.get_multiple(&titles, Force::UseCache).unwrap();

        assert_eq!(first.len(), 2);
        let mut a: Vec<_> = first.iter().map(|r| r.title.clone()).collect();
        let mut b: Vec<_> = second.iter().map(|r| r.title.clone()).collect();
        a.sort();
        b.sort();
        assert_eq!(a, b);
        // "gone" is tombstoned upstream, so only it is asked for again.
        assert_eq!(source.fetch_calls(), calls + 1);
        assert_eq!(source.fetched_titles().last().unwrap(), &vec!["gone".to_string()]);
    }

    #[test]
    fn test_get_multiple_force_all_bypasses_local() {
        let source = Arc::new(MockSource::new("remote"));
        source.insert(Record::new("a", ts(2), "fresh"));
        let cache = cache_over(source.clone(), vec![Record::new("a", ts(1), "stale")]);

        let cached = cache.get_multiple(&["a".to_string()], Force::UseCache).unwrap();
        assert_eq!(cached[0].content.as_deref(), Some("stale"));
        assert_eq!(source.fetch_calls(), 0);

        let forced = cache.get_multiple(&["a".to_string()], Force::ForceAll).unwrap();
        assert_eq!(forced[0].content.as_deref(), Some("fresh"));
        assert_eq!(source.fetch_calls(), 1);

        // ForceLocalOnly does not bypass a leaf cache.
        cache.get_multiple(&["a".to_string()], Force::ForceLocalOnly).unwrap();
        assert_eq!(source.fetch_calls(), 1);
    }

    #[test]
    fn test_get_multiple_resolves_redirect_targets_remotely() {
        let source = Arc::new(MockSource::new("remote"));
        source.insert(Record::new("target", ts(1), "body"));
        let cache = cache_over(source.clone(), vec![Record::redirect_to("alias", "target", None)]);
        let found = cache.get_multiple(&["alias".to_string()], Force::UseCache).unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].title, "target");
        assert_eq!(source.fetched_titles(), vec![vec!["target".to_string()]]);
    }

    #[test]
    fn test_save_records_deletes_tombstones() {
        let source = Arc::new(MockSource::new("remote"));
        let cache = cache_over(source, vec![Record::new("old", ts(1), "x")]);
        let outcome = cache
            .save_records(vec![Record::tombstone("old"), Record::new("new", ts(2), "y")])
            .unwrap();
        assert_eq!(outcome.deleted, vec!["old".to_string()]);
        assert_eq!(outcome.saved.len(), 1);
        assert!(cache.store().get("old").unwrap().is_none());
        assert_eq!(cache.stats().deleted, 1);
    }

    #[test]
    fn test_for_each_batch_bounds_batches_and_filters() {
        let local: Vec<Record> = (0..7)
            .map(|i| Record::new(format!("Шаблон:{i}"), ts(1), "x"))
            .chain([Record::new("кот", ts(1), "x")])
            .collect();
        let cache = cache_over(Arc::new(MockSource::new("remote")), local);

        let mut sizes = Vec::new();
        let mut titles = Vec::new();
        cache
            .for_each_batch(&RecordFilter::new().with_prefix("Шаблон:"), 3, |records| {
                sizes.push(records.len());
                titles.extend(records.into_iter().map(|r| r.title));
                Ok(())
            })
            .unwrap();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(titles.len(), 7);
        assert!(titles.iter().all(|t| t.starts_with("Шаблон:")));
    }

    #[test]
    fn test_hit_rate() {
        let stats = CacheStats {
            hits: 80,
            misses: 20,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);
        assert!((CacheStats::default().hit_rate() - 0.0).abs() < 0.001);
    }
}
