//! Derived caches: a source that computes its records from another cache.
//!
//! [`DerivedSource`] reads records from an upstream [`ContentCache`] and runs
//! a [`PageTransform`] over each one. Chaining these builds multi-stage
//! pipelines (raw pages -> parsed tokens -> ...), and because the source
//! reports the upstream cache, the downstream cache refreshes as a composed
//! cache: it inherits the upstream watermark and re-derives only the delta.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use glossa_core::{Force, GlossaError, GlossaResult, Record, Timestamp};

use crate::cache::ContentCache;
use crate::source::{is_current, ScanSink, SourceCapability, SourceDescriptor};
use crate::store::{RecordFilter, Stamps};

const SCAN_BATCH: usize = 200;

/// Per-record computation behind a derived cache.
pub trait PageTransform: Send + Sync {
    fn name(&self) -> &str;

    /// Compute the derived record, or `None` to produce nothing for this
    /// input. Recoverable errors are turned into error-marker records by the
    /// caller; any other error is structural.
    fn transform(&self, record: &Record, force: Force) -> GlossaResult<Option<Record>>;
}

/// What to do with a non-recoverable transform error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StructuralErrorPolicy {
    /// Propagate, aborting the fetch or refresh.
    #[default]
    Abort,
    /// Store the error text on the record like a recoverable error.
    Isolate,
}

pub struct DerivedSource<T: PageTransform> {
    descriptor: SourceDescriptor,
    upstream: Arc<ContentCache>,
    transform: T,
    policy: StructuralErrorPolicy,
}

impl<T: PageTransform> DerivedSource<T> {
    pub fn new(upstream: Arc<ContentCache>, transform: T) -> Self {
        let descriptor = SourceDescriptor::new(transform.name().to_string());
        Self {
            descriptor,
            upstream,
            transform,
            policy: StructuralErrorPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: StructuralErrorPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn transformer(&self) -> &T {
        &self.transform
    }

    /// Run the transform on one record, applying the error contract.
    pub fn apply(&self, record: &Record, force: Force) -> GlossaResult<Option<Record>> {
        match self.transform.transform(record, force) {
            Ok(derived) => Ok(derived),
            Err(err) if err.is_recoverable() => {
                tracing::warn!(
                    transform = %self.transform.name(),
                    title = %record.title,
                    error = %err,
                    "record failed validation"
                );
                Ok(Some(record.derive_error(&err)))
            }
            Err(err) => self.on_structural(record, err),
        }
    }

    fn on_structural(&self, record: &Record, err: GlossaError) -> GlossaResult<Option<Record>> {
        match self.policy {
            StructuralErrorPolicy::Abort => {
                tracing::error!(
                    transform = %self.transform.name(),
                    title = %record.title,
                    error = %err,
                    "structural error, aborting"
                );
                Err(err)
            }
            StructuralErrorPolicy::Isolate => {
                tracing::error!(
                    transform = %self.transform.name(),
                    title = %record.title,
                    error = %err,
                    "structural error, isolating record"
                );
                Ok(Some(record.derive_error(&err)))
            }
        }
    }
}

impl<T: PageTransform> SourceCapability for DerivedSource<T> {
    fn descriptor(&self) -> &SourceDescriptor {
        &self.descriptor
    }

    fn upstream(&self) -> Option<&ContentCache> {
        Some(self.upstream.as_ref())
    }

    fn supports_refresh(&self) -> bool {
        true
    }

    fn discover_changes(&self, since: Timestamp) -> GlossaResult<Vec<(String, Timestamp)>> {
        Ok(self
            .upstream
            .stamps(Some(since))?
            .into_iter()
            .filter_map(|(title, ts)| ts.map(|ts| (title, ts)))
            .collect())
    }

    fn fetch(&self, titles: &[String], force: Force) -> GlossaResult<Vec<Record>> {
        let records = self.upstream.get_multiple(titles, Force::UseCache)?;
        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::with_capacity(records.len());
        for record in &records {
            seen.insert(record.title.clone());
            if let Some(derived) = self.apply(record, force)? {
                out.push(derived);
            }
        }
        out.extend(
            titles
                .iter()
                .filter(|t| !seen.contains(*t))
                .map(|t| Record::tombstone(t.as_str())),
        );
        Ok(out)
    }

    fn full_scan(
        &self,
        exclude: &Stamps,
        sink: &mut ScanSink<'_>,
    ) -> GlossaResult<BTreeSet<String>> {
        let mut present = BTreeSet::new();
        let mut batch = Vec::with_capacity(SCAN_BATCH);
        self.upstream
            .for_each_batch(&RecordFilter::new(), SCAN_BATCH, |records| {
                for record in records {
                    present.insert(record.title.clone());
                    if is_current(exclude.get(&record.title), record.timestamp) {
                        continue;
                    }
                    if let Some(derived) = self.apply(&record, Force::UseCache)? {
                        batch.push(derived);
                    }
                    if batch.len() >= SCAN_BATCH {
                        sink(std::mem::take(&mut batch))?;
                    }
                }
                Ok(())
            })?;
        if !batch.is_empty() {
            sink(batch)?;
        }
        Ok(present)
    }
}
