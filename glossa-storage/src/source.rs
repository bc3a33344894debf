//! Source capability: what a content cache needs from its upstream.
//!
//! An upstream is either a live remote (leaf) or another content cache
//! (composed). The cache never talks to a transport directly; it only calls
//! these methods, which is what lets raw, parsed and further-derived caches
//! share one refresh algorithm.

use std::collections::BTreeSet;

use glossa_core::{Force, GlossaResult, Record, SourceKind, Timestamp};

use crate::cache::ContentCache;
use crate::store::Stamps;

/// Per-cache description of how the upstream's records are treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceDescriptor {
    /// Name used in logs and errors.
    pub name: String,
    /// Whether lookups chase redirect records to their targets.
    pub follows_redirects: bool,
    /// Keep redirected titles as redirect markers; otherwise they are
    /// tombstoned (hard-deleted).
    pub retains_redirects: bool,
}

impl SourceDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            follows_redirects: true,
            retains_redirects: false,
        }
    }

    pub fn with_follow_redirects(mut self, follow: bool) -> Self {
        self.follows_redirects = follow;
        self
    }

    pub fn with_retain_redirects(mut self, retain: bool) -> Self {
        self.retains_redirects = retain;
        self
    }
}

/// Receives full-scan output in batches so the cache can persist as it goes.
pub type ScanSink<'a> = dyn FnMut(Vec<Record>) -> GlossaResult<()> + 'a;

/// Upstream contract consumed by [`ContentCache`].
pub trait SourceCapability: Send + Sync {
    fn descriptor(&self) -> &SourceDescriptor;

    /// The cache this source derives from, if any.
    fn upstream(&self) -> Option<&ContentCache> {
        None
    }

    fn kind(&self) -> SourceKind {
        if self.upstream().is_some() {
            SourceKind::Composed
        } else {
            SourceKind::Leaf
        }
    }

    fn supports_refresh(&self) -> bool;

    /// Titles changed upstream since `since`, with their change times.
    fn discover_changes(&self, since: Timestamp) -> GlossaResult<Vec<(String, Timestamp)>>;

    /// Fetch `titles`. Titles that no longer exist come back as tombstones.
    fn fetch(&self, titles: &[String], force: Force) -> GlossaResult<Vec<Record>>;

    /// Stream every upstream record through `sink`, skipping titles whose
    /// stamp in `exclude` is already current. Returns every title present
    /// upstream, excluded or not.
    fn full_scan(&self, exclude: &Stamps, sink: &mut ScanSink<'_>)
        -> GlossaResult<BTreeSet<String>>;
}

/// Whether a stored stamp makes re-fetching `candidate` unnecessary.
pub fn is_current(existing: Option<&Option<Timestamp>>, candidate: Option<Timestamp>) -> bool {
    match existing {
        None => false,
        Some(stored) => match (stored, candidate) {
            (Some(stored), Some(candidate)) => *stored >= candidate,
            (_, None) => true,
            (None, Some(_)) => false,
        },
    }
}
