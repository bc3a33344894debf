//! Cache bypass control

use serde::{Deserialize, Serialize};

/// Whether a cache is fed by a live remote or by another cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceKind {
    Leaf,
    Composed,
}

/// How a lookup treats locally cached records.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Force {
    /// Serve local hits, escalate only misses.
    #[default]
    UseCache,
    /// Recompute the record and make every nested lookup bypass its cache too.
    ForceAll,
    /// Recompute the record, but let nested lookups use their caches.
    ForceLocalOnly,
}

impl Force {
    /// Whether a cache fed by a source of `kind` must skip local hits.
    ///
    /// `ForceLocalOnly` only recomputes derived records; leaf caches keep
    /// serving what they hold.
    pub fn bypasses(self, kind: SourceKind) -> bool {
        match self {
            Force::UseCache => false,
            Force::ForceAll => true,
            Force::ForceLocalOnly => kind == SourceKind::Composed,
        }
    }

    /// The force level handed to lookups made while computing a record.
    pub fn nested(self) -> Force {
        match self {
            Force::ForceAll => Force::ForceAll,
            Force::UseCache | Force::ForceLocalOnly => Force::UseCache,
        }
    }
}
