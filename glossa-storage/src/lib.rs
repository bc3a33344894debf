//! glossa storage - record stores, content caches and refresh
//!
//! A [`ContentCache`] mirrors one upstream ([`SourceCapability`]) into a
//! [`RecordStore`]. Leaf caches sit on a remote wiki; composed caches sit on
//! another cache through a [`DerivedSource`].

pub mod cache;
pub mod derived;
pub mod mock;
pub mod progress;
pub mod source;
pub mod store;
pub mod watermark;

pub use cache::{CacheStats, ContentCache, RefreshMode, SaveOutcome};
pub use derived::{DerivedSource, PageTransform, StructuralErrorPolicy};
pub use mock::MockSource;
pub use progress::ProgressReporter;
pub use source::{is_current, ScanSink, SourceCapability, SourceDescriptor};

// Re-export store types for pipeline wiring
pub use store::{
    InMemoryRecordStore, LmdbRecordStore, LmdbStoreError, RecordFilter, RecordStore, Stamps,
};
pub use watermark::Watermark;
