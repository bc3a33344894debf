//! Record persistence.
//!
//! [`RecordStore`] is the only thing a content cache needs from its storage:
//! get by key, filter by timestamp, upsert and delete. [`LmdbRecordStore`]
//! is the on-disk implementation, [`InMemoryRecordStore`] the test double.

pub mod lmdb_backend;
pub mod memory;
pub mod traits;

pub use lmdb_backend::{LmdbRecordStore, LmdbStoreError};
pub use memory::InMemoryRecordStore;
pub use traits::{RecordFilter, RecordStore, Stamps};
