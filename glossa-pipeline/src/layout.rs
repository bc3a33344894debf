//! Where each cache of the pipeline keeps its records

use std::path::PathBuf;

use glossa_core::GlossaResult;
use glossa_storage::{InMemoryRecordStore, LmdbRecordStore, RecordStore};

/// Upper bound of each LMDB memory map.
pub const DEFAULT_MAP_SIZE_MB: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreLayout {
    /// One LMDB environment per cache under `root/<cache name>`.
    Lmdb { root: PathBuf, map_size_mb: usize },
    /// Nothing survives the process.
    Memory,
}

impl StoreLayout {
    pub fn lmdb(root: impl Into<PathBuf>) -> Self {
        StoreLayout::Lmdb {
            root: root.into(),
            map_size_mb: DEFAULT_MAP_SIZE_MB,
        }
    }

    pub fn open(&self, cache: &str) -> GlossaResult<Box<dyn RecordStore>> {
        match self {
            StoreLayout::Lmdb { root, map_size_mb } => {
                let path = root.join(cache);
                tracing::debug!(cache, path = %path.display(), "opening LMDB store");
                Ok(Box::new(LmdbRecordStore::open(path, *map_size_mb)?))
            }
            StoreLayout::Memory => Ok(Box::new(InMemoryRecordStore::new())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lmdb_layout_uses_one_directory_per_cache() {
        let dir = TempDir::new().unwrap();
        let layout = StoreLayout::lmdb(dir.path());
        layout.open("pages").unwrap();
        layout.open("parsed").unwrap();
        assert!(dir.path().join("pages").is_dir());
        assert!(dir.path().join("parsed").is_dir());
    }

    #[test]
    fn test_memory_layout_starts_empty() {
        let store = StoreLayout::Memory.open("pages").unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }
}
