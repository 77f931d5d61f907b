use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use super::{CacheEntry, CacheResult, CompileCache, cache_key};
use crate::specifier::ModuleSpecifier;

/// Process-lifetime cache backend.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    entries: RwLock<FxHashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompileCache for MemoryCacheStore {
    fn get(&self, specifier: &ModuleSpecifier) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().get(&cache_key(specifier)).cloned())
    }

    fn put(&self, specifier: &ModuleSpecifier, entry: &CacheEntry) -> CacheResult<()> {
        self.entries.write().insert(cache_key(specifier), entry.clone());
        Ok(())
    }

    fn clear_namespace(&self) -> CacheResult<usize> {
        let mut entries = self.entries.write();
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn len(&self) -> CacheResult<usize> {
        Ok(self.entries.read().len())
    }
}
