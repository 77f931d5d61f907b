//! redb-backed cache storage.
//!
//! Provides persistent key-value storage using redb, an embedded ACID database.
//! The database file may be shared with other tools; this store only reads,
//! counts and clears keys under its own namespace.

use std::path::Path;

use redb::{Database, ReadableDatabase, ReadableTable, TableDefinition};

use super::{CACHE_NAMESPACE, CacheEntry, CacheError, CacheResult, CompileCache, cache_key};
use crate::specifier::ModuleSpecifier;

/// Maps namespaced keys to bincode-serialized [`CacheEntry`] values.
const COMPILED_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("compiled");

/// File name of the database inside the cache directory.
pub const DATABASE_FILE: &str = "compile-cache.redb";

impl From<redb::Error> for CacheError {
    fn from(err: redb::Error) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::DatabaseError> for CacheError {
    fn from(err: redb::DatabaseError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::TableError> for CacheError {
    fn from(err: redb::TableError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::TransactionError> for CacheError {
    fn from(err: redb::TransactionError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::StorageError> for CacheError {
    fn from(err: redb::StorageError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

impl From<redb::CommitError> for CacheError {
    fn from(err: redb::CommitError) -> Self {
        CacheError::DatabaseError(err.to_string())
    }
}

/// Persistent compile cache using redb.
pub struct RedbCacheStore {
    db: Database,
}

impl std::fmt::Debug for RedbCacheStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedbCacheStore").finish_non_exhaustive()
    }
}

impl RedbCacheStore {
    /// Open or create a cache store at `<cache_dir>/compile-cache.redb`.
    ///
    /// Creates the directory and database file if they don't exist.
    pub fn open(cache_dir: &Path) -> CacheResult<Self> {
        std::fs::create_dir_all(cache_dir)?;

        let db = Database::create(cache_dir.join(DATABASE_FILE))?;

        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(COMPILED_TABLE)?;
        }
        write_txn.commit()?;

        Ok(Self { db })
    }

    /// Store a raw value under an arbitrary key, outside the namespace rules.
    /// Used to share the file with other tools.
    pub fn put_raw(&self, key: &str, value: &[u8]) -> CacheResult<()> {
        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(COMPILED_TABLE)?;
            table.insert(key, value)?;
        }
        write_txn.commit()?;
        Ok(())
    }

    pub fn contains_raw(&self, key: &str) -> CacheResult<bool> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMPILED_TABLE)?;
        Ok(table.get(key)?.is_some())
    }
}

impl CompileCache for RedbCacheStore {
    fn get(&self, specifier: &ModuleSpecifier) -> CacheResult<Option<CacheEntry>> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMPILED_TABLE)?;

        let Some(value) = table.get(cache_key(specifier).as_str())? else {
            return Ok(None);
        };

        let entry: CacheEntry = bincode::deserialize(value.value())
            .map_err(|e| CacheError::DeserializationError(e.to_string()))?;
        Ok(Some(entry))
    }

    fn put(&self, specifier: &ModuleSpecifier, entry: &CacheEntry) -> CacheResult<()> {
        let bytes =
            bincode::serialize(entry).map_err(|e| CacheError::SerializationError(e.to_string()))?;

        let write_txn = self.db.begin_write()?;
        {
            let mut table = write_txn.open_table(COMPILED_TABLE)?;
            table.insert(cache_key(specifier).as_str(), bytes.as_slice())?;
        }
        write_txn.commit()?;

        Ok(())
    }

    fn clear_namespace(&self) -> CacheResult<usize> {
        let write_txn = self.db.begin_write()?;
        let removed = {
            let mut table = write_txn.open_table(COMPILED_TABLE)?;

            let mut keys = Vec::new();
            for entry in table.iter()? {
                let (key, _) = entry?;
                if key.value().starts_with(CACHE_NAMESPACE) {
                    keys.push(key.value().to_string());
                }
            }
            for key in &keys {
                table.remove(key.as_str())?;
            }
            keys.len()
        };
        write_txn.commit()?;

        Ok(removed)
    }

    fn len(&self) -> CacheResult<usize> {
        let read_txn = self.db.begin_read()?;
        let table = read_txn.open_table(COMPILED_TABLE)?;

        let mut count = 0;
        for entry in table.iter()? {
            let (key, _) = entry?;
            if key.value().starts_with(CACHE_NAMESPACE) {
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{CachedCompile, Checksum};
    use crate::compiler::{CompileOptions, DependencyReport};
    use tempfile::TempDir;

    fn create_test_store() -> (RedbCacheStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RedbCacheStore::open(dir.path()).unwrap();
        (store, dir)
    }

    fn spec(s: &str) -> ModuleSpecifier {
        ModuleSpecifier::parse(s).unwrap()
    }

    fn entry(code: &str) -> CacheEntry {
        CacheEntry {
            checksum: Checksum::compute(code, &CompileOptions::default()),
            compiled: CachedCompile {
                report: DependencyReport {
                    is_module_source: true,
                    static_deps: vec![spec("/b")],
                    dynamic_deps: vec![spec("/lazy")],
                },
                code: code.to_string(),
            },
        }
    }

    #[test]
    fn test_store_open_creates_directory() {
        let dir = TempDir::new().unwrap();
        let cache_dir = dir.path().join("new_cache");

        let _store = RedbCacheStore::open(&cache_dir).unwrap();

        assert!(cache_dir.join(DATABASE_FILE).exists());
    }

    #[test]
    fn test_cache_miss() {
        let (store, _dir) = create_test_store();
        assert!(store.get(&spec("/nonexistent")).unwrap().is_none());
    }

    #[test]
    fn test_put_get() {
        let (store, _dir) = create_test_store();
        let a = spec("/a");

        store.put(&a, &entry("const a = 1;")).unwrap();
        assert_eq!(store.get(&a).unwrap(), Some(entry("const a = 1;")));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = RedbCacheStore::open(dir.path()).unwrap();
            store.put(&spec("/a"), &entry("a")).unwrap();
        }
        let store = RedbCacheStore::open(dir.path()).unwrap();
        assert_eq!(store.get(&spec("/a")).unwrap(), Some(entry("a")));
    }

    #[test]
    fn test_clear_namespace_keeps_foreign_keys() {
        let (store, _dir) = create_test_store();
        store.put(&spec("/a"), &entry("a")).unwrap();
        store.put(&spec("/b"), &entry("b")).unwrap();
        store.put_raw("other-tool:settings", b"keep me").unwrap();

        assert_eq!(store.clear_namespace().unwrap(), 2);
        assert!(store.is_empty().unwrap());
        assert!(store.contains_raw("other-tool:settings").unwrap());
    }
}
