//! Persistent compile cache.
//!
//! Compiled modules are stored per specifier under a fixed key namespace,
//! together with a checksum of the source they were compiled from. A lookup
//! only hits when the checksum of freshly fetched source matches, so any
//! change to the source, the compile options, or the cache format forces a
//! fresh compile.
//!
//! # Architecture
//!
//! - **Checksummed**: BLAKE3 over a format tag, the compile options and the source
//! - **Namespaced**: every key starts with [`CACHE_NAMESPACE`]; clearing the
//!   cache removes exactly that namespace
//! - **Best effort**: cache failures are logged and never fail a load
//!
//! Backends implement [`CompileCache`]: [`RedbCacheStore`] keeps a single
//! redb file on disk, [`MemoryCacheStore`] lives for the process.

mod checksum;
mod memory;
mod store;

pub use checksum::Checksum;
pub use memory::MemoryCacheStore;
pub use store::{DATABASE_FILE, RedbCacheStore};

use std::fmt::Debug;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use crate::compiler::DependencyReport;
use crate::specifier::ModuleSpecifier;

/// Prefix of every key this crate writes.
pub const CACHE_NAMESPACE: &str = "tsb-compiled:";

/// Error types for cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Cache database error.
    #[error("cache database error: {0}")]
    DatabaseError(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    DeserializationError(String),

    /// IO error.
    #[error("io error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;

/// Compiler output as stored in the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedCompile {
    pub report: DependencyReport,
    pub code: String,
}

/// One cache value: the compile and the checksum of its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub checksum: Checksum,
    pub compiled: CachedCompile,
}

/// Key/value storage for compiled modules.
pub trait CompileCache: Send + Sync + Debug {
    fn get(&self, specifier: &ModuleSpecifier) -> CacheResult<Option<CacheEntry>>;

    fn put(&self, specifier: &ModuleSpecifier, entry: &CacheEntry) -> CacheResult<()>;

    /// Remove every key under [`CACHE_NAMESPACE`]. Returns how many were removed.
    fn clear_namespace(&self) -> CacheResult<usize>;

    /// Number of entries under [`CACHE_NAMESPACE`].
    fn len(&self) -> CacheResult<usize>;

    fn is_empty(&self) -> CacheResult<bool> {
        Ok(self.len()? == 0)
    }
}

/// Storage key for `specifier`.
pub fn cache_key(specifier: &ModuleSpecifier) -> String {
    format!("{CACHE_NAMESPACE}{specifier}")
}

/// Configuration for persistent compile caching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub enabled: bool,

    /// Directory holding `compile-cache.redb`.
    pub dir: PathBuf,

    /// Skip cache reads but still write fresh compiles back.
    pub force_refresh: bool,
}

impl CacheConfig {
    /// Create an enabled cache config with the given directory.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            enabled: true,
            dir: dir.into(),
            force_refresh: false,
        }
    }

    pub fn with_force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    /// Force refresh is also requested by `TSB_FORCE_RECOMPILE`.
    pub fn should_force_refresh(&self) -> bool {
        self.force_refresh || std::env::var_os("TSB_FORCE_RECOMPILE").is_some()
    }

    /// Open the configured store, or `None` when caching is disabled.
    pub fn open(&self) -> CacheResult<Option<RedbCacheStore>> {
        if !self.enabled {
            return Ok(None);
        }
        RedbCacheStore::open(&self.dir).map(Some)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            dir: PathBuf::from(".cache/tsb"),
            force_refresh: false,
        }
    }
}

/// Return the cached compile for `specifier` if it was built from source
/// with `checksum`.
///
/// This is non-fatal - errors are logged and treated as a miss.
pub fn try_load(
    cache: &dyn CompileCache,
    specifier: &ModuleSpecifier,
    checksum: &Checksum,
) -> Option<CachedCompile> {
    match cache.get(specifier) {
        Ok(Some(entry)) if entry.checksum == *checksum => {
            debug!(specifier = %specifier, "compile cache hit");
            Some(entry.compiled)
        }
        Ok(Some(_)) => {
            debug!(specifier = %specifier, "compile cache stale");
            None
        }
        Ok(None) => {
            debug!(specifier = %specifier, "compile cache miss");
            None
        }
        Err(err) => {
            warn!(specifier = %specifier, error = %err, "compile cache read failed");
            None
        }
    }
}

/// Save a compile to the cache.
///
/// This is non-fatal - errors are logged but don't fail the load.
pub fn try_save(cache: &dyn CompileCache, specifier: &ModuleSpecifier, entry: &CacheEntry) {
    if let Err(err) = cache.put(specifier, entry) {
        warn!(specifier = %specifier, error = %err, "compile cache write failed");
    }
}

/// Clear the namespace after a failed load.
pub fn try_clear(cache: &dyn CompileCache) {
    match cache.clear_namespace() {
        Ok(removed) => debug!(removed, "compile cache cleared"),
        Err(err) => warn!(error = %err, "compile cache clear failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(s: &str) -> ModuleSpecifier {
        ModuleSpecifier::parse(s).unwrap()
    }

    fn entry(source: &str) -> CacheEntry {
        CacheEntry {
            checksum: Checksum::compute(source, &Default::default()),
            compiled: CachedCompile {
                report: DependencyReport {
                    is_module_source: true,
                    static_deps: vec![spec("/dep")],
                    dynamic_deps: vec![],
                },
                code: format!("compiled({source})"),
            },
        }
    }

    #[test]
    fn test_cache_config_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.dir, PathBuf::from(".cache/tsb"));
        assert!(!config.enabled);
        assert!(!config.force_refresh);
        assert!(config.open().unwrap().is_none());
    }

    #[test]
    fn test_cache_key_is_namespaced() {
        assert_eq!(cache_key(&spec("/src/a")), "tsb-compiled:/src/a");
    }

    #[test]
    fn test_try_load_checks_checksum() {
        let cache = MemoryCacheStore::new();
        let a = spec("/a");
        try_save(&cache, &a, &entry("v1"));

        let hit = try_load(&cache, &a, &Checksum::compute("v1", &Default::default()));
        assert_eq!(hit.map(|c| c.code), Some("compiled(v1)".to_string()));

        let stale = try_load(&cache, &a, &Checksum::compute("v2", &Default::default()));
        assert!(stale.is_none());

        assert!(try_load(&cache, &spec("/b"), &Checksum::compute("v1", &Default::default())).is_none());
    }

    #[test]
    fn test_try_clear_empties_namespace() {
        let cache = MemoryCacheStore::new();
        try_save(&cache, &spec("/a"), &entry("a"));
        try_save(&cache, &spec("/b"), &entry("b"));
        assert_eq!(cache.len().unwrap(), 2);

        try_clear(&cache);
        assert!(cache.is_empty().unwrap());
    }
}
