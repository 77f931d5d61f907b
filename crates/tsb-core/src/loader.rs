//! The module loader service.
//!
//! [`ModuleLoader`] owns the process-wide pieces: the compiler pool, the
//! optional persistent cache, the fetcher over a [`ContentSource`], the host
//! and the module registry. It is cheap to clone and meant to be built once.
//!
//! ```text
//! load_module(entry)
//!   ├─ registry hit ─────────────────────────────▶ LoadedModule
//!   └─ resolve (skip loaded) ─▶ await code ─▶ [assembly lock] ─▶ assemble
//!                                                     │
//!                        host ◀── instantiate ────────┘
//!                          └── DynamicImporter ─▶ import_dynamic(raw, base)
//! ```
//!
//! Fetching and compiling run concurrently across requests. Assembly is
//! serialized by one async lock, which keeps instantiation at most once per
//! specifier for the lifetime of the loader.
//!
//! Records compiled but not instantiated by a load (literal `import()`
//! targets) are kept as prepared records, so a later dynamic import of the
//! same specifier only instantiates.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use rustc_hash::FxHashSet;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::assembler::{Assembler, ModuleRegistry};
use crate::cache::{self, CacheConfig, CompileCache};
use crate::compiler::{CompileOptions, CompilerFactory, CompilerPool, default_pool_size};
use crate::config::{DEFAULT_MAX_RESOLUTION_STEPS, LoaderConfig};
use crate::error::{LoaderError, Result};
use crate::fetcher::SourceFetcher;
use crate::graph::{CompiledRecord, DependencyGraph};
use crate::host::ModuleHost;
use crate::module::LoadedModule;
use crate::resolver::GraphResolver;
use crate::source::ContentSource;
use crate::specifier::ModuleSpecifier;

struct LoaderInner {
    resolver: GraphResolver,
    assembler: Assembler,
    registry: Arc<ModuleRegistry>,
    prepared: DashMap<ModuleSpecifier, PreparedRecord>,
    cache: Option<Arc<dyn CompileCache>>,
    assembly: AsyncMutex<()>,
    options: CompileOptions,
    importer: DynamicImporter,
}

/// A compiled record waiting for its first instantiation.
struct PreparedRecord {
    options: CompileOptions,
    record: CompiledRecord,
}

/// Loads TypeScript modules on demand.
#[derive(Clone)]
pub struct ModuleLoader {
    inner: Arc<LoaderInner>,
}

impl std::fmt::Debug for ModuleLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleLoader")
            .field("pool", self.inner.resolver.pool())
            .field("loaded", &self.inner.registry.len())
            .field("cache", &self.inner.cache)
            .finish_non_exhaustive()
    }
}

impl ModuleLoader {
    pub fn builder(
        source: Arc<dyn ContentSource>,
        host: Arc<dyn ModuleHost>,
        factory: Arc<dyn CompilerFactory>,
    ) -> ModuleLoaderBuilder {
        ModuleLoaderBuilder::new(source, host, factory)
    }

    /// Load `entry` with the loader's default compile options.
    pub async fn load_module(&self, entry: &str) -> Result<Arc<LoadedModule>> {
        let options = self.inner.options.clone();
        self.load_module_with(entry, &options).await
    }

    /// Load `entry` and its static dependencies, compiling with `options`.
    ///
    /// A module that is already loaded is returned without touching the
    /// network or the pool.
    pub async fn load_module_with(
        &self,
        entry: &str,
        options: &CompileOptions,
    ) -> Result<Arc<LoadedModule>> {
        let entry = ModuleSpecifier::parse(entry)?;
        self.load_specifier(entry, options).await
    }

    /// The single run-time import entry point.
    ///
    /// `raw` is resolved against `base`, the importing module's location, then
    /// loaded like a top-level entry. Repeat imports are served from the
    /// registry.
    pub async fn import_dynamic(&self, raw: &str, base: &str) -> Result<Arc<LoadedModule>> {
        let specifier = ModuleSpecifier::resolve(raw, base)?;
        debug!(raw, base, specifier = %specifier, "dynamic import");
        let options = self.inner.options.clone();
        self.load_specifier(specifier, &options).await
    }

    /// Resolve and compile the graph reachable from `entries` without
    /// loading anything.
    pub async fn resolve_graph(
        &self,
        entries: &[ModuleSpecifier],
        options: &CompileOptions,
    ) -> Result<DependencyGraph> {
        let result = self.inner.resolver.resolve(entries, options).await;
        if result.is_err() {
            self.clear_cache();
        }
        result
    }

    /// Handle for hosts to reach [`import_dynamic`](Self::import_dynamic).
    pub fn importer(&self) -> DynamicImporter {
        self.inner.importer.clone()
    }

    pub fn registry(&self) -> &ModuleRegistry {
        &self.inner.registry
    }

    pub fn pool(&self) -> &CompilerPool {
        self.inner.resolver.pool()
    }

    pub fn cache(&self) -> Option<&Arc<dyn CompileCache>> {
        self.inner.cache.as_ref()
    }

    pub fn compile_options(&self) -> &CompileOptions {
        &self.inner.options
    }

    async fn load_specifier(
        &self,
        specifier: ModuleSpecifier,
        options: &CompileOptions,
    ) -> Result<Arc<LoadedModule>> {
        if let Some(module) = self.inner.registry.get(&specifier) {
            debug!(specifier = %specifier, "already loaded");
            return Ok(module);
        }

        info!(specifier = %specifier, "loading module");
        let result = self.resolve_and_assemble(&specifier, options).await;
        if let Err(err) = &result {
            warn!(specifier = %specifier, error = %err, "load failed");
            self.clear_cache();
        }
        result
    }

    async fn resolve_and_assemble(
        &self,
        specifier: &ModuleSpecifier,
        options: &CompileOptions,
    ) -> Result<Arc<LoadedModule>> {
        let registry = &self.inner.registry;
        let prepared = &self.inner.prepared;
        let mut graph = self
            .inner
            .resolver
            .resolve_skipping(std::slice::from_ref(specifier), options, |s| {
                registry.is_loaded(s)
                    || prepared.get(s).is_some_and(|p| &p.options == options)
            })
            .await?;
        graph.await_code().await?;
        self.adopt_prepared(&mut graph, specifier, options);

        let _assembly = self.inner.assembly.lock().await;
        let result = self
            .inner
            .assembler
            .load(&graph, specifier, &self.inner.importer)
            .await;
        self.retain_prepared(&graph, options);
        result
    }

    /// Copy prepared records reachable from `entry` into `graph`.
    fn adopt_prepared(
        &self,
        graph: &mut DependencyGraph,
        entry: &ModuleSpecifier,
        options: &CompileOptions,
    ) {
        let mut visited = FxHashSet::default();
        let mut stack = vec![entry.clone()];
        while let Some(specifier) = stack.pop() {
            if !visited.insert(specifier.clone()) || self.inner.registry.is_loaded(&specifier) {
                continue;
            }
            if !graph.contains(&specifier) {
                let Some(prepared) = self.inner.prepared.get(&specifier) else {
                    continue;
                };
                if &prepared.options != options {
                    continue;
                }
                debug!(specifier = %specifier, "reusing prepared compile");
                graph.insert(prepared.record.clone());
            }
            if let Some(record) = graph.get(&specifier) {
                stack.extend(record.static_deps().iter().cloned());
            }
        }
    }

    /// Keep records the load compiled but did not instantiate; forget the
    /// ones that are now in the registry.
    fn retain_prepared(&self, graph: &DependencyGraph, options: &CompileOptions) {
        for record in graph.iter() {
            if self.inner.registry.is_loaded(&record.specifier) {
                self.inner.prepared.remove(&record.specifier);
            } else {
                self.inner.prepared.insert(
                    record.specifier.clone(),
                    PreparedRecord {
                        options: options.clone(),
                        record: record.clone(),
                    },
                );
            }
        }
    }

    fn clear_cache(&self) {
        if let Some(cache) = &self.inner.cache {
            cache::try_clear(cache.as_ref());
        }
    }
}

/// Cloneable handle that lets compiled code call back into the loader.
///
/// Holds the loader weakly; once every [`ModuleLoader`] clone is dropped,
/// imports fail with [`LoaderError::PoolUnavailable`]. Do not block on an
/// import from inside [`ModuleHost::instantiate`]: assembly is serialized, so
/// the import would wait for the instantiation that is waiting for it.
#[derive(Clone)]
pub struct DynamicImporter {
    loader: Weak<LoaderInner>,
}

impl std::fmt::Debug for DynamicImporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicImporter")
            .field("attached", &self.is_attached())
            .finish()
    }
}

impl DynamicImporter {
    /// An importer not connected to any loader.
    pub fn detached() -> Self {
        Self { loader: Weak::new() }
    }

    pub fn is_attached(&self) -> bool {
        self.loader.strong_count() > 0
    }

    /// Import `raw` as seen from the module at `base`.
    pub async fn import(&self, raw: &str, base: &str) -> Result<Arc<LoadedModule>> {
        let inner = self
            .loader
            .upgrade()
            .ok_or_else(|| LoaderError::PoolUnavailable {
                reason: "module loader has been dropped".to_string(),
            })?;
        ModuleLoader { inner }.import_dynamic(raw, base).await
    }
}

/// Builder for [`ModuleLoader`].
pub struct ModuleLoaderBuilder {
    source: Arc<dyn ContentSource>,
    host: Arc<dyn ModuleHost>,
    factory: Arc<dyn CompilerFactory>,
    pool_size: Option<usize>,
    constrained: bool,
    max_resolution_steps: usize,
    cache: Option<Arc<dyn CompileCache>>,
    cache_config: Option<CacheConfig>,
    force_refresh: bool,
    options: CompileOptions,
}

impl ModuleLoaderBuilder {
    fn new(
        source: Arc<dyn ContentSource>,
        host: Arc<dyn ModuleHost>,
        factory: Arc<dyn CompilerFactory>,
    ) -> Self {
        Self {
            source,
            host,
            factory,
            pool_size: None,
            constrained: false,
            max_resolution_steps: DEFAULT_MAX_RESOLUTION_STEPS,
            cache: None,
            cache_config: None,
            force_refresh: false,
            options: CompileOptions::default(),
        }
    }

    /// Apply every setting from `config`. A persistent cache configured there
    /// is opened by [`build`](Self::build).
    pub fn config(mut self, config: &LoaderConfig) -> Self {
        self.pool_size = config.pool_size;
        self.constrained = config.constrained;
        self.max_resolution_steps = config.max_resolution_steps;
        self.options = config.compile.clone();
        self.force_refresh = config.cache.should_force_refresh();
        self.cache_config = config.cache.enabled.then(|| config.cache.clone());
        self
    }

    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    pub fn constrained(mut self, constrained: bool) -> Self {
        self.constrained = constrained;
        self
    }

    pub fn max_resolution_steps(mut self, steps: usize) -> Self {
        self.max_resolution_steps = steps;
        self
    }

    /// Use `cache` instead of any configured store.
    pub fn cache(mut self, cache: Arc<dyn CompileCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn force_refresh(mut self, force: bool) -> Self {
        self.force_refresh = force;
        self
    }

    pub fn compile_options(mut self, options: CompileOptions) -> Self {
        self.options = options;
        self
    }

    /// Start the compiler pool and assemble the loader.
    ///
    /// Must be called from within a tokio runtime. A configured cache that
    /// fails to open is logged and skipped.
    pub fn build(self) -> Result<ModuleLoader> {
        let size = self
            .pool_size
            .unwrap_or_else(|| default_pool_size(self.constrained));
        let pool = CompilerPool::new(size, self.factory)?;

        let cache = match (self.cache, &self.cache_config) {
            (Some(cache), _) => Some(cache),
            (None, Some(config)) => match config.open() {
                Ok(store) => store.map(|s| Arc::new(s) as Arc<dyn CompileCache>),
                Err(err) => {
                    warn!(dir = %config.dir.display(), error = %err, "compile cache unavailable");
                    None
                }
            },
            (None, None) => None,
        };

        let mut resolver = GraphResolver::new(SourceFetcher::new(self.source), pool)
            .with_max_steps(self.max_resolution_steps);
        if let Some(cache) = &cache {
            resolver = resolver.with_cache(Arc::clone(cache), self.force_refresh);
        }

        let registry = Arc::new(ModuleRegistry::new());
        let assembler = Assembler::new(self.host, Arc::clone(&registry));
        let options = self.options;

        info!(pool_size = size, cache = cache.is_some(), "module loader ready");

        let inner = Arc::new_cyclic(|weak| LoaderInner {
            resolver,
            assembler,
            registry,
            prepared: DashMap::new(),
            cache,
            assembly: AsyncMutex::new(()),
            options,
            importer: DynamicImporter {
                loader: weak.clone(),
            },
        });
        Ok(ModuleLoader { inner })
    }
}
