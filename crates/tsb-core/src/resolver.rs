//! Graph resolver: concurrent breadth-first discovery.
//!
//! Every specifier goes through fetch then compile exactly once per request.
//! Completions are consumed in whatever order they finish; each one moves a
//! record into the graph and schedules the dependencies it reported.
//!
//! ```text
//!         ┌──────────── pending ────────────┐
//! entry ─▶│ fetch ─▶ submit ─▶ deps reported│─▶ graph.insert
//!         └─────────────────────────────────┘      │
//!                  ▲          static + literal dynamic deps
//!                  └───────────────────────────────┘
//! ```
//!
//! Resolution is complete when nothing is pending. A step budget bounds the
//! number of completions.

use std::sync::Arc;

use futures::future::FutureExt;
use futures::stream::{FuturesUnordered, StreamExt};
use rustc_hash::FxHashSet;
use tracing::{debug, trace};

use crate::cache::{self, CacheEntry, CachedCompile, Checksum, CompileCache};
use crate::compiler::{
    CodeFuture, CompileOptions, CompileRequest, CompilerPool, DependencyReport,
};
use crate::config::DEFAULT_MAX_RESOLUTION_STEPS;
use crate::error::{LoaderError, Result};
use crate::fetcher::SourceFetcher;
use crate::graph::{CompiledRecord, DependencyGraph};
use crate::specifier::ModuleSpecifier;

/// Discovers and compiles the module graph reachable from a set of entries.
#[derive(Debug, Clone)]
pub struct GraphResolver {
    fetcher: SourceFetcher,
    pool: CompilerPool,
    cache: Option<Arc<dyn CompileCache>>,
    force_refresh: bool,
    max_steps: usize,
}

impl GraphResolver {
    pub fn new(fetcher: SourceFetcher, pool: CompilerPool) -> Self {
        Self {
            fetcher,
            pool,
            cache: None,
            force_refresh: false,
            max_steps: DEFAULT_MAX_RESOLUTION_STEPS,
        }
    }

    /// Consult and populate `cache`. With `force_refresh`, lookups are
    /// skipped but fresh compiles are still written back.
    pub fn with_cache(mut self, cache: Arc<dyn CompileCache>, force_refresh: bool) -> Self {
        self.cache = Some(cache);
        self.force_refresh = force_refresh;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn pool(&self) -> &CompilerPool {
        &self.pool
    }

    pub async fn resolve(
        &self,
        entries: &[ModuleSpecifier],
        options: &CompileOptions,
    ) -> Result<DependencyGraph> {
        self.resolve_skipping(entries, options, |_| false).await
    }

    /// Like [`resolve`](Self::resolve), but never schedules specifiers for
    /// which `skip` returns true (typically modules that are already loaded).
    pub async fn resolve_skipping<F>(
        &self,
        entries: &[ModuleSpecifier],
        options: &CompileOptions,
        skip: F,
    ) -> Result<DependencyGraph>
    where
        F: Fn(&ModuleSpecifier) -> bool,
    {
        let mut graph = DependencyGraph::new(entries.to_vec());
        let mut pending: FxHashSet<ModuleSpecifier> = FxHashSet::default();
        let mut in_flight = FuturesUnordered::new();

        for entry in entries {
            if !skip(entry) && pending.insert(entry.clone()) {
                in_flight.push(self.fetch_and_compile(entry.clone(), options));
            }
        }

        let mut budget = self.max_steps;
        while let Some(result) = in_flight.next().await {
            if budget == 0 {
                return Err(LoaderError::ResolutionDidNotConverge {
                    budget: self.max_steps,
                });
            }
            budget -= 1;

            let record = result?;
            pending.remove(&record.specifier);

            let discovered: Vec<ModuleSpecifier> = record
                .static_deps()
                .iter()
                .chain(record.dynamic_deps())
                .cloned()
                .collect();
            graph.insert(record);

            for dep in discovered {
                if graph.contains(&dep) || pending.contains(&dep) || skip(&dep) {
                    continue;
                }
                pending.insert(dep.clone());
                in_flight.push(self.fetch_and_compile(dep, options));
            }

            debug!(
                resolved = graph.len(),
                pending = pending.len(),
                "resolution step"
            );
        }

        Ok(graph)
    }

    async fn fetch_and_compile(
        &self,
        specifier: ModuleSpecifier,
        options: &CompileOptions,
    ) -> Result<CompiledRecord> {
        let source = self.fetcher.fetch(&specifier, options.jsx).await?;

        let checksum = self
            .cache
            .as_ref()
            .map(|_| Checksum::compute(&source.raw_source, options));

        if let (Some(cache), Some(checksum)) = (&self.cache, &checksum) {
            if !self.force_refresh {
                if let Some(cached) = cache::try_load(cache.as_ref(), &specifier, checksum) {
                    let code: Arc<str> = cached.code.into();
                    return Ok(CompiledRecord {
                        specifier,
                        location: source.location,
                        report: cached.report,
                        code: futures::future::ready(Ok(code)).boxed().shared(),
                        from_cache: true,
                    });
                }
            }
        }

        trace!(specifier = %specifier, location = %source.location, "submitting compile");
        let output = self
            .pool
            .submit(CompileRequest {
                specifier: specifier.clone(),
                location: source.location.clone(),
                source_text: Arc::clone(&source.raw_source),
                options: options.clone(),
            })
            .await?;

        let code = match (self.cache.clone(), checksum) {
            (Some(cache), Some(checksum)) => write_back(
                output.code,
                cache,
                specifier.clone(),
                checksum,
                output.report.clone(),
            ),
            _ => output.code,
        };

        Ok(CompiledRecord {
            specifier,
            location: source.location,
            report: output.report,
            code,
            from_cache: false,
        })
    }
}

/// Store the compile once its code is generated.
fn write_back(
    code: CodeFuture,
    cache: Arc<dyn CompileCache>,
    specifier: ModuleSpecifier,
    checksum: Checksum,
    report: DependencyReport,
) -> CodeFuture {
    code.map(move |result| {
        if let Ok(code) = &result {
            let entry = CacheEntry {
                checksum,
                compiled: CachedCompile {
                    report,
                    code: code.to_string(),
                },
            };
            cache::try_save(cache.as_ref(), &specifier, &entry);
        }
        result
    })
    .boxed()
    .shared()
}
