//! Dependency graph produced by resolution.

use std::sync::Arc;

use futures::future::try_join_all;
use indexmap::IndexMap;
use serde::Serialize;

use crate::compiler::{CodeFuture, DependencyReport};
use crate::error::Result;
use crate::specifier::ModuleSpecifier;

/// One compiled module. Dependency lists are final; only the code may still
/// be generating.
#[derive(Clone)]
pub struct CompiledRecord {
    pub specifier: ModuleSpecifier,
    pub location: String,
    pub report: DependencyReport,
    pub code: CodeFuture,
    /// Served from the persistent cache instead of the pool.
    pub from_cache: bool,
}

impl std::fmt::Debug for CompiledRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledRecord")
            .field("specifier", &self.specifier)
            .field("location", &self.location)
            .field("report", &self.report)
            .field("from_cache", &self.from_cache)
            .finish_non_exhaustive()
    }
}

impl CompiledRecord {
    pub fn is_module_source(&self) -> bool {
        self.report.is_module_source
    }

    pub fn static_deps(&self) -> &[ModuleSpecifier] {
        &self.report.static_deps
    }

    pub fn dynamic_deps(&self) -> &[ModuleSpecifier] {
        &self.report.dynamic_deps
    }

    /// Wait for generated code.
    pub async fn code(&self) -> Result<Arc<str>> {
        self.code.clone().await
    }

    /// Code if it has already been generated.
    pub fn code_if_ready(&self) -> Option<Arc<str>> {
        self.code.peek().and_then(|r| r.as_ref().ok()).cloned()
    }
}

/// Specifier to compiled record, in discovery order.
///
/// Append-only: inserting a specifier that is already present keeps the
/// first record.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    entries: Vec<ModuleSpecifier>,
    records: IndexMap<ModuleSpecifier, CompiledRecord>,
}

impl DependencyGraph {
    pub fn new(entries: Vec<ModuleSpecifier>) -> Self {
        Self {
            entries,
            records: IndexMap::new(),
        }
    }

    /// Returns false if the specifier was already present.
    pub fn insert(&mut self, record: CompiledRecord) -> bool {
        if self.records.contains_key(&record.specifier) {
            return false;
        }
        self.records.insert(record.specifier.clone(), record);
        true
    }

    pub fn get(&self, specifier: &ModuleSpecifier) -> Option<&CompiledRecord> {
        self.records.get(specifier)
    }

    pub fn contains(&self, specifier: &ModuleSpecifier) -> bool {
        self.records.contains_key(specifier)
    }

    pub fn entries(&self) -> &[ModuleSpecifier] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompiledRecord> {
        self.records.values()
    }

    /// Wait until every module's code is generated.
    pub async fn await_code(&self) -> Result<()> {
        try_join_all(self.records.values().map(|r| r.code.clone())).await?;
        Ok(())
    }

    /// Serializable view of the graph, without code.
    pub fn summary(&self) -> GraphSummary {
        GraphSummary {
            entries: self.entries.clone(),
            modules: self
                .records
                .values()
                .map(|r| ModuleSummary {
                    specifier: r.specifier.clone(),
                    location: r.location.clone(),
                    is_module_source: r.report.is_module_source,
                    static_deps: r.report.static_deps.clone(),
                    dynamic_deps: r.report.dynamic_deps.clone(),
                    from_cache: r.from_cache,
                })
                .collect(),
        }
    }
}

/// JSON-friendly description of a resolved graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphSummary {
    pub entries: Vec<ModuleSpecifier>,
    pub modules: Vec<ModuleSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleSummary {
    pub specifier: ModuleSpecifier,
    pub location: String,
    pub is_module_source: bool,
    pub static_deps: Vec<ModuleSpecifier>,
    pub dynamic_deps: Vec<ModuleSpecifier>,
    pub from_cache: bool,
}
