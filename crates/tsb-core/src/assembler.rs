//! Assembler: instantiating a resolved graph through the host.
//!
//! Loading is a depth-first walk from the entry. Static dependencies are
//! loaded first, in import order, and bound into the importer's
//! [`ModuleScope`]; then the host instantiates the module exactly once and
//! its registry slot is filled.
//!
//! A dependency that is already on the current walk's stack is a back-edge.
//! The importer gets a [`ForwarderStub`] over the dependency's slot instead
//! of waiting for it.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, trace};

use crate::error::{CircularAccess, LoaderError, Result};
use crate::forwarder::{ForwarderStub, ModuleRef, ModuleSlot};
use crate::graph::{CompiledRecord, DependencyGraph};
use crate::host::{HostModule, ModuleHost, ModuleScope};
use crate::loader::DynamicImporter;
use crate::module::{Exports, LoadedModule, SourceKind, with_source_url};
use crate::specifier::ModuleSpecifier;

/// Process-wide specifier to slot map.
///
/// Slots are allocated on first request and filled once; a filled slot is
/// never replaced.
#[derive(Debug, Default)]
pub struct ModuleRegistry {
    slots: DashMap<ModuleSpecifier, ModuleSlot>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The slot for `specifier`, allocating an empty one if needed.
    pub fn slot(&self, specifier: &ModuleSpecifier) -> ModuleSlot {
        Arc::clone(self.slots.entry(specifier.clone()).or_default().value())
    }

    pub fn get(&self, specifier: &ModuleSpecifier) -> Option<Arc<LoadedModule>> {
        self.slots
            .get(specifier)
            .and_then(|slot| slot.get().cloned())
    }

    pub fn is_loaded(&self, specifier: &ModuleSpecifier) -> bool {
        self.slots
            .get(specifier)
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Number of instantiated modules.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|e| e.value().get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Specifiers of all instantiated modules, in no particular order.
    pub fn loaded(&self) -> Vec<ModuleSpecifier> {
        self.slots
            .iter()
            .filter(|e| e.value().get().is_some())
            .map(|e| e.key().clone())
            .collect()
    }
}

/// State owned by one top-level load.
struct LoadSession<'g> {
    graph: &'g DependencyGraph,
    importer: &'g DynamicImporter,
    stack: Vec<ModuleSpecifier>,
}

/// Turns compiled records into loaded modules.
#[derive(Clone)]
pub struct Assembler {
    host: Arc<dyn ModuleHost>,
    registry: Arc<ModuleRegistry>,
}

impl std::fmt::Debug for Assembler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Assembler")
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl Assembler {
    pub fn new(host: Arc<dyn ModuleHost>, registry: Arc<ModuleRegistry>) -> Self {
        Self { host, registry }
    }

    pub fn registry(&self) -> &Arc<ModuleRegistry> {
        &self.registry
    }

    /// Load `entry` and everything it statically depends on.
    ///
    /// Waits for all code in `graph` first; instantiation itself never
    /// suspends. Modules already in the registry are reused, so a graph
    /// resolved with loaded modules skipped is still loadable.
    pub async fn load(
        &self,
        graph: &DependencyGraph,
        entry: &ModuleSpecifier,
        importer: &DynamicImporter,
    ) -> Result<Arc<LoadedModule>> {
        graph.await_code().await?;

        let mut session = LoadSession {
            graph,
            importer,
            stack: Vec::new(),
        };
        match self.load_ref(&mut session, entry)? {
            ModuleRef::Loaded(module) => Ok(module),
            // The stack is empty at the entry, so this only happens if the
            // entry was filled concurrently.
            ModuleRef::Forwarded(stub) => stub
                .resolve(CircularAccess::Exports)
                .cloned(),
        }
    }

    fn load_ref(&self, session: &mut LoadSession<'_>, specifier: &ModuleSpecifier) -> Result<ModuleRef> {
        let slot = self.registry.slot(specifier);
        if let Some(module) = slot.get() {
            return Ok(ModuleRef::Loaded(Arc::clone(module)));
        }

        if session.stack.contains(specifier) {
            let requester = session
                .stack
                .last()
                .cloned()
                .unwrap_or_else(|| specifier.clone());
            debug!(module = %specifier, requester = %requester, "circular import, forwarding");
            return Ok(ModuleRef::Forwarded(ForwarderStub::new(
                specifier.clone(),
                requester,
                slot,
            )));
        }

        let graph = session.graph;
        let record = graph
            .get(specifier)
            .ok_or_else(|| LoaderError::NotResolved {
                specifier: specifier.clone(),
            })?;

        session.stack.push(specifier.clone());
        let result = self.instantiate(session, record, &slot);
        session.stack.pop();

        result.map(ModuleRef::Loaded)
    }

    fn instantiate(
        &self,
        session: &mut LoadSession<'_>,
        record: &CompiledRecord,
        slot: &ModuleSlot,
    ) -> Result<Arc<LoadedModule>> {
        let mut scope = ModuleScope::new(record.specifier.clone());
        for dep in record.static_deps() {
            let module = self.load_ref(session, dep)?;
            scope.bind(dep.clone(), module);
        }

        let compiled = record
            .code_if_ready()
            .ok_or_else(|| LoaderError::NotResolved {
                specifier: record.specifier.clone(),
            })?;
        let code: Arc<str> = with_source_url(&compiled, &record.specifier).into();
        let kind = if record.is_module_source() {
            SourceKind::Module
        } else {
            SourceKind::Script
        };

        trace!(specifier = %record.specifier, ?kind, deps = scope.len(), "instantiating");
        let exports = self.host.instantiate(HostModule {
            specifier: &record.specifier,
            code: &code,
            kind,
            scope: &scope,
            importer: session.importer,
        })?;

        let module = Arc::new(LoadedModule {
            specifier: record.specifier.clone(),
            kind,
            exports: match kind {
                SourceKind::Module => exports,
                SourceKind::Script => Exports::new(),
            },
            code,
        });
        Ok(Arc::clone(slot.get_or_init(|| module)))
    }
}
