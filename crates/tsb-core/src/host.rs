//! The host primitive: turning executable code into a module.
//!
//! The loader never evaluates code itself. For every resolved module it calls
//! [`ModuleHost::instantiate`] exactly once, passing the compiled code (with a
//! `//# sourceURL=` origin comment appended) and a [`ModuleScope`] holding
//! the module's already-loaded or forwarded dependencies.
//!
//! Compiled code reads its imports from the scope by dependency specifier.
//! Dynamic `import()` calls reach back into the loader through the
//! [`DynamicImporter`] handle; hosts must not block on it while
//! `instantiate` is running.

use indexmap::IndexMap;

use crate::error::Result;
use crate::forwarder::ModuleRef;
use crate::loader::DynamicImporter;
use crate::module::{Exports, SourceKind};
use crate::specifier::ModuleSpecifier;

/// Dependencies visible to one module, keyed by specifier.
#[derive(Debug, Clone)]
pub struct ModuleScope {
    owner: ModuleSpecifier,
    bindings: IndexMap<ModuleSpecifier, ModuleRef>,
}

impl ModuleScope {
    pub fn new(owner: ModuleSpecifier) -> Self {
        Self {
            owner,
            bindings: IndexMap::new(),
        }
    }

    pub fn owner(&self) -> &ModuleSpecifier {
        &self.owner
    }

    pub fn bind(&mut self, dependency: ModuleSpecifier, module: ModuleRef) {
        self.bindings.insert(dependency, module);
    }

    /// Look up a dependency by its resolved specifier.
    pub fn module(&self, dependency: &str) -> Option<&ModuleRef> {
        self.bindings.get(dependency)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ModuleSpecifier, &ModuleRef)> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Everything the host needs to instantiate one module.
#[derive(Debug)]
pub struct HostModule<'a> {
    pub specifier: &'a ModuleSpecifier,
    /// Compiled code followed by the origin comment.
    pub code: &'a str,
    pub kind: SourceKind,
    pub scope: &'a ModuleScope,
    pub importer: &'a DynamicImporter,
}

/// Executes module code.
///
/// Errors raised by the module's own initialization, including circular
/// access through a forwarder, should be returned as-is; the loader
/// propagates them to the request that triggered the load.
pub trait ModuleHost: Send + Sync {
    fn instantiate(&self, module: HostModule<'_>) -> Result<Exports>;
}
