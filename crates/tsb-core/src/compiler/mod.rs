//! Compiler units and the pool that drives them.
//!
//! A [`Compiler`] turns one module's source into executable code. It reports
//! the module's dependencies first, through the `report` callback, and only
//! then returns the generated code. The pool forwards the report to the
//! resolver as soon as it arrives, so graph discovery never waits for code
//! generation.
//!
//! ```text
//!            submit()                 UnitRequest          ┌──────────────┐
//! resolver ───────────▶ CompilerPool ─────────────────────▶│ unit thread  │
//!     ▲                   │   ▲        (one at a time)     │ dyn Compiler │
//!     │  DependencyReport │   │  Deps → Code | Error       └──────┬───────┘
//!     └───────────────────┘   └───────────────────────────────────┘
//! ```

mod pool;
mod protocol;

pub use pool::{CodeFuture, CompileOutput, CompilerPool, PoolStats, default_pool_size};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::specifier::ModuleSpecifier;

/// Options forwarded to every compile request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct CompileOptions {
    /// Probe `.tsx` candidates and compile JSX syntax.
    pub jsx: bool,
    /// Factory used for JSX elements (classic runtime).
    pub jsx_pragma: String,
    /// Factory used for JSX fragments (classic runtime).
    pub jsx_pragma_frag: String,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            jsx: false,
            jsx_pragma: "React.createElement".to_string(),
            jsx_pragma_frag: "React.Fragment".to_string(),
        }
    }
}

impl CompileOptions {
    pub fn with_jsx(mut self, jsx: bool) -> Self {
        self.jsx = jsx;
        self
    }
}

/// One unit of work for a compiler.
#[derive(Debug, Clone)]
pub struct CompileRequest {
    pub specifier: ModuleSpecifier,
    /// Location the source was fetched from. Relative imports resolve
    /// against it, and its extension selects the source dialect.
    pub location: String,
    pub source_text: Arc<str>,
    pub options: CompileOptions,
}

/// Dependencies of one module, reported before its code is generated.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DependencyReport {
    /// False for side-effect-only scripts, which are evaluated but export nothing.
    pub is_module_source: bool,
    /// Static imports in source order, without duplicates.
    pub static_deps: Vec<ModuleSpecifier>,
    /// `import()` targets that were string literals.
    pub dynamic_deps: Vec<ModuleSpecifier>,
}

impl DependencyReport {
    pub fn push_static(&mut self, dep: ModuleSpecifier) {
        if !self.static_deps.contains(&dep) {
            self.static_deps.push(dep);
        }
    }

    pub fn push_dynamic(&mut self, dep: ModuleSpecifier) {
        if !self.dynamic_deps.contains(&dep) {
            self.dynamic_deps.push(dep);
        }
    }
}

/// Failure raised by a compiler.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CompileError {
    pub message: String,
    pub stack: Option<String>,
}

impl CompileError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    pub fn with_stack(mut self, stack: impl Into<String>) -> Self {
        self.stack = Some(stack.into());
        self
    }
}

/// A source-to-executable compiler hosted by one pool unit.
///
/// Instances are created on, and never leave, their unit's thread.
pub trait Compiler: Send {
    /// Compile one module. `report` must be called exactly once, before
    /// returning the generated code.
    fn compile(
        &mut self,
        request: &CompileRequest,
        report: &mut dyn FnMut(DependencyReport),
    ) -> Result<String, CompileError>;
}

/// Creates one compiler per pool unit.
pub trait CompilerFactory: Send + Sync + 'static {
    fn create(&self, unit: usize) -> Result<Box<dyn Compiler>, CompileError>;
}

impl<F> CompilerFactory for F
where
    F: Fn(usize) -> Result<Box<dyn Compiler>, CompileError> + Send + Sync + 'static,
{
    fn create(&self, unit: usize) -> Result<Box<dyn Compiler>, CompileError> {
        self(unit)
    }
}
