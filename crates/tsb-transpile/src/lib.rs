//! # tsb-transpile
//!
//! OXC-backed compiler units for the tsb module loader.
//!
//! Each unit compiles in two passes:
//!
//! 1. **Rewrite** ([`rewrite`]): module syntax is turned into reads from the
//!    scope object and calls into the loader, and dependencies are collected.
//!    They are reported to the pool before the second pass starts.
//! 2. **Transform** ([`transform`]): TypeScript and JSX sources are lowered to
//!    plain JavaScript and printed. `.js` sources skip this pass.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsb_core::{ModuleLoader, source::FsSource};
//! # fn host() -> Arc<dyn tsb_core::ModuleHost> { unimplemented!() }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let loader = ModuleLoader::builder(
//!     Arc::new(FsSource::new("./public")),
//!     host(),
//!     tsb_transpile::factory(),
//! )
//! .build()?;
//! # Ok(())
//! # }
//! ```

pub mod rewrite;
pub mod transform;

use std::path::Path;
use std::sync::Arc;

use oxc_span::SourceType;
use tracing::trace;

use tsb_core::{CompileError, CompileRequest, Compiler, CompilerFactory, DependencyReport};

pub use rewrite::{DYNAMIC_IMPORT_FN, MODULES_OBJECT, Rewritten, rewrite_module};

/// Compiler backed by the OXC parser, transformer and code generator.
#[derive(Debug, Default)]
pub struct OxcCompiler {
    compiled: usize,
}

impl OxcCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of modules this unit has compiled.
    pub fn compiled(&self) -> usize {
        self.compiled
    }
}

impl Compiler for OxcCompiler {
    fn compile(
        &mut self,
        request: &CompileRequest,
        report: &mut dyn FnMut(DependencyReport),
    ) -> Result<String, CompileError> {
        let source_type = source_type_for(&request.location);
        let rewritten = rewrite_module(
            &request.source_text,
            &request.location,
            source_type,
            &request.options,
        )?;
        trace!(
            location = %request.location,
            static_deps = rewritten.report.static_deps.len(),
            dynamic_deps = rewritten.report.dynamic_deps.len(),
            "module rewritten"
        );
        report(rewritten.report);

        let code = if transform::needs_transform(&request.location) {
            transform::transform(&rewritten.code, &request.location, source_type, &request.options)?
        } else {
            rewritten.code
        };
        self.compiled += 1;
        Ok(code)
    }
}

/// Factory creating one [`OxcCompiler`] per pool unit.
pub fn factory() -> Arc<dyn CompilerFactory> {
    Arc::new(|_unit: usize| -> Result<Box<dyn Compiler>, CompileError> {
        Ok(Box::new(OxcCompiler::new()))
    })
}

/// Source dialect implied by the location's extension; TypeScript when the
/// extension is missing or unknown.
pub fn source_type_for(location: &str) -> SourceType {
    let file = location.rsplit('/').next().unwrap_or(location);
    SourceType::from_path(Path::new(file)).unwrap_or_else(|_| SourceType::ts())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_type_for() {
        assert!(source_type_for("/src/a.ts").is_typescript());
        assert!(source_type_for("/src/a.tsx").is_jsx());
        assert!(!source_type_for("https://cdn.test/lib.js").is_typescript());
        assert!(source_type_for("/src/noext").is_typescript());
    }
}
