//! Test doubles for the compiler and the host.
//!
//! [`LineCompiler`] recognises imports and exports line by line and passes
//! the source through unchanged. [`ScriptedHost`] evaluates
//! `export const name = <json>;` lines, or runs a per-module closure.

use std::sync::{Arc, LazyLock};

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::compiler::{
    CompileError, CompileRequest, Compiler, CompilerFactory, DependencyReport,
};
use crate::error::Result;
use crate::host::{HostModule, ModuleHost};
use crate::module::Exports;
use crate::specifier::ModuleSpecifier;

static STATIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^\s*(?:import|export)\s+(?:[^'"]*?\s+from\s+)?['"]([^'"]+)['"]"#)
        .expect("valid regex")
});

static EXPORT_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*export\s").expect("valid regex"));

static DYNAMIC_IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"import\(\s*['"]([^'"]+)['"]\s*\)"#).expect("valid regex")
});

static EXPORT_CONST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*export\s+const\s+(\w+)\s*=\s*(.+?);?\s*$").expect("valid regex")
});

/// Shared per-specifier compile counts.
#[derive(Debug, Clone, Default)]
pub struct CompileCounter {
    counts: Arc<Mutex<FxHashMap<String, usize>>>,
}

impl CompileCounter {
    fn record(&self, specifier: &ModuleSpecifier) {
        *self.counts.lock().entry(specifier.to_string()).or_default() += 1;
    }

    pub fn count(&self, specifier: &str) -> usize {
        self.counts.lock().get(specifier).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.lock().values().sum()
    }
}

/// Line-oriented compiler for tests.
///
/// A line containing `@compile-error` makes the compile fail with the rest of
/// that line as the message.
#[derive(Debug)]
pub struct LineCompiler {
    counter: CompileCounter,
}

impl LineCompiler {
    pub fn new(counter: CompileCounter) -> Self {
        Self { counter }
    }

    pub fn factory(counter: CompileCounter) -> Arc<dyn CompilerFactory> {
        Arc::new(move |_unit: usize| -> std::result::Result<Box<dyn Compiler>, CompileError> {
            Ok(Box::new(LineCompiler::new(counter.clone())))
        })
    }
}

impl Compiler for LineCompiler {
    fn compile(
        &mut self,
        request: &CompileRequest,
        report: &mut dyn FnMut(DependencyReport),
    ) -> std::result::Result<String, CompileError> {
        self.counter.record(&request.specifier);

        let mut deps = DependencyReport::default();
        for line in request.source_text.lines() {
            if let Some((_, message)) = line.split_once("@compile-error") {
                return Err(CompileError::new(message.trim()));
            }
            if let Some(captures) = STATIC_IMPORT.captures(line) {
                deps.is_module_source = true;
                deps.push_static(resolve(&captures[1], &request.location)?);
            } else if EXPORT_ONLY.is_match(line) {
                deps.is_module_source = true;
            }
            for captures in DYNAMIC_IMPORT.captures_iter(line) {
                deps.push_dynamic(resolve(&captures[1], &request.location)?);
            }
        }

        report(deps);
        Ok(request.source_text.to_string())
    }
}

fn resolve(raw: &str, base: &str) -> std::result::Result<ModuleSpecifier, CompileError> {
    ModuleSpecifier::resolve(raw, base).map_err(|e| CompileError::new(e.to_string()))
}

/// Exports declared with `export const name = <json>;` lines.
///
/// Values that are not valid JSON become strings.
pub fn declared_exports(code: &str) -> Exports {
    let mut exports = Exports::new();
    for line in code.lines() {
        if let Some(captures) = EXPORT_CONST.captures(line) {
            let raw = captures[2].trim();
            let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()));
            exports = exports.with_value(&captures[1], value);
        }
    }
    exports
}

type Script = Arc<dyn Fn(&HostModule<'_>) -> Result<Exports> + Send + Sync>;

/// Host that records every instantiation.
#[derive(Clone, Default)]
pub struct ScriptedHost {
    scripts: Arc<RwLock<FxHashMap<String, Script>>>,
    evaluated: Arc<Mutex<Vec<ModuleSpecifier>>>,
    code: Arc<Mutex<FxHashMap<String, String>>>,
}

impl std::fmt::Debug for ScriptedHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedHost")
            .field("evaluated", &self.evaluated.lock().len())
            .finish_non_exhaustive()
    }
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `script` instead of the default evaluator for `specifier`.
    pub fn script<F>(self, specifier: &str, script: F) -> Self
    where
        F: Fn(&HostModule<'_>) -> Result<Exports> + Send + Sync + 'static,
    {
        self.scripts
            .write()
            .insert(specifier.to_string(), Arc::new(script));
        self
    }

    /// Specifiers in instantiation order.
    pub fn evaluated(&self) -> Vec<String> {
        self.evaluated.lock().iter().map(ToString::to_string).collect()
    }

    pub fn evaluation_count(&self, specifier: &str) -> usize {
        self.evaluated
            .lock()
            .iter()
            .filter(|s| s.as_str() == specifier)
            .count()
    }

    /// Code last passed to the host for `specifier`.
    pub fn code_for(&self, specifier: &str) -> Option<String> {
        self.code.lock().get(specifier).cloned()
    }
}

impl ModuleHost for ScriptedHost {
    fn instantiate(&self, module: HostModule<'_>) -> Result<Exports> {
        self.evaluated.lock().push(module.specifier.clone());
        self.code
            .lock()
            .insert(module.specifier.to_string(), module.code.to_string());

        let script = self.scripts.read().get(module.specifier.as_str()).cloned();
        match script {
            Some(script) => script(&module),
            None => Ok(declared_exports(module.code)),
        }
    }
}
