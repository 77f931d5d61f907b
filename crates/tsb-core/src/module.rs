//! Loaded modules and their export bindings.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value;

use crate::error::{LoaderError, Result};
use crate::forwarder::DeferredBinding;
use crate::specifier::ModuleSpecifier;

/// Callable export.
pub type NativeFn = Arc<dyn Fn(&[Value]) -> Result<Value> + Send + Sync>;

/// A single exported binding.
#[derive(Clone)]
pub enum Binding {
    Value(Value),
    Function(NativeFn),
    /// Export of a module that was still loading when the binding was read.
    Deferred(DeferredBinding),
}

impl Binding {
    pub fn value(value: impl Into<Value>) -> Self {
        Binding::Value(value.into())
    }

    pub fn function<F>(f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        Binding::Function(Arc::new(f))
    }

    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Binding::Value(value) => Some(value),
            Binding::Function(_) | Binding::Deferred(_) => None,
        }
    }

    pub fn is_function(&self) -> bool {
        matches!(self, Binding::Function(_))
    }

    pub fn as_deferred(&self) -> Option<&DeferredBinding> {
        match self {
            Binding::Deferred(deferred) => Some(deferred),
            _ => None,
        }
    }

    /// The binding as it stands now. A deferred binding is followed to its
    /// module and fails if that module is still loading.
    pub fn current(&self) -> Result<Option<Binding>> {
        match self {
            Binding::Deferred(deferred) => deferred.current(),
            binding => Ok(Some(binding.clone())),
        }
    }
}

impl fmt::Debug for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Binding::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Binding::Function(_) => f.write_str("Function(..)"),
            Binding::Deferred(deferred) => f
                .debug_tuple("Deferred")
                .field(&deferred.target().as_str())
                .field(&deferred.name())
                .finish(),
        }
    }
}

/// Named exports of a module, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Exports(IndexMap<String, Binding>);

impl Exports {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_value(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(name, Binding::value(value));
        self
    }

    pub fn with_function<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    {
        self.insert(name, Binding::function(f));
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, binding: Binding) {
        self.0.insert(name.into(), binding);
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.0.get(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Binding)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How the host should treat a module's code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// ES module with import/export bindings.
    Module,
    /// Side-effect-only script; evaluated, exports nothing.
    Script,
}

/// A module that has been instantiated by the host. Immutable once created.
#[derive(Debug)]
pub struct LoadedModule {
    pub specifier: ModuleSpecifier,
    pub kind: SourceKind,
    pub exports: Exports,
    /// Executable code as handed to the host, origin comment included.
    pub code: Arc<str>,
}

impl LoadedModule {
    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.exports.get(name)
    }

    /// Invoke the exported function `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        match self.exports.get(name) {
            Some(Binding::Function(f)) => f(args),
            Some(Binding::Deferred(deferred)) => deferred.call(args),
            Some(Binding::Value(_)) => Err(self.evaluation_error(format!("'{name}' is not a function"))),
            None => Err(self.evaluation_error(format!("'{name}' is not exported"))),
        }
    }

    fn evaluation_error(&self, message: String) -> LoaderError {
        LoaderError::Evaluation {
            specifier: self.specifier.clone(),
            message,
        }
    }
}

/// Append the origin comment hosts use to attribute stack traces.
pub fn with_source_url(code: &str, specifier: &ModuleSpecifier) -> String {
    let mut assembled = String::with_capacity(code.len() + specifier.as_str().len() + 20);
    assembled.push_str(code);
    if !code.ends_with('\n') {
        assembled.push('\n');
    }
    assembled.push_str("//# sourceURL=");
    assembled.push_str(specifier.as_str());
    assembled
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn module(exports: Exports) -> LoadedModule {
        LoadedModule {
            specifier: ModuleSpecifier::parse("/m").unwrap(),
            kind: SourceKind::Module,
            exports,
            code: "".into(),
        }
    }

    #[test]
    fn test_call_exported_function() {
        let m = module(
            Exports::new()
                .with_value("answer", 42)
                .with_function("double", |args| {
                    Ok(json!(args[0].as_i64().unwrap_or(0) * 2))
                }),
        );

        assert_eq!(m.call("double", &[json!(21)]).unwrap(), json!(42));
        assert!(matches!(m.call("answer", &[]), Err(LoaderError::Evaluation { .. })));
        assert!(matches!(m.call("missing", &[]), Err(LoaderError::Evaluation { .. })));
        assert_eq!(m.exports.names().collect::<Vec<_>>(), vec!["answer", "double"]);
    }

    #[test]
    fn test_with_source_url() {
        let spec = ModuleSpecifier::parse("/src/app").unwrap();
        assert_eq!(
            with_source_url("run();", &spec),
            "run();\n//# sourceURL=/src/app"
        );
        assert_eq!(
            with_source_url("run();\n", &spec),
            "run();\n//# sourceURL=/src/app"
        );
    }
}
