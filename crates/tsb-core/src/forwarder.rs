//! Forwarders for circular imports.
//!
//! When module Y needs X while X is itself still loading in the same request,
//! waiting for X would deadlock. Y gets a [`ForwarderStub`] instead: a handle
//! to X's registry slot that starts empty and is filled exactly once, when X
//! finishes instantiating.
//!
//! ```text
//! load(A) ─▶ load(B) ─▶ load(A)?  A is on the stack
//!                          └──▶ ForwarderStub { target: A, requester: B }
//! B instantiates with the stub in scope
//! A instantiates, fills its slot ─▶ the stub now forwards to A
//! ```
//!
//! Storing the stub and using it later behaves like a live binding. Naming an
//! export through it ([`ModuleRef::get`]) always succeeds and yields a
//! [`DeferredBinding`], so `const { a } = ...` at the top of B is fine. Reading
//! or calling that binding while A is still loading fails with
//! [`LoaderError::CircularAccessBeforeInit`].

use std::fmt;
use std::sync::{Arc, OnceLock};

use serde_json::Value;

use crate::error::{CircularAccess, LoaderError, Result};
use crate::module::{Binding, Exports, LoadedModule};
use crate::specifier::ModuleSpecifier;

/// Write-once cell holding a module once it is instantiated.
pub type ModuleSlot = Arc<OnceLock<Arc<LoadedModule>>>;

/// Lazy stand-in for a module that is still loading.
#[derive(Debug, Clone)]
pub struct ForwarderStub {
    target: ModuleSpecifier,
    requester: ModuleSpecifier,
    slot: ModuleSlot,
}

impl ForwarderStub {
    pub fn new(target: ModuleSpecifier, requester: ModuleSpecifier, slot: ModuleSlot) -> Self {
        Self {
            target,
            requester,
            slot,
        }
    }

    pub fn target(&self) -> &ModuleSpecifier {
        &self.target
    }

    pub fn requester(&self) -> &ModuleSpecifier {
        &self.requester
    }

    /// Whether the target has finished loading.
    pub fn is_ready(&self) -> bool {
        self.slot.get().is_some()
    }

    /// The target module, or the circular-access error for `access`.
    pub fn resolve(&self, access: CircularAccess) -> Result<&Arc<LoadedModule>> {
        self.slot
            .get()
            .ok_or_else(|| LoaderError::CircularAccessBeforeInit {
                target: self.target.clone(),
                requester: self.requester.clone(),
                member: access,
            })
    }
}

/// Export `name` of a forwarded module, resolved when it is used.
#[derive(Clone)]
pub struct DeferredBinding {
    stub: ForwarderStub,
    name: String,
}

impl DeferredBinding {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn target(&self) -> &ModuleSpecifier {
        self.stub.target()
    }

    /// The binding the target exports under this name; `None` if it exports
    /// nothing by that name.
    pub fn current(&self) -> Result<Option<Binding>> {
        let module = self.stub.resolve(CircularAccess::Get(self.name.clone()))?;
        match module.get(&self.name) {
            Some(binding) => binding.current(),
            None => Ok(None),
        }
    }

    pub fn call(&self, args: &[Value]) -> Result<Value> {
        self.stub
            .resolve(CircularAccess::Call(self.name.clone()))?
            .call(&self.name, args)
    }
}

impl fmt::Debug for DeferredBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredBinding")
            .field("target", &self.stub.target)
            .field("requester", &self.stub.requester)
            .field("name", &self.name)
            .field("ready", &self.stub.is_ready())
            .finish()
    }
}

/// A dependency as seen from an importing module's scope.
#[derive(Debug, Clone)]
pub enum ModuleRef {
    Loaded(Arc<LoadedModule>),
    Forwarded(ForwarderStub),
}

impl ModuleRef {
    pub fn specifier(&self) -> &ModuleSpecifier {
        match self {
            ModuleRef::Loaded(module) => &module.specifier,
            ModuleRef::Forwarded(stub) => stub.target(),
        }
    }

    pub fn is_forwarded(&self) -> bool {
        matches!(self, ModuleRef::Forwarded(_))
    }

    /// The module, if it is available right now.
    pub fn loaded(&self) -> Option<Arc<LoadedModule>> {
        match self {
            ModuleRef::Loaded(module) => Some(Arc::clone(module)),
            ModuleRef::Forwarded(stub) => stub.slot.get().cloned(),
        }
    }

    /// Read the export `name`; `None` if the module does not export it.
    ///
    /// A forwarded module that is still loading cannot answer yet, so it hands
    /// out a [`Binding::Deferred`] that checks again when it is used.
    pub fn get(&self, name: &str) -> Result<Option<Binding>> {
        match self {
            ModuleRef::Loaded(module) => Ok(module.get(name).cloned()),
            ModuleRef::Forwarded(stub) => match stub.slot.get() {
                Some(module) => Ok(module.get(name).cloned()),
                None => Ok(Some(Binding::Deferred(DeferredBinding {
                    stub: stub.clone(),
                    name: name.to_string(),
                }))),
            },
        }
    }

    /// Call the exported function `name`.
    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value> {
        self.module(CircularAccess::Call(name.to_string()))?
            .call(name, args)
    }

    pub fn exports(&self) -> Result<&Exports> {
        Ok(&self.module(CircularAccess::Exports)?.exports)
    }

    fn module(&self, access: CircularAccess) -> Result<&Arc<LoadedModule>> {
        match self {
            ModuleRef::Loaded(module) => Ok(module),
            ModuleRef::Forwarded(stub) => stub.resolve(access),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::SourceKind;
    use serde_json::json;

    fn spec(s: &str) -> ModuleSpecifier {
        ModuleSpecifier::parse(s).unwrap()
    }

    #[test]
    fn test_stub_defers_until_slot_is_filled() {
        let slot: ModuleSlot = Arc::default();
        let stub = ModuleRef::Forwarded(ForwarderStub::new(spec("/a"), spec("/b"), Arc::clone(&slot)));

        let early = stub.get("value").unwrap().expect("forwarded names are deferred");
        let deferred = early.as_deferred().expect("deferred binding");
        assert_eq!(deferred.target(), &spec("/a"));
        assert_eq!(deferred.name(), "value");

        match early.current() {
            Err(LoaderError::CircularAccessBeforeInit {
                target,
                requester,
                member,
            }) => {
                assert_eq!(target, spec("/a"));
                assert_eq!(requester, spec("/b"));
                assert_eq!(member, CircularAccess::Get("value".into()));
            }
            other => panic!("expected circular access error, got {other:?}"),
        }
        assert!(matches!(
            stub.call("run", &[]),
            Err(LoaderError::CircularAccessBeforeInit {
                member: CircularAccess::Call(_),
                ..
            })
        ));
        let run = stub.get("run").unwrap().unwrap();
        assert!(matches!(
            run.as_deferred().unwrap().call(&[]),
            Err(LoaderError::CircularAccessBeforeInit {
                member: CircularAccess::Call(_),
                ..
            })
        ));
        assert!(stub.loaded().is_none());

        let module = Arc::new(LoadedModule {
            specifier: spec("/a"),
            kind: SourceKind::Module,
            exports: Exports::new()
                .with_value("value", 7)
                .with_function("run", |_| Ok(json!("ran"))),
            code: "".into(),
        });
        assert!(slot.set(module).is_ok());

        // Bindings taken before the slot was filled now see the module.
        assert_eq!(early.current().unwrap().and_then(|b| b.as_value().cloned()), Some(json!(7)));
        assert_eq!(run.as_deferred().unwrap().call(&[]).unwrap(), json!("ran"));
        assert_eq!(stub.get("value").unwrap().and_then(|b| b.as_value().cloned()), Some(json!(7)));
        assert!(stub.get("other").unwrap().is_none());
        assert_eq!(stub.specifier(), &spec("/a"));
        assert!(stub.is_forwarded());
    }
}
