//! Shared fixtures for tsb-core integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use tsb_core::source::MemorySource;
use tsb_core::test_utils::{CompileCounter, LineCompiler, ScriptedHost};
use tsb_core::{CompileCache, ModuleLoader, ModuleLoaderBuilder, ModuleSpecifier};

/// Everything a test needs to inspect after loading.
pub struct Fixture {
    pub source: MemorySource,
    pub host: ScriptedHost,
    pub counter: CompileCounter,
}

impl Fixture {
    pub fn new(source: MemorySource) -> Self {
        Self::with_host(source, ScriptedHost::new())
    }

    pub fn with_host(source: MemorySource, host: ScriptedHost) -> Self {
        Self {
            source,
            host,
            counter: CompileCounter::default(),
        }
    }

    pub fn builder(&self) -> ModuleLoaderBuilder {
        ModuleLoader::builder(
            Arc::new(self.source.clone()),
            Arc::new(self.host.clone()),
            LineCompiler::factory(self.counter.clone()),
        )
        .pool_size(2)
    }

    pub fn loader(&self) -> ModuleLoader {
        self.builder().build().unwrap()
    }

    pub fn loader_with_cache(&self, cache: Arc<dyn CompileCache>) -> ModuleLoader {
        self.builder().cache(cache).build().unwrap()
    }
}

pub fn spec(s: &str) -> ModuleSpecifier {
    ModuleSpecifier::parse(s).unwrap()
}
