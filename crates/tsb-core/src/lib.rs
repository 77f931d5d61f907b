#![cfg_attr(docsrs, feature(doc_cfg))]

//! # tsb-core
//!
//! On-demand loading of TypeScript module graphs.
//!
//! Given an entry specifier, the loader fetches the source (probing `.ts`,
//! `.tsx` and `.js` candidates), compiles every reachable module on a small
//! pool of isolated compiler units, and hands each module's code to a
//! [`ModuleHost`] in dependency order. Circular imports are broken with
//! forwarders that resolve once the cycle finishes loading.
//!
//! ## Architecture
//!
//! ```text
//!                    ┌──────────────────────────────┐
//!  load_module ─────▶│         ModuleLoader         │
//!                    └───┬──────────────┬───────────┘
//!                        │              │
//!                        ▼              ▼
//!               ┌──────────────┐  ┌────────────┐   ┌─────────────┐
//!               │GraphResolver │  │ Assembler  │──▶│ ModuleHost  │
//!               └──┬────────┬──┘  └─────┬──────┘   └─────────────┘
//!                  │        │           │
//!                  ▼        ▼           ▼
//!        ┌─────────────┐ ┌────────────┐ ┌────────────────┐
//!        │SourceFetcher│ │CompilerPool│ │ ModuleRegistry │
//!        └──────┬──────┘ └─────┬──────┘ │ (slots, stubs) │
//!               ▼              ▼        └────────────────┘
//!        ContentSource   CompileCache
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tsb_core::{ModuleLoader, LoaderConfig, source::FsSource};
//! # use tsb_core::{CompilerFactory, ModuleHost};
//! # fn parts() -> (Arc<dyn ModuleHost>, Arc<dyn CompilerFactory>) { unimplemented!() }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let (host, compiler) = parts();
//! let config = LoaderConfig::load(None)?;
//! let loader = ModuleLoader::builder(Arc::new(FsSource::new("./public")), host, compiler)
//!     .config(&config)
//!     .build()?;
//!
//! let app = loader.load_module("/src/main").await?;
//! for name in app.exports.names() {
//!     println!("export: {name}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod assembler;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod forwarder;
pub mod graph;
pub mod host;
pub mod loader;
pub mod module;
pub mod resolver;
pub mod source;
pub mod specifier;

// Logging utilities (optional, enabled with "logging" feature)
#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub mod logging;

#[cfg(feature = "logging")]
#[cfg_attr(docsrs, doc(cfg(feature = "logging")))]
pub use logging::{LogLevel, init_logging, init_logging_from_env};

// Test utilities (available in test builds and with the "test-utils" feature)
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use assembler::{Assembler, ModuleRegistry};
pub use cache::{CacheConfig, CompileCache, MemoryCacheStore, RedbCacheStore};
pub use compiler::{
    CompileError, CompileOptions, CompileRequest, Compiler, CompilerFactory, CompilerPool,
    DependencyReport,
};
pub use config::{ConfigError, LoaderConfig};
pub use error::{CircularAccess, FetchAttempt, LoaderError, Result};
pub use forwarder::{DeferredBinding, ForwarderStub, ModuleRef};
pub use graph::{CompiledRecord, DependencyGraph, GraphSummary};
pub use host::{HostModule, ModuleHost, ModuleScope};
pub use loader::{DynamicImporter, ModuleLoader, ModuleLoaderBuilder};
pub use module::{Binding, Exports, LoadedModule, SourceKind};
pub use resolver::GraphResolver;
pub use source::ContentSource;
pub use specifier::ModuleSpecifier;
