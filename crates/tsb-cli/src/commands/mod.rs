//! Command implementations.
//!
//! - [`resolve`] - print a dependency graph
//! - [`emit`] - write compiled modules to disk
//! - [`cache`] - inspect or clear the compile cache
//!
//! Each command exposes an `execute` function taking its parsed arguments
//! and the global `--config` path.

pub mod cache;
pub mod emit;
pub mod resolve;
pub(crate) mod utils;

pub use cache::execute as cache_execute;
pub use emit::execute as emit_execute;
pub use resolve::execute as resolve_execute;
