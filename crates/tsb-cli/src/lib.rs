//! tsb CLI - resolve, compile and inspect TypeScript module graphs.
//!
//! The binary drives the same resolver and compiler pool a browser host
//! uses, against a directory on disk:
//!
//! - `tsb resolve` - print the dependency graph of one or more entries
//! - `tsb emit` - write every compiled module plus a manifest
//! - `tsb cache clear` - drop the persistent compile cache
//!
//! - [`error`] - CLI error type and miette conversion
//! - [`logger`] - tracing subscriber setup
//! - [`ui`] - status messages

pub mod cli;
pub mod commands;
pub mod error;
pub mod logger;
pub mod ui;

pub use error::{CliError, Result};
