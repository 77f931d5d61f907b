//! Content sources: where raw module text comes from.
//!
//! The fetcher never touches the network or the filesystem directly. It asks
//! a [`ContentSource`] for one candidate location at a time, so the same
//! probing logic runs against a web server, a directory on disk, or an
//! in-memory map in tests.
//!
//! ```text
//! SourceFetcher ──retrieve("/src/a.ts")──▶ dyn ContentSource
//!                                            ├── HttpSource   (feature "http")
//!                                            ├── FsSource
//!                                            └── MemorySource
//! ```

mod fs;
#[cfg(feature = "http")]
mod http;
mod memory;

pub use fs::FsSource;
#[cfg(feature = "http")]
pub use http::HttpSource;
pub use memory::MemorySource;

use async_trait::async_trait;
use std::fmt::Debug;
use thiserror::Error;

/// Failure to retrieve a single location.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetrievalError {
    #[error("not found")]
    NotFound,

    /// The server answered, but not with 200.
    #[error("status {0}")]
    Status(u16),

    /// The location resolves outside the source root.
    #[error("access denied: {0}")]
    AccessDenied(String),

    #[error("{0}")]
    Transport(String),
}

/// Result type for content retrieval.
pub type RetrievalResult<T> = std::result::Result<T, RetrievalError>;

/// Retrieves raw source text for a location.
///
/// Implementations must treat anything other than a complete, successful
/// read as an error; partial text is never returned.
#[async_trait]
pub trait ContentSource: Send + Sync + Debug {
    async fn retrieve(&self, location: &str) -> RetrievalResult<String>;
}
