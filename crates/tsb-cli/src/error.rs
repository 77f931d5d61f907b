//! CLI error type.
//!
//! Library errors convert into [`CliError`] through `#[from]`, and
//! [`cli_error_to_miette`] turns the final error into a report with a hint
//! where one is useful.

use std::path::PathBuf;

use miette::Report;
use thiserror::Error;
use tsb_core::cache::CacheError;
use tsb_core::{ConfigError, LoaderError, ModuleSpecifier};

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Loader(#[from] LoaderError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("'{first}' and '{second}' would both be written to {}", path.display())]
    OutputCollision {
        path: PathBuf,
        first: ModuleSpecifier,
        second: ModuleSpecifier,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CliError>;

/// Convert a [`CliError`] into a miette report.
pub fn cli_error_to_miette(err: CliError) -> Report {
    match err {
        CliError::Loader(e) => loader_error_to_miette(e),
        CliError::Config(e) => miette::miette!(
            help = "check tsb.toml and TSB_* environment variables",
            "Configuration error: {}",
            e
        ),
        collision @ CliError::OutputCollision { .. } => miette::miette!(
            help = "import each module through one spelling of its path",
            "{}",
            collision
        ),
        other => miette::miette!("{}", other),
    }
}

/// Convert a [`LoaderError`] into a report with a hint for the common cases.
pub fn loader_error_to_miette(err: LoaderError) -> Report {
    match &err {
        LoaderError::FetchNotFound { .. } => miette::miette!(
            help = "check the import path and that --root points at the directory the page is served from",
            "{}",
            err
        ),
        LoaderError::CompileFailure { stack: Some(stack), .. } => {
            miette::miette!("{}\n\n{}", err, stack)
        }
        LoaderError::ResolutionDidNotConverge { .. } => miette::miette!(
            help = "raise max_resolution_steps in tsb.toml for very large graphs",
            "{}",
            err
        ),
        LoaderError::PoolUnavailable { .. } => miette::miette!(
            help = "run with --verbose to see why the compiler workers stopped",
            "{}",
            err
        ),
        _ => miette::miette!("{}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_error_keeps_message() {
        let err = CliError::from(LoaderError::ResolutionDidNotConverge { budget: 5 });
        let report = cli_error_to_miette(err);
        assert!(report.to_string().contains("within 5 steps"));
    }

    #[test]
    fn test_fetch_not_found_has_help() {
        let err = LoaderError::FetchNotFound {
            specifier: ModuleSpecifier::parse("/src/missing").unwrap(),
            attempted: vec![],
        };
        let report = loader_error_to_miette(err);
        assert!(report.help().is_some());
        assert!(report.to_string().contains("/src/missing"));
    }

    #[test]
    fn test_write_error_names_the_path() {
        let err = CliError::Write {
            path: PathBuf::from("dist/a.js"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("dist/a.js"));
    }

    #[test]
    fn test_output_collision_has_help() {
        let err = CliError::OutputCollision {
            path: PathBuf::from("dist/src/a.js"),
            first: ModuleSpecifier::parse("/src/a").unwrap(),
            second: ModuleSpecifier::parse("/src/a.ts").unwrap(),
        };
        let report = cli_error_to_miette(err);
        assert!(report.help().is_some());
        assert!(report.to_string().contains("'/src/a' and '/src/a.ts'"));
    }
}
