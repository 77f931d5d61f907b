//! Error taxonomy for module loading.
//!
//! Every failure that can reject a `load_module` request is a [`LoaderError`].
//! The type is `Clone` because a single compile or load result is shared by
//! every waiter on it.

use std::fmt;

use thiserror::Error;

use crate::specifier::ModuleSpecifier;

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// One candidate location the fetcher tried, and why it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchAttempt {
    pub location: String,
    pub reason: String,
}

impl fmt::Display for FetchAttempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.location, self.reason)
    }
}

/// The operation attempted on a module that was still mid-cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CircularAccess {
    Get(String),
    Call(String),
    Exports,
}

impl fmt::Display for CircularAccess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircularAccess::Get(name) => write!(f, "get field '{name}'"),
            CircularAccess::Call(name) => write!(f, "call {name}()"),
            CircularAccess::Exports => f.write_str("read the exports"),
        }
    }
}

/// Errors that reject a load request.
#[derive(Debug, Clone, Error)]
pub enum LoaderError {
    /// No candidate location produced source text.
    #[error("module '{specifier}' could not be fetched (tried {})", join_attempts(.attempted))]
    FetchNotFound {
        specifier: ModuleSpecifier,
        attempted: Vec<FetchAttempt>,
    },

    /// The compiler rejected the source or failed while compiling it.
    #[error("failed to compile '{specifier}': {message}")]
    CompileFailure {
        specifier: ModuleSpecifier,
        message: String,
        stack: Option<String>,
    },

    /// A forwarded module was used before its own load finished.
    #[error(
        "tried to {member} on circular reference '{target}' before it finished loading (imported by '{requester}')"
    )]
    CircularAccessBeforeInit {
        target: ModuleSpecifier,
        requester: ModuleSpecifier,
        member: CircularAccess,
    },

    /// The iteration budget ran out before the pending set drained.
    #[error("dependency resolution did not converge within {budget} steps")]
    ResolutionDidNotConverge { budget: usize },

    /// A compiler unit replied with a message its pending request did not expect.
    #[error("compiler unit {unit} sent an unexpected {message} message")]
    UnexpectedProtocolMessage { unit: usize, message: String },

    /// Every compiler unit failed or was retired.
    #[error("compiler pool unavailable: {reason}")]
    PoolUnavailable { reason: String },

    /// The host failed to evaluate a module.
    #[error("failed to evaluate '{specifier}': {message}")]
    Evaluation {
        specifier: ModuleSpecifier,
        message: String,
    },

    /// The assembler was asked for a module that resolution never produced.
    #[error("module '{specifier}' is not part of the resolved graph")]
    NotResolved { specifier: ModuleSpecifier },

    /// An import specifier could not be interpreted.
    #[error("invalid module specifier '{specifier}': {reason}")]
    InvalidSpecifier { specifier: String, reason: String },
}

impl LoaderError {
    /// The module the failure is attributed to, if any.
    pub fn specifier(&self) -> Option<&ModuleSpecifier> {
        match self {
            LoaderError::FetchNotFound { specifier, .. }
            | LoaderError::CompileFailure { specifier, .. }
            | LoaderError::Evaluation { specifier, .. }
            | LoaderError::NotResolved { specifier } => Some(specifier),
            LoaderError::CircularAccessBeforeInit { requester, .. } => Some(requester),
            _ => None,
        }
    }
}

fn join_attempts(attempted: &[FetchAttempt]) -> String {
    if attempted.is_empty() {
        return "nothing".to_string();
    }
    attempted
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
