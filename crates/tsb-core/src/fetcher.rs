//! Source fetcher: specifier to raw source text.
//!
//! Probing order is part of the loader's observable behaviour:
//!
//! 1. A specifier ending in `.ts`, `.js`, `.tsx` or `.jsx` is fetched as-is.
//!    A `.js` specifier that fails falls back to the sibling `.ts`.
//! 2. Otherwise `{s}.ts` and (with JSX enabled) `{s}.tsx` are raced; the
//!    first success wins and the rest are dropped.
//! 3. If every raced candidate failed, `{s}.js` is tried last.

use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tracing::{debug, trace};

use crate::error::{FetchAttempt, LoaderError, Result};
use crate::source::ContentSource;
use crate::specifier::ModuleSpecifier;

/// Raw text for one module together with the location that produced it.
#[derive(Debug, Clone)]
pub struct SourceRecord {
    pub specifier: ModuleSpecifier,
    /// Candidate location that actually succeeded.
    pub location: String,
    pub raw_source: Arc<str>,
}

/// Resolves specifiers to source text through a [`ContentSource`].
#[derive(Debug, Clone)]
pub struct SourceFetcher {
    source: Arc<dyn ContentSource>,
}

impl SourceFetcher {
    pub fn new(source: Arc<dyn ContentSource>) -> Self {
        Self { source }
    }

    pub async fn fetch(&self, specifier: &ModuleSpecifier, allow_jsx: bool) -> Result<SourceRecord> {
        let mut attempted = Vec::new();

        let found = match specifier.explicit_extension() {
            Some(ext) => {
                let direct = specifier.as_str().to_string();
                let mut found = self.race(vec![direct], &mut attempted).await;
                if found.is_none() && ext == "js" {
                    let stem = &specifier.as_str()[..specifier.as_str().len() - ".js".len()];
                    found = self.race(vec![format!("{stem}.ts")], &mut attempted).await;
                }
                found
            }
            None => {
                let mut candidates = vec![specifier.with_appended_extension("ts")];
                if allow_jsx {
                    candidates.push(specifier.with_appended_extension("tsx"));
                }
                match self.race(candidates, &mut attempted).await {
                    Some(found) => Some(found),
                    None => {
                        self.race(vec![specifier.with_appended_extension("js")], &mut attempted)
                            .await
                    }
                }
            }
        };

        match found {
            Some((location, text)) => {
                debug!(specifier = %specifier, location = %location, "fetched module source");
                Ok(SourceRecord {
                    specifier: specifier.clone(),
                    location,
                    raw_source: text.into(),
                })
            }
            None => Err(LoaderError::FetchNotFound {
                specifier: specifier.clone(),
                attempted,
            }),
        }
    }

    /// Retrieve all candidates concurrently and return the first success.
    async fn race(
        &self,
        candidates: Vec<String>,
        attempted: &mut Vec<FetchAttempt>,
    ) -> Option<(String, String)> {
        let mut racing: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|location| {
                let source = Arc::clone(&self.source);
                async move {
                    let result = source.retrieve(&location).await;
                    (location, result)
                }
            })
            .collect();

        while let Some((location, result)) = racing.next().await {
            match result {
                Ok(text) => return Some((location, text)),
                Err(err) => {
                    trace!(location = %location, error = %err, "candidate failed");
                    attempted.push(FetchAttempt {
                        location,
                        reason: err.to_string(),
                    });
                }
            }
        }
        None
    }
}
