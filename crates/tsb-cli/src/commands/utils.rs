//! Shared setup for commands that resolve a graph.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use figment::providers::Serialized;
use tracing::{debug, warn};

use tsb_core::cache::{self, CompileCache};
use tsb_core::compiler::CompilerPool;
use tsb_core::config::CONFIG_FILE;
use tsb_core::fetcher::SourceFetcher;
use tsb_core::source::{ContentSource, FsSource};
use tsb_core::{DependencyGraph, GraphResolver, LoaderConfig, ModuleSpecifier};

use crate::cli::LoaderArgs;
use crate::error::{CliError, Result};
use crate::ui;

/// Load the layered configuration and apply command-line overrides on top.
///
/// Without `--config`, `tsb.toml` in the project root is used when present.
pub(crate) fn load_config(config_path: Option<&Path>, args: &LoaderArgs) -> Result<LoaderConfig> {
    let config_file: Option<PathBuf> = config_path.map(Path::to_path_buf).or_else(|| {
        let default_path = args.root.join(CONFIG_FILE);
        default_path.exists().then_some(default_path)
    });
    if let Some(path) = &config_file {
        debug!(path = %path.display(), "using config file");
    }

    let mut figment = LoaderConfig::figment(config_file.as_deref());
    if args.jsx {
        figment = figment.merge(Serialized::default("compile.jsx", true));
    }
    if let Some(pragma) = &args.jsx_pragma {
        figment = figment.merge(Serialized::default("compile.jsx_pragma", pragma));
    }
    if let Some(pragma_frag) = &args.jsx_pragma_frag {
        figment = figment.merge(Serialized::default("compile.jsx_pragma_frag", pragma_frag));
    }
    if let Some(size) = args.pool_size {
        figment = figment.merge(Serialized::default("pool_size", size));
    }
    if args.no_cache {
        figment = figment.merge(Serialized::default("cache.enabled", false));
    }
    if args.force_refresh {
        figment = figment.merge(Serialized::default("cache.force_refresh", true));
    }

    Ok(LoaderConfig::from_figment(figment)?)
}

/// Resolver plus the cache it writes to.
pub(crate) struct Session {
    resolver: GraphResolver,
    cache: Option<Arc<dyn CompileCache>>,
    config: LoaderConfig,
}

impl Session {
    pub(crate) fn open(config: LoaderConfig, args: &LoaderArgs) -> Result<Self> {
        let source = content_source(args)?;
        let pool = CompilerPool::new(config.effective_pool_size(), tsb_transpile::factory())?;
        let mut resolver = GraphResolver::new(SourceFetcher::new(source), pool)
            .with_max_steps(config.max_resolution_steps);

        // A cache that cannot be opened only costs speed.
        let cache: Option<Arc<dyn CompileCache>> = match config.cache.open() {
            Ok(Some(store)) => Some(Arc::new(store)),
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "compile cache unavailable");
                ui::warning(&format!("Compile cache unavailable: {e}"));
                None
            }
        };
        if let Some(cache) = &cache {
            resolver = resolver.with_cache(Arc::clone(cache), config.cache.should_force_refresh());
        }

        Ok(Self {
            resolver,
            cache,
            config,
        })
    }

    /// Resolve `entries` and wait for every module's code.
    ///
    /// A failure clears the cache, the same as a failed load request.
    pub(crate) async fn resolve(&self, entries: &[ModuleSpecifier]) -> Result<DependencyGraph> {
        let result = async {
            let graph = self.resolver.resolve(entries, &self.config.compile).await?;
            graph.await_code().await?;
            Ok::<_, tsb_core::LoaderError>(graph)
        }
        .await;

        match result {
            Ok(graph) => Ok(graph),
            Err(e) => {
                if let Some(cache) = &self.cache {
                    cache::try_clear(cache.as_ref());
                }
                Err(e.into())
            }
        }
    }
}

pub(crate) fn parse_entries(raw: &[String]) -> Result<Vec<ModuleSpecifier>> {
    if raw.is_empty() {
        return Err(CliError::InvalidArgument(
            "at least one entry is required".to_string(),
        ));
    }
    raw.iter()
        .map(|entry| ModuleSpecifier::parse(entry).map_err(CliError::from))
        .collect()
}

#[cfg(not(feature = "http"))]
fn content_source(args: &LoaderArgs) -> Result<Arc<dyn ContentSource>> {
    if args.origin.is_some() {
        return Err(CliError::InvalidArgument(
            "--origin requires tsb to be built with the `http` feature".to_string(),
        ));
    }
    local_source(args)
}

#[cfg(feature = "http")]
fn content_source(args: &LoaderArgs) -> Result<Arc<dyn ContentSource>> {
    match &args.origin {
        Some(origin) => {
            let source = tsb_core::source::HttpSource::new(Some(origin.as_str()))
                .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
            Ok(Arc::new(source))
        }
        None => local_source(args),
    }
}

fn local_source(args: &LoaderArgs) -> Result<Arc<dyn ContentSource>> {
    if !args.root.is_dir() {
        return Err(CliError::InvalidArgument(format!(
            "root '{}' is not a directory",
            args.root.display()
        )));
    }
    Ok(Arc::new(FsSource::new(&args.root)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    fn args(root: &Path) -> LoaderArgs {
        LoaderArgs {
            root: root.to_path_buf(),
            ..LoaderArgs::default()
        }
    }

    #[test]
    fn test_flags_override_config_file() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "tsb.toml",
                r#"
                pool_size = 3

                [compile]
                jsx_pragma = "h"

                [cache]
                enabled = true
                "#,
            )?;

            let mut args = args(jail.directory());
            args.jsx = true;
            args.pool_size = Some(1);
            args.no_cache = true;

            let config = load_config(None, &args).map_err(|e| e.to_string())?;
            assert_eq!(config.pool_size, Some(1));
            assert!(config.compile.jsx);
            assert_eq!(config.compile.jsx_pragma, "h");
            assert!(!config.cache.enabled);
            Ok(())
        });
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        Jail::expect_with(|jail| {
            let mut args = args(jail.directory());
            args.pool_size = Some(0);
            assert!(load_config(None, &args).is_err());
            Ok(())
        });
    }

    #[test]
    fn test_parse_entries() {
        let entries = parse_entries(&["/src/main".to_string(), "src/worker.ts".to_string()]).unwrap();
        assert_eq!(entries[0].as_str(), "/src/main");
        assert!(entries[1].as_str().ends_with("src/worker.ts"));
        assert!(parse_entries(&[]).is_err());
        assert!(parse_entries(&["  ".to_string()]).is_err());
    }

    #[test]
    fn test_missing_root_is_rejected() {
        let args = args(Path::new("/definitely/not/here"));
        assert!(matches!(local_source(&args), Err(CliError::InvalidArgument(_))));
    }
}
