//! `tsb cache`: inspect or clear the persistent compile cache.

use std::path::{Path, PathBuf};

use tracing::info;
use tsb_core::cache::DATABASE_FILE;
use tsb_core::{CompileCache, LoaderConfig, RedbCacheStore};

use crate::cli::{CacheArgs, CacheCommand};
use crate::error::Result;
use crate::ui;

pub async fn execute(args: CacheArgs, config_path: Option<&Path>) -> Result<()> {
    match args.action {
        CacheCommand::Clear { dir } => {
            let dir = cache_dir(dir, config_path)?;
            match clear(&dir)? {
                Some(removed) => {
                    info!(removed, dir = %dir.display(), "cache cleared");
                    ui::success(&format!("Removed {removed} cached compiles"));
                }
                None => ui::info(&format!("No compile cache in {}", dir.display())),
            }
        }
        CacheCommand::Stats { dir } => {
            let dir = cache_dir(dir, config_path)?;
            match entry_count(&dir)? {
                Some(count) => println!("{count} cached compiles in {}", dir.display()),
                None => println!("no compile cache in {}", dir.display()),
            }
        }
    }
    Ok(())
}

/// Clear the cache in `dir`. `None` when no cache database exists there.
pub fn clear(dir: &Path) -> Result<Option<usize>> {
    if !dir.join(DATABASE_FILE).exists() {
        return Ok(None);
    }
    let store = RedbCacheStore::open(dir)?;
    Ok(Some(store.clear_namespace()?))
}

/// Number of cached compiles in `dir`. `None` when no cache database exists.
pub fn entry_count(dir: &Path) -> Result<Option<usize>> {
    if !dir.join(DATABASE_FILE).exists() {
        return Ok(None);
    }
    let store = RedbCacheStore::open(dir)?;
    Ok(Some(store.len()?))
}

fn cache_dir(explicit: Option<PathBuf>, config_path: Option<&Path>) -> Result<PathBuf> {
    match explicit {
        Some(dir) => Ok(dir),
        None => Ok(LoaderConfig::load(config_path)?.cache.dir),
    }
}
