//! `tsb emit`: compile a graph ahead of time and write it to disk.
//!
//! Every module becomes one `.js` file whose path mirrors its specifier, and
//! `manifest.json` records the graph so a host can prime its registry.

use std::path::{Path, PathBuf};

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;
use tsb_core::{DependencyGraph, ModuleSpecifier};

use super::utils::{Session, load_config, parse_entries};
use crate::cli::EmitArgs;
use crate::error::{CliError, Result};
use crate::ui;

/// Name of the graph description written next to the modules.
pub const MANIFEST_FILE: &str = "manifest.json";

const SOURCE_EXTENSIONS: &[&str] = &["ts", "tsx", "mts", "js", "jsx", "mjs", "cjs"];

#[derive(Debug, Serialize)]
pub struct Manifest {
    pub entries: Vec<ModuleSpecifier>,
    pub modules: Vec<ManifestEntry>,
}

#[derive(Debug, Serialize)]
pub struct ManifestEntry {
    pub specifier: ModuleSpecifier,
    /// Output path relative to the output directory, `/`-separated.
    pub file: String,
    pub is_module_source: bool,
    pub static_deps: Vec<ModuleSpecifier>,
    pub dynamic_deps: Vec<ModuleSpecifier>,
}

pub async fn execute(args: EmitArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.loader)?;
    let entries = parse_entries(&args.entries)?;
    let session = Session::open(config, &args.loader)?;

    let graph = session.resolve(&entries).await?;
    let outputs = output_paths(&graph)?;

    tokio::fs::create_dir_all(&args.out_dir)
        .await
        .map_err(|source| CliError::Write {
            path: args.out_dir.clone(),
            source,
        })?;

    let mut modules = Vec::with_capacity(graph.len());
    let mut total_bytes = 0;
    for (record, relative) in graph.iter().zip(outputs) {
        let code = record.code().await?;
        let path = args.out_dir.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| CliError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(&path, code.as_bytes())
            .await
            .map_err(|source| CliError::Write {
                path: path.clone(),
                source,
            })?;
        debug!(module = %record.specifier, path = %path.display(), "module written");

        total_bytes += code.len();
        modules.push(ManifestEntry {
            specifier: record.specifier.clone(),
            file: relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/"),
            is_module_source: record.is_module_source(),
            static_deps: record.static_deps().to_vec(),
            dynamic_deps: record.dynamic_deps().to_vec(),
        });
    }

    let manifest = Manifest {
        entries: graph.entries().to_vec(),
        modules,
    };
    let manifest_path = args.out_dir.join(MANIFEST_FILE);
    tokio::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .await
        .map_err(|source| CliError::Write {
            path: manifest_path,
            source,
        })?;

    ui::success(&format!(
        "Wrote {} modules ({}) to {}",
        graph.len(),
        ui::format_size(total_bytes),
        args.out_dir.display()
    ));
    Ok(())
}

/// Output path of every module in discovery order. Two specifiers that map
/// to the same file are an error, so nothing is overwritten.
pub fn output_paths(graph: &DependencyGraph) -> Result<Vec<PathBuf>> {
    let mut claimed: FxHashMap<PathBuf, &ModuleSpecifier> = FxHashMap::default();
    let mut paths = Vec::with_capacity(graph.len());
    for record in graph.iter() {
        let path = output_path(&record.specifier);
        if let Some(first) = claimed.insert(path.clone(), &record.specifier) {
            return Err(CliError::OutputCollision {
                path,
                first: first.clone(),
                second: record.specifier.clone(),
            });
        }
        paths.push(path);
    }
    Ok(paths)
}

/// Output path for `specifier`, relative to the output directory.
///
/// URL schemes are dropped so the host becomes the first directory. `..`
/// segments are renamed rather than followed, which keeps every file inside
/// the output directory. A known source extension is replaced by `.js`.
pub fn output_path(specifier: &ModuleSpecifier) -> PathBuf {
    let raw = specifier.as_str();
    let raw = raw.split_once("://").map_or(raw, |(_, rest)| rest);
    let raw = raw.split(['?', '#']).next().unwrap_or(raw);

    let mut segments: Vec<&str> = raw
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .map(|s| if s == ".." { "__parent__" } else { s })
        .collect();

    let file = match segments.pop() {
        Some(last) => {
            let stem = match last.rsplit_once('.') {
                Some((stem, ext)) if !stem.is_empty() && SOURCE_EXTENSIONS.contains(&ext) => stem,
                _ => last,
            };
            format!("{stem}.js")
        }
        None => "index.js".to_string(),
    };

    let mut path: PathBuf = segments.iter().collect();
    path.push(file);
    path
}
