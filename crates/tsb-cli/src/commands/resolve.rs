//! `tsb resolve`: compile a graph and print it.

use std::fmt::Write as _;
use std::path::Path;

use rustc_hash::FxHashSet;
use tracing::info;
use tsb_core::{DependencyGraph, ModuleSpecifier};

use super::utils::{Session, load_config, parse_entries};
use crate::cli::ResolveArgs;
use crate::error::Result;
use crate::ui;

pub async fn execute(args: ResolveArgs, config_path: Option<&Path>) -> Result<()> {
    let config = load_config(config_path, &args.loader)?;
    let entries = parse_entries(&args.entries)?;
    let session = Session::open(config, &args.loader)?;

    let graph = session.resolve(&entries).await?;
    let cached = graph.iter().filter(|r| r.from_cache).count();
    info!(modules = graph.len(), cached, "graph resolved");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&graph.summary())?);
    } else {
        print!("{}", render_tree(&graph));
        ui::success(&format!(
            "Resolved {} modules {}",
            graph.len(),
            ui::dim(&format!("({cached} from cache)"))
        ));
    }
    Ok(())
}

/// Indented dependency tree, one module per line.
///
/// Modules already printed are marked instead of expanded again, which also
/// terminates cycles. Dynamic imports are prefixed with `import()`.
pub fn render_tree(graph: &DependencyGraph) -> String {
    let mut out = String::new();
    let mut seen = FxHashSet::default();
    for entry in graph.entries() {
        render_node(graph, entry, 0, false, &mut seen, &mut out);
    }
    out
}

fn render_node(
    graph: &DependencyGraph,
    specifier: &ModuleSpecifier,
    depth: usize,
    dynamic: bool,
    seen: &mut FxHashSet<ModuleSpecifier>,
    out: &mut String,
) {
    let indent = "  ".repeat(depth);
    let prefix = if dynamic { "import() " } else { "" };
    let Some(record) = graph.get(specifier) else {
        let _ = writeln!(out, "{indent}{prefix}{specifier} (skipped)");
        return;
    };

    if !seen.insert(specifier.clone()) {
        let _ = writeln!(out, "{indent}{prefix}{specifier} (see above)");
        return;
    }

    let mut flags = Vec::new();
    if !record.is_module_source() {
        flags.push("script");
    }
    if record.from_cache {
        flags.push("cached");
    }
    if flags.is_empty() {
        let _ = writeln!(out, "{indent}{prefix}{specifier}");
    } else {
        let _ = writeln!(out, "{indent}{prefix}{specifier} [{}]", flags.join(", "));
    }

    for dep in record.static_deps() {
        render_node(graph, dep, depth + 1, false, seen, out);
    }
    for dep in record.dynamic_deps() {
        render_node(graph, dep, depth + 1, true, seen, out);
    }
}
