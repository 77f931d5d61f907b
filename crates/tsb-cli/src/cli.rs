//! Command-line interface definition.
//!
//! - `tsb resolve <ENTRY>...` - resolve and compile, then print the graph
//! - `tsb emit <ENTRY>... --out-dir dist` - write compiled modules
//! - `tsb cache clear` - remove cached compiles

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// tsb - on-demand TypeScript module loading
#[derive(Parser, Debug)]
#[command(
    name = "tsb",
    version,
    about = "Resolve and compile TypeScript module graphs",
    long_about = "tsb fetches TypeScript modules, compiles them on a pool of workers and\n\
                  follows their imports. The CLI exposes the resolver for inspection and\n\
                  ahead-of-time compilation."
)]
pub struct Cli {
    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    /// Configuration file (defaults to tsb.toml in the project root)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Resolve entries and print their dependency graph
    Resolve(ResolveArgs),

    /// Compile a graph and write one JavaScript file per module
    Emit(EmitArgs),

    /// Manage the persistent compile cache
    Cache(CacheArgs),
}

/// Options shared by every command that resolves a graph.
#[derive(Args, Debug, Clone)]
pub struct LoaderArgs {
    /// Directory that root-relative specifiers are served from
    #[arg(short, long, default_value = ".")]
    pub root: PathBuf,

    /// Fetch sources over HTTP relative to this URL instead of --root
    /// (requires the `http` feature)
    #[arg(long, value_name = "URL")]
    pub origin: Option<String>,

    /// Enable JSX (probes .tsx candidates)
    #[arg(long)]
    pub jsx: bool,

    /// JSX element factory
    #[arg(long, value_name = "EXPR")]
    pub jsx_pragma: Option<String>,

    /// JSX fragment factory
    #[arg(long, value_name = "EXPR")]
    pub jsx_pragma_frag: Option<String>,

    /// Number of compiler workers
    #[arg(long, value_name = "N")]
    pub pool_size: Option<usize>,

    /// Disable the persistent compile cache
    #[arg(long, conflicts_with = "force_refresh")]
    pub no_cache: bool,

    /// Recompile everything but still write results to the cache
    #[arg(long)]
    pub force_refresh: bool,
}

impl Default for LoaderArgs {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            origin: None,
            jsx: false,
            jsx_pragma: None,
            jsx_pragma_frag: None,
            pool_size: None,
            no_cache: false,
            force_refresh: false,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct ResolveArgs {
    /// Entry specifiers, e.g. /src/main
    #[arg(required = true, value_name = "ENTRY")]
    pub entries: Vec<String>,

    #[command(flatten)]
    pub loader: LoaderArgs,

    /// Print the graph as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct EmitArgs {
    /// Entry specifiers, e.g. /src/main
    #[arg(required = true, value_name = "ENTRY")]
    pub entries: Vec<String>,

    #[command(flatten)]
    pub loader: LoaderArgs,

    /// Output directory
    #[arg(short, long, default_value = "dist")]
    pub out_dir: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct CacheArgs {
    #[command(subcommand)]
    pub action: CacheCommand,
}

#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Remove every cached compile
    Clear {
        /// Cache directory (defaults to the configured one)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },

    /// Show how many compiles are cached
    Stats {
        /// Cache directory (defaults to the configured one)
        #[arg(long, value_name = "DIR")]
        dir: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_resolve() {
        let cli = Cli::try_parse_from([
            "tsb", "resolve", "/src/main", "/src/worker", "--root", "web", "--jsx", "--json",
        ])
        .unwrap();

        let Command::Resolve(args) = cli.command else {
            panic!("expected resolve");
        };
        assert_eq!(args.entries, vec!["/src/main", "/src/worker"]);
        assert_eq!(args.loader.root, PathBuf::from("web"));
        assert!(args.loader.jsx);
        assert!(args.json);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["tsb", "cache", "clear", "-v", "--config", "x.toml"]).unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Cli::try_parse_from(["tsb", "-v", "-q", "cache", "stats"]).is_err());
    }

    #[test]
    fn test_resolve_requires_an_entry() {
        assert!(Cli::try_parse_from(["tsb", "resolve"]).is_err());
    }
}
