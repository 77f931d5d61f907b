//! tsb CLI entry point.

use clap::Parser;
use miette::Result;
use tsb_cli::{cli, commands, error, logger};

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    logger::init_logger(args.verbose, args.quiet, args.no_color);

    let config = args.config.as_deref();
    let result = match args.command {
        cli::Command::Resolve(resolve_args) => commands::resolve_execute(resolve_args, config).await,
        cli::Command::Emit(emit_args) => commands::emit_execute(emit_args, config).await,
        cli::Command::Cache(cache_args) => commands::cache_execute(cache_args, config).await,
    };

    result.map_err(error::cli_error_to_miette)
}
