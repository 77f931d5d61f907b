//! Logging setup for the tsb CLI.
//!
//! - `--verbose` enables debug output for the tsb crates
//! - `--quiet` shows errors only
//! - otherwise `RUST_LOG` is honored, defaulting to info

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const VERBOSE_FILTER: &str = "tsb_core=debug,tsb_transpile=debug,tsb_cli=debug";
const QUIET_FILTER: &str = "tsb_core=error,tsb_transpile=error,tsb_cli=error";
const DEFAULT_FILTER: &str = "tsb_core=info,tsb_transpile=info,tsb_cli=info";

/// Initialize the global tracing subscriber. Call once, before any logging.
///
/// `verbose` wins over `quiet`; with neither set, `RUST_LOG` is used when
/// present.
pub fn init_logger(verbose: bool, quiet: bool, no_color: bool) {
    init_logger_with_filter(filter_for(verbose, quiet), no_color);
}

/// Initialize with an explicit filter.
pub fn init_logger_with_filter(filter: EnvFilter, no_color: bool) {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .with_ansi(!no_color && should_use_colors())
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn filter_for(verbose: bool, quiet: bool) -> EnvFilter {
    if verbose {
        EnvFilter::new(VERBOSE_FILTER)
    } else if quiet {
        EnvFilter::new(QUIET_FILTER)
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
    }
}

/// Whether stderr output should be colored.
///
/// `NO_COLOR` disables colors and `FORCE_COLOR` forces them; otherwise the
/// terminal decides.
pub fn should_use_colors() -> bool {
    if std::env::var_os("NO_COLOR").is_some() {
        return false;
    }
    if std::env::var_os("FORCE_COLOR").is_some() {
        return true;
    }
    console::Term::stderr().features().colors_supported()
}

#[cfg(test)]
mod tests {
    use super::*;

    // The subscriber is process-global, so only filter construction is tested.

    #[test]
    fn test_verbose_filter() {
        assert!(filter_for(true, false).to_string().contains("tsb_core=debug"));
    }

    #[test]
    fn test_verbose_wins_over_quiet() {
        assert!(filter_for(true, true).to_string().contains("debug"));
    }

    #[test]
    fn test_quiet_filter() {
        assert!(filter_for(false, true).to_string().contains("tsb_cli=error"));
    }
}
