//! Tracing subscriber setup for the `cdbm` binary.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Crates whose logs `--verbose` turns up.
const CRATES: [&str; 4] = ["cdbm_cli", "cdbm_migrate", "cdbm_postgres", "cdbm_sqlite"];

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> String {
    if verbose {
        CRATES
            .iter()
            .map(|krate| format!("{}=debug", krate))
            .collect::<Vec<_>>()
            .join(",")
    } else {
        "warn".to_string()
    }
}

/// Install the global subscriber, writing to stderr.
///
/// `RUST_LOG` wins unless `--verbose` is given.
pub fn init(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new(default_filter(true))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter(false)))
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .try_init();
}
