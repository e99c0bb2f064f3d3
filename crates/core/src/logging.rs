//! Shared `tracing` subscriber setup for both binaries.
//!
//! Replaces the single-file `eprintln!`-to-`/tmp` logger the prototype used
//! with structured, level-filtered output so diagnosing a multi-peer
//! session doesn't mean grepping a flat text file on one machine.

use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. `verbose` selects the default filter
/// when `RUST_LOG` isn't set; an explicit `RUST_LOG` always wins.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
