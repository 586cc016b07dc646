//! Logging setup
//!
//! Steps emit `tracing` events; this installs a formatter for them. `RUST_LOG`
//! takes precedence over the verbosity flag.

use tracing_subscriber::EnvFilter;

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "stepwise=debug"
    } else {
        "stepwise=info"
    }
}

/// Install the global subscriber. Does nothing if one is already set.
pub fn init(verbose: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
