//! Tracing subscriber setup.
//!
//! Log lines go to stderr so CLI output on stdout stays machine-readable.
//! Filtering follows the `NANCY_LOG` environment variable (same syntax as
//! `RUST_LOG`), defaulting to `info`.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "NANCY_LOG";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    init_with(filter);
}

/// Initialize with an explicit filter string, e.g. `"warn"` for quiet CLI runs.
pub fn init_tracing_with_filter(filter: &str) {
    init_with(EnvFilter::new(filter));
}

fn init_with(filter: EnvFilter) {
    // A second init (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
