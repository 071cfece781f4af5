//! Logging setup for library consumers and tests.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber once. The `DENOVO_LOG`
/// environment variable overrides the default `info` level, using the
/// usual `tracing` filter syntax.
pub fn init_logging() {
    if tracing::dispatcher::has_been_set() {
        return;
    }
    let filter = EnvFilter::try_from_env("DENOVO_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
