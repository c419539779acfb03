//! Logging for tests.

use tracing_subscriber::EnvFilter;

/// Route `tracing` output through the test writer, filtered by `RUST_LOG` or,
/// when unset, by `fallback`. Only the first call in a test binary installs
/// the subscriber.
///
/// ```rust,ignore
/// keel_test::setup_test_logging("keel_runtime=debug,keel_sandbox::console=trace");
/// ```
pub fn setup_test_logging(fallback: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}

/// [`setup_test_logging`] with a `warn` fallback.
pub fn setup_test_logging_default() {
    setup_test_logging("warn");
}
