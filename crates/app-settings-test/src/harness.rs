//! Test harness helpers.

use tracing_subscriber::EnvFilter;

/// Set up test logging with the given filter directive.
///
/// Safe to call from every test; only the first call installs a
/// subscriber.
pub fn setup_test_logging(filter: &str) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_test_writer()
        .try_init();
}

/// Set up test logging at debug level for `app_settings`, or from
/// `RUST_LOG` when set.
pub fn setup_test_logging_default() {
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "app_settings=debug".to_string());
    setup_test_logging(&filter);
}
