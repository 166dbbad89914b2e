//! Tracing subscriber setup.
//!
//! Sessions never install a subscriber themselves; binaries and tests call
//! one of the functions below once, and every [`DatabaseAccess`] session logs
//! into the span it was constructed with.
//!
//! [`DatabaseAccess`]: crate::db::DatabaseAccess

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize tracing with the given default filter directive.
///
/// This sets up:
/// - Console logging to stderr with targets and line numbers
/// - Environment-based filter (via RUST_LOG), falling back to `default_filter`
///
/// # Panics
///
/// Panics if tracing has already been initialized.
pub fn init_tracing(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();

    tracing::debug!(filter = default_filter, "Tracing initialized");
}

/// Initialize tracing for tests (only logs errors).
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("error")
        .with_test_writer()
        .try_init();
}
