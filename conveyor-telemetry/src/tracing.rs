//! Tracing initialization for conveyor binaries and tests.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, fmt};

/// Initializes the global tracing subscriber for a service binary.
///
/// The filter is read from `RUST_LOG`, defaulting to `info` for the given
/// service when the variable is unset.
pub fn init_tracing(service_name: &str) -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| format!("{service_name}=info").into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer())
        .try_init()
}

/// Initializes tracing for tests.
///
/// Safe to call from every test; only the first call installs the subscriber,
/// later calls are no-ops.
pub fn init_test_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into());

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_test_writer())
        .try_init();
}
