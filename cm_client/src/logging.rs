//! Logging setup for the command-line client.

use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Default filter when `RUST_LOG` is unset
const DEFAULT_FILTER: &str = "info,clipmarket=debug,hyper=warn,reqwest=warn";

/// Initialize structured logging on stderr.
///
/// Records emitted through the `log` facade by the `clipmarket` library are
/// forwarded into the same subscriber. Levels are configurable via
/// `RUST_LOG`.
pub fn init() {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    tracing::debug!("Logging initialized");
}
