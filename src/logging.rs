//! Logging setup.
//!
//! Logs go to stderr so chat output on stdout stays clean. `RUST_LOG`
//! takes precedence over the filter from the config file.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the global `tracing` subscriber.
///
/// `default_filter` is used when `RUST_LOG` is unset or invalid. An invalid
/// `default_filter` falls back to `warn`. Calling this twice is harmless.
pub fn init(default_filter: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();

    tracing::debug!("Logging initialized");
}
