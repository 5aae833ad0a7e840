//! Tracing subscriber initialization.

use tracing_subscriber::EnvFilter;

use super::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` overrides the configured level.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.clone()));

    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);

    let result = if config.format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // A second init (tests) is harmless.
    if result.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}
