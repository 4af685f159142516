//! Tracing subscriber setup for binaries and tests embedding the engine.

use crate::config::LoggingConfig;
use tracing_subscriber::{
    layer::SubscriberExt, util::SubscriberInitExt, util::TryInitError, EnvFilter,
};

/// Default directives for a configured level: quiet dependencies, verbose engine.
fn default_directives(level: &str) -> String {
    format!("warn,multicall_core={level},tests={level}")
}

/// Builds the filter: `RUST_LOG` wins when set and parseable, else the configured level.
fn build_filter(config: &LoggingConfig, rust_log: Option<&str>) -> EnvFilter {
    match rust_log {
        Some(level @ ("debug" | "trace")) => EnvFilter::new(default_directives(level)),
        Some(directives) => EnvFilter::try_new(directives)
            .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.level))),
        None => EnvFilter::new(default_directives(&config.level)),
    }
}

/// Installs the global tracing subscriber.
///
/// `format = "json"` emits one JSON object per line; anything else uses the pretty format.
///
/// # Errors
///
/// Returns [`TryInitError`] if a global subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<(), TryInitError> {
    let rust_log = std::env::var("RUST_LOG").ok();
    let filter = build_filter(config, rust_log.as_deref());
    let registry = tracing_subscriber::registry().with(filter);

    if config.format.as_str() == "json" {
        let fmt_layer = tracing_subscriber::fmt::layer().json();
        registry.with(fmt_layer).try_init()
    } else {
        let fmt_layer = tracing_subscriber::fmt::layer()
            .pretty()
            .with_file(true)
            .with_line_number(true)
            .with_target(false);
        registry.with(fmt_layer).try_init()
    }
}
