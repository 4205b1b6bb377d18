use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Installs a `fmt` subscriber filtered by `RUST_LOG`, falling back to the
/// configured level.
///
/// Returns `false` when a global subscriber was already installed (embedders
/// usually set up their own).
pub fn init_logging(config: &LoggingConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(true)
        .try_init()
        .is_ok()
}
