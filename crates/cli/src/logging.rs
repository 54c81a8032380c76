use pricewise_core::config::{AppConfig, LogFormat, LoadOptions};
use tracing_subscriber::EnvFilter;

/// Installs the global subscriber. Command output owns stdout, so events go
/// to stderr. `RUST_LOG` wins over the configured level when set.
pub fn init(format: LogFormat, level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    // Ignored when a subscriber is already installed.
    let _ = match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
}

/// Best-effort setup before a command loads its own config. A broken
/// config is reported by the command itself, so this falls back to defaults.
pub fn init_from_env() {
    let config = AppConfig::load(LoadOptions::default()).unwrap_or_default();
    init(config.logging.format, &config.logging.level);
}
