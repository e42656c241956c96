use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
/// A second call is a no-op.
pub fn init(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},hyper=warn,reqwest=warn", cfg.level)));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if cfg.json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().compact()).try_init()
    };

    if installed.is_ok() {
        tracing::debug!(level = %cfg.level, json = cfg.json, "logging initialised");
    }
}
