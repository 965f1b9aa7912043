//! Initialisation du logging
//!
//! `RUST_LOG` est prioritaire ; sinon le niveau vient de
//! `host.logger.min_level`. Les logs vont sur stderr, stdout étant réservé
//! au JSON.

use pbxconfig::Config;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Directive `EnvFilter` pour un niveau de la configuration
fn level_directive(level: &str) -> &'static str {
    match level.trim().to_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARN" | "WARNING" => "warn",
        "ERROR" => "error",
        "OFF" | "NONE" => "off",
        _ => "info",
    }
}

pub fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = config.get_log_min_level().unwrap_or_default();
        EnvFilter::new(level_directive(&level))
    });

    let enable_console = config.get_log_enable_console().unwrap_or(true);

    let registry = tracing_subscriber::registry().with(filter);
    if enable_console {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_level(true),
            )
            .init();
    } else {
        registry.init();
    }
}
