//! Logging setup shared by every binary.

use crate::cli::LogFormat;
use crate::config::Config;
use crate::formatter;
use tracing_subscriber::fmt::format::JsonFields;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Builds the global subscriber from `Config::log_level` and the CLI's
/// `--log-format` flag. Respects `RUST_LOG` when set, same as upstream
/// `tracing_subscriber` convention.
pub fn setup_logging(config: &Config, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber: Box<dyn tracing::Subscriber + Send + Sync> = match format {
        LogFormat::Pretty => Box::new(
            FmtSubscriber::builder()
                .with_target(true)
                .event_format(formatter::EventFormatter)
                .with_env_filter(filter)
                .finish(),
        ),
        LogFormat::Json => Box::new(
            FmtSubscriber::builder()
                .with_target(true)
                .event_format(formatter::JsonEventFormatter)
                .fmt_fields(JsonFields::new())
                .with_env_filter(filter)
                .finish(),
        ),
    };

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");
}
