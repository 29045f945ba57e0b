//! Process-wide diagnostics subscriber.
//!
//! Diagnostics go to stderr so stdout stays machine readable for `--format
//! json`. Installed at most once per process.

use crate::core::config::{LogFormat, LoggingConfig};
use std::sync::OnceLock;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time::UtcTime;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

pub fn level_filter(level: &str) -> LevelFilter {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "warn" => LevelFilter::WARN,
        "error" => LevelFilter::ERROR,
        "off" => LevelFilter::OFF,
        _ => LevelFilter::INFO,
    }
}

pub fn init_tracing(config: &LoggingConfig) {
    let _ = TRACING_INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_timer(UtcTime::rfc_3339())
            .with_max_level(level_filter(&config.level))
            .with_writer(std::io::stderr)
            .with_target(false);
        let _ = match config.format {
            LogFormat::Json => tracing::subscriber::set_global_default(
                builder
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .finish(),
            ),
            LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        };
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_level_falls_back_to_info() {
        assert_eq!(level_filter("loud"), LevelFilter::INFO);
        assert_eq!(level_filter(" DEBUG "), LevelFilter::DEBUG);
    }

    #[test]
    fn init_is_idempotent() {
        let cfg = LoggingConfig::default();
        init_tracing(&cfg);
        init_tracing(&cfg);
        assert!(TRACING_INIT.get().is_some());
    }
}
