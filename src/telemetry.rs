use crate::config::{AppConfig, LogFormat};
use std::fs::OpenOptions;
use std::sync::{Mutex, OnceLock};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Env var holding `RUST_LOG`-style directives.
pub(crate) const LOG_FILTER_ENV: &str = "CHIMEWATCH_LOG";

pub(crate) fn default_directive(config: &AppConfig) -> &'static str {
    if config.logs {
        "debug"
    } else {
        "info"
    }
}

fn log_filter(config: &AppConfig) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(config)))
}

fn log_writer(config: &AppConfig) -> BoxMakeWriter {
    if let Some(path) = &config.log_file {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => return BoxMakeWriter::new(Mutex::new(file)),
            Err(err) => {
                eprintln!(
                    "chimewatch: cannot open log file {}: {err}; logging to stderr",
                    path.display()
                );
            }
        }
    }
    BoxMakeWriter::new(std::io::stderr)
}

/// Install the global subscriber once. Later calls are no-ops.
pub fn init_tracing(config: &AppConfig) {
    if config.no_logs {
        return;
    }

    let _ = TRACING_INIT.get_or_init(|| {
        let builder = tracing_subscriber::fmt()
            .with_env_filter(log_filter(config))
            .with_timer(UtcTime::rfc_3339())
            .with_writer(log_writer(config))
            .with_target(false);
        let installed = match config.log_format {
            LogFormat::Json => {
                let subscriber = builder
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .finish();
                tracing::subscriber::set_global_default(subscriber)
            }
            LogFormat::Text => {
                let subscriber = builder.with_ansi(config.log_file.is_none()).finish();
                tracing::subscriber::set_global_default(subscriber)
            }
        };
        if installed.is_err() {
            eprintln!("chimewatch: a tracing subscriber was already installed");
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn verbose_flag_raises_default_level() {
        let cfg = AppConfig::parse_from(["test-app"]);
        assert_eq!(default_directive(&cfg), "info");
        let cfg = AppConfig::parse_from(["test-app", "--logs"]);
        assert_eq!(default_directive(&cfg), "debug");
    }

    #[test]
    fn disabled_logging_installs_nothing() {
        let cfg = AppConfig::parse_from(["test-app", "--no-logs"]);
        init_tracing(&cfg);
        assert!(TRACING_INIT.get().is_none());
    }
}
