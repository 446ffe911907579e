//! Logging setup: journald on Linux, otherwise a daily log file or stderr.
//!
//! The level is read from `PLANTWATCH_LOG` (`debug`, `info`, `warn`, `error`,
//! or any `EnvFilter` directive) and defaults to `info`.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const LOG_ENV: &str = "PLANTWATCH_LOG";

static GUARD: OnceLock<WorkerGuard> = OnceLock::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Install the global subscriber. Call once, before any other work.
pub fn init(log_dir: Option<PathBuf>) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(journald_layer.with_syslog_identifier("plantwatch".to_string()))
                .try_init()?;

            tracing::debug!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    if let Some(log_dir) = log_dir {
        std::fs::create_dir_all(&log_dir)?;

        let file_appender = tracing_appender::rolling::daily(&log_dir, "plantwatch.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let _ = GUARD.set(guard);

        tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .try_init()?;

        tracing::debug!("Logging initialized with file backend at {:?}", log_dir);
        return Ok(());
    }

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()?;
    Ok(())
}
