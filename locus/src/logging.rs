//! Logging setup.
//!
//! Diagnostics go through `tracing`. [`init_logging`] installs the global
//! subscriber: a compact stderr layer plus an optional plain-text file layer,
//! both behind a reloadable `EnvFilter` so diagnostics can be switched off
//! and on at runtime without reinstalling the subscriber.
//!
//! `RUST_LOG` takes precedence over the configured level.

use std::fs;
use std::io;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::{LoggingSettings, DEFAULT_LOG_LEVEL};

/// Keeps the file writer alive and controls the active filter.
///
/// Dropping the guard flushes and closes the log file.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
    filter: reload::Handle<EnvFilter, Registry>,
    level: String,
}

impl LoggingGuard {
    /// Turn diagnostics off, or back on with the same precedence as
    /// [`build_filter`].
    pub fn set_enabled(&self, enabled: bool) -> Result<(), reload::Error> {
        set_filter_enabled(&self.filter, &self.level, enabled)
    }
}

impl std::fmt::Debug for LoggingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoggingGuard")
            .field("level", &self.level)
            .field("file", &self._file_guard.is_some())
            .finish()
    }
}

/// Install the global subscriber.
///
/// # Errors
///
/// Fails if the log file cannot be created or a global subscriber is
/// already installed.
pub fn init_logging(settings: &LoggingSettings) -> Result<LoggingGuard, io::Error> {
    let (filter, handle) = reload::Layer::new(build_filter(settings));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_target(false)
        .compact();

    let (file_layer, file_guard) = match &settings.file {
        Some(path) => {
            let dir = match path.parent() {
                Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
                _ => std::path::PathBuf::from("."),
            };
            let name = path
                .file_name()
                .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "log file has no name"))?;
            fs::create_dir_all(&dir)?;
            // Each session starts with an empty log.
            fs::write(path, "")?;

            let appender = tracing_appender::rolling::never(&dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        filter: handle,
        level: settings.level.clone(),
    })
}

/// Filter for `settings`: `off` when disabled, otherwise `RUST_LOG` if set,
/// otherwise the configured level.
pub fn build_filter(settings: &LoggingSettings) -> EnvFilter {
    if !settings.enabled {
        return EnvFilter::new("off");
    }
    enabled_filter(&settings.level)
}

fn enabled_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| filter_for_level(level))
}

fn set_filter_enabled<S>(
    handle: &reload::Handle<EnvFilter, S>,
    level: &str,
    enabled: bool,
) -> Result<(), reload::Error> {
    let filter = if enabled {
        enabled_filter(level)
    } else {
        EnvFilter::new("off")
    };
    handle.reload(filter)
}

fn filter_for_level(level: &str) -> EnvFilter {
    EnvFilter::try_new(level).unwrap_or_else(|e| {
        eprintln!("Invalid log level '{}': {}, using {}", level, e, DEFAULT_LOG_LEVEL);
        EnvFilter::new(DEFAULT_LOG_LEVEL)
    })
}
