use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use gn_core::{Error, LogLevel, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as fmt_layer, EnvFilter, Layer};

/// Dependencies that are too chatty below these levels.
const DEPENDENCY_DIRECTIVES: &[&str] = &["mongodb=info", "hyper=info", "h2=info", "reqwest=warn"];

const LOG_FILE_PREFIX: &str = "post_processor";
const LOG_FILE_SUFFIX: &str = "log";
const MAX_LOG_FILES: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Environment {
    Dev,
    Prod,
    Test,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Dev => f.write_str("dev"),
            Environment::Prod => f.write_str("prod"),
            Environment::Test => f.write_str("test"),
        }
    }
}

/// Production always logs at info, whatever was requested.
pub fn effective_level(env: Environment, requested: LogLevel) -> LogLevel {
    match env {
        Environment::Prod => LogLevel::Info,
        Environment::Dev | Environment::Test => requested,
    }
}

pub fn filter_directives(level: LogLevel) -> String {
    std::iter::once(level.as_directive())
        .chain(DEPENDENCY_DIRECTIVES.iter().copied())
        .collect::<Vec<_>>()
        .join(",")
}

/// Daily-rotated `post_processor.<date>.log` in `dir`, keeping the newest
/// five files.
pub fn log_file_appender(dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix(LOG_FILE_SUFFIX)
        .max_log_files(MAX_LOG_FILES)
        .build(dir)
        .map_err(|e| Error::Config(format!("Failed to open log file in {}: {e}", dir.display())))
}

/// Install the global subscriber: console output (JSON in prod) plus an
/// optional JSON log file in `log_dir`. `RUST_LOG` overrides the computed
/// filter. Keep the returned guard alive until exit so buffered file output
/// is flushed.
pub fn init_logging(env: Environment, level: LogLevel, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let level = effective_level(env, level);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directives(level)));

    let console = match env {
        Environment::Prod => fmt_layer::layer().json().boxed(),
        Environment::Dev | Environment::Test => fmt_layer::layer().with_target(false).boxed(),
    };

    let (file, guard) = match log_dir {
        Some(dir) => {
            let (writer, guard) = tracing_appender::non_blocking(log_file_appender(dir)?);
            let layer = fmt_layer::layer().json().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file)
        .with(filter)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to initialize logging: {e}")))?;

    tracing::debug!(environment = %env, level = level.as_directive(), "logging initialized");
    Ok(guard)
}
