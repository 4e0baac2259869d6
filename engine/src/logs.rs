//! Logging configuration

use std::path::PathBuf;

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt,
    layer::{Layered, SubscriberExt},
    reload,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::errors::ExecError;

/// Log level configuration
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn to_filter_string(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl serde::Serialize for LogLevel {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.to_filter_string())
    }
}

impl<'de> serde::Deserialize<'de> for LogLevel {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Logging options
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Log level
    pub log_level: LogLevel,

    /// Write logs to stderr (stdout carries batch results)
    pub stderr: bool,

    /// Log directory for file output, disabled when `None`
    pub log_dir: Option<PathBuf>,

    /// Enable JSON format
    pub json_format: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            stderr: true,
            log_dir: None,
            json_format: false,
        }
    }
}

type FilterHandle =
    reload::Handle<EnvFilter, Layered<Vec<Box<dyn Layer<Registry> + Send + Sync>>, Registry>>;

/// Live logging setup
///
/// Holds the file writer guard, which flushes on drop, and a handle to
/// change the level once settings are known.
pub struct LogHandle {
    filter: FilterHandle,
    from_env: bool,
    _guard: Option<WorkerGuard>,
}

impl LogHandle {
    /// Switch to `level`; a filter taken from `RUST_LOG` is kept
    pub fn set_level(&self, level: &LogLevel) -> Result<(), ExecError> {
        if self.from_env {
            return Ok(());
        }
        self.filter
            .reload(EnvFilter::new(level.to_filter_string()))
            .map_err(|e| ExecError::ConfigError(e.to_string()))
    }
}

/// Initialize logging
///
/// The returned handle must be kept alive for as long as logs should be
/// written. A log directory that cannot be used disables file output only.
pub fn init_logging(options: LogOptions) -> Result<LogHandle, ExecError> {
    let (filter, from_env) = match EnvFilter::try_from_default_env() {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(options.log_level.to_filter_string()), false),
    };
    let (filter, filter_handle) = reload::Layer::new(filter);

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    if options.stderr {
        if options.json_format {
            layers.push(fmt::layer().json().with_writer(std::io::stderr).boxed());
        } else {
            layers.push(fmt::layer().with_writer(std::io::stderr).boxed());
        }
    }

    let mut guard = None;
    let mut file_error = None;
    if let Some(log_dir) = &options.log_dir {
        let appender = RollingFileAppender::builder()
            .rotation(Rotation::DAILY)
            .filename_prefix("netfanout.log")
            .build(log_dir);
        match appender {
            Ok(appender) => {
                let (writer, file_guard) = tracing_appender::non_blocking(appender);
                layers.push(fmt::layer().with_ansi(false).with_writer(writer).boxed());
                guard = Some(file_guard);
            }
            Err(e) => file_error = Some(format!("{}: {}", log_dir.display(), e)),
        }
    }

    tracing_subscriber::registry()
        .with(layers)
        .with(filter)
        .try_init()
        .map_err(|e| ExecError::ConfigError(e.to_string()))?;

    if let Some(e) = file_error {
        warn!("File logging disabled, unable to use {}", e);
    }

    Ok(LogHandle {
        filter: filter_handle,
        from_env,
        _guard: guard,
    })
}
