use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use serde::Serialize;

use crate::convert::{ConversionEvent, EventOutcome};
use crate::error::ConvertError;

// Process-wide sink; stderr is used until one is installed.
static SINK: OnceLock<Box<dyn LogSink>> = OnceLock::new();

/// ログの重要度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// A single log line with its timestamp.
#[derive(Debug, Clone, Serialize)]
pub struct LogRecord {
    pub level: LogLevel,
    pub message: String,
    pub timestamp: jiff::Timestamp,
    /// Structured payload for conversion events.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event: Option<ConversionEvent>,
}

/// Destination for log records.
pub trait LogSink: Send + Sync {
    fn write(&self, record: &LogRecord);
}

/// Appends `[YYYY-mm-dd HH:MM:SS] LEVEL: message` lines to a text file.
#[derive(Debug, Clone)]
pub struct FileLogSink {
    path: PathBuf,
}

impl FileLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Log file under the system temp directory, creating the directory if needed.
    pub fn in_temp_dir() -> std::io::Result<Self> {
        let dir = std::env::temp_dir().join("pose_converter_logs");
        fs::create_dir_all(&dir)?;
        Ok(Self::new(dir.join("pose_converter_log.txt")))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LogSink for FileLogSink {
    fn write(&self, record: &LogRecord) {
        let local = record.timestamp.to_zoned(jiff::tz::TimeZone::system());
        let line = format!(
            "{} {}: {}\n",
            local.strftime("[%Y-%m-%d %H:%M:%S]"),
            record.level.as_str().to_uppercase(),
            record.message
        );
        let result = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut file| file.write_all(line.as_bytes()));
        if let Err(e) = result {
            eprintln!("Failed to write log file {}: {}", self.path.display(), e);
        }
    }
}

/// Writes each record as one JSON object per line on stderr.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStderrSink;

impl LogSink for JsonStderrSink {
    fn write(&self, record: &LogRecord) {
        match serde_json::to_string(record) {
            Ok(json) => eprintln!("{}", json),
            Err(e) => eprintln!("Failed to serialize log record: {}", e),
        }
    }
}

/// Install the process-wide sink. Only the first call has an effect.
pub fn init_logging(sink: Box<dyn LogSink>) {
    if SINK.set(sink).is_err() {
        eprintln!("Warning: Logging system already initialized");
    }
}

fn timestamp() -> jiff::Timestamp {
    jiff::Timestamp::now()
}

fn dispatch(record: LogRecord) {
    if let Some(sink) = SINK.get() {
        sink.write(&record);
    } else {
        eprintln!("[{}] {}", record.level.as_str().to_uppercase(), record.message);
    }
}

/// Send a log message to the installed sink.
pub fn send_log(level: LogLevel, message: &str) {
    dispatch(LogRecord {
        level,
        message: message.to_string(),
        timestamp: timestamp(),
        event: None,
    });
}

/// Forward a conversion event to the installed sink.
pub fn send_event(event: &ConversionEvent) {
    let level = match event.outcome {
        EventOutcome::Started | EventOutcome::Succeeded => LogLevel::Info,
        EventOutcome::Warning => LogLevel::Warn,
        EventOutcome::Failed => LogLevel::Error,
    };
    let message = match &event.target {
        Some(target) => format!("[{}] {}: {}", event.phase, target, event.message),
        None => format!("[{}] {}", event.phase, event.message),
    };
    dispatch(LogRecord {
        level,
        message,
        timestamp: timestamp(),
        event: Some(event.clone()),
    });
}

/// Log ConvertError with automatic error-level logging
pub fn log_convert_error(error: &ConvertError, context: Option<&str>) {
    let message = match context {
        Some(ctx) => format!("{}: {}", ctx, error),
        None => error.to_string(),
    };

    send_log(LogLevel::Error, &message);
}

/// Convenience macros for logging
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Debug, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Info, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Warn, &format!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::logging::send_log($crate::logging::LogLevel::Error, &format!($($arg)*))
    };
}

/// Result extension for convenient error logging
pub trait ResultExt<T, E> {
    fn log_error(self, context: Option<&str>) -> Self;
}

impl<T> ResultExt<T, ConvertError> for Result<T, ConvertError> {
    fn log_error(self, context: Option<&str>) -> Self {
        if let Err(ref error) = self {
            log_convert_error(error, context);
        }
        self
    }
}
