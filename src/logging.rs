/// Structured logging for the weather pipeline
///
/// Provides stage-tagged logging with an optional subject (a column or
/// table name), timestamps, and severity levels. Supports both console
/// output and append-only file logging.
///
/// Loggers are passed in as `&dyn Log` rather than installed globally, so
/// library code can be exercised with a `MemoryLog` and no filesystem
/// side effects.

use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Mutex;

use chrono::Utc;
use serde::Deserialize;

use crate::model::PipelineError;

// ---------------------------------------------------------------------------
// Log Levels
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Debug,
    Info,
    #[serde(alias = "warn")]
    Warning,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warning => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            other => Err(format!("unknown log level '{}'", other)),
        }
    }
}

// ---------------------------------------------------------------------------
// Pipeline Stages
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Connect,
    Load,
    Clean,
    Aggregate,
    Write,
    Pipeline,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Connect => write!(f, "CONNECT"),
            Stage::Load => write!(f, "LOAD"),
            Stage::Clean => write!(f, "CLEAN"),
            Stage::Aggregate => write!(f, "AGGREGATE"),
            Stage::Write => write!(f, "WRITE"),
            Stage::Pipeline => write!(f, "PIPELINE"),
        }
    }
}

// ---------------------------------------------------------------------------
// Log Sink
// ---------------------------------------------------------------------------

/// Destination for pipeline log records.
pub trait Log {
    fn log(&self, level: LogLevel, stage: Stage, subject: Option<&str>, message: &str);

    fn debug(&self, stage: Stage, subject: Option<&str>, message: &str) {
        self.log(LogLevel::Debug, stage, subject, message);
    }

    fn info(&self, stage: Stage, subject: Option<&str>, message: &str) {
        self.log(LogLevel::Info, stage, subject, message);
    }

    fn warn(&self, stage: Stage, subject: Option<&str>, message: &str) {
        self.log(LogLevel::Warning, stage, subject, message);
    }

    fn error(&self, stage: Stage, subject: Option<&str>, message: &str) {
        self.log(LogLevel::Error, stage, subject, message);
    }
}

// ---------------------------------------------------------------------------
// Console / File Logger
// ---------------------------------------------------------------------------

pub struct Logger {
    /// Minimum log level to display
    min_level: LogLevel,
    /// Optional file path for logging
    log_file: Option<PathBuf>,
    /// Whether to include timestamps in console output
    console_timestamps: bool,
}

impl Logger {
    pub fn new(min_level: LogLevel, log_file: Option<PathBuf>, console_timestamps: bool) -> Self {
        Logger {
            min_level,
            log_file,
            console_timestamps,
        }
    }

    fn format_entry(level: LogLevel, stage: Stage, subject: Option<&str>, message: &str) -> String {
        let timestamp = Utc::now().format("%Y-%m-%d %H:%M:%S UTC");
        let subject_part = subject.map(|s| format!(" [{}]", s)).unwrap_or_default();
        format!("{} {} {}{}: {}", timestamp, level, stage, subject_part, message)
    }

    fn append_to_file(path: &PathBuf, entry: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{}", entry)?;
        Ok(())
    }
}

impl Log for Logger {
    fn log(&self, level: LogLevel, stage: Stage, subject: Option<&str>, message: &str) {
        if level < self.min_level {
            return;
        }

        let log_entry = Self::format_entry(level, stage, subject, message);
        let subject_part = subject.map(|s| format!(" [{}]", s)).unwrap_or_default();

        // Console output
        if self.console_timestamps {
            match level {
                LogLevel::Error => eprintln!("{}", log_entry),
                LogLevel::Warning => eprintln!("   {}", log_entry),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => println!("   [DEBUG] {}", message),
            }
        } else {
            match level {
                LogLevel::Error => eprintln!("   ✗ {}{}: {}", stage, subject_part, message),
                LogLevel::Warning => eprintln!("   ⚠ {}{}: {}", stage, subject_part, message),
                LogLevel::Info => println!("   {}", message),
                LogLevel::Debug => {} // Skip debug in non-timestamp mode
            }
        }

        // File output
        if let Some(ref path) = self.log_file {
            if let Err(e) = Self::append_to_file(path, &log_entry) {
                eprintln!("Failed to write to log file {}: {}", path.display(), e);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Capturing / Discarding Sinks
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: LogLevel,
    pub stage: Stage,
    pub subject: Option<String>,
    pub message: String,
}

/// Keeps every record in memory. Used by tests to assert on warnings.
#[derive(Default)]
pub struct MemoryLog {
    records: Mutex<Vec<LogRecord>>,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, level: LogLevel) -> usize {
        self.records().iter().filter(|r| r.level == level).count()
    }

    /// Records at `level` whose subject is `subject`.
    pub fn about(&self, level: LogLevel, subject: &str) -> Vec<LogRecord> {
        self.records()
            .into_iter()
            .filter(|r| r.level == level && r.subject.as_deref() == Some(subject))
            .collect()
    }
}

impl Log for MemoryLog {
    fn log(&self, level: LogLevel, stage: Stage, subject: Option<&str>, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                level,
                stage,
                subject: subject.map(String::from),
                message: message.to_string(),
            });
        }
    }
}

/// Drops everything.
pub struct NullLog;

impl Log for NullLog {
    fn log(&self, _level: LogLevel, _stage: Stage, _subject: Option<&str>, _message: &str) {}
}

// ---------------------------------------------------------------------------
// Structured Failure Logging
// ---------------------------------------------------------------------------

/// Log a stage failure at error level: one record tagged with the stage
/// that raised it, then one at `Pipeline` noting the run was aborted.
/// Pipeline-level failures get only the first record.
pub fn log_stage_failure(log: &dyn Log, err: &PipelineError) {
    let stage = err.stage();
    let message = format!("{} stage failed: {}", stage, err);
    log.error(stage, None, &message);
    if stage != Stage::Pipeline {
        log.error(Stage::Pipeline, None, "Run aborted; nothing was written");
    }
}

/// Log a summary of cell coercions for a finished run.
pub fn log_coercion_summary(log: &dyn Log, total_rows: usize, invalid_dates: usize, coerced_values: usize) {
    let message = format!(
        "Cleaning complete: {} rows, {} invalid dates, {} numeric values coerced to null",
        total_rows, invalid_dates, coerced_values
    );

    if invalid_dates == 0 && coerced_values == 0 {
        log.info(Stage::Clean, None, &message);
    } else {
        log.warn(Stage::Clean, None, &message);
    }
}
