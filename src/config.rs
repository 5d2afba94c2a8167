//! Run configuration.
//!
//! Read from a TOML file with three sections, `[connection]`, `[job]` and
//! `[logging]`. Every field has a default, so an empty or missing file
//! describes the stock run: `SELECT * FROM SeattleWeather` into
//! `MonthlyAvgTemperature` over a trusted local connection.
//!
//! ```toml
//! [connection]
//! server = "db.internal"
//! database = "Weather"
//!
//! [job]
//! output_table = "MonthlyAvgTemperature"
//!
//! [logging]
//! level = "debug"
//! file = "weather_pipeline.log"
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::logging::{LogLevel, Logger};
use crate::model::PipelineError;
use crate::store::ConnectionSettings;

pub const DEFAULT_CONFIG_PATH: &str = "weather_pipeline.toml";
pub const DEFAULT_QUERY: &str = "SELECT * FROM SeattleWeather";
pub const DEFAULT_OUTPUT_TABLE: &str = "MonthlyAvgTemperature";
pub const DEFAULT_PREVIEW_ROWS: usize = 5;

/// Environment variables that override `[connection]` fields.
pub const ENV_DB_SERVER: &str = "WEATHER_DB_SERVER";
pub const ENV_DB_NAME: &str = "WEATHER_DB_NAME";
pub const ENV_DB_USER: &str = "WEATHER_DB_USER";
pub const ENV_DB_PASSWORD: &str = "WEATHER_DB_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub connection: ConnectionSettings,
    pub job: JobSettings,
    pub logging: LoggingSettings,
}

/// What to read and where to put the result.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct JobSettings {
    pub query: String,
    pub output_table: String,
    /// Rows of the loaded data logged at info level right after loading,
    /// before cleaning starts. Zero disables the preview.
    pub preview_rows: usize,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            query: DEFAULT_QUERY.to_string(),
            output_table: DEFAULT_OUTPUT_TABLE.to_string(),
            preview_rows: DEFAULT_PREVIEW_ROWS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    pub level: LogLevel,
    /// Append-only log file, in addition to the console.
    pub file: Option<PathBuf>,
    /// Timestamped console lines instead of the compact form.
    pub timestamps: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            file: None,
            timestamps: false,
        }
    }
}

impl LoggingSettings {
    pub fn build_logger(&self) -> Logger {
        Logger::new(self.level, self.file.clone(), self.timestamps)
    }
}

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, PipelineError> {
        toml::from_str(text).map_err(|e| PipelineError::Config(format!("invalid TOML: {}", e)))
    }

    /// Replaces connection fields with any of the `WEATHER_DB_*` values
    /// `lookup` returns. Blank values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(server) = get(ENV_DB_SERVER) {
            self.connection.server = server;
        }
        if let Some(database) = get(ENV_DB_NAME) {
            self.connection.database = database;
        }
        if let Some(user) = get(ENV_DB_USER) {
            self.connection.user = Some(user);
        }
        if let Some(password) = get(ENV_DB_PASSWORD) {
            self.connection.password = Some(password);
        }
    }

    /// Checks the job settings. Connection settings are checked when the
    /// engine is built.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.job.query.trim().is_empty() {
            return Err(PipelineError::Config("job.query must not be empty".into()));
        }
        if self.job.output_table.trim().is_empty() {
            return Err(PipelineError::Config(
                "job.output_table must not be empty".into(),
            ));
        }
        Ok(())
    }
}

/// Loads the configuration at `path`, applies environment overrides and
/// validates the result. A missing file yields the defaults.
pub fn load_config(path: &Path) -> Result<PipelineConfig, PipelineError> {
    let mut config = match fs::read_to_string(path) {
        Ok(text) => PipelineConfig::from_toml_str(&text).map_err(|e| match e {
            PipelineError::Config(msg) => {
                PipelineError::Config(format!("{}: {}", path.display(), msg))
            }
            other => other,
        })?,
        Err(e) if e.kind() == ErrorKind::NotFound => PipelineConfig::default(),
        Err(e) => {
            return Err(PipelineError::Config(format!(
                "cannot read {}: {}",
                path.display(),
                e
            )));
        }
    };

    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
