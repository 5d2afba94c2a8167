//! Orchestrator: connect, load, clean, aggregate, write.
//!
//! Each stage runs once, in order. The first error aborts the run; it is
//! logged here, at error level and tagged with its stage, and handed back
//! unchanged. Nothing is retried and the destination table is only
//! touched by the final stage, so an aborted run writes nothing.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::analysis::aggregate;
use crate::clean::clean_with_summary;
use crate::config::{JobSettings, PipelineConfig};
use crate::ingest::load;
use crate::logging::{Log, Stage, log_coercion_summary, log_stage_failure};
use crate::model::{PipelineError, Table};
use crate::persist::save;
use crate::store::{Store, new_engine};

/// What a successful run did.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub rows_loaded: usize,
    pub invalid_dates: usize,
    pub coerced_values: BTreeMap<String, usize>,
    pub aggregate_rows: usize,
    pub destination: String,
}

impl RunReport {
    /// Writes the report as pretty-printed JSON.
    pub fn write_json(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RunOutput {
    /// First rows of the data as loaded, before cleaning.
    pub preview: Table,
    /// The table that was written.
    pub aggregate: Table,
    pub report: RunReport,
}

/// Runs the whole pipeline against the configured PostgreSQL store.
///
/// The session is closed on every exit path; a failure while closing
/// after a successful write is only a warning.
pub fn run(config: &PipelineConfig, log: &dyn Log) -> Result<RunOutput, PipelineError> {
    let result = connect_and_execute(config, log);
    if let Err(ref e) = result {
        log_stage_failure(log, e);
    }
    result
}

/// Runs the pipeline against an already open store.
pub fn run_with_store<S: Store + ?Sized>(
    store: &mut S,
    job: &JobSettings,
    log: &dyn Log,
) -> Result<RunOutput, PipelineError> {
    let result = execute(store, job, log);
    if let Err(ref e) = result {
        log_stage_failure(log, e);
    }
    result
}

fn connect_and_execute(config: &PipelineConfig, log: &dyn Log) -> Result<RunOutput, PipelineError> {
    config.validate()?;

    let engine = new_engine(&config.connection)?;
    log.info(
        Stage::Connect,
        None,
        &format!("Connecting with {}", engine.redacted_connection_string()),
    );

    let mut session = engine.connect()?;
    log.info(Stage::Connect, None, "Connection established");

    let output = execute(&mut session, &config.job, log)?;

    if let Err(e) = session.close() {
        log.warn(Stage::Connect, None, &format!("Failed to close connection cleanly: {}", e));
    }
    Ok(output)
}

fn execute<S: Store + ?Sized>(
    store: &mut S,
    job: &JobSettings,
    log: &dyn Log,
) -> Result<RunOutput, PipelineError> {
    let started_at = Utc::now();
    let destination = job.output_table.trim().to_string();

    // Load
    log.info(Stage::Load, None, &format!("Running query: {}", job.query));
    let raw = load(store, &job.query)?;
    log.info(
        Stage::Load,
        None,
        &format!("Loaded {} rows, {} columns", raw.num_rows(), raw.num_columns()),
    );
    let preview = raw.head(job.preview_rows);
    if job.preview_rows > 0 {
        log.info(
            Stage::Load,
            None,
            &format!("Loaded data (first {} rows):\n{}", preview.num_rows(), preview),
        );
    }

    // Clean
    let cleaned = clean_with_summary(raw, log)?;
    let summary = cleaned.summary;
    log_coercion_summary(log, summary.rows, summary.invalid_dates, summary.total_coerced());

    // Aggregate
    let monthly = aggregate(&cleaned.table)?;
    log.info(
        Stage::Aggregate,
        None,
        &format!("Computed averages for {} month(s)", monthly.num_rows()),
    );

    // Write
    save(&monthly, store, &destination)?;
    log.info(
        Stage::Write,
        Some(destination.as_str()),
        &format!("Wrote {} rows", monthly.num_rows()),
    );

    let report = RunReport {
        started_at,
        finished_at: Utc::now(),
        rows_loaded: summary.rows,
        invalid_dates: summary.invalid_dates,
        coerced_values: summary.coerced_values,
        aggregate_rows: monthly.num_rows(),
        destination,
    };
    log.info(Stage::Pipeline, None, "Run complete");

    Ok(RunOutput {
        preview,
        aggregate: monthly,
        report,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
