//! Cleaner: normalizes column types and derives calendar fields.
//!
//! Each column is coerced on its own, so one malformed column never
//! blocks the others:
//! - `date` becomes date-or-null,
//! - `precipitation`, `temp_max`, `temp_min` and `wind` become float-or-null,
//! - `year` and `month` are derived from `date` (null when the date is).
//!
//! Other columns pass through untouched. Rows are never dropped here.

pub mod coerce;
pub mod dates;

use std::collections::BTreeMap;

use chrono::Datelike;
use serde::Serialize;

use crate::logging::{Log, Stage};
use crate::model::{
    COL_DATE, COL_MONTH, COL_YEAR, Column, NUMERIC_COLUMNS, PipelineError, Table, Value,
};

use coerce::{FloatTarget, coerce_column};
use dates::DateTarget;

/// What cleaning had to throw away.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CleanSummary {
    pub rows: usize,
    /// Dates present in the input that could not be parsed.
    pub invalid_dates: usize,
    /// Per numeric column, values present in the input that became null.
    pub coerced_values: BTreeMap<String, usize>,
}

impl CleanSummary {
    pub fn total_coerced(&self) -> usize {
        self.coerced_values.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cleaned {
    pub table: Table,
    pub summary: CleanSummary,
}

/// Cleans a raw table. Fails only when a required column is missing.
pub fn clean(table: Table, log: &dyn Log) -> Result<Table, PipelineError> {
    clean_with_summary(table, log).map(|cleaned| cleaned.table)
}

/// `clean`, also reporting how many cells were nulled.
pub fn clean_with_summary(mut table: Table, log: &dyn Log) -> Result<Cleaned, PipelineError> {
    check_schema(&table)?;

    let mut summary = CleanSummary {
        rows: table.num_rows(),
        ..CleanSummary::default()
    };

    log.debug(Stage::Clean, None, &format!("Initial column types: {}", describe_types(&table)));

    // Date column
    let dates = coerce_column::<DateTarget>(COL_DATE, column_values(&table, COL_DATE), log);
    summary.invalid_dates = dates.nulled;
    let (years, months): (Vec<Value>, Vec<Value>) = dates
        .values
        .iter()
        .map(|value| match value.as_date() {
            Some(d) => (Value::Int(d.year() as i64), Value::Int(d.month() as i64)),
            None => (Value::Null, Value::Null),
        })
        .unzip();
    table.push_column(Column::new(COL_DATE, dates.values))?;

    // Numeric columns
    for name in NUMERIC_COLUMNS {
        let coerced = coerce_column::<FloatTarget>(name, column_values(&table, name), log);
        summary.coerced_values.insert(name.to_string(), coerced.nulled);
        table.push_column(Column::new(name, coerced.values))?;
    }

    // Derived calendar fields
    table.push_column(Column::new(COL_YEAR, years))?;
    table.push_column(Column::new(COL_MONTH, months))?;
    log.debug(Stage::Clean, None, "Year and month columns extracted");

    log.debug(Stage::Clean, None, &format!("Column types after cleaning: {}", describe_types(&table)));

    Ok(Cleaned { table, summary })
}

fn check_schema(table: &Table) -> Result<(), PipelineError> {
    let missing: Vec<&str> = std::iter::once(COL_DATE)
        .chain(NUMERIC_COLUMNS)
        .filter(|name| !table.has_column(name))
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Schema(format!(
            "input is missing required column(s): {}",
            missing.join(", ")
        )))
    }
}

fn column_values(table: &Table, name: &str) -> Vec<Value> {
    table
        .column(name)
        .map(|c| c.values.clone())
        .unwrap_or_default()
}

/// "name: type" for every column, naming the distinct value types seen.
fn describe_types(table: &Table) -> String {
    table
        .columns()
        .iter()
        .map(|column| {
            let mut types: Vec<&str> = column
                .values
                .iter()
                .filter(|v| !v.is_null())
                .map(Value::type_name)
                .collect();
            types.sort_unstable();
            types.dedup();
            let types = if types.is_empty() {
                "null".to_string()
            } else {
                types.join("|")
            };
            format!("{}: {}", column.name, types)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{LogLevel, MemoryLog, NullLog};
    use crate::model::{COL_PRECIPITATION, COL_TEMP_MAX, COL_TEMP_MIN, COL_WIND};
    use chrono::NaiveDate;

    fn ymd(y: i32, m: u32, d: u32) -> Value {
        Value::Date(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    /// One bad date, one bad temperature, a missing precipitation reading.
    fn messy() -> Table {
        Table::from_columns(vec![
            Column::from_values(COL_DATE, ["2024-01-01", "invalid_date"]),
            Column::new(COL_TEMP_MAX, vec![Value::Int(10), Value::from("invalid")]),
            Column::from_values(COL_TEMP_MIN, [5, 7]),
            Column::new(COL_PRECIPITATION, vec![Value::Null, Value::Float(0.2)]),
            Column::new(COL_WIND, vec![Value::from("10.5"), Value::Null]),
        ])
        .unwrap()
    }

    fn column<'a>(table: &'a Table, name: &str) -> &'a [Value] {
        &table.column(name).unwrap_or_else(|| panic!("missing column {}", name)).values
    }

    // --- Column types -------------------------------------------------------

    #[test]
    fn test_clean_converts_types_and_derives_calendar_fields() {
        let cleaned = clean(messy(), &NullLog).expect("cleaning should not fail");

        assert_eq!(column(&cleaned, COL_DATE), &[ymd(2024, 1, 1), Value::Null]);
        assert_eq!(column(&cleaned, COL_TEMP_MAX), &[Value::Float(10.0), Value::Null]);
        assert_eq!(column(&cleaned, COL_TEMP_MIN), &[Value::Float(5.0), Value::Float(7.0)]);
        assert_eq!(column(&cleaned, COL_PRECIPITATION), &[Value::Null, Value::Float(0.2)]);
        assert_eq!(column(&cleaned, COL_WIND), &[Value::Float(10.5), Value::Null]);
        assert_eq!(column(&cleaned, COL_YEAR), &[Value::Int(2024), Value::Null]);
        assert_eq!(column(&cleaned, COL_MONTH), &[Value::Int(1), Value::Null]);
    }

    #[test]
    fn test_cleaned_schema_is_exactly_the_expected_columns() {
        let cleaned = clean(messy(), &NullLog).unwrap();
        let mut names = cleaned.column_names();
        names.sort_unstable();
        assert_eq!(
            names,
            vec!["date", "month", "precipitation", "temp_max", "temp_min", "wind", "year"]
        );
        assert_eq!(cleaned.num_rows(), 2, "rows are never dropped by cleaning");
    }

    #[test]
    fn test_extra_columns_pass_through() {
        let table = messy()
            .with_column(Column::from_values("station", ["SEA", "SEA"]))
            .unwrap();
        let cleaned = clean(table, &NullLog).unwrap();
        assert_eq!(column(&cleaned, "station"), &[Value::from("SEA"), Value::from("SEA")]);
    }

    // --- Partial failure ----------------------------------------------------

    #[test]
    fn test_invalid_date_only_nulls_that_row() {
        let table = Table::from_columns(vec![
            Column::from_values(COL_DATE, ["2024-03-01", "not a date", "2024-03-15"]),
            Column::from_values(COL_TEMP_MAX, [1.0, 2.0, 3.0]),
            Column::from_values(COL_TEMP_MIN, [0.0, 0.0, 0.0]),
            Column::from_values(COL_PRECIPITATION, [0.0, 0.0, 0.0]),
            Column::from_values(COL_WIND, [1.0, 1.0, 1.0]),
        ])
        .unwrap();

        let log = MemoryLog::new();
        let cleaned = clean_with_summary(table, &log).expect("bad dates never raise");
        assert_eq!(
            column(&cleaned.table, COL_DATE),
            &[ymd(2024, 3, 1), Value::Null, ymd(2024, 3, 15)]
        );
        assert_eq!(cleaned.summary.invalid_dates, 1);
        assert!(!log.about(LogLevel::Warning, COL_DATE).is_empty());
    }

    #[test]
    fn test_mixed_but_valid_date_formats_all_survive() {
        let table = Table::from_columns(vec![
            Column::from_values(COL_DATE, ["2024-03-01", "03/02/2024"]),
            Column::from_values(COL_TEMP_MAX, [1.0, 2.0]),
            Column::from_values(COL_TEMP_MIN, [0.0, 0.0]),
            Column::from_values(COL_PRECIPITATION, [0.0, 0.0]),
            Column::from_values(COL_WIND, [1.0, 1.0]),
        ])
        .unwrap();

        let cleaned = clean_with_summary(table, &NullLog).unwrap();
        assert_eq!(column(&cleaned.table, COL_DATE), &[ymd(2024, 3, 1), ymd(2024, 3, 2)]);
        assert_eq!(cleaned.summary.invalid_dates, 0);
    }

    #[test]
    fn test_summary_counts_coerced_cells_per_column() {
        let cleaned = clean_with_summary(messy(), &NullLog).unwrap();
        assert_eq!(cleaned.summary.coerced_values.get(COL_TEMP_MAX), Some(&1));
        assert_eq!(cleaned.summary.coerced_values.get(COL_WIND), Some(&0));
        assert_eq!(cleaned.summary.total_coerced(), 1);
        assert_eq!(cleaned.summary.rows, 2);
    }

    #[test]
    fn test_warnings_name_only_the_broken_columns() {
        let log = MemoryLog::new();
        clean(messy(), &log).unwrap();

        let warned: Vec<String> = log
            .records()
            .into_iter()
            .filter(|r| r.level == LogLevel::Warning)
            .filter_map(|r| r.subject)
            .collect();
        assert!(warned.iter().any(|s| s == COL_DATE));
        assert!(warned.iter().any(|s| s == COL_TEMP_MAX));
        assert!(!warned.iter().any(|s| s == COL_TEMP_MIN || s == COL_WIND));
    }

    // --- Schema errors ------------------------------------------------------

    #[test]
    fn test_missing_required_columns_is_schema_error() {
        let table = Table::from_columns(vec![
            Column::from_values(COL_DATE, ["2024-01-01"]),
            Column::from_values(COL_TEMP_MAX, [10.0]),
            Column::from_values(COL_TEMP_MIN, [5.0]),
        ])
        .unwrap();

        match clean(table, &NullLog) {
            Err(PipelineError::Schema(msg)) => {
                assert!(msg.contains(COL_PRECIPITATION) && msg.contains(COL_WIND), "{}", msg);
            }
            other => panic!("expected schema error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_table_with_full_schema_cleans() {
        let table = Table::from_columns(
            std::iter::once(COL_DATE)
                .chain(NUMERIC_COLUMNS)
                .map(|name| Column::new(name, Vec::new()))
                .collect(),
        )
        .unwrap();
        let cleaned = clean(table, &NullLog).unwrap();
        assert_eq!(cleaned.num_rows(), 0);
        assert!(cleaned.has_column(COL_YEAR) && cleaned.has_column(COL_MONTH));
    }
}
