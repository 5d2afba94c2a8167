//! Monthly temperature averages.
//!
//! Groups cleaned rows by (year, month) and averages `temp_max` and
//! `temp_min` over the non-null values of each group. Rows without a
//! usable year or month cannot be grouped and are left out.

use std::collections::BTreeMap;

use crate::model::{
    COL_MONTH, COL_TEMP_MAX, COL_TEMP_MIN, COL_YEAR, Column, MonthlyAverage, PipelineError, Table,
    Value,
};

/// Decimal places kept in the published averages.
pub const AVERAGE_DECIMALS: i32 = 2;

#[derive(Debug, Default, Clone, Copy)]
struct Mean {
    sum: f64,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}

#[derive(Debug, Default, Clone, Copy)]
struct MonthAccumulator {
    temp_max: Mean,
    temp_min: Mean,
}

/// Aggregates a cleaned table into `year, month, avg_temp_max,
/// avg_temp_min`, ordered by (year, month).
pub fn aggregate(table: &Table) -> Result<Table, PipelineError> {
    monthly_averages(table).map(|rows| MonthlyAverage::to_table(&rows))
}

/// Typed form of `aggregate`.
pub fn monthly_averages(table: &Table) -> Result<Vec<MonthlyAverage>, PipelineError> {
    let years = required(table, COL_YEAR)?;
    let months = required(table, COL_MONTH)?;
    let temp_max = required(table, COL_TEMP_MAX)?;
    let temp_min = required(table, COL_TEMP_MIN)?;

    let mut groups: BTreeMap<(i32, u32), MonthAccumulator> = BTreeMap::new();

    for row in 0..table.num_rows() {
        let high = temperature(temp_max, row)?;
        let low = temperature(temp_min, row)?;

        let Some(key) = month_key(&years.values[row], &months.values[row]) else {
            continue;
        };

        let acc = groups.entry(key).or_default();
        acc.temp_max.push(high);
        acc.temp_min.push(low);
    }

    Ok(groups
        .into_iter()
        .map(|((year, month), acc)| MonthlyAverage {
            year,
            month,
            avg_temp_max: acc.temp_max.value().map(|v| round_half_even(v, AVERAGE_DECIMALS)),
            avg_temp_min: acc.temp_min.value().map(|v| round_half_even(v, AVERAGE_DECIMALS)),
        })
        .collect())
}

/// Rounds to `decimals` places, ties to even on the scaled value.
pub fn round_half_even(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round_ties_even() / factor
}

fn required<'a>(table: &'a Table, name: &str) -> Result<&'a Column, PipelineError> {
    table.column(name).ok_or_else(|| {
        PipelineError::Aggregation(format!("input is missing required column '{}'", name))
    })
}

/// Integral year and a month in 1..=12, or `None` if the row can't be
/// grouped.
fn month_key(year: &Value, month: &Value) -> Option<(i32, u32)> {
    let year = i32::try_from(year.as_i64()?).ok()?;
    let month = u32::try_from(month.as_i64()?).ok()?;
    (1..=12).contains(&month).then_some((year, month))
}

/// Numeric temperature, `None` when missing. Anything else means the
/// table was never cleaned.
fn temperature(column: &Column, row: usize) -> Result<Option<f64>, PipelineError> {
    let value = &column.values[row];
    if value.is_null() {
        return Ok(None);
    }
    value.as_f64().map(Some).ok_or_else(|| {
        PipelineError::Aggregation(format!(
            "column '{}' holds non-numeric {} value '{}' at row {}",
            column.name,
            value.type_name(),
            value,
            row
        ))
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
