/// Core data types for the weather aggregation pipeline.
///
/// This module defines the shared table model imported by every stage:
/// a column-oriented `Table` of loosely typed `Value`s, the typed
/// `MonthlyAverage` row produced by aggregation, the well-known column
/// names, and the pipeline error taxonomy. It performs no I/O.

use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;
use thiserror::Error;

use crate::logging::Stage;

// ---------------------------------------------------------------------------
// Column names
// ---------------------------------------------------------------------------

pub const COL_DATE: &str = "date";
pub const COL_TEMP_MAX: &str = "temp_max";
pub const COL_TEMP_MIN: &str = "temp_min";
pub const COL_PRECIPITATION: &str = "precipitation";
pub const COL_WIND: &str = "wind";

/// Calendar fields derived from `date` by the cleaner.
pub const COL_YEAR: &str = "year";
pub const COL_MONTH: &str = "month";

pub const COL_AVG_TEMP_MAX: &str = "avg_temp_max";
pub const COL_AVG_TEMP_MIN: &str = "avg_temp_min";

/// Columns coerced to floating point, in the order they are cleaned.
pub const NUMERIC_COLUMNS: [&str; 4] = [COL_PRECIPITATION, COL_TEMP_MAX, COL_TEMP_MIN, COL_WIND];

// ---------------------------------------------------------------------------
// Values
// ---------------------------------------------------------------------------

/// A single cell. Raw tables hold whatever the store returned; cleaned
/// tables hold only `Float`, `Int`, `Date` and `Null`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
}

impl Value {
    /// `Null` and NaN floats are both missing values.
    pub fn is_null(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Float(f) => f.is_nan(),
            _ => false,
        }
    }

    /// Numeric view of the value. Text is not parsed here.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) if !f.is_nan() => Some(*f),
            _ => None,
        }
    }

    /// Integer view: ints, and floats with no fractional part.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Date(_) => "date",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) if x.is_nan() => write!(f, "null"),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => write!(f, "{}", s),
            Value::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<NaiveDate> for Value {
    fn from(v: NaiveDate) -> Self {
        Value::Date(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

// ---------------------------------------------------------------------------
// Columns
// ---------------------------------------------------------------------------

/// Storage type a column maps to when persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Date,
    Text,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Builds a column from anything convertible into `Value`.
    pub fn from_values<T, I>(name: impl Into<String>, values: I) -> Self
    where
        T: Into<Value>,
        I: IntoIterator<Item = T>,
    {
        Self::new(name, values.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn null_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_null()).count()
    }

    /// Narrowest storage kind that holds every non-null value.
    /// Ints mixed with floats widen to `Float`; any other mix, or a
    /// column with no values at all, is `Text`.
    pub fn kind(&self) -> ColumnKind {
        let mut kind: Option<ColumnKind> = None;
        for value in self.values.iter().filter(|v| !v.is_null()) {
            let this = match value {
                Value::Int(_) => ColumnKind::Integer,
                Value::Float(_) => ColumnKind::Float,
                Value::Date(_) => ColumnKind::Date,
                Value::Text(_) | Value::Null => ColumnKind::Text,
            };
            kind = Some(match (kind, this) {
                (None, k) => k,
                (Some(a), b) if a == b => a,
                (Some(ColumnKind::Integer), ColumnKind::Float)
                | (Some(ColumnKind::Float), ColumnKind::Integer) => ColumnKind::Float,
                _ => return ColumnKind::Text,
            });
        }
        kind.unwrap_or(ColumnKind::Text)
    }
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// An ordered, column-oriented table. All columns have the same length
/// and names are unique.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<Column>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_columns(columns: Vec<Column>) -> Result<Self, PipelineError> {
        let mut table = Table::new();
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    /// Builder form of `push_column`.
    pub fn with_column(mut self, column: Column) -> Result<Self, PipelineError> {
        self.push_column(column)?;
        Ok(self)
    }

    /// Appends a column, or replaces the existing column of the same
    /// name in place. The length must match the table's row count.
    pub fn push_column(&mut self, column: Column) -> Result<(), PipelineError> {
        if !self.columns.is_empty() && column.len() != self.num_rows() {
            return Err(PipelineError::Schema(format!(
                "column '{}' has {} rows, table has {}",
                column.name,
                column.len(),
                self.num_rows()
            )));
        }
        match self.columns.iter_mut().find(|c| c.name == column.name) {
            Some(existing) => *existing = column,
            None => self.columns.push(column),
        }
        Ok(())
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(Column::len).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.num_rows() == 0
    }

    /// Values of row `index` in column order.
    pub fn row(&self, index: usize) -> Option<Vec<&Value>> {
        if index >= self.num_rows() {
            return None;
        }
        Some(self.columns.iter().map(|c| &c.values[index]).collect())
    }

    /// First `n` rows.
    pub fn head(&self, n: usize) -> Table {
        Table {
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), c.values.iter().take(n).cloned().collect()))
                .collect(),
        }
    }

    /// Projection in the requested order. Returns the first unknown
    /// column name on failure.
    pub fn select(&self, names: &[&str]) -> Result<Table, String> {
        let mut columns = Vec::with_capacity(names.len());
        for name in names {
            let column = self.column(name).ok_or_else(|| name.to_string())?;
            columns.push(column.clone());
        }
        Ok(Table { columns })
    }
}

/// Fixed-width preview with a leading row index.
impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.columns.is_empty() {
            return write!(f, "Empty table");
        }

        let rows = self.num_rows();
        let index_width = rows.saturating_sub(1).to_string().len();
        let cells: Vec<Vec<String>> = self
            .columns
            .iter()
            .map(|c| c.values.iter().map(ToString::to_string).collect())
            .collect();
        let widths: Vec<usize> = self
            .columns
            .iter()
            .zip(&cells)
            .map(|(c, vals)| vals.iter().map(String::len).chain([c.name.len()]).max().unwrap_or(0))
            .collect();

        write!(f, "{:>w$}", "", w = index_width)?;
        for (column, width) in self.columns.iter().zip(&widths) {
            write!(f, "  {:>w$}", column.name, w = *width)?;
        }
        for row in 0..rows {
            writeln!(f)?;
            write!(f, "{:>w$}", row, w = index_width)?;
            for (vals, width) in cells.iter().zip(&widths) {
                write!(f, "  {:>w$}", vals[row], w = *width)?;
            }
        }
        if rows == 0 {
            write!(f, "\n(0 rows)")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Aggregate rows
// ---------------------------------------------------------------------------

/// Mean daily extremes for one calendar month.
///
/// A mean is `None` when the month had no usable reading for that field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyAverage {
    pub year: i32,
    pub month: u32,
    pub avg_temp_max: Option<f64>,
    pub avg_temp_min: Option<f64>,
}

impl MonthlyAverage {
    /// Lays the rows out as `year, month, avg_temp_max, avg_temp_min`.
    pub fn to_table(rows: &[MonthlyAverage]) -> Table {
        Table {
            columns: vec![
                Column::from_values(COL_YEAR, rows.iter().map(|r| r.year)),
                Column::from_values(COL_MONTH, rows.iter().map(|r| r.month as i64)),
                Column::from_values(COL_AVG_TEMP_MAX, rows.iter().map(|r| r.avg_temp_max)),
                Column::from_values(COL_AVG_TEMP_MIN, rows.iter().map(|r| r.avg_temp_min)),
            ],
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Everything that can abort a pipeline run.
///
/// Cell-level coercion problems never show up here; the cleaner turns
/// them into nulls.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The connection parameters cannot form a usable connection string.
    #[error("Connection configuration error: {0}")]
    ConnectionConfig(String),
    /// The store is unreachable or rejected authentication.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The store rejected the read query.
    #[error("Query error: {0}")]
    Query(String),
    /// A column required for cleaning is missing, or a table is ragged.
    #[error("Schema error: {0}")]
    Schema(String),
    /// A column required for aggregation is missing or not numeric.
    #[error("Aggregation error: {0}")]
    Aggregation(String),
    /// The store rejected the write.
    #[error("Write error: {0}")]
    Write(String),
    /// The configuration file is unreadable, malformed, or invalid.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// The stage that raised this error.
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::ConnectionConfig(_) | PipelineError::Connection(_) => Stage::Connect,
            PipelineError::Query(_) => Stage::Load,
            PipelineError::Schema(_) => Stage::Clean,
            PipelineError::Aggregation(_) => Stage::Aggregate,
            PipelineError::Write(_) => Stage::Write,
            PipelineError::Config(_) => Stage::Pipeline,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::from_columns(vec![
            Column::from_values(COL_DATE, ["2024-01-01", "2024-01-02", "2024-01-03"]),
            Column::from_values(COL_TEMP_MAX, [10.0, 12.5, 9.0]),
        ])
        .expect("equal-length columns")
    }

    #[test]
    fn test_nan_float_counts_as_null() {
        assert!(Value::Float(f64::NAN).is_null());
        assert!(Value::Null.is_null());
        assert!(!Value::Float(0.0).is_null());
        assert_eq!(Value::Float(f64::NAN).as_f64(), None);
    }

    #[test]
    fn test_as_i64_accepts_integral_floats_only() {
        assert_eq!(Value::Float(2024.0).as_i64(), Some(2024));
        assert_eq!(Value::Float(2024.5).as_i64(), None);
        assert_eq!(Value::Int(7).as_i64(), Some(7));
        assert_eq!(Value::from("7").as_i64(), None, "text is never parsed by accessors");
    }

    #[test]
    fn test_push_column_rejects_length_mismatch() {
        let mut table = sample();
        let err = table
            .push_column(Column::from_values("wind", [1.0]))
            .expect_err("ragged column should be rejected");
        assert!(matches!(err, PipelineError::Schema(_)));
    }

    #[test]
    fn test_push_column_replaces_same_name_in_place() {
        let mut table = sample();
        table
            .push_column(Column::from_values(COL_DATE, [1, 2, 3]))
            .expect("same length");
        assert_eq!(table.column_names(), vec![COL_DATE, COL_TEMP_MAX]);
        assert_eq!(table.column(COL_DATE).unwrap().values[0], Value::Int(1));
    }

    #[test]
    fn test_head_and_row() {
        let table = sample();
        let head = table.head(2);
        assert_eq!(head.num_rows(), 2);
        assert_eq!(head.num_columns(), 2);
        assert_eq!(table.head(10).num_rows(), 3);

        let row = table.row(1).expect("row 1 exists");
        assert_eq!(row, vec![&Value::from("2024-01-02"), &Value::Float(12.5)]);
        assert!(table.row(3).is_none());
    }

    #[test]
    fn test_select_reports_unknown_column() {
        let table = sample();
        assert_eq!(table.select(&["wind"]).unwrap_err(), "wind");
        let projected = table.select(&[COL_TEMP_MAX]).expect("known column");
        assert_eq!(projected.column_names(), vec![COL_TEMP_MAX]);
    }

    #[test]
    fn test_column_kind_inference() {
        assert_eq!(Column::from_values("a", [1, 2]).kind(), ColumnKind::Integer);
        assert_eq!(
            Column::new("b", vec![Value::Int(1), Value::Float(2.5), Value::Null]).kind(),
            ColumnKind::Float
        );
        assert_eq!(Column::new("c", vec![Value::Null, Value::Null]).kind(), ColumnKind::Text);
        assert_eq!(
            Column::new("d", vec![Value::Int(1), Value::from("x")]).kind(),
            ColumnKind::Text
        );
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        assert_eq!(Column::from_values("e", [day]).kind(), ColumnKind::Date);
    }

    #[test]
    fn test_display_preview_contains_headers_and_values() {
        let text = sample().to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4, "header plus three rows:\n{}", text);
        assert!(lines[0].contains("date") && lines[0].contains("temp_max"));
        assert!(lines[2].starts_with('1') && lines[2].contains("12.5"));
    }

    #[test]
    fn test_monthly_average_table_layout() {
        let table = MonthlyAverage::to_table(&[MonthlyAverage {
            year: 2024,
            month: 1,
            avg_temp_max: Some(12.5),
            avg_temp_min: None,
        }]);
        assert_eq!(
            table.column_names(),
            vec![COL_YEAR, COL_MONTH, COL_AVG_TEMP_MAX, COL_AVG_TEMP_MIN]
        );
        assert_eq!(table.row(0).unwrap()[3], &Value::Null);
    }

    #[test]
    fn test_error_stage_mapping() {
        assert_eq!(PipelineError::Query("x".into()).stage(), Stage::Load);
        assert_eq!(PipelineError::ConnectionConfig("x".into()).stage(), Stage::Connect);
        assert_eq!(PipelineError::Write("x".into()).stage(), Stage::Write);
    }
}
