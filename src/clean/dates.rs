//! Permissive calendar-date parsing.
//!
//! Strict pass: find one format that parses every text value in the
//! column. Fallback: try every format on each value on its own.

use chrono::{DateTime, NaiveDate, NaiveDateTime};

use crate::clean::coerce::{CoercionFailure, CoercionTarget};
use crate::model::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// Plain calendar date, e.g. `%Y-%m-%d`.
    Date(&'static str),
    /// Date and time; the time part is dropped.
    DateTime(&'static str),
    /// Date and time with a UTC offset, e.g. PostgreSQL `timestamptz`
    /// text (`2024-01-01 00:00:00+00`). The date is taken in that offset.
    Zoned(&'static str),
    /// RFC 3339 timestamp with offset.
    Rfc3339,
}

/// Accepted formats, most common first.
pub const DATE_FORMATS: &[DateFormat] = &[
    DateFormat::Date("%Y-%m-%d"),
    DateFormat::Date("%Y/%m/%d"),
    DateFormat::Date("%m/%d/%Y"),
    DateFormat::Date("%d.%m.%Y"),
    DateFormat::Rfc3339,
    DateFormat::DateTime("%Y-%m-%d %H:%M:%S"),
    DateFormat::DateTime("%Y-%m-%dT%H:%M:%S"),
    DateFormat::DateTime("%Y-%m-%d %H:%M:%S%.f"),
    DateFormat::DateTime("%Y-%m-%dT%H:%M:%S%.f"),
    DateFormat::Zoned("%Y-%m-%d %H:%M:%S%#z"),
    DateFormat::Zoned("%Y-%m-%dT%H:%M:%S%#z"),
    DateFormat::Zoned("%Y-%m-%d %H:%M:%S%.f%#z"),
    DateFormat::Zoned("%Y-%m-%dT%H:%M:%S%.f%#z"),
];

impl DateFormat {
    pub fn parse(&self, text: &str) -> Option<NaiveDate> {
        let text = text.trim();
        match self {
            DateFormat::Date(fmt) => NaiveDate::parse_from_str(text, fmt).ok(),
            DateFormat::DateTime(fmt) => NaiveDateTime::parse_from_str(text, fmt)
                .ok()
                .map(|dt| dt.date()),
            DateFormat::Zoned(fmt) => DateTime::parse_from_str(text, fmt)
                .ok()
                .map(|dt| dt.date_naive()),
            DateFormat::Rfc3339 => DateTime::parse_from_rfc3339(text)
                .ok()
                .map(|dt| dt.date_naive()),
        }
    }
}

/// Parses `text` with the first accepted format that fits.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    DATE_FORMATS.iter().find_map(|format| format.parse(text))
}

/// The first format that parses every text value, if one exists.
/// Columns without any text values trivially match the first format.
pub fn detect_format(values: &[Value]) -> Option<DateFormat> {
    DATE_FORMATS.iter().copied().find(|format| {
        values.iter().all(|value| match value {
            Value::Text(text) => format.parse(text).is_some(),
            _ => true,
        })
    })
}

pub struct DateTarget;

impl CoercionTarget for DateTarget {
    const NAME: &'static str = "date";

    fn convert_one(value: &Value) -> Option<Value> {
        match value {
            v if v.is_null() => Some(Value::Null),
            Value::Date(d) => Some(Value::Date(*d)),
            Value::Text(text) => parse_date(text).map(Value::Date),
            _ => None,
        }
    }

    fn convert_all(values: &[Value]) -> Result<Vec<Value>, CoercionFailure> {
        let Some(format) = detect_format(values) else {
            let (row, value) = first_unparseable(values);
            return Err(CoercionFailure {
                row,
                value,
                reason: "does not share a single date format with the rest of the column"
                    .to_string(),
            });
        };

        values
            .iter()
            .enumerate()
            .map(|(row, value)| match value {
                v if v.is_null() => Ok(Value::Null),
                Value::Date(d) => Ok(Value::Date(*d)),
                Value::Text(text) => format.parse(text).map(Value::Date).ok_or_else(|| {
                    CoercionFailure {
                        row,
                        value: text.clone(),
                        reason: "is not a valid date".to_string(),
                    }
                }),
                other => Err(CoercionFailure {
                    row,
                    value: other.to_string(),
                    reason: format!("is a {}, not a date", other.type_name()),
                }),
            })
            .collect()
    }
}

/// Best guess at the value that broke format detection: the first one no
/// format can parse, else the first text value.
fn first_unparseable(values: &[Value]) -> (usize, String) {
    let candidate = values
        .iter()
        .enumerate()
        .find(|(_, v)| matches!(v, Value::Text(t) if parse_date(t).is_none()))
        .or_else(|| values.iter().enumerate().find(|(_, v)| matches!(v, Value::Text(_))));
    match candidate {
        Some((row, value)) => (row, value.to_string()),
        None => (0, String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_date_accepts_common_layouts() {
        assert_eq!(parse_date("2024-01-02"), Some(ymd(2024, 1, 2)));
        assert_eq!(parse_date(" 2024/01/02 "), Some(ymd(2024, 1, 2)));
        assert_eq!(parse_date("01/02/2024"), Some(ymd(2024, 1, 2)));
        assert_eq!(parse_date("02.01.2024"), Some(ymd(2024, 1, 2)));
        assert_eq!(parse_date("2024-01-02 13:45:00"), Some(ymd(2024, 1, 2)));
        assert_eq!(parse_date("2024-01-02T23:30:00+02:00"), Some(ymd(2024, 1, 2)));
    }

    #[test]
    fn test_parse_date_accepts_postgres_timestamptz_text() {
        assert_eq!(parse_date("2024-01-01 00:00:00+00"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_date("2024-01-01 13:45:00.5+01"), Some(ymd(2024, 1, 1)));
        assert_eq!(parse_date("2024-03-31 23:59:59.123456-07"), Some(ymd(2024, 3, 31)));
        assert_eq!(parse_date("2024-06-15 08:00:00+05:30"), Some(ymd(2024, 6, 15)));
    }

    #[test]
    fn test_timestamptz_column_converts_without_fallback() {
        let values = vec![
            Value::from("2024-01-01 00:00:00+00"),
            Value::Null,
            Value::from("2024-01-02 06:30:00.25+00"),
        ];
        let converted = DateTarget::convert_all(&values).expect("uniform timestamptz column");
        assert_eq!(
            converted,
            vec![
                Value::Date(ymd(2024, 1, 1)),
                Value::Null,
                Value::Date(ymd(2024, 1, 2)),
            ]
        );
    }

    #[test]
    fn test_parse_date_rejects_garbage_and_impossible_dates() {
        assert_eq!(parse_date("invalid_date"), None);
        assert_eq!(parse_date("2024-02-30"), None);
        assert_eq!(parse_date(""), None);
    }

    #[test]
    fn test_detect_format_requires_uniform_column() {
        let uniform = vec![Value::from("2024-01-01"), Value::Null, Value::from("2024-01-31")];
        assert_eq!(detect_format(&uniform), Some(DateFormat::Date("%Y-%m-%d")));

        let mixed = vec![Value::from("2024-01-01"), Value::from("01/31/2024")];
        assert_eq!(detect_format(&mixed), None);
    }

    #[test]
    fn test_strict_pass_reports_offending_value() {
        let values = vec![Value::from("2024-01-01"), Value::from("invalid_date")];
        let failure = DateTarget::convert_all(&values).unwrap_err();
        assert_eq!(failure.row, 1);
        assert_eq!(failure.value, "invalid_date");
    }

    #[test]
    fn test_numeric_value_is_not_a_date() {
        assert_eq!(DateTarget::convert_one(&Value::Int(20240101)), None);
        assert!(DateTarget::convert_all(&[Value::Int(20240101)]).is_err());
    }
}
