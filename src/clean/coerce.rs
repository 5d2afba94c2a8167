//! Column coercion with per-value fallback.
//!
//! Every column is first converted strictly, all or nothing. If any
//! value refuses, the column is converted again value by value and the
//! refusals become `Value::Null`. A bad cell never costs more than itself.

use std::fmt;

use crate::logging::{Log, Stage};
use crate::model::Value;

/// The first value that stopped a strict conversion.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercionFailure {
    pub row: usize,
    pub value: String,
    pub reason: String,
}

impl fmt::Display for CoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "row {}: '{}' {}", self.row, self.value, self.reason)
    }
}

/// A target type values can be coerced into.
pub trait CoercionTarget {
    /// Name used in log messages, e.g. "float".
    const NAME: &'static str;

    /// Converts one value. `Some(Value::Null)` for missing input, `None`
    /// when the value cannot be represented.
    fn convert_one(value: &Value) -> Option<Value>;

    /// Strict whole-column conversion.
    fn convert_all(values: &[Value]) -> Result<Vec<Value>, CoercionFailure> {
        values
            .iter()
            .enumerate()
            .map(|(row, value)| {
                Self::convert_one(value).ok_or_else(|| CoercionFailure {
                    row,
                    value: value.to_string(),
                    reason: format!("is not a valid {}", Self::NAME),
                })
            })
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Coerced {
    pub values: Vec<Value>,
    /// Values that were present but had to be replaced by null.
    pub nulled: usize,
}

/// Coerces one column to `T`, falling back to per-value conversion.
///
/// The fallback is logged as a warning naming the column and the cause;
/// it never fails.
pub fn coerce_column<T: CoercionTarget>(column: &str, values: Vec<Value>, log: &dyn Log) -> Coerced {
    match T::convert_all(&values) {
        Ok(converted) => {
            log.debug(
                Stage::Clean,
                Some(column),
                &format!("'{}' column converted to {}", column, T::NAME),
            );
            Coerced {
                values: converted,
                nulled: 0,
            }
        }
        Err(failure) => {
            log.warn(
                Stage::Clean,
                Some(column),
                &format!(
                    "Failed to convert '{}' to {} ({}); coercing invalid entries to null",
                    column,
                    T::NAME,
                    failure
                ),
            );

            let mut nulled = 0;
            let converted = values
                .into_iter()
                .map(|value| match T::convert_one(&value) {
                    Some(v) => v,
                    None => {
                        nulled += 1;
                        Value::Null
                    }
                })
                .collect();

            log.warn(
                Stage::Clean,
                Some(column),
                &format!("{} value(s) in '{}' set to null", nulled, column),
            );
            Coerced {
                values: converted,
                nulled,
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Float target
// ---------------------------------------------------------------------------

pub struct FloatTarget;

impl CoercionTarget for FloatTarget {
    const NAME: &'static str = "float";

    fn convert_one(value: &Value) -> Option<Value> {
        let number = match value {
            Value::Null => return Some(Value::Null),
            Value::Int(i) => *i as f64,
            Value::Float(f) => *f,
            Value::Text(s) => s.trim().parse::<f64>().ok()?,
            Value::Date(_) => return None,
        };
        Some(if number.is_nan() {
            Value::Null
        } else {
            Value::Float(number)
        })
    }
}
