use std::fmt;

use chrono::{DateTime, NaiveDateTime, TimeZone, Timelike};

/// Canonical text form of timestamps handed to the database, e.g. `2024-03-01 09:30:00.1250000`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A bound parameter value.
///
/// Timestamps never appear here: they are rendered to text when bound, see [`format_timestamp`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Numeric view used by comparisons: integers, floats and numeric text.
    pub(crate) fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Text(s) => s.parse::<f64>().ok(),
            Value::Null | Value::Bool(_) => None,
        }
    }

    pub(crate) fn to_f32(&self) -> Option<f32> {
        match self {
            Value::Int(i) => Some(*i as f32),
            Value::Float(f) => Some(*f as f32),
            Value::Text(s) => s.parse::<f32>().ok(),
            Value::Null | Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

/// Formats a timestamp with seven fractional digits.
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    // leap seconds report nanos >= 1e9
    let ticks = (ts.nanosecond() % 1_000_000_000) / 100;
    format!("{}.{:07}", ts.format(TIMESTAMP_FORMAT), ticks)
}

pub(crate) fn format_zoned_timestamp<Tz: TimeZone>(ts: &DateTime<Tz>) -> String {
    format_timestamp(&ts.naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_format_timestamp() {
        let ts = NaiveDate::from_ymd_opt(2024, 3, 1)
            .unwrap()
            .and_hms_nano_opt(9, 30, 5, 125_000_000)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "2024-03-01 09:30:05.1250000");

        let ts = NaiveDate::from_ymd_opt(1999, 12, 31)
            .unwrap()
            .and_hms_opt(23, 59, 59)
            .unwrap();
        assert_eq!(format_timestamp(&ts), "1999-12-31 23:59:59.0000000");
    }

    #[test]
    fn test_numeric_views() {
        assert_eq!(Value::Text("3.5".into()).to_f64(), Some(3.5));
        assert_eq!(Value::Int(7).to_f32(), Some(7.0));
        assert_eq!(Value::Text("abc".into()).to_f64(), None);
        assert_eq!(Value::Bool(true).to_f64(), None);
        assert_eq!(Value::Null.to_f32(), None);
    }

    #[test]
    fn test_as_text() {
        assert_eq!(Value::from("abc").as_text(), Some("abc"));
        assert_eq!(Value::Int(1).as_text(), None);
        assert!(Value::from(None::<i64>).is_null());
    }
}
