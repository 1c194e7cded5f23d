//! Value parsing rules shared by the cleaner, the inferencer and the loader

use chrono::{NaiveDate, NaiveDateTime};

use crate::table::Value;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
];

pub fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<i64>().ok()
}

/// Decimal parsing; non-finite spellings ("NaN", "inf") are not numbers here
pub fn parse_float(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|f| f.is_finite())
}

pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if let Ok(dt) = chrono::DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Numeric class of a column, judged over its non-null values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericClass {
    Integer,
    Float,
    NotNumeric,
}

pub fn is_integer_like(value: &Value) -> bool {
    match value {
        Value::Integer(_) => true,
        Value::Text(s) => parse_integer(s).is_some(),
        _ => false,
    }
}

pub fn is_float_like(value: &Value) -> bool {
    match value {
        Value::Integer(_) | Value::Float(_) => true,
        Value::Text(s) => parse_float(s).is_some(),
        _ => false,
    }
}

/// Integer if every non-null value is an integer, else Float if every one is
/// a decimal number. Columns without non-null values are not numeric.
pub fn numeric_class<'a>(values: impl Iterator<Item = &'a Value> + Clone) -> NumericClass {
    let mut non_null = values.filter(|v| !v.is_null()).peekable();
    if non_null.peek().is_none() {
        return NumericClass::NotNumeric;
    }
    if non_null.clone().all(is_integer_like) {
        NumericClass::Integer
    } else if non_null.all(is_float_like) {
        NumericClass::Float
    } else {
        NumericClass::NotNumeric
    }
}

pub fn to_integer(value: &Value) -> Option<i64> {
    match value {
        Value::Integer(i) => Some(*i),
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Some(*f as i64),
        Value::Text(s) => parse_integer(s),
        _ => None,
    }
}

pub fn to_float(value: &Value) -> Option<f64> {
    match value {
        Value::Integer(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        Value::Text(s) => parse_float(s),
        _ => None,
    }
}

pub fn to_datetime(value: &Value) -> Option<NaiveDateTime> {
    match value {
        Value::DateTime(dt) => Some(*dt),
        Value::Text(s) => parse_datetime(s),
        _ => None,
    }
}

/// First `capacity` characters of `text`
pub fn truncate_chars(text: &str, capacity: usize) -> String {
    match text.char_indices().nth(capacity) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}
