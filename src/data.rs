use std::{fmt, str::FromStr, sync::OnceLock};

use anyhow::{Context, Result, anyhow, bail};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::contract::ColumnType;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl Eq for Value {}

impl Value {
    pub fn as_display(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Integer(i) => i.to_string(),
            Value::Decimal(d) => d.normalize().to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Date(d) => d.format("%Y-%m-%d").to_string(),
            Value::DateTime(dt) => dt.format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        }
    }

    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Value::Integer(i) => Some(Decimal::from(*i)),
            Value::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Integer(_) | Value::Decimal(_) => 1,
            Value::Date(_) => 2,
            Value::DateTime(_) => 3,
            Value::String(_) => 4,
        }
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (self, other) {
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Integer(a), Value::Decimal(b)) => Decimal::from(*a).cmp(b),
            (Value::Decimal(a), Value::Integer(b)) => a.cmp(&Decimal::from(*b)),
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (left, right) => left.rank().cmp(&right.rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_display())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComparableValue(pub Option<Value>);

impl Ord for ComparableValue {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        match (&self.0, &other.0) {
            (None, None) => std::cmp::Ordering::Equal,
            (None, Some(_)) => std::cmp::Ordering::Less,
            (Some(_), None) => std::cmp::Ordering::Greater,
            (Some(left), Some(right)) => left.cmp(right),
        }
    }
}

impl PartialOrd for ComparableValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%m/%d/%Y", "%Y%m%d", "%Y/%m/%d", "%d-%b-%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%m/%d/%Y %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_naive_date(value: &str, format: Option<&str>) -> Result<NaiveDate> {
    if let Some(fmt) = format {
        return NaiveDate::parse_from_str(value, fmt)
            .with_context(|| format!("Failed to parse '{value}' as date with format '{fmt}'"));
    }
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as date"))
}

/// Parses a timestamp and returns it in UTC. Offset-bearing inputs are
/// converted; naive inputs are taken to already be UTC.
pub fn parse_utc_datetime(value: &str, format: Option<&str>) -> Result<NaiveDateTime> {
    if let Some(fmt) = format {
        return NaiveDateTime::parse_from_str(value, fmt)
            .with_context(|| format!("Failed to parse '{value}' as datetime with format '{fmt}'"));
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Ok(parsed.naive_utc());
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(value, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("Failed to parse '{value}' as datetime"))
}

fn grouped_number() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[+-]?\d{1,3}(,\d{3})+(\.\d+)?$").expect("grouped number pattern is valid")
    })
}

/// Removes thousands separators only when they are correctly placed; anything
/// else is handed to the numeric parser untouched so it fails loudly.
fn strip_grouping(value: &str) -> String {
    if grouped_number().is_match(value) {
        value.replace(',', "")
    } else {
        value.to_string()
    }
}

pub fn parse_decimal_literal(value: &str) -> Result<Decimal> {
    let cleaned = strip_grouping(value);
    let cleaned = cleaned.strip_prefix('+').unwrap_or(&cleaned);
    if let Ok(parsed) = Decimal::from_str(cleaned) {
        return Ok(parsed);
    }
    if cleaned.contains(['e', 'E']) {
        return Decimal::from_scientific(cleaned)
            .with_context(|| format!("Failed to parse '{value}' as decimal"));
    }
    bail!("Failed to parse '{value}' as decimal")
}

pub fn parse_boolean(value: &str) -> Result<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "t" | "yes" | "y" | "1" => Ok(true),
        "false" | "f" | "no" | "n" | "0" => Ok(false),
        _ => bail!("Failed to parse '{value}' as boolean"),
    }
}

/// Converts an already trimmed, non-empty cell into a typed value. Never
/// substitutes a default: anything that does not parse is an error.
pub fn parse_typed_value(value: &str, ty: &ColumnType, format: Option<&str>) -> Result<Value> {
    let parsed = match ty {
        ColumnType::String | ColumnType::Category => Value::String(value.to_string()),
        ColumnType::Integer => {
            let cleaned = strip_grouping(value);
            let parsed: i64 = cleaned
                .strip_prefix('+')
                .unwrap_or(&cleaned)
                .parse()
                .with_context(|| format!("Failed to parse '{value}' as integer"))?;
            Value::Integer(parsed)
        }
        ColumnType::Decimal => Value::Decimal(parse_decimal_literal(value)?),
        ColumnType::Boolean => Value::Boolean(parse_boolean(value)?),
        ColumnType::Date => Value::Date(parse_naive_date(value, format)?),
        ColumnType::DateTime => Value::DateTime(parse_utc_datetime(value, format)?),
    };
    Ok(parsed)
}
