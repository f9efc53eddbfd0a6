//! Semantic column types, per-token inference and value coercion.
//!
//! Inference is total over non-empty tokens and follows a fixed precedence:
//! number, then boolean (`true`/`false`), then date, then string. A column is
//! typed from the first non-empty sample in its data rows; a column with no
//! sample stays [`ColumnType::Unknown`].

use std::{fmt, str::FromStr};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};

use crate::data::{Value, parse_instant, parse_number, to_iso_instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[default]
    Unknown,
    Number,
    Boolean,
    Date,
    String,
}

impl ColumnType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Unknown => "unknown",
            ColumnType::Number => "number",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::String => "string",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["unknown", "number", "boolean", "date", "string"]
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ColumnType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "unknown" => Ok(ColumnType::Unknown),
            "number" | "numeric" => Ok(ColumnType::Number),
            "boolean" | "bool" => Ok(ColumnType::Boolean),
            "date" | "datetime" | "timestamp" => Ok(ColumnType::Date),
            "string" | "text" => Ok(ColumnType::String),
            _ => Err(anyhow!(
                "Unknown column type '{value}'. Supported types: {}",
                ColumnType::variants().join(", ")
            )),
        }
    }
}

pub(crate) fn is_empty_cell(raw: Option<&str>) -> bool {
    raw.is_none_or(|value| value.trim().is_empty())
}

pub fn infer_type(sample: &str) -> ColumnType {
    if sample.trim().is_empty() {
        return ColumnType::Unknown;
    }
    if parse_number(sample).is_some() {
        ColumnType::Number
    } else if matches!(sample.trim(), "true" | "false") {
        ColumnType::Boolean
    } else if parse_instant(sample).is_some() {
        ColumnType::Date
    } else {
        ColumnType::String
    }
}

/// Coerces one raw cell. Empty or absent cells are always [`Value::Null`].
///
/// Booleans only recognise the exact token `"true"`; anything else becomes
/// `false`, unlike numbers and dates which fall back to `Null`.
pub fn coerce(raw: Option<&str>, column_type: ColumnType) -> Value {
    let Some(raw) = raw.filter(|value| !value.trim().is_empty()) else {
        return Value::Null;
    };
    match column_type {
        ColumnType::Number => parse_number(raw).map(Value::Number).unwrap_or(Value::Null),
        ColumnType::Boolean => Value::Boolean(raw.trim() == "true"),
        ColumnType::Date => parse_instant(raw)
            .map(|instant| Value::String(to_iso_instant(&instant)))
            .unwrap_or(Value::Null),
        ColumnType::String | ColumnType::Unknown => Value::String(raw.to_string()),
    }
}

/// Types every header position from the first usable sample in `rows`.
pub fn infer_column_types<R: AsRef<[String]>>(column_count: usize, rows: &[R]) -> Vec<ColumnType> {
    (0..column_count)
        .map(|idx| {
            rows.iter()
                .map(|row| row.as_ref().get(idx).map(String::as_str))
                .find(|cell| !is_empty_cell(*cell))
                .flatten()
                .map(infer_type)
                .unwrap_or(ColumnType::Unknown)
        })
        .collect()
}
