use std::{fmt, str::FromStr};

use anyhow::{Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    frame::DataFrame,
    inference::{ColumnType, coerce},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    #[serde(rename = "=")]
    Eq,
    #[serde(rename = "!=")]
    NotEq,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startswith")]
    StartsWith,
    #[serde(rename = "endswith")]
    EndsWith,
}

impl ComparisonOperator {
    pub fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::Eq => "=",
            ComparisonOperator::NotEq => "!=",
            ComparisonOperator::Gt => ">",
            ComparisonOperator::Ge => ">=",
            ComparisonOperator::Lt => "<",
            ComparisonOperator::Le => "<=",
            ComparisonOperator::Contains => "contains",
            ComparisonOperator::StartsWith => "startswith",
            ComparisonOperator::EndsWith => "endswith",
        }
    }

    pub fn is_text_match(&self) -> bool {
        matches!(
            self,
            ComparisonOperator::Contains
                | ComparisonOperator::StartsWith
                | ComparisonOperator::EndsWith
        )
    }
}

impl fmt::Display for ComparisonOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for ComparisonOperator {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(ComparisonOperator::Eq),
            "!=" | "<>" => Ok(ComparisonOperator::NotEq),
            ">" => Ok(ComparisonOperator::Gt),
            ">=" => Ok(ComparisonOperator::Ge),
            "<" => Ok(ComparisonOperator::Lt),
            "<=" => Ok(ComparisonOperator::Le),
            "contains" => Ok(ComparisonOperator::Contains),
            "startswith" | "starts_with" => Ok(ComparisonOperator::StartsWith),
            "endswith" | "ends_with" => Ok(ComparisonOperator::EndsWith),
            other => Err(anyhow!("Unknown comparison operator '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterCondition {
    pub column_name: String,
    pub operator: ComparisonOperator,
    pub value: Value,
}

impl FilterCondition {
    pub fn new(
        column_name: impl Into<String>,
        operator: ComparisonOperator,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            operator,
            value: value.into(),
        }
    }
}

/// A filter as typed on the command line, before column types are known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterExpression {
    pub column: String,
    pub operator: ComparisonOperator,
    pub raw_value: String,
}

impl FilterExpression {
    /// Types the literal against `frame`. `null` is the null literal; text
    /// operators and unknown columns keep the literal as a string.
    pub fn resolve(&self, frame: &DataFrame) -> FilterCondition {
        let value = if self.raw_value.eq_ignore_ascii_case("null") {
            Value::Null
        } else if self.operator.is_text_match() {
            Value::String(self.raw_value.clone())
        } else {
            let column_type = frame
                .column(&self.column)
                .map(|c| c.column_type)
                .unwrap_or(ColumnType::String);
            match coerce(Some(&self.raw_value), column_type) {
                Value::Null => Value::String(self.raw_value.clone()),
                typed => typed,
            }
        };
        FilterCondition {
            column_name: self.column.clone(),
            operator: self.operator,
            value,
        }
    }
}

pub fn parse_filters(filters: &[String]) -> Result<Vec<FilterExpression>> {
    filters.iter().map(|f| parse_filter(f)).collect()
}

pub fn parse_filter(filter: &str) -> Result<FilterExpression> {
    let trimmed = filter.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Empty filter expression"));
    }

    let lowered = trimmed.to_ascii_lowercase();
    for (needle, op) in [
        (" contains ", ComparisonOperator::Contains),
        (" startswith ", ComparisonOperator::StartsWith),
        (" endswith ", ComparisonOperator::EndsWith),
    ] {
        if let Some(idx) = lowered.find(needle) {
            let (left, right_with_space) = trimmed.split_at(idx);
            let right = right_with_space[needle.len()..].trim();
            return build(left, op, right);
        }
    }

    for needle in ["!=", ">=", "<=", "=", ">", "<"] {
        if let Some(idx) = trimmed.find(needle) {
            let op = needle.parse::<ComparisonOperator>()?;
            let left = &trimmed[..idx];
            let right = &trimmed[idx + needle.len()..];
            return build(left, op, right);
        }
    }

    Err(anyhow!("Failed to parse filter expression '{trimmed}'"))
}

fn build(column: &str, operator: ComparisonOperator, value: &str) -> Result<FilterExpression> {
    let column = column.trim();
    if column.is_empty() {
        return Err(anyhow!("Filter expression is missing a column name"));
    }
    Ok(FilterExpression {
        column: column.to_string(),
        operator,
        raw_value: unquote(value.trim()).to_string(),
    })
}

fn unquote(value: &str) -> &str {
    if value.len() >= 2 {
        let bytes = value.as_bytes();
        if (bytes[0] == b'"' && bytes[value.len() - 1] == b'"')
            || (bytes[0] == b'\'' && bytes[value.len() - 1] == b'\'')
        {
            return &value[1..value.len() - 1];
        }
    }
    value
}
