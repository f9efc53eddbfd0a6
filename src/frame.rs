//! The typed tabular model shared by ingestion and querying.
//!
//! [`generate`] turns a header row plus raw data rows into a [`DataFrame`],
//! one [`Field`] per output column and a [`SourceSchema`] snapshot. Every
//! generated frame leads with the `_rowIndex` system column.

use std::{collections::HashSet, sync::OnceLock};

use chrono::Utc;
use log::{debug, info, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    csv_parser::row_has_content,
    data::{Row, Value},
    inference::{ColumnType, coerce, infer_column_types},
};

pub const ROW_INDEX_COLUMN: &str = "_rowIndex";
pub const INITIAL_SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
        }
    }

    pub fn is_system(&self) -> bool {
        self.name == ROW_INDEX_COLUMN
    }
}

pub type TableColumn = Column;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct DataFrame {
    pub field_ids: Vec<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<Column>>,
    pub rows: Vec<Row>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<String>,
    /// Engine table holding these rows, when the frame has been registered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_ref: Option<String>,
}

impl DataFrame {
    pub fn columns(&self) -> &[Column] {
        self.columns.as_deref().unwrap_or_default()
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns().iter().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns().iter().map(|c| c.name.clone()).collect()
    }

    /// Id of the field backing `name`, when `field_ids` is aligned with the columns.
    pub fn field_id_of(&self, name: &str) -> Option<Uuid> {
        let position = self.columns().iter().position(|c| c.name == name)?;
        self.field_ids.get(position).copied()
    }

    /// Whether `name` is addressable. Frames without declared columns fall
    /// back to the keys of their first row.
    pub fn resolves_column(&self, name: &str) -> bool {
        match &self.columns {
            Some(columns) => columns.iter().any(|c| c.name == name),
            None => self.rows.first().is_some_and(|row| row.contains_key(name)),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn with_table_ref(mut self, table: impl Into<String>) -> Self {
        self.table_ref = Some(table.into());
        self
    }

    pub fn column_values(&self, column: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|row| row.get(column).cloned().unwrap_or_default())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Field {
    pub id: Uuid,
    pub name: String,
    pub table_id: Uuid,
    /// `None` marks a computed field such as `_rowIndex`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
}

impl Field {
    pub fn is_computed(&self) -> bool {
        self.column_name.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceSchema {
    pub columns: Vec<TableColumn>,
    pub version: u32,
    /// Epoch milliseconds.
    pub last_synced_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvResult {
    pub data_frame: DataFrame,
    pub fields: Vec<Field>,
    pub source_schema: SourceSchema,
}

fn primary_key_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)^_?id$").expect("static primary key pattern"))
}

/// First header named `id` or `_id`, ignoring case and surrounding space.
pub fn detect_primary_key(headers: &[String]) -> Option<&str> {
    headers
        .iter()
        .map(|h| h.as_str())
        .find(|header| primary_key_pattern().is_match(header.trim()))
}

/// Column names for `headers`, made unique against each other and the system
/// column. Later duplicates get `_2`, `_3`, ... suffixes; comparison ignores
/// ASCII case.
pub fn unique_column_names(headers: &[String]) -> Vec<String> {
    let mut taken = HashSet::from([ROW_INDEX_COLUMN.to_ascii_lowercase()]);
    headers
        .iter()
        .map(|header| {
            let mut candidate = header.clone();
            let mut suffix = 2;
            while !taken.insert(candidate.to_ascii_lowercase()) {
                candidate = format!("{header}_{suffix}");
                suffix += 1;
            }
            if candidate != *header {
                warn!("Header '{header}' collides with another column; renamed to '{candidate}'");
            }
            candidate
        })
        .collect()
}

pub fn generate<R: AsRef<[String]>>(
    headers: &[String],
    data_rows: &[R],
    table_id: Uuid,
) -> CsvResult {
    let rows = data_rows
        .iter()
        .map(|row| row.as_ref())
        .filter(|row| row_has_content(row))
        .collect::<Vec<_>>();
    let types = infer_column_types(headers.len(), &rows);
    let names = unique_column_names(headers);

    let primary_key = detect_primary_key(&names)
        .unwrap_or(ROW_INDEX_COLUMN)
        .to_string();

    let user_columns = names
        .iter()
        .zip(types.iter())
        .map(|(name, ty)| Column::new(name.clone(), *ty))
        .collect::<Vec<_>>();
    let mut columns = Vec::with_capacity(user_columns.len() + 1);
    columns.push(Column::new(ROW_INDEX_COLUMN, ColumnType::Number));
    columns.extend(user_columns.iter().cloned());

    let materialized = rows
        .iter()
        .enumerate()
        .map(|(ordinal, raw)| {
            let mut row = Row::new();
            row.insert(ROW_INDEX_COLUMN.to_string(), Value::Number(ordinal as f64));
            for (idx, column) in user_columns.iter().enumerate() {
                let cell = raw.get(idx).map(String::as_str);
                row.insert(column.name.clone(), coerce(cell, column.column_type));
            }
            row
        })
        .collect::<Vec<_>>();

    let source_names = std::iter::once(None).chain(headers.iter().map(Some));
    let fields = columns
        .iter()
        .zip(source_names)
        .map(|(column, source)| Field {
            id: Uuid::new_v4(),
            name: column.name.clone(),
            table_id,
            column_name: source.cloned(),
            column_type: column.column_type,
        })
        .collect::<Vec<_>>();

    debug!(
        "Column types: {}",
        columns
            .iter()
            .map(|c| format!("{}={}", c.name, c.column_type))
            .collect::<Vec<_>>()
            .join(", ")
    );
    info!(
        "Generated frame with {} row(s), {} column(s), primary key '{}'",
        materialized.len(),
        columns.len(),
        primary_key
    );

    let data_frame = DataFrame {
        field_ids: fields.iter().map(|f| f.id).collect(),
        columns: Some(columns),
        rows: materialized,
        primary_key: Some(primary_key),
        table_ref: None,
    };
    let source_schema = SourceSchema {
        columns: headers
            .iter()
            .zip(types.iter())
            .map(|(name, ty)| Column::new(name.clone(), *ty))
            .collect(),
        version: INITIAL_SCHEMA_VERSION,
        last_synced_at: Utc::now().timestamp_millis(),
    };

    CsvResult {
        data_frame,
        fields,
        source_schema,
    }
}
