//! [`EngineConnection`] backed by an embedded SQLite database.
//!
//! The connection sits behind a mutex and every statement runs on tokio's
//! blocking pool, so requests from concurrent builders are serialised.

use std::{
    path::Path,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{
    Connection, params_from_iter,
    types::{Value as SqlValue, ValueRef},
};

use crate::{
    data::{Row, Value},
    engine::{EngineConnection, QueryRows, SqlDialect},
    error::EngineError,
    frame::{Column, DataFrame, ROW_INDEX_COLUMN},
    inference::ColumnType,
    sql::quote_identifier,
};

#[derive(Clone)]
pub struct SqliteEngine {
    connection: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteEngine").finish_non_exhaustive()
    }
}

fn rejected(err: rusqlite::Error) -> EngineError {
    EngineError::Rejected(err.to_string())
}

impl SqliteEngine {
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let connection =
            Connection::open_in_memory().map_err(|e| EngineError::Connection(e.to_string()))?;
        Self::from_connection(connection)
    }

    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let connection = Connection::open(path)
            .map_err(|e| EngineError::Connection(format!("Opening {path:?}: {e}")))?;
        Self::from_connection(connection)
    }

    /// Wraps an open connection with case-sensitive `LIKE` matching.
    pub fn from_connection(connection: Connection) -> Result<Self, EngineError> {
        connection
            .pragma_update(None, "case_sensitive_like", true)
            .map_err(|e| EngineError::Connection(e.to_string()))?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Replaces table `name` with the rows of `frame` and returns the frame
    /// pointing at it.
    pub async fn register_frame(
        &self,
        name: &str,
        frame: DataFrame,
    ) -> Result<DataFrame, EngineError> {
        let connection = Arc::clone(&self.connection);
        let table = name.to_string();
        tokio::task::spawn_blocking(move || {
            let mut guard = connection
                .lock()
                .map_err(|_| EngineError::Connection("Engine connection poisoned".into()))?;
            register_blocking(&mut guard, &table, &frame)?;
            info!("Registered {} row(s) as table '{table}'", frame.row_count());
            Ok(frame.with_table_ref(table))
        })
        .await
        .map_err(|e| EngineError::Connection(e.to_string()))?
    }
}

fn storage_type(column: &Column) -> &'static str {
    if column.name == ROW_INDEX_COLUMN {
        return "INTEGER";
    }
    match column.column_type {
        ColumnType::Number => "REAL",
        ColumnType::Boolean => "INTEGER",
        ColumnType::Date | ColumnType::String | ColumnType::Unknown => "TEXT",
    }
}

fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Number(n) => SqlValue::Real(*n),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::String(s) => SqlValue::Text(s.clone()),
    }
}

fn storage_value(column: &Column, value: &Value) -> SqlValue {
    match value {
        Value::Number(n) if column.name == ROW_INDEX_COLUMN => SqlValue::Integer(*n as i64),
        other => to_sql_value(other),
    }
}

fn register_blocking(
    connection: &mut Connection,
    table: &str,
    frame: &DataFrame,
) -> Result<(), EngineError> {
    let columns = match &frame.columns {
        Some(columns) => columns.clone(),
        None => frame
            .rows
            .first()
            .map(|row| {
                row.keys()
                    .map(|name| Column::new(name.clone(), ColumnType::Unknown))
                    .collect()
            })
            .unwrap_or_default(),
    };
    if columns.is_empty() {
        return Err(EngineError::Rejected(format!(
            "Cannot register table '{table}' without columns"
        )));
    }

    let quoted = quote_identifier(table);
    let definitions = columns
        .iter()
        .map(|c| format!("{} {}", quote_identifier(&c.name), storage_type(c)))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; columns.len()].join(", ");

    let tx = connection.transaction().map_err(rejected)?;
    tx.execute_batch(&format!(
        "DROP TABLE IF EXISTS {quoted}; CREATE TABLE {quoted} ({definitions});"
    ))
    .map_err(rejected)?;
    {
        let mut insert = tx
            .prepare(&format!("INSERT INTO {quoted} VALUES ({placeholders})"))
            .map_err(rejected)?;
        for row in &frame.rows {
            let values = columns
                .iter()
                .map(|c| storage_value(c, row.get(&c.name).unwrap_or(&Value::Null)))
                .collect::<Vec<_>>();
            insert
                .execute(params_from_iter(values.iter()))
                .map_err(rejected)?;
        }
    }
    tx.commit().map_err(rejected)
}

fn read_value(value: ValueRef<'_>) -> Result<Value, EngineError> {
    match value {
        ValueRef::Null => Ok(Value::Null),
        ValueRef::Integer(i) => Ok(Value::Number(i as f64)),
        ValueRef::Real(f) => Ok(Value::Number(f)),
        ValueRef::Text(bytes) => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
        ValueRef::Blob(bytes) => Err(EngineError::Conversion(format!(
            "Binary values are not supported ({} byte blob)",
            bytes.len()
        ))),
    }
}

fn query_blocking(
    connection: &Connection,
    sql: &str,
    params: &[SqlValue],
) -> Result<QueryRows, EngineError> {
    let mut statement = connection.prepare(sql).map_err(rejected)?;
    let columns = statement
        .column_names()
        .into_iter()
        .map(String::from)
        .collect::<Vec<_>>();
    let mut cursor = statement
        .query(params_from_iter(params.iter()))
        .map_err(rejected)?;
    let mut rows = Vec::new();
    while let Some(record) = cursor.next().map_err(rejected)? {
        let mut row = Row::new();
        for (idx, name) in columns.iter().enumerate() {
            let value = record
                .get_ref(idx)
                .map_err(|e| EngineError::Conversion(e.to_string()))?;
            let value = read_value(value)?;
            row.entry(name.clone()).or_insert(value);
        }
        rows.push(row);
    }
    Ok(QueryRows { columns, rows })
}

#[async_trait]
impl EngineConnection for SqliteEngine {
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryRows, EngineError> {
        let connection = Arc::clone(&self.connection);
        let sql = sql.to_string();
        let params = params.iter().map(to_sql_value).collect::<Vec<_>>();
        tokio::task::spawn_blocking(move || {
            let guard = connection
                .lock()
                .map_err(|_| EngineError::Connection("Engine connection poisoned".into()))?;
            let result = query_blocking(&guard, &sql, &params)?;
            debug!("SQLite returned {} row(s)", result.rows.len());
            Ok(result)
        })
        .await
        .map_err(|e| EngineError::Connection(e.to_string()))?
    }

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Sqlite
    }
}
