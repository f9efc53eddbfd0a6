//! Immutable, chainable query construction over a [`DataFrame`].
//!
//! Every chaining method returns a new [`QueryBuilder`] with one more
//! [`QueryOperation`] appended; the receiver is left untouched, so a builder
//! can be forked freely. No SQL exists until [`QueryBuilder::compile`] or
//! [`QueryBuilder::execute`] is called.

use std::{fmt, str::FromStr, sync::Arc};

use anyhow::anyhow;
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    data::{Row, Value},
    engine::{EngineConnection, QueryRows, SqlDialect},
    error::QueryError,
    filter::FilterCondition,
    frame::{Column, DataFrame},
    inference::ColumnType,
    sql::{self, CompiledQuery},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn is_ascending(self) -> bool {
        matches!(self, SortDirection::Asc)
    }

    pub(crate) fn keyword(self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub column_name: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            direction: SortDirection::Desc,
        }
    }
}

impl FromStr for SortKey {
    type Err = anyhow::Error;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        let mut parts = spec.split(':');
        let column = parts
            .next()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("Sort directive is missing a column"))?;
        let direction = match parts.next().unwrap_or("asc").trim().to_ascii_lowercase().as_str() {
            "asc" => SortDirection::Asc,
            "desc" => SortDirection::Desc,
            other => return Err(anyhow!("Unknown sort direction '{other}'")),
        };
        Ok(SortKey {
            column_name: column.to_string(),
            direction,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum JoinType {
    #[default]
    Inner,
    Left,
    Right,
    Full,
}

impl JoinType {
    pub(crate) fn keyword(self) -> &'static str {
        match self {
            JoinType::Inner => "INNER JOIN",
            JoinType::Left => "LEFT JOIN",
            JoinType::Right => "RIGHT JOIN",
            JoinType::Full => "FULL OUTER JOIN",
        }
    }
}

impl FromStr for JoinType {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "inner" => Ok(JoinType::Inner),
            "left" => Ok(JoinType::Left),
            "right" => Ok(JoinType::Right),
            "full" | "outer" => Ok(JoinType::Full),
            other => Err(anyhow!("Unknown join type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub other: Arc<DataFrame>,
    pub join_type: JoinType,
    pub left_column: String,
    pub right_column: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOperation {
    Filter(Vec<FilterCondition>),
    Sort(Vec<SortKey>),
    GroupBy(Vec<String>),
    Join(JoinSpec),
    Limit(u64),
    Offset(u64),
    Select(Vec<String>),
}

impl QueryOperation {
    pub fn name(&self) -> &'static str {
        match self {
            QueryOperation::Filter(_) => "filter",
            QueryOperation::Sort(_) => "sort",
            QueryOperation::GroupBy(_) => "groupBy",
            QueryOperation::Join(_) => "join",
            QueryOperation::Limit(_) => "limit",
            QueryOperation::Offset(_) => "offset",
            QueryOperation::Select(_) => "select",
        }
    }
}

#[derive(Clone)]
pub struct QueryBuilder {
    data_frame: Arc<DataFrame>,
    connection: Arc<dyn EngineConnection>,
    operations: Vec<QueryOperation>,
}

impl fmt::Debug for QueryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("table_ref", &self.data_frame.table_ref)
            .field("operations", &self.operations)
            .finish_non_exhaustive()
    }
}

impl QueryBuilder {
    pub fn new(data_frame: impl Into<Arc<DataFrame>>, connection: Arc<dyn EngineConnection>) -> Self {
        Self {
            data_frame: data_frame.into(),
            connection,
            operations: Vec::new(),
        }
    }

    pub fn data_frame(&self) -> &DataFrame {
        &self.data_frame
    }

    pub fn operations(&self) -> &[QueryOperation] {
        &self.operations
    }

    fn append(&self, operation: QueryOperation) -> Self {
        let mut operations = Vec::with_capacity(self.operations.len() + 1);
        operations.extend(self.operations.iter().cloned());
        operations.push(operation);
        Self {
            data_frame: Arc::clone(&self.data_frame),
            connection: Arc::clone(&self.connection),
            operations,
        }
    }

    /// Predicates are AND-combined, within this call and across calls.
    pub fn filter(&self, conditions: impl IntoIterator<Item = FilterCondition>) -> Self {
        self.append(QueryOperation::Filter(conditions.into_iter().collect()))
    }

    /// Appends ordering keys after any keys from earlier calls.
    pub fn sort(&self, keys: impl IntoIterator<Item = SortKey>) -> Self {
        self.append(QueryOperation::Sort(keys.into_iter().collect()))
    }

    pub fn order_by(&self, keys: impl IntoIterator<Item = SortKey>) -> Self {
        self.sort(keys)
    }

    pub fn group_by<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append(QueryOperation::GroupBy(
            columns.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn join(
        &self,
        other: impl Into<Arc<DataFrame>>,
        join_type: JoinType,
        left_column: impl Into<String>,
        right_column: impl Into<String>,
    ) -> Self {
        self.append(QueryOperation::Join(JoinSpec {
            other: other.into(),
            join_type,
            left_column: left_column.into(),
            right_column: right_column.into(),
        }))
    }

    pub fn limit(&self, count: u64) -> Self {
        self.append(QueryOperation::Limit(count))
    }

    pub fn offset(&self, count: u64) -> Self {
        self.append(QueryOperation::Offset(count))
    }

    /// Projects `columns` in the given order. A later call replaces it.
    pub fn select<I, S>(&self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.append(QueryOperation::Select(
            columns.into_iter().map(Into::into).collect(),
        ))
    }

    pub fn compile(&self) -> Result<CompiledQuery, QueryError> {
        self.compile_for(self.connection.dialect())
    }

    pub fn compile_for(&self, dialect: SqlDialect) -> Result<CompiledQuery, QueryError> {
        sql::compile(&self.data_frame, &self.operations, dialect)
    }

    /// Compiles, runs the statement once and wraps the rows in a new frame.
    ///
    /// Dropping the returned future abandons the wait; the engine may still
    /// finish the statement.
    pub async fn execute(&self) -> Result<DataFrame, QueryError> {
        let compiled = self.compile()?;
        debug!(
            "Executing query with {} parameter(s): {}",
            compiled.params.len(),
            compiled.sql
        );
        let result = self
            .connection
            .query(&compiled.sql, &compiled.params)
            .await?;
        let frame = self.wrap_result(result);
        info!(
            "Query returned {} row(s) across {} column(s)",
            frame.row_count(),
            frame.columns().len()
        );
        Ok(frame)
    }

    fn joined_frames(&self) -> impl Iterator<Item = &DataFrame> {
        self.operations.iter().filter_map(|op| match op {
            QueryOperation::Join(spec) => Some(spec.other.as_ref()),
            _ => None,
        })
    }

    fn resolve_output_column(&self, name: &str) -> Option<(Column, Option<Uuid>)> {
        std::iter::once(self.data_frame.as_ref())
            .chain(self.joined_frames())
            .find_map(|frame| {
                frame
                    .column(name)
                    .map(|column| (column.clone(), frame.field_id_of(name)))
            })
    }

    fn wrap_result(&self, result: QueryRows) -> DataFrame {
        let QueryRows { columns, mut rows } = result;
        let names: Vec<String> = if columns.is_empty() {
            rows.first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default()
        } else {
            // `SELECT *` across a join repeats shared names; the base side wins.
            columns.into_iter().unique().collect()
        };

        let mut output_columns = Vec::with_capacity(names.len());
        let mut field_ids = Vec::new();
        for name in &names {
            match self.resolve_output_column(name) {
                Some((column, field_id)) => {
                    if column.column_type == ColumnType::Boolean {
                        normalize_booleans(&mut rows, name);
                    }
                    output_columns.push(column);
                    field_ids.extend(field_id);
                }
                None => output_columns.push(Column::new(
                    name.clone(),
                    observed_type(&rows, name),
                )),
            }
        }

        let primary_key = self
            .data_frame
            .primary_key
            .clone()
            .filter(|key| names.contains(key));

        DataFrame {
            field_ids,
            columns: Some(output_columns),
            rows,
            primary_key,
            table_ref: None,
        }
    }
}

fn normalize_booleans(rows: &mut [Row], column: &str) {
    for row in rows {
        if let Some(value) = row.get_mut(column)
            && let Some(n) = value.as_f64()
        {
            *value = Value::Boolean(n != 0.0);
        }
    }
}

fn observed_type(rows: &[Row], column: &str) -> ColumnType {
    rows.iter()
        .filter_map(|row| row.get(column))
        .find(|value| !value.is_null())
        .map(|value| match value {
            Value::Number(_) => ColumnType::Number,
            Value::Boolean(_) => ColumnType::Boolean,
            Value::String(_) => ColumnType::String,
            Value::Null => ColumnType::Unknown,
        })
        .unwrap_or(ColumnType::Unknown)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::EngineError,
        filter::ComparisonOperator,
        frame::{ROW_INDEX_COLUMN, generate},
    };
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct CannedConnection {
        result: QueryRows,
        seen: Mutex<Vec<(String, Vec<Value>)>>,
    }

    #[async_trait]
    impl EngineConnection for CannedConnection {
        async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryRows, EngineError> {
            self.seen
                .lock()
                .map_err(|e| EngineError::Connection(e.to_string()))?
                .push((sql.to_string(), params.to_vec()));
            Ok(self.result.clone())
        }
    }

    fn people() -> DataFrame {
        let headers = ["id", "name", "vip"].map(String::from).to_vec();
        let rows = vec![
            ["1", "ada", "true"].map(String::from).to_vec(),
            ["2", "bob", "false"].map(String::from).to_vec(),
        ];
        generate(&headers, &rows, Uuid::nil()).data_frame.with_table_ref("people")
    }

    #[test]
    fn chaining_never_mutates_the_receiver() {
        let conn: Arc<dyn EngineConnection> = Arc::new(CannedConnection::default());
        let base = QueryBuilder::new(people(), conn);
        let before = base.compile().unwrap();
        let limited = base.limit(5);
        let filtered = base.filter([FilterCondition::new("id", ComparisonOperator::Gt, 1i64)]);
        assert!(base.operations().is_empty());
        assert_eq!(limited.operations().len(), 1);
        assert_eq!(filtered.operations().len(), 1);
        assert_eq!(base.compile().unwrap(), before);
    }

    #[test]
    fn sort_and_order_by_are_synonyms() {
        let conn: Arc<dyn EngineConnection> = Arc::new(CannedConnection::default());
        let base = QueryBuilder::new(people(), conn);
        assert_eq!(
            base.sort([SortKey::desc("name")]).operations(),
            base.order_by([SortKey::desc("name")]).operations()
        );
    }

    #[test]
    fn sort_key_parses_directives() {
        assert_eq!("name".parse::<SortKey>().unwrap(), SortKey::asc("name"));
        assert_eq!("name:DESC".parse::<SortKey>().unwrap(), SortKey::desc("name"));
        assert!("name:sideways".parse::<SortKey>().is_err());
        assert!(":asc".parse::<SortKey>().is_err());
    }

    #[tokio::test]
    async fn execute_wraps_rows_with_projected_shape() {
        let frame = people();
        let mut row = Row::new();
        row.insert("name".into(), Value::from("ada"));
        row.insert("vip".into(), Value::Number(1.0));
        row.insert("n".into(), Value::Number(3.0));
        let conn = Arc::new(CannedConnection {
            result: QueryRows {
                columns: vec!["name".into(), "vip".into(), "n".into()],
                rows: vec![row],
            },
            ..Default::default()
        });
        let builder = QueryBuilder::new(frame.clone(), conn.clone());
        let result = builder.select(["name", "vip"]).execute().await.unwrap();

        assert_eq!(result.column_names(), vec!["name", "vip", "n"]);
        assert_eq!(result.rows[0].get("vip"), Some(&Value::Boolean(true)));
        assert_eq!(result.column("n").unwrap().column_type, ColumnType::Number);
        assert_eq!(result.field_ids.len(), 2);
        assert_eq!(result.field_ids[0], frame.field_id_of("name").unwrap());
        assert_eq!(result.primary_key, None);
        assert!(result.table_ref.is_none());

        let seen = conn.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert!(seen[0].0.starts_with("SELECT t0.\"name\", t0.\"vip\" FROM"));
    }

    #[tokio::test]
    async fn execute_keeps_primary_key_when_projected() {
        let conn = Arc::new(CannedConnection {
            result: QueryRows {
                columns: vec![ROW_INDEX_COLUMN.into(), "id".into()],
                rows: Vec::new(),
            },
            ..Default::default()
        });
        let result = QueryBuilder::new(people(), conn).execute().await.unwrap();
        assert_eq!(result.primary_key.as_deref(), Some("id"));
        assert_eq!(result.row_count(), 0);
    }

    #[tokio::test]
    async fn compile_errors_never_reach_the_engine() {
        let conn = Arc::new(CannedConnection::default());
        let builder = QueryBuilder::new(people(), conn.clone());
        let err = builder.select(["missing"]).execute().await.unwrap_err();
        assert!(err.is_compile_error());
        assert!(conn.seen.lock().unwrap().is_empty());
    }
}
