//! Compilation of an operation list into a single parameterised statement.
//!
//! Clause slots are fixed regardless of the order operations were appended:
//!
//! ```text
//! SELECT <select | *> FROM <base> AS t0
//!   [<kind> JOIN <other> AS tN ON t0.<left> = tN.<right>]...
//!   [WHERE <filter> AND ...] [GROUP BY ...] [ORDER BY ...] [LIMIT n] [OFFSET m]
//! ```
//!
//! `select`, `groupBy`, `limit` and `offset` keep the last call; filters and
//! sort keys accumulate in call order; joins keep call order. Literal values
//! only ever travel as `?` parameters.

use std::fmt::Write as _;

use itertools::Itertools;
use log::debug;

use crate::{
    data::Value,
    engine::SqlDialect,
    error::QueryError,
    filter::{ComparisonOperator, FilterCondition},
    frame::{DataFrame, ROW_INDEX_COLUMN},
    query::{JoinSpec, QueryOperation, SortKey},
};

pub const BASE_ALIAS: &str = "t0";

#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Default)]
struct Clauses<'a> {
    projection: Option<&'a [String]>,
    predicates: Vec<&'a FilterCondition>,
    joins: Vec<&'a JoinSpec>,
    group_by: Option<&'a [String]>,
    order_by: Vec<&'a SortKey>,
    limit: Option<u64>,
    offset: Option<u64>,
}

pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(alias: &str, column: &str) -> String {
    format!("{alias}.{}", quote_identifier(column))
}

pub fn compile(
    frame: &DataFrame,
    operations: &[QueryOperation],
    dialect: SqlDialect,
) -> Result<CompiledQuery, QueryError> {
    let base = frame
        .table_ref
        .as_deref()
        .ok_or(QueryError::MissingTableReference { operation: "from" })?;
    let clauses = collect(frame, operations)?;

    let mut sql = String::from("SELECT ");
    let mut params = Vec::new();

    match clauses.projection {
        Some(columns) => sql.push_str(
            &columns
                .iter()
                .map(|column| qualified(BASE_ALIAS, column))
                .join(", "),
        ),
        None => sql.push('*'),
    }
    let _ = write!(sql, " FROM {} AS {BASE_ALIAS}", quote_identifier(base));

    for (idx, join) in clauses.joins.iter().enumerate() {
        let other = join
            .other
            .table_ref
            .as_deref()
            .ok_or(QueryError::MissingTableReference { operation: "join" })?;
        let alias = format!("t{}", idx + 1);
        let _ = write!(
            sql,
            " {} {} AS {alias} ON {} = {}",
            join.join_type.keyword(),
            quote_identifier(other),
            qualified(BASE_ALIAS, &join.left_column),
            qualified(&alias, &join.right_column)
        );
    }

    if !clauses.predicates.is_empty() {
        let rendered = clauses
            .predicates
            .iter()
            .map(|condition| render_predicate(condition, &mut params))
            .collect::<Vec<_>>();
        let _ = write!(sql, " WHERE {}", rendered.join(" AND "));
    }

    if let Some(columns) = clauses.group_by {
        let _ = write!(
            sql,
            " GROUP BY {}",
            columns
                .iter()
                .map(|column| qualified(BASE_ALIAS, column))
                .join(", ")
        );
    }

    if !clauses.order_by.is_empty() {
        let mut keys = clauses
            .order_by
            .iter()
            .map(|key| {
                format!(
                    "{} {}",
                    qualified(BASE_ALIAS, &key.column_name),
                    key.direction.keyword()
                )
            })
            .collect::<Vec<_>>();
        if needs_row_index_tiebreak(frame, &clauses) {
            keys.push(format!("{} ASC", qualified(BASE_ALIAS, ROW_INDEX_COLUMN)));
        }
        let _ = write!(sql, " ORDER BY {}", keys.join(", "));
    }

    match (clauses.limit, clauses.offset, dialect) {
        (Some(limit), _, _) => {
            let _ = write!(sql, " LIMIT {limit}");
        }
        (None, Some(_), SqlDialect::Sqlite) => sql.push_str(" LIMIT -1"),
        _ => {}
    }
    if let Some(offset) = clauses.offset {
        let _ = write!(sql, " OFFSET {offset}");
    }

    debug!("Compiled {} operation(s) into: {sql}", operations.len());
    Ok(CompiledQuery { sql, params })
}

/// Ties on the sort keys fall back to ingestion order, except in grouped
/// queries.
fn needs_row_index_tiebreak(frame: &DataFrame, clauses: &Clauses<'_>) -> bool {
    clauses.group_by.is_none()
        && frame.resolves_column(ROW_INDEX_COLUMN)
        && clauses
            .order_by
            .iter()
            .all(|key| key.column_name != ROW_INDEX_COLUMN)
}

fn collect<'a>(
    frame: &DataFrame,
    operations: &'a [QueryOperation],
) -> Result<Clauses<'a>, QueryError> {
    let mut clauses = Clauses::default();
    for operation in operations {
        let name = operation.name();
        match operation {
            QueryOperation::Filter(conditions) => {
                require_non_empty(conditions, name, "at least one predicate is required")?;
                for condition in conditions {
                    check_column(frame, &condition.column_name, name)?;
                    check_condition(condition)?;
                    clauses.predicates.push(condition);
                }
            }
            QueryOperation::Sort(keys) => {
                require_non_empty(keys, name, "at least one sort key is required")?;
                for key in keys {
                    check_column(frame, &key.column_name, name)?;
                    clauses.order_by.push(key);
                }
            }
            QueryOperation::GroupBy(columns) => {
                require_non_empty(columns, name, "at least one grouping column is required")?;
                check_columns(frame, columns, name)?;
                clauses.group_by = Some(columns.as_slice());
            }
            QueryOperation::Select(columns) => {
                require_non_empty(columns, name, "at least one column is required")?;
                check_columns(frame, columns, name)?;
                clauses.projection = Some(columns.as_slice());
            }
            QueryOperation::Join(join) => {
                check_join(frame, join)?;
                clauses.joins.push(join);
            }
            QueryOperation::Limit(count) => clauses.limit = Some(*count),
            QueryOperation::Offset(count) => clauses.offset = Some(*count),
        }
    }
    Ok(clauses)
}

fn require_non_empty<T>(items: &[T], operation: &'static str, reason: &str) -> Result<(), QueryError> {
    if items.is_empty() {
        Err(QueryError::malformed(operation, reason))
    } else {
        Ok(())
    }
}

fn check_column(frame: &DataFrame, column: &str, operation: &'static str) -> Result<(), QueryError> {
    if column.trim().is_empty() {
        return Err(QueryError::malformed(operation, "column name cannot be empty"));
    }
    if !frame.resolves_column(column) {
        return Err(QueryError::UnknownColumn {
            column: column.to_string(),
            operation,
        });
    }
    Ok(())
}

fn check_columns(
    frame: &DataFrame,
    columns: &[String],
    operation: &'static str,
) -> Result<(), QueryError> {
    columns
        .iter()
        .try_for_each(|column| check_column(frame, column, operation))
}

fn check_condition(condition: &FilterCondition) -> Result<(), QueryError> {
    let null_allowed = matches!(
        condition.operator,
        ComparisonOperator::Eq | ComparisonOperator::NotEq
    );
    if condition.value.is_null() && !null_allowed {
        return Err(QueryError::malformed(
            "filter",
            format!(
                "operator '{}' on '{}' cannot compare against null",
                condition.operator, condition.column_name
            ),
        ));
    }
    Ok(())
}

fn check_join(frame: &DataFrame, join: &JoinSpec) -> Result<(), QueryError> {
    if join.other.table_ref.is_none() {
        return Err(QueryError::MissingTableReference { operation: "join" });
    }
    check_column(frame, &join.left_column, "join")?;
    if join.right_column.trim().is_empty() {
        return Err(QueryError::malformed("join", "right column name cannot be empty"));
    }
    let other_is_described = join.other.columns.is_some() || !join.other.rows.is_empty();
    if other_is_described && !join.other.resolves_column(&join.right_column) {
        return Err(QueryError::UnknownJoinColumn {
            column: join.right_column.clone(),
        });
    }
    Ok(())
}

fn render_predicate(condition: &FilterCondition, params: &mut Vec<Value>) -> String {
    use ComparisonOperator::*;

    let column = qualified(BASE_ALIAS, &condition.column_name);
    match (&condition.value, condition.operator) {
        (Value::Null, NotEq) => format!("{column} IS NOT NULL"),
        (Value::Null, _) => format!("{column} IS NULL"),
        (value, op) if op.is_text_match() => {
            params.push(Value::String(like_pattern(op, &value.as_display())));
            format!("{column} LIKE ? ESCAPE '\\'")
        }
        (value, op) => {
            params.push(value.clone());
            let symbol = match op {
                NotEq => "<>",
                other => other.symbol(),
            };
            format!("{column} {symbol} ?")
        }
    }
}

fn like_pattern(operator: ComparisonOperator, needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    for ch in needle.chars() {
        if matches!(ch, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    match operator {
        ComparisonOperator::StartsWith => format!("{escaped}%"),
        ComparisonOperator::EndsWith => format!("%{escaped}"),
        _ => format!("%{escaped}%"),
    }
}
