use async_trait::async_trait;

use crate::{
    data::{Row, Value},
    error::EngineError,
};

/// SQL flavour quirks the compiler has to respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    /// `OFFSET` may appear without `LIMIT`.
    #[default]
    Ansi,
    /// `OFFSET` requires a `LIMIT`; `LIMIT -1` means unbounded.
    Sqlite,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct QueryRows {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

/// An embedded SQL engine. Implementations decide how requests are
/// serialised or pipelined; callers treat the connection as opaque.
#[async_trait]
pub trait EngineConnection: Send + Sync {
    /// Runs `sql` with positional `?` parameters bound from `params`.
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryRows, EngineError>;

    fn dialect(&self) -> SqlDialect {
        SqlDialect::Ansi
    }
}
