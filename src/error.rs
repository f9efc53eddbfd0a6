use thiserror::Error;

/// Fatal ingestion failures. Malformed quoting is never one of these.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("File is empty")]
    EmptyFile,

    #[error("File contains a header row but no data rows")]
    NoDataRows,

    #[error("Source is {size} bytes which exceeds the {limit} byte limit")]
    Oversize { size: u64, limit: u64 },

    #[error("Failed to decode input as {encoding}")]
    Decode { encoding: String },

    #[error("Unsupported source kind '{0}'")]
    UnsupportedSource(String),

    #[error("Invalid source: {0}")]
    InvalidSource(String),
}

/// Failures raised by an [`crate::engine::EngineConnection`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    #[error("Engine rejected query: {0}")]
    Rejected(String),

    #[error("Engine connection failed: {0}")]
    Connection(String),

    #[error("Engine value conversion failed: {0}")]
    Conversion(String),
}

/// Compilation failures are raised before the engine is contacted; engine
/// failures pass through untouched.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    #[error("No table reference available for {operation}")]
    MissingTableReference { operation: &'static str },

    #[error("Column '{column}' referenced by {operation} does not exist")]
    UnknownColumn {
        column: String,
        operation: &'static str,
    },

    #[error("Join column '{column}' does not exist in the joined frame")]
    UnknownJoinColumn { column: String },

    #[error("Malformed {operation} operation: {reason}")]
    MalformedOperation {
        operation: &'static str,
        reason: String,
    },

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl QueryError {
    pub(crate) fn malformed(operation: &'static str, reason: impl Into<String>) -> Self {
        QueryError::MalformedOperation {
            operation,
            reason: reason.into(),
        }
    }

    pub fn is_compile_error(&self) -> bool {
        !matches!(self, QueryError::Engine(_))
    }
}
