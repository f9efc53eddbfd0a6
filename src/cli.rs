use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::query::JoinType;

#[derive(Debug, Parser)]
#[command(author, version, about = "Ingest delimited files into typed frames and query them with SQL", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Ingest a file and report the inferred fields, optionally writing them to a metadata file
    Probe(ProbeArgs),
    /// Ingest a file into the embedded engine and run a chained query against it
    Query(QueryArgs),
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Input CSV file
    #[arg(short = 'i', long = "input")]
    pub input: PathBuf,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Reject inputs larger than this many bytes (0 disables the check)
    #[arg(long = "max-bytes")]
    pub max_bytes: Option<u64>,
}

#[derive(Debug, Args)]
pub struct ProbeArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Write fields and source schema to this .yml/.yaml or .json file
    #[arg(short, long)]
    pub meta: Option<PathBuf>,
    /// Print the probe report as JSON instead of a table
    #[arg(long)]
    pub json: bool,
}

#[derive(Debug, Args)]
pub struct QueryArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Engine table name for the input (defaults to the file stem)
    #[arg(long)]
    pub table: Option<String>,
    /// Row-level filters such as `amount>=100` or `status = shipped`
    #[arg(long = "filter", action = clap::ArgAction::Append)]
    pub filters: Vec<String>,
    /// Sort directives of the form `column[:asc|desc]`
    #[arg(long = "sort", action = clap::ArgAction::Append)]
    pub sort: Vec<String>,
    /// Comma-separated list of columns to project
    #[arg(short = 'C', long = "columns", value_delimiter = ',')]
    pub columns: Vec<String>,
    /// Comma-separated grouping key
    #[arg(long = "group-by", value_delimiter = ',')]
    pub group_by: Vec<String>,
    /// Maximum number of rows returned
    #[arg(long)]
    pub limit: Option<u64>,
    /// Number of rows skipped after ordering
    #[arg(long)]
    pub offset: Option<u64>,
    /// Join another CSV file: `FILE:left=right[:inner|left|right|full]`
    #[arg(long = "join", action = clap::ArgAction::Append, value_parser = parse_join)]
    pub joins: Vec<JoinArg>,
    /// Print the compiled SQL and its parameters before the results
    #[arg(long = "show-sql")]
    pub show_sql: bool,
    /// Print the result frame as JSON instead of a table
    #[arg(long)]
    pub json: bool,
    /// Write the result as CSV to this file (`.tsv` switches to tabs)
    #[arg(short, long, conflicts_with = "json")]
    pub output: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinArg {
    pub path: PathBuf,
    pub left_column: String,
    pub right_column: String,
    pub join_type: JoinType,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

/// Splits from the right so paths may themselves contain `:`.
pub fn parse_join(value: &str) -> Result<JoinArg, String> {
    let malformed = || format!("Join '{value}' must look like FILE:left=right[:kind]");
    let (rest, last) = value.rsplit_once(':').ok_or_else(malformed)?;
    let (path, keys, kind) = if last.contains('=') {
        (rest, last, None)
    } else {
        let (path, keys) = rest.rsplit_once(':').ok_or_else(malformed)?;
        (path, keys, Some(last))
    };
    let (left, right) = keys.split_once('=').ok_or_else(malformed)?;
    let (left, right) = (left.trim(), right.trim());
    if path.is_empty() || left.is_empty() || right.is_empty() {
        return Err(malformed());
    }
    let join_type = match kind {
        Some(kind) => kind.parse::<JoinType>().map_err(|e| e.to_string())?,
        None => JoinType::Inner,
    };
    Ok(JoinArg {
        path: PathBuf::from(path),
        left_column: left.to_string(),
        right_column: right.to_string(),
        join_type,
    })
}
