pub mod cli;
pub mod connector;
pub mod csv_parser;
pub mod data;
pub mod engine;
pub mod error;
pub mod filter;
pub mod frame;
pub mod inference;
pub mod ingest;
pub mod query;
pub mod sql;
pub mod sqlite;
pub mod table;

use std::{
    collections::HashSet,
    env, fs, io,
    path::Path,
    sync::{Arc, OnceLock},
};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info};
use serde::Serialize;
use uuid::Uuid;

use crate::{
    cli::{Cli, Commands, ProbeArgs, QueryArgs, SourceArgs},
    data::normalize_table_name,
    frame::{CsvResult, DataFrame, Field, SourceSchema},
    ingest::IngestOptions,
    query::{QueryBuilder, SortKey},
    sqlite::SqliteEngine,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("tabular_query", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Probe(args) => handle_probe(&args),
        Commands::Query(args) => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Starting async runtime")?;
            runtime.block_on(handle_query(&args))
        }
    }
}

/// Metadata written by `probe --meta` and printed by `probe --json`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport<'a> {
    table_id: Uuid,
    row_count: usize,
    primary_key: Option<&'a str>,
    fields: &'a [Field],
    source_schema: &'a SourceSchema,
}

impl<'a> ProbeReport<'a> {
    fn new(table_id: Uuid, result: &'a CsvResult) -> Self {
        Self {
            table_id,
            row_count: result.data_frame.row_count(),
            primary_key: result.data_frame.primary_key.as_deref(),
            fields: &result.fields,
            source_schema: &result.source_schema,
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let body = if is_json {
            serde_json::to_string_pretty(self)?
        } else {
            serde_yaml::to_string(self)?
        };
        fs::write(path, body).with_context(|| format!("Writing metadata to {path:?}"))
    }
}

fn ingest_options(args: &SourceArgs) -> Result<IngestOptions> {
    let encoding = ingest::resolve_encoding(args.input_encoding.as_deref())?;
    let delimiter = ingest::resolve_input_delimiter(&args.input, args.delimiter);
    let mut options = IngestOptions::default()
        .with_delimiter(delimiter)
        .with_encoding(encoding);
    if let Some(limit) = args.max_bytes {
        options = options.with_max_bytes((limit > 0).then_some(limit));
    }
    Ok(options)
}

fn handle_probe(args: &ProbeArgs) -> Result<()> {
    let options = ingest_options(&args.source)?;
    info!(
        "Probing '{}' with delimiter '{}'",
        args.source.input.display(),
        printable_delimiter(options.delimiter)
    );
    let table_id = Uuid::new_v4();
    let result = ingest::ingest_path(&args.source.input, table_id, &options)?;
    let report = ProbeReport::new(table_id, &result);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!(
            "{}",
            table::render_fields(&result.fields, report.primary_key)
        );
        println!(
            "{} row(s), primary key {}",
            report.row_count,
            report.primary_key.unwrap_or("-")
        );
    }

    if let Some(meta) = &args.meta {
        report.save(meta)?;
        info!("Metadata for {} field(s) written to {meta:?}", result.fields.len());
    }
    Ok(())
}

fn table_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    normalize_table_name(stem)
}

fn unique_table_name(base: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = base.clone();
    let mut suffix = 2;
    while taken.contains(&candidate) {
        candidate = format!("{base}_{suffix}");
        suffix += 1;
    }
    taken.insert(candidate.clone());
    candidate
}

async fn register(
    engine: &SqliteEngine,
    path: &Path,
    name: String,
    options: &IngestOptions,
) -> Result<DataFrame> {
    let result = ingest::ingest_path(path, Uuid::new_v4(), options)?;
    engine
        .register_frame(&name, result.data_frame)
        .await
        .with_context(|| format!("Registering {path:?} as table '{name}'"))
}

async fn handle_query(args: &QueryArgs) -> Result<()> {
    let options = ingest_options(&args.source)?;
    let engine = SqliteEngine::open_in_memory()?;
    let mut taken = HashSet::new();

    let base_name = match &args.table {
        Some(name) => name.clone(),
        None => table_name_for(&args.source.input),
    };
    let base_name = unique_table_name(base_name, &mut taken);
    let base = register(&engine, &args.source.input, base_name, &options).await?;

    let mut builder = QueryBuilder::new(base, Arc::new(engine.clone()));
    for join in &args.joins {
        let join_options = IngestOptions {
            delimiter: ingest::resolve_input_delimiter(&join.path, args.source.delimiter),
            ..options
        };
        let name = unique_table_name(table_name_for(&join.path), &mut taken);
        let other = register(&engine, &join.path, name, &join_options).await?;
        builder = builder.join(
            other,
            join.join_type,
            join.left_column.clone(),
            join.right_column.clone(),
        );
    }

    if !args.filters.is_empty() {
        let expressions = filter::parse_filters(&args.filters)?;
        let conditions = expressions
            .iter()
            .map(|expr| expr.resolve(builder.data_frame()))
            .collect::<Vec<_>>();
        debug!("Filters: {conditions:?}");
        builder = builder.filter(conditions);
    }
    if !args.sort.is_empty() {
        let keys = args
            .sort
            .iter()
            .map(|s| s.parse::<SortKey>())
            .collect::<Result<Vec<_>>>()?;
        builder = builder.sort(keys);
    }
    let group_by = non_empty(&args.group_by);
    if !group_by.is_empty() {
        builder = builder.group_by(group_by);
    }
    let columns = non_empty(&args.columns);
    if !columns.is_empty() {
        builder = builder.select(columns);
    }
    if let Some(limit) = args.limit {
        builder = builder.limit(limit);
    }
    if let Some(offset) = args.offset {
        builder = builder.offset(offset);
    }

    if args.show_sql {
        let compiled = builder.compile()?;
        println!("{}", compiled.sql);
        if !compiled.params.is_empty() {
            let params = compiled
                .params
                .iter()
                .map(|p| serde_json::to_string(p).unwrap_or_else(|_| p.to_string()))
                .collect::<Vec<_>>();
            println!("-- params: [{}]", params.join(", "));
        }
        println!();
    }

    let result = builder.execute().await.context("Executing query")?;
    if let Some(path) = &args.output {
        let file =
            fs::File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
        let delimiter = ingest::resolve_input_delimiter(path, None);
        table::write_csv(&result, io::BufWriter::new(file), delimiter)
            .with_context(|| format!("Writing {path:?}"))?;
        info!("Wrote {} row(s) to {path:?}", result.row_count());
    } else if args.json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        print!("{}", table::render_frame(&result));
        info!("{} row(s) returned", result.row_count());
    }
    Ok(())
}

fn non_empty(values: &[String]) -> Vec<String> {
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| v.to_string())
        .collect()
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}
