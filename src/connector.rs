//! Source connectors: every upload or remote adapter reduces its payload to
//! a header row plus data rows before frame generation.

use std::{collections::HashMap, sync::Arc};

use log::{debug, warn};
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use uuid::Uuid;

use crate::{
    csv_parser::parse_with_delimiter,
    error::IngestError,
    frame::CsvResult,
    ingest::{DEFAULT_MAX_BYTES, IngestOptions, check_size, decode_upload, ingest_rows},
};

pub const CSV_UPLOAD_KIND: &str = "csv";
pub const JSON_ROWS_KIND: &str = "json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FormFieldKind {
    File,
    Text,
    Number,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormField {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FormFieldKind,
    pub required: bool,
}

impl FormField {
    const fn new(name: &'static str, label: &'static str, kind: FormFieldKind, required: bool) -> Self {
        Self {
            name,
            label,
            kind,
            required,
        }
    }
}

pub trait SourceConnector: Send + Sync {
    fn kind(&self) -> &'static str;

    /// Rejects payloads that must not reach parsing.
    fn validate(&self, bytes: &[u8]) -> Result<(), IngestError>;

    /// Header row first, then data rows.
    fn parse_to_rows(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError>;

    fn form_fields(&self) -> Vec<FormField>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CsvUploadConnector {
    options: IngestOptions,
}

impl CsvUploadConnector {
    pub fn new(options: IngestOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &IngestOptions {
        &self.options
    }
}

impl SourceConnector for CsvUploadConnector {
    fn kind(&self) -> &'static str {
        CSV_UPLOAD_KIND
    }

    fn validate(&self, bytes: &[u8]) -> Result<(), IngestError> {
        if bytes.is_empty() {
            return Err(IngestError::EmptyFile);
        }
        check_size(bytes.len() as u64, self.options.max_bytes)
    }

    fn parse_to_rows(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError> {
        let text = decode_upload(bytes, self.options.encoding)?;
        Ok(parse_with_delimiter(&text, self.options.delimiter))
    }

    fn form_fields(&self) -> Vec<FormField> {
        vec![
            FormField::new("file", "CSV file", FormFieldKind::File, true),
            FormField::new("delimiter", "Delimiter", FormFieldKind::Text, false),
            FormField::new("encoding", "Text encoding", FormFieldKind::Text, false),
        ]
    }
}

/// A JSON array of flat objects, as returned by API-backed tables.
#[derive(Debug, Clone, Copy)]
pub struct JsonRowsConnector {
    max_bytes: Option<u64>,
}

impl Default for JsonRowsConnector {
    fn default() -> Self {
        Self {
            max_bytes: Some(DEFAULT_MAX_BYTES),
        }
    }
}

impl JsonRowsConnector {
    pub fn new(max_bytes: Option<u64>) -> Self {
        Self { max_bytes }
    }

    fn objects(bytes: &[u8]) -> Result<Vec<Map<String, JsonValue>>, IngestError> {
        let document: JsonValue = serde_json::from_slice(bytes)
            .map_err(|e| IngestError::InvalidSource(format!("Malformed JSON: {e}")))?;
        let JsonValue::Array(items) = document else {
            return Err(IngestError::InvalidSource(
                "Expected a JSON array of row objects".into(),
            ));
        };
        items
            .into_iter()
            .enumerate()
            .map(|(idx, item)| match item {
                JsonValue::Object(map) => Ok(map),
                other => Err(IngestError::InvalidSource(format!(
                    "Row {} is {} rather than an object",
                    idx + 1,
                    json_kind(&other)
                ))),
            })
            .collect()
    }
}

fn json_kind(value: &JsonValue) -> &'static str {
    match value {
        JsonValue::Null => "null",
        JsonValue::Bool(_) => "a boolean",
        JsonValue::Number(_) => "a number",
        JsonValue::String(_) => "a string",
        JsonValue::Array(_) => "an array",
        JsonValue::Object(_) => "an object",
    }
}

fn json_cell(value: Option<&JsonValue>) -> String {
    match value {
        None | Some(JsonValue::Null) => String::new(),
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Bool(b)) => b.to_string(),
        Some(JsonValue::Number(n)) => n.to_string(),
        Some(nested) => nested.to_string(),
    }
}

impl SourceConnector for JsonRowsConnector {
    fn kind(&self) -> &'static str {
        JSON_ROWS_KIND
    }

    fn validate(&self, bytes: &[u8]) -> Result<(), IngestError> {
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Err(IngestError::EmptyFile);
        }
        check_size(bytes.len() as u64, self.max_bytes)
    }

    fn parse_to_rows(&self, bytes: &[u8]) -> Result<Vec<Vec<String>>, IngestError> {
        let objects = Self::objects(bytes)?;
        if objects.is_empty() {
            return Ok(Vec::new());
        }

        let mut header: Vec<String> = Vec::new();
        for object in &objects {
            for key in object.keys() {
                if !header.contains(key) {
                    header.push(key.clone());
                }
            }
        }
        debug!(
            "JSON source yields {} object(s) over {} key(s)",
            objects.len(),
            header.len()
        );

        let mut rows = Vec::with_capacity(objects.len() + 1);
        rows.push(header.clone());
        rows.extend(objects.iter().map(|object| {
            header
                .iter()
                .map(|key| json_cell(object.get(key)))
                .collect::<Vec<_>>()
        }));
        Ok(rows)
    }

    fn form_fields(&self) -> Vec<FormField> {
        vec![
            FormField::new("endpoint", "API endpoint", FormFieldKind::Text, true),
            FormField::new("pageSize", "Rows per page", FormFieldKind::Number, false),
        ]
    }
}

/// Connectors keyed by [`SourceConnector::kind`].
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn SourceConnector>>,
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(options: IngestOptions) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(CsvUploadConnector::new(options)));
        registry.register(Arc::new(JsonRowsConnector::new(options.max_bytes)));
        registry
    }

    pub fn register(&mut self, connector: Arc<dyn SourceConnector>) {
        let kind = connector.kind().to_string();
        if self.connectors.insert(kind.clone(), connector).is_some() {
            warn!("Replaced existing connector for kind '{kind}'");
        } else {
            debug!("Registered connector '{kind}'");
        }
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn SourceConnector>, IngestError> {
        self.connectors
            .get(kind)
            .cloned()
            .ok_or_else(|| IngestError::UnsupportedSource(kind.to_string()))
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds = self.connectors.keys().map(String::as_str).collect::<Vec<_>>();
        kinds.sort_unstable();
        kinds
    }
}

/// Validates, parses and generates a frame through the connector for `kind`.
pub fn ingest_source(
    registry: &ConnectorRegistry,
    kind: &str,
    bytes: &[u8],
    table_id: Uuid,
) -> Result<CsvResult, IngestError> {
    let connector = registry.get(kind)?;
    connector.validate(bytes)?;
    let rows = connector.parse_to_rows(bytes)?;
    ingest_rows(rows, table_id)
}
