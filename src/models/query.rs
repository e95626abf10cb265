//! Query-related data models.
//!
//! This module defines types for SQL query requests, execution options and results.

use crate::db::ConnectionMode;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::time::Duration;

/// Default query timeout in seconds.
pub const DEFAULT_QUERY_TIMEOUT_SECS: u32 = 30;

/// Maximum query timeout in seconds.
pub const MAX_QUERY_TIMEOUT_SECS: u32 = 300;

/// A parameter value for parameterized queries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    /// Stored as i64 for maximum range
    Int(i64),
    Float(f64),
    String(String),
    /// Arrays and objects, bound as JSON
    Json(JsonValue),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Json(_) => "json",
        }
    }
}

impl From<&str> for QueryParam {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for QueryParam {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for QueryParam {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Bind parameters, either by position or by `:name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    Positional(Vec<QueryParam>),
    Named(BTreeMap<String, QueryParam>),
}

impl Params {
    pub fn none() -> Self {
        Self::Positional(Vec::new())
    }

    /// Build named parameters from `(name, value)` pairs.
    pub fn named<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<QueryParam>,
    {
        Self::Named(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Positional(values) => values.len(),
            Self::Named(values) => values.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Params {
    fn default() -> Self {
        Self::none()
    }
}

impl From<Vec<QueryParam>> for Params {
    fn from(values: Vec<QueryParam>) -> Self {
        Self::Positional(values)
    }
}

/// Shape of returned rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutFormat {
    /// One JSON object per row, keyed by column name
    #[default]
    Object,
    /// One JSON array per row, in column order
    Array,
}

/// How large binary objects (BLOB, BYTEA, ...) are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BlobFetch {
    /// Raw bytes, base64 encoded
    #[default]
    Buffer,
    /// UTF-8 text when valid, base64 otherwise
    Utf8,
}

/// How large character objects (CLOB, TEXT, ...) are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClobFetch {
    #[default]
    String,
    /// Parsed as JSON when the content is valid JSON, plain string otherwise
    Json,
}

/// Type coercion rules for large objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FetchTypes {
    #[serde(default)]
    pub blob: BlobFetch,
    #[serde(default)]
    pub clob: ClobFetch,
}

/// Caller-supplied execution options. Unset keys fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecuteOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_commit: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub out_format: Option<OutFormat>,
    /// Replaces the default rules as a whole when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetch_types: Option<FetchTypes>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u32>,
}

impl ExecuteOptions {
    pub fn with_auto_commit(mut self, auto_commit: bool) -> Self {
        self.auto_commit = Some(auto_commit);
        self
    }

    pub fn with_out_format(mut self, out_format: OutFormat) -> Self {
        self.out_format = Some(out_format);
        self
    }

    pub fn with_fetch_types(mut self, fetch_types: FetchTypes) -> Self {
        self.fetch_types = Some(fetch_types);
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u32) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Shallow merge over `defaults`: every key set here wins, nested values
    /// are taken as a whole.
    pub fn resolve(&self, defaults: &QueryOptions) -> QueryOptions {
        QueryOptions {
            auto_commit: self.auto_commit.unwrap_or(defaults.auto_commit),
            out_format: self.out_format.unwrap_or(defaults.out_format),
            fetch_types: self.fetch_types.unwrap_or(defaults.fetch_types),
            timeout_secs: self
                .timeout_secs
                .unwrap_or(defaults.timeout_secs)
                .clamp(1, MAX_QUERY_TIMEOUT_SECS),
        }
    }
}

/// Fully resolved options handed to a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryOptions {
    pub auto_commit: bool,
    pub out_format: OutFormat,
    pub fetch_types: FetchTypes,
    pub timeout_secs: u32,
}

impl QueryOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs as u64)
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            auto_commit: true,
            out_format: OutFormat::Object,
            fetch_types: FetchTypes::default(),
            timeout_secs: DEFAULT_QUERY_TIMEOUT_SECS,
        }
    }
}

/// A single statement to run against a named target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryRequest {
    pub target: String,
    pub sql: String,
    #[serde(default)]
    pub params: Params,
    #[serde(default)]
    pub options: ExecuteOptions,
    /// Falls back to the manager's default mode
    #[serde(default)]
    pub mode: Option<ConnectionMode>,
}

impl QueryRequest {
    /// Create a new query request with default options.
    pub fn new(target: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            sql: sql.into(),
            params: Params::none(),
            options: ExecuteOptions::default(),
            mode: None,
        }
    }

    pub fn with_params(mut self, params: impl Into<Params>) -> Self {
        self.params = params.into();
        self
    }

    pub fn with_options(mut self, options: ExecuteOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_mode(mut self, mode: ConnectionMode) -> Self {
        self.mode = Some(mode);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// Result of a single statement.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RowResult {
    pub columns: Vec<ColumnMetadata>,
    /// Objects or arrays depending on [`OutFormat`]
    pub rows: Vec<JsonValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rows_affected: Option<u64>,
    pub execution_time_ms: u64,
}

impl RowResult {
    /// Create a result for write operations (INSERT/UPDATE/DELETE).
    pub fn write_result(rows_affected: u64) -> Self {
        Self {
            rows_affected: Some(rows_affected),
            ..Self::default()
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Result of a statement applied to many parameter sets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub rows_affected: u64,
    /// Affected rows per parameter set, in input order
    pub rows_affected_per_set: Vec<u64>,
    pub execution_time_ms: u64,
}

impl BatchResult {
    pub fn from_counts(counts: Vec<u64>) -> Self {
        Self {
            rows_affected: counts.iter().sum(),
            rows_affected_per_set: counts,
            execution_time_ms: 0,
        }
    }
}
