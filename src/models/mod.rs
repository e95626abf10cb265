//! Data models for the gateway.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod target;

// Re-export commonly used types
pub use query::{
    BatchResult, BlobFetch, ClobFetch, ColumnMetadata, DEFAULT_QUERY_TIMEOUT_SECS,
    ExecuteOptions, FetchTypes, MAX_QUERY_TIMEOUT_SECS, OutFormat, Params, QueryOptions,
    QueryParam, QueryRequest, RowResult,
};
pub use target::{
    Credentials, DEFAULT_POOL_IDLE_TIMEOUT_SECS, DEFAULT_POOL_INCREMENT, DEFAULT_POOL_MAX,
    DEFAULT_POOL_MIN, DEFAULT_QUEUE_TIMEOUT_SECS, DatabaseType, PoolSizing, TargetDescriptor,
    TargetError,
};
