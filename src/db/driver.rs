//! Driver abstraction.
//!
//! The connection manager and executor never talk to a database client
//! directly. They go through the [`Driver`], [`Pool`] and [`Connection`]
//! traits so the same lifecycle code runs against `sqlx` in production and
//! against the in-memory driver in tests.

use crate::models::{BatchResult, Credentials, Params, QueryOptions, RowResult, TargetDescriptor};
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

/// How the database client library is loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum DriverMode {
    /// Pure client, no native libraries
    #[default]
    Thin,
    /// Native client libraries loaded from `client_lib_dir`
    Thick { client_lib_dir: PathBuf },
}

impl DriverMode {
    pub fn is_thick(&self) -> bool {
        matches!(self, Self::Thick { .. })
    }
}

impl std::fmt::Display for DriverMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Thin => write!(f, "thin"),
            Self::Thick { client_lib_dir } => write!(f, "thick ({})", client_lib_dir.display()),
        }
    }
}

/// Failures reported by a driver.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("authentication rejected: {0}")]
    Authentication(String),

    #[error("{message}")]
    Sql {
        message: String,
        /// SQLSTATE or vendor code when the backend reports one
        code: Option<String>,
    },

    #[error("timed out waiting for a free connection")]
    PoolTimedOut,

    #[error("connection source is closed")]
    Closed,

    #[error("statement exceeded {secs}s")]
    Timeout { secs: u32 },

    #[error("batch entry {index} failed: {source}")]
    Batch {
        index: usize,
        #[source]
        source: Box<DriverError>,
    },

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("{0}")]
    Other(String),
}

impl DriverError {
    pub fn sql(message: impl Into<String>) -> Self {
        Self::Sql {
            message: message.into(),
            code: None,
        }
    }

    pub fn batch(index: usize, source: DriverError) -> Self {
        Self::Batch {
            index,
            source: Box::new(source),
        }
    }

    /// True when the backend rejected the supplied credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }
}

/// Point-in-time counters of a pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    /// Physical connections currently open
    pub size: u32,
    pub idle: u32,
}

impl PoolStats {
    /// Connections currently handed out.
    pub fn leased(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }
}

/// Entry point of a database client implementation.
#[async_trait]
pub trait Driver: Send + Sync + std::fmt::Debug {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Create a pool sized per the target's descriptor.
    async fn create_pool(&self, target: &TargetDescriptor) -> Result<Arc<dyn Pool>, DriverError>;

    /// Open one standalone connection. `credentials` replace the user info
    /// embedded in `connection_string` when given.
    async fn connect(
        &self,
        connection_string: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Connection>, DriverError>;
}

/// A shared source of connections for one target.
#[async_trait]
pub trait Pool: Send + Sync + std::fmt::Debug {
    /// Borrow a connection, waiting up to the queue timeout.
    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError>;

    fn stats(&self) -> PoolStats;

    /// Close every connection. Further acquires fail with [`DriverError::Closed`].
    async fn close(&self) -> Result<(), DriverError>;
}

/// One live database session.
#[async_trait]
pub trait Connection: Send + std::fmt::Debug {
    async fn execute(
        &mut self,
        sql: &str,
        params: &Params,
        options: &QueryOptions,
    ) -> Result<RowResult, DriverError>;

    /// Run `sql` once per parameter set, in order.
    async fn execute_many(
        &mut self,
        sql: &str,
        param_sets: &[Params],
        options: &QueryOptions,
    ) -> Result<BatchResult, DriverError>;

    /// Hand a pooled connection back to its pool.
    async fn release(self: Box<Self>) -> Result<(), DriverError>;

    /// Close the underlying session.
    async fn close(self: Box<Self>) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_stats_leased() {
        let stats = PoolStats { size: 4, idle: 1 };
        assert_eq!(stats.leased(), 3);
        assert_eq!(PoolStats::default().leased(), 0);
    }

    #[test]
    fn test_batch_error_display_names_entry() {
        let err = DriverError::batch(2, DriverError::sql("duplicate key"));
        assert_eq!(err.to_string(), "batch entry 2 failed: duplicate key");
    }

    #[test]
    fn test_driver_mode_display() {
        assert_eq!(DriverMode::Thin.to_string(), "thin");
        let thick = DriverMode::Thick {
            client_lib_dir: PathBuf::from("/opt/client"),
        };
        assert!(thick.is_thick());
        assert_eq!(thick.to_string(), "thick (/opt/client)");
    }
}
