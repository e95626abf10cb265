//! Target-related data models.
//!
//! A target is a named logical database endpoint with its own credentials and
//! pool sizing. Descriptors are built once from configuration and never mutated.

use serde::{Deserialize, Serialize};
use std::time::Duration;

// Pool sizing defaults
pub const DEFAULT_POOL_MIN: u32 = 1;
pub const DEFAULT_POOL_MAX: u32 = 10;
pub const DEFAULT_POOL_INCREMENT: u32 = 1;
pub const DEFAULT_POOL_IDLE_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_QUEUE_TIMEOUT_SECS: u64 = 60;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
    /// In-process driver, see [`crate::db::memory`]
    Memory,
}

impl DatabaseType {
    /// Parse database type from a connection string.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let lower = connection_string.to_lowercase();
        if lower.starts_with("postgres://") || lower.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if lower.starts_with("mysql://") || lower.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if lower.starts_with("sqlite://") || lower.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else if lower.starts_with("memory://") {
            Some(Self::Memory)
        } else {
            None
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
            Self::Memory => "Memory",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Login credentials supplied by a user.
#[derive(Clone, Deserialize)]
pub struct Credentials {
    pub user: String,
    pub password: String,
}

impl Credentials {
    pub fn new(user: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &"****")
            .finish()
    }
}

/// Pool sizing parameters for one target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolSizing {
    pub min: u32,
    pub max: u32,
    /// Number of connections opened at once when the pool grows
    pub increment: u32,
    pub idle_timeout_secs: u64,
    /// How long an acquire waits for a free connection before failing
    pub queue_timeout_secs: u64,
}

impl Default for PoolSizing {
    fn default() -> Self {
        Self {
            min: DEFAULT_POOL_MIN,
            max: DEFAULT_POOL_MAX,
            increment: DEFAULT_POOL_INCREMENT,
            idle_timeout_secs: DEFAULT_POOL_IDLE_TIMEOUT_SECS,
            queue_timeout_secs: DEFAULT_QUEUE_TIMEOUT_SECS,
        }
    }
}

impl PoolSizing {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn queue_timeout(&self) -> Duration {
        Duration::from_secs(self.queue_timeout_secs)
    }

    /// Validate sizing and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.max == 0 {
            return Err("pool_max must be greater than 0".to_string());
        }
        if self.increment == 0 {
            return Err("pool_increment must be greater than 0".to_string());
        }
        if self.min > self.max {
            return Err(format!(
                "pool_min ({}) cannot exceed pool_max ({})",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

/// Immutable description of a named database target.
#[derive(Debug, Clone, Serialize)]
pub struct TargetDescriptor {
    pub name: String,
    pub db_type: DatabaseType,
    /// Contains sensitive data - never log
    #[serde(skip_serializing)]
    pub connection_string: String,
    pub pool: PoolSizing,
}

impl TargetDescriptor {
    /// Create a new descriptor, validating the name and detecting the database type.
    pub fn new(
        name: impl Into<String>,
        connection_string: impl Into<String>,
        pool: PoolSizing,
    ) -> Result<Self, TargetError> {
        let name = name.into();
        let connection_string = connection_string.into();

        if name.is_empty() {
            return Err(TargetError::EmptyName);
        }
        if !name
            .chars()
            .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
        {
            return Err(TargetError::InvalidName(name));
        }

        let db_type = DatabaseType::from_connection_string(&connection_string)
            .ok_or_else(|| TargetError::UnknownDatabaseType(name.clone()))?;

        pool.validate().map_err(TargetError::InvalidPool)?;

        Ok(Self {
            name,
            db_type,
            connection_string,
            pool,
        })
    }

    /// Get a display-safe version of the connection string (password masked).
    pub fn masked_connection_string(&self) -> String {
        if let Some(at_pos) = self.connection_string.find('@') {
            let scheme_end = self.connection_string.find("://").map_or(0, |p| p + 3);
            if let Some(colon_pos) = self.connection_string[scheme_end..at_pos].rfind(':') {
                let prefix = &self.connection_string[..scheme_end + colon_pos + 1];
                let suffix = &self.connection_string[at_pos..];
                return format!("{}****{}", prefix, suffix);
            }
        }
        self.connection_string.clone()
    }
}

/// Errors that can occur when building a target descriptor.
#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("Target name cannot be empty")]
    EmptyName,

    #[error("Target name contains invalid characters: {0}")]
    InvalidName(String),

    /// The connection string itself is not echoed since it carries credentials
    #[error("Unknown database type in connection string for target '{0}'")]
    UnknownDatabaseType(String),

    #[error("Invalid pool sizing: {0}")]
    InvalidPool(String),
}
