//! `sqlx` backed driver for PostgreSQL, MySQL and SQLite.
//!
//! Uses database-specific pools (PgPool, MySqlPool, SqlitePool) rather than
//! `AnyPool` to keep full type support when decoding rows.

use crate::db::driver::{Connection, Driver, DriverError, DriverMode, Pool, PoolStats};
use crate::db::params::{
    Placeholder, bind_mysql_param, bind_postgres_param, bind_sqlite_param, prepare,
};
use crate::db::types::RowToJson;
use crate::models::{
    BatchResult, Credentials, DatabaseType, Params, PoolSizing, QueryOptions, RowResult,
    TargetDescriptor,
};
use async_trait::async_trait;
use futures_util::TryStreamExt;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::pool::{PoolConnection, PoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{
    ConnectOptions, Connection as _, Database, Either, Executor, MySql, MySqlPool, PgPool,
    Postgres, Sqlite, SqlitePool,
};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Convert sqlx errors to DriverError.
impl From<sqlx::Error> for DriverError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                // SQLSTATE class 28: invalid authorization specification
                if code.as_deref().is_some_and(|c| c.starts_with("28")) {
                    return DriverError::Authentication(db_err.message().to_string());
                }
                DriverError::Sql {
                    message: db_err.message().to_string(),
                    code,
                }
            }
            sqlx::Error::PoolTimedOut => DriverError::PoolTimedOut,
            sqlx::Error::PoolClosed => DriverError::Closed,
            sqlx::Error::Configuration(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_) => DriverError::Connect(err.to_string()),
            sqlx::Error::RowNotFound => DriverError::sql("No rows returned"),
            other => DriverError::Other(other.to_string()),
        }
    }
}

/// Driver over the `sqlx` client.
#[derive(Debug, Clone, Default)]
pub struct SqlxDriver {
    mode: DriverMode,
}

impl SqlxDriver {
    pub fn new(mode: DriverMode) -> Self {
        if let DriverMode::Thick { client_lib_dir } = &mode {
            // sqlx speaks the wire protocols natively
            warn!(
                client_lib_dir = %client_lib_dir.display(),
                "Thick driver mode requested; sqlx has no native client libraries, continuing in thin mode"
            );
        }
        Self { mode }
    }

    pub fn mode(&self) -> &DriverMode {
        &self.mode
    }
}

fn pool_options<DB: Database>(sizing: &PoolSizing) -> PoolOptions<DB> {
    PoolOptions::<DB>::new()
        .min_connections(sizing.min)
        .max_connections(sizing.max)
        .acquire_timeout(sizing.queue_timeout())
        .idle_timeout(Some(sizing.idle_timeout()))
}

fn invalid_url(db_type: DatabaseType, err: sqlx::Error) -> DriverError {
    DriverError::Connect(format!("Invalid {} connection string: {}", db_type, err))
}

#[async_trait]
impl Driver for SqlxDriver {
    fn name(&self) -> &'static str {
        "sqlx"
    }

    async fn create_pool(&self, target: &TargetDescriptor) -> Result<Arc<dyn Pool>, DriverError> {
        let url = target.connection_string.as_str();
        if target.pool.increment > 1 {
            debug!(
                target_name = %target.name,
                increment = target.pool.increment,
                "sqlx grows pools one connection at a time"
            );
        }

        let pool = match target.db_type {
            DatabaseType::PostgreSQL => {
                let options = PgConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(target.db_type, e))?;
                let pool: PgPoolOptions = pool_options(&target.pool);
                SqlxPool::Postgres(pool.connect_with(options).await?)
            }
            DatabaseType::MySQL => {
                let options = MySqlConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(target.db_type, e))?
                    .charset("utf8mb4");
                let pool: MySqlPoolOptions = pool_options(&target.pool);
                SqlxPool::MySql(pool.connect_with(options).await?)
            }
            DatabaseType::SQLite => {
                let options = SqliteConnectOptions::from_str(url)
                    .map_err(|e| invalid_url(target.db_type, e))?
                    .create_if_missing(true);
                let pool: SqlitePoolOptions = pool_options(&target.pool);
                SqlxPool::Sqlite(pool.connect_with(options).await?)
            }
            DatabaseType::Memory => {
                return Err(DriverError::Unsupported(
                    "memory:// targets require the memory driver".to_string(),
                ));
            }
        };

        Ok(Arc::new(pool))
    }

    async fn connect(
        &self,
        connection_string: &str,
        credentials: Option<&Credentials>,
    ) -> Result<Box<dyn Connection>, DriverError> {
        let db_type = DatabaseType::from_connection_string(connection_string).ok_or_else(|| {
            DriverError::Connect("Unknown database type in connection string".to_string())
        })?;

        match db_type {
            DatabaseType::PostgreSQL => {
                let mut options = PgConnectOptions::from_str(connection_string)
                    .map_err(|e| invalid_url(db_type, e))?;
                if let Some(c) = credentials {
                    options = options.username(&c.user).password(&c.password);
                }
                let conn = options.connect().await?;
                Ok(Box::new(SqlxConnection::<Postgres>::direct(conn)))
            }
            DatabaseType::MySQL => {
                let mut options = MySqlConnectOptions::from_str(connection_string)
                    .map_err(|e| invalid_url(db_type, e))?
                    .charset("utf8mb4");
                if let Some(c) = credentials {
                    options = options.username(&c.user).password(&c.password);
                }
                let conn = options.connect().await?;
                Ok(Box::new(SqlxConnection::<MySql>::direct(conn)))
            }
            DatabaseType::SQLite => {
                if credentials.is_some() {
                    debug!("SQLite has no user accounts; credentials ignored");
                }
                let options = SqliteConnectOptions::from_str(connection_string)
                    .map_err(|e| invalid_url(db_type, e))?
                    .create_if_missing(true);
                let conn = options.connect().await?;
                Ok(Box::new(SqlxConnection::<Sqlite>::direct(conn)))
            }
            DatabaseType::Memory => Err(DriverError::Unsupported(
                "memory:// targets require the memory driver".to_string(),
            )),
        }
    }
}

/// Database-specific connection pool (avoids AnyPool limitations).
#[derive(Debug, Clone)]
pub enum SqlxPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

#[async_trait]
impl Pool for SqlxPool {
    async fn acquire(&self) -> Result<Box<dyn Connection>, DriverError> {
        let conn: Box<dyn Connection> = match self {
            SqlxPool::MySql(pool) => Box::new(SqlxConnection::pooled(pool.acquire().await?)),
            SqlxPool::Postgres(pool) => Box::new(SqlxConnection::pooled(pool.acquire().await?)),
            SqlxPool::Sqlite(pool) => Box::new(SqlxConnection::pooled(pool.acquire().await?)),
        };
        Ok(conn)
    }

    fn stats(&self) -> PoolStats {
        let (size, idle) = match self {
            SqlxPool::MySql(pool) => (pool.size(), pool.num_idle()),
            SqlxPool::Postgres(pool) => (pool.size(), pool.num_idle()),
            SqlxPool::Sqlite(pool) => (pool.size(), pool.num_idle()),
        };
        PoolStats {
            size,
            idle: idle as u32,
        }
    }

    async fn close(&self) -> Result<(), DriverError> {
        match self {
            SqlxPool::MySql(pool) => pool.close().await,
            SqlxPool::Postgres(pool) => pool.close().await,
            SqlxPool::Sqlite(pool) => pool.close().await,
        }
        Ok(())
    }
}

enum Session<DB: Database> {
    Pooled(PoolConnection<DB>),
    Direct(DB::Connection),
}

/// A pooled or standalone `sqlx` connection.
pub struct SqlxConnection<DB: Database> {
    session: Session<DB>,
}

impl<DB: Database> SqlxConnection<DB> {
    fn pooled(conn: PoolConnection<DB>) -> Self {
        Self {
            session: Session::Pooled(conn),
        }
    }

    fn direct(conn: DB::Connection) -> Self {
        Self {
            session: Session::Direct(conn),
        }
    }

    fn raw(&mut self) -> &mut DB::Connection {
        match &mut self.session {
            Session::Pooled(conn) => &mut **conn,
            Session::Direct(conn) => conn,
        }
    }
}

impl<DB: Database> std::fmt::Debug for SqlxConnection<DB> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxConnection")
            .field("backend", &DB::NAME)
            .field("pooled", &matches!(self.session, Session::Pooled(_)))
            .finish()
    }
}

// Each backend gets the same statement plumbing with its own bind function
// and placeholder syntax.
macro_rules! impl_sqlx_connection {
    ($db:ty, $bind:path, $placeholder:expr) => {
        impl SqlxConnection<$db> {
            async fn run(
                conn: &mut <$db as Database>::Connection,
                sql: &str,
                params: &Params,
                options: &QueryOptions,
            ) -> Result<RowResult, DriverError> {
                let prepared = prepare(sql, params, $placeholder)?;
                let mut query = sqlx::query(&prepared.sql);
                for value in &prepared.values {
                    query = $bind(query, value);
                }

                let mut result = RowResult::default();
                let mut rows_affected = 0;
                let mut stream = (&mut *conn).fetch_many(query);
                while let Some(item) = stream.try_next().await? {
                    match item {
                        Either::Left(done) => rows_affected += done.rows_affected(),
                        Either::Right(row) => {
                            if result.columns.is_empty() {
                                result.columns = row.column_metadata();
                            }
                            result
                                .rows
                                .push(row.to_json(options.fetch_types, options.out_format));
                        }
                    }
                }
                if result.rows.is_empty() {
                    result.rows_affected = Some(rows_affected);
                }
                Ok(result)
            }

            async fn run_batch(
                conn: &mut <$db as Database>::Connection,
                sql: &str,
                param_sets: &[Params],
            ) -> Result<Vec<u64>, DriverError> {
                let mut counts = Vec::with_capacity(param_sets.len());
                for (index, params) in param_sets.iter().enumerate() {
                    let prepared = prepare(sql, params, $placeholder)
                        .map_err(|e| DriverError::batch(index, e))?;
                    let mut query = sqlx::query(&prepared.sql);
                    for value in &prepared.values {
                        query = $bind(query, value);
                    }
                    let done = (&mut *conn)
                        .execute(query)
                        .await
                        .map_err(|e| DriverError::batch(index, e.into()))?;
                    counts.push(done.rows_affected());
                }
                Ok(counts)
            }
        }

        #[async_trait]
        impl Connection for SqlxConnection<$db> {
            async fn execute(
                &mut self,
                sql: &str,
                params: &Params,
                options: &QueryOptions,
            ) -> Result<RowResult, DriverError> {
                let conn = self.raw();
                if options.auto_commit {
                    return Self::run(conn, sql, params, options).await;
                }

                // Without auto-commit nothing this call does may persist
                let mut tx = conn.begin().await?;
                let result = Self::run(&mut *tx, sql, params, options).await;
                let rolled_back = tx.rollback().await;
                let result = result?;
                rolled_back?;
                Ok(result)
            }

            async fn execute_many(
                &mut self,
                sql: &str,
                param_sets: &[Params],
                options: &QueryOptions,
            ) -> Result<BatchResult, DriverError> {
                // All sets succeed or none do; a failed set drops the transaction
                let mut tx = self.raw().begin().await?;
                let counts = Self::run_batch(&mut *tx, sql, param_sets).await?;
                if options.auto_commit {
                    tx.commit().await?;
                } else {
                    tx.rollback().await?;
                }
                Ok(BatchResult::from_counts(counts))
            }

            async fn release(self: Box<Self>) -> Result<(), DriverError> {
                // Returned inline so the lease is back before the caller resumes
                if let Session::Pooled(mut conn) = self.session {
                    conn.return_to_pool().await;
                }
                Ok(())
            }

            async fn close(self: Box<Self>) -> Result<(), DriverError> {
                match self.session {
                    Session::Pooled(conn) => conn.close().await?,
                    Session::Direct(conn) => conn.close().await?,
                }
                Ok(())
            }
        }
    };
}

impl_sqlx_connection!(Postgres, bind_postgres_param, Placeholder::Dollar);
impl_sqlx_connection!(MySql, bind_mysql_param, Placeholder::Question);
impl_sqlx_connection!(Sqlite, bind_sqlite_param, Placeholder::Question);
