//! DB REST Gateway Library
//!
//! A REST API backend that authenticates users against SQL databases
//! (PostgreSQL, MySQL, SQLite), issues session tokens, and runs statements
//! through pooled or direct connections per named target.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod transport;

pub use auth::{AuthGate, Claims, TokenIssuer, TokenPayload, verify_token};
pub use config::Config;
pub use db::{ConnectionManager, ConnectionMode, QueryExecutor};
pub use error::DbError;
