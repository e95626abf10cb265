//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - Driver seam (`Driver`, `Pool`, `Connection`) with `sqlx` and in-memory implementations
//! - Connection lifecycle management
//! - Query execution
//! - Parameter binding and type mappings

pub mod driver;
pub mod executor;
pub mod memory;
pub mod params;
pub mod pool;
pub mod sqlx_driver;
pub mod types;

pub use driver::{Connection, Driver, DriverError, DriverMode, Pool, PoolStats};
pub use executor::QueryExecutor;
pub use memory::MemoryDriver;
pub use pool::{CloseFailure, CloseReport, ConnectionManager, ConnectionMode, HandleState, Lease};
pub use sqlx_driver::SqlxDriver;
