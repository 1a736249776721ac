//! Database access layer.
//!
//! - `adapter`: the `DatabaseAdapter` contract and its implementation
//! - `engine`: per-database engine handles over sqlx pools
//! - `registry`: lazily opened engines keyed by database name
//! - `executor`: statement execution raced against deadlines
//! - `connection` / `transaction`: session-bound handles
//! - `params` / `types`: parameter binding and row decoding

#[macro_use]
pub mod macros;
pub mod adapter;
pub mod connection;
pub mod engine;
pub mod executor;
pub mod params;
pub mod registry;
pub mod transaction;
pub mod types;

pub use adapter::{Adapter, CANARY_SQL, DatabaseAdapter};
pub use connection::ConnectionHandle;
pub use engine::{CloseError, EngineHandle, EnginePool};
pub use registry::EngineRegistry;
pub use transaction::TransactionHandle;
