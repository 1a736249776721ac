//! DB Adapter Library
//!
//! A uniform async interface over SQLite, PostgreSQL and MySQL: named
//! databases opened on first use, per-database statement deadlines,
//! transactions, health reporting and orderly shutdown.
//!
//! ```no_run
//! use db_adapter::{Adapter, AdapterConfig, DatabaseAdapter, QueryParam};
//!
//! # async fn run() -> db_adapter::DbResult<()> {
//! let adapter = Adapter::new(AdapterConfig::in_memory())?;
//! adapter.execute("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT)", &[], None).await?;
//! adapter.execute("INSERT INTO t (v) VALUES (?)", &[QueryParam::from("x")], None).await?;
//! let rows = adapter.query("SELECT v FROM t", &[], None).await?;
//! assert_eq!(rows.len(), 1);
//! adapter.close().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{AdapterConfig, Backend, DatabaseConfig, PoolOptions};
pub use db::{Adapter, ConnectionHandle, DatabaseAdapter, TransactionHandle};
pub use error::{DbError, DbResult, ErrorKind};
pub use models::{DatabaseStatus, ExecuteResult, HealthStatus, QueryParam, Record};
