//! Data models for the database adapter.
//!
//! This module re-exports all model types used throughout the crate.

pub mod query;
pub mod status;

// Re-export commonly used types
pub use query::{ExecuteResult, QueryParam, QueryRequest, Record};
pub use status::{DatabaseStatus, HealthStatus};
