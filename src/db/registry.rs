//! Lazily opened engines keyed by database name.
//!
//! # Concurrency
//!
//! - `RwLock` protects the map; it is never held across an engine open
//! - One `OnceCell` per name makes opening single-flight: concurrent first
//!   requests for the same name wait for one open and share its result
//! - A failed open leaves the cell empty, so the next request retries
//! - `drain` empties the map under the write lock and hands the engines back
//!   for closing outside of it. An open racing with `drain` completes into an
//!   orphaned cell; its caller still gets a working engine and later requests
//!   open a fresh one.

use crate::db::engine::EngineHandle;
use crate::error::DbResult;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

#[derive(Debug, Default)]
pub struct EngineRegistry {
    engines: RwLock<HashMap<String, Arc<OnceCell<Arc<EngineHandle>>>>>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the engine for `database`, opening it with `open` on first use.
    pub async fn get_or_open<F, Fut>(&self, database: &str, open: F) -> DbResult<Arc<EngineHandle>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DbResult<EngineHandle>>,
    {
        let cell = {
            let engines = self.engines.read().await;
            if let Some(cell) = engines.get(database) {
                Arc::clone(cell)
            } else {
                drop(engines);
                let mut engines = self.engines.write().await;
                // Double-check after acquiring write lock
                Arc::clone(
                    engines
                        .entry(database.to_string())
                        .or_insert_with(|| Arc::new(OnceCell::new())),
                )
            }
        };

        let engine = cell
            .get_or_try_init(|| async {
                debug!(database = %database, "Engine not open yet");
                open().await.map(Arc::new)
            })
            .await?;

        Ok(Arc::clone(engine))
    }

    /// Get the engine for `database` if it is already open.
    pub async fn get(&self, database: &str) -> Option<Arc<EngineHandle>> {
        let engines = self.engines.read().await;
        engines
            .get(database)
            .and_then(|cell| cell.get())
            .map(Arc::clone)
    }

    /// Number of open engines (initialized cells).
    pub async fn open_count(&self) -> usize {
        let engines = self.engines.read().await;
        engines.values().filter(|cell| cell.get().is_some()).count()
    }

    /// Remove every open engine from the registry.
    pub async fn drain(&self) -> Vec<Arc<EngineHandle>> {
        let cells: Vec<_> = {
            let mut engines = self.engines.write().await;
            engines.drain().map(|(_, cell)| cell).collect()
        };

        cells
            .into_iter()
            .filter_map(|cell| cell.get().map(Arc::clone))
            .collect()
    }
}
