//! The database adapter.
//!
//! `DatabaseAdapter` is the uniform contract callers program against: run
//! statements by database name, check out sessions, open transactions, report
//! health and shut down. `Adapter` implements it for one backend over any
//! number of named databases, opening each engine on first use.

use crate::config::{AdapterConfig, Backend, DEFAULT_DATABASE_NAME, DatabaseConfig};
use crate::db::connection::{ConnectionHandle, PooledSession};
use crate::db::engine::EngineHandle;
use crate::db::executor;
use crate::db::registry::EngineRegistry;
use crate::db::transaction::{DbTransaction, TransactionHandle};
use crate::error::{DbError, DbResult};
use crate::models::{DatabaseStatus, ExecuteResult, HealthStatus, QueryParam, QueryRequest, Record};
use async_trait::async_trait;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Statement used to probe a database.
pub const CANARY_SQL: &str = "SELECT 1";

/// Uniform access to the configured databases.
///
/// `database` arguments name a configured database; `None` means
/// [`DEFAULT_DATABASE_NAME`].
#[async_trait]
pub trait DatabaseAdapter: Send + Sync {
    /// Backend every database of this adapter runs on.
    fn backend(&self) -> Backend;

    /// Run a row-returning statement.
    async fn query(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> DbResult<Vec<Record>>;

    /// Run a write statement.
    async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> DbResult<ExecuteResult>;

    /// Check out a session bound to one database.
    async fn get_connection(&self, database: Option<&str>) -> DbResult<ConnectionHandle>;

    /// Give a session back. A no-op for engines that do not pool sessions.
    async fn release_connection(&self, connection: ConnectionHandle);

    /// Begin a transaction. The connection's database wins over `database`.
    async fn begin_transaction(
        &self,
        connection: Option<&ConnectionHandle>,
        database: Option<&str>,
    ) -> DbResult<TransactionHandle>;

    /// Whether every configured database answers the canary statement.
    async fn is_healthy(&self) -> bool;

    /// Per-database health report. Never fails.
    async fn get_status(&self) -> HealthStatus;

    /// Close every open engine. Later calls reopen engines on demand.
    async fn close(&self);
}

struct AdapterInner {
    config: AdapterConfig,
    engines: EngineRegistry,
}

/// Adapter over one backend. Cheap to clone; clones share open engines.
#[derive(Clone)]
pub struct Adapter {
    inner: Arc<AdapterInner>,
}

impl Adapter {
    /// Create an adapter. No engine is opened until first use.
    pub fn new(config: AdapterConfig) -> DbResult<Self> {
        config.validate()?;
        info!(
            backend = %config.backend,
            databases = ?config.names(),
            "Database adapter configured"
        );
        Ok(Self {
            inner: Arc::new(AdapterInner {
                config,
                engines: EngineRegistry::new(),
            }),
        })
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.inner.config
    }

    /// Get the engine for a database, opening it on first use.
    ///
    /// Repeated calls return the same handle until [`DatabaseAdapter::close`].
    pub async fn engine(&self, database: Option<&str>) -> DbResult<Arc<EngineHandle>> {
        let name = database.unwrap_or(DEFAULT_DATABASE_NAME);
        let config = self.database_config(name)?;
        let backend = self.inner.config.backend;
        self.inner
            .engines
            .get_or_open(name, || EngineHandle::open(name, backend, config))
            .await
    }

    /// Number of currently open engines.
    pub async fn open_engines(&self) -> usize {
        self.inner.engines.open_count().await
    }

    fn database_config(&self, name: &str) -> DbResult<&DatabaseConfig> {
        self.inner
            .config
            .databases
            .get(name)
            .ok_or_else(|| DbError::database_not_found(name, self.inner.config.names()))
    }

    async fn check(&self, name: &str, config: &DatabaseConfig) -> DatabaseStatus {
        let location = config.masked_location();

        // Every session checked out means the engine is open and serving
        if let Some(engine) = self.inner.engines.get(name).await {
            if engine.is_busy() {
                debug!(database = %name, "All sessions in use, skipping canary");
                return DatabaseStatus::up(location, config.read_only);
            }
        }

        match self.query(CANARY_SQL, &[], Some(name)).await {
            Ok(_) => DatabaseStatus::up(location, config.read_only),
            Err(e) => {
                warn!(database = %name, error = %e, "Health check failed");
                DatabaseStatus::down(location, config.read_only, e.to_string())
            }
        }
    }
}

#[async_trait]
impl DatabaseAdapter for Adapter {
    fn backend(&self) -> Backend {
        self.inner.config.backend
    }

    async fn query(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> DbResult<Vec<Record>> {
        let engine = self.engine(database).await?;
        let request = QueryRequest::new(sql, engine.database(), engine.timeout()).with_params(params);
        executor::fetch_rows(engine.pool(), request).await
    }

    async fn execute(
        &self,
        sql: &str,
        params: &[QueryParam],
        database: Option<&str>,
    ) -> DbResult<ExecuteResult> {
        let engine = self.engine(database).await?;
        let request = QueryRequest::new(sql, engine.database(), engine.timeout()).with_params(params);
        executor::execute(engine.pool(), request).await
    }

    async fn get_connection(&self, database: Option<&str>) -> DbResult<ConnectionHandle> {
        let engine = self.engine(database).await?;
        let session = PooledSession::acquire(&engine).await?;
        debug!(
            database = %engine.database(),
            pooled = session.is_some(),
            "Connection checked out"
        );
        Ok(ConnectionHandle::new(
            self.clone(),
            engine.database(),
            engine.timeout(),
            session,
        ))
    }

    async fn release_connection(&self, connection: ConnectionHandle) {
        connection.return_to_pool().await;
    }

    async fn begin_transaction(
        &self,
        connection: Option<&ConnectionHandle>,
        database: Option<&str>,
    ) -> DbResult<TransactionHandle> {
        let database = connection.map(ConnectionHandle::database).or(database);
        let engine = self.engine(database).await?;

        let transaction = DbTransaction::begin(engine.pool())
            .await
            .map_err(|e| DbError::transaction("begin", engine.database(), e))?;
        let handle = TransactionHandle::new(engine.database(), engine.timeout(), transaction);

        debug!(
            transaction_id = %handle.id(),
            database = %engine.database(),
            "Transaction started"
        );
        Ok(handle)
    }

    async fn is_healthy(&self) -> bool {
        self.get_status().await.healthy
    }

    async fn get_status(&self) -> HealthStatus {
        let checks = self
            .inner
            .config
            .databases
            .iter()
            .map(|(name, config)| async move { (name.clone(), self.check(name, config).await) });

        let databases: BTreeMap<String, DatabaseStatus> = join_all(checks).await.into_iter().collect();
        let healthy = databases.values().all(|status| status.connected);

        HealthStatus {
            healthy,
            backend: self.backend().to_string(),
            databases,
        }
    }

    async fn close(&self) {
        let engines = self.inner.engines.drain().await;
        for engine in engines {
            match engine.close().await {
                Ok(()) => info!(database = %engine.database(), "Database closed"),
                Err(e) => error!(
                    database = %engine.database(),
                    error = %e,
                    "Failed to close database cleanly"
                ),
            }
        }
    }
}

impl std::fmt::Debug for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Adapter")
            .field("backend", &self.inner.config.backend)
            .field("databases", &self.inner.config.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_rejects_invalid_config() {
        let err = Adapter::new(AdapterConfig::new(Backend::Sqlite)).unwrap_err();
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_engines_open_lazily() {
        let adapter = Adapter::new(AdapterConfig::in_memory()).unwrap();
        assert_eq!(adapter.open_engines().await, 0);

        adapter.query(CANARY_SQL, &[], None).await.unwrap();
        assert_eq!(adapter.open_engines().await, 1);

        adapter.close().await;
        assert_eq!(adapter.open_engines().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_engines() {
        let adapter = Adapter::new(AdapterConfig::in_memory()).unwrap();
        let clone = adapter.clone();

        let a = adapter.engine(None).await.unwrap();
        let b = clone.engine(Some(DEFAULT_DATABASE_NAME)).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn test_adapter_is_object_safe() {
        let adapter: Arc<dyn DatabaseAdapter> =
            Arc::new(Adapter::new(AdapterConfig::in_memory()).unwrap());
        assert_eq!(adapter.backend(), Backend::Sqlite);
        assert!(adapter.is_healthy().await);
        adapter.close().await;
    }
}
