//! Connection handles.
//!
//! For pooled engines (PostgreSQL, MySQL) a `ConnectionHandle` holds one
//! checked-out session until it is released, so consecutive statements see the
//! same session state. SQLite engines already pin every database name to a
//! single session; their handles just delegate to the adapter.

use crate::db::adapter::{Adapter, DatabaseAdapter};
use crate::db::engine::{EngineHandle, EnginePool};
use crate::db::executor::{self, run_with_deadline};
use crate::error::{DbError, DbResult};
use crate::models::{ExecuteResult, QueryParam, QueryRequest, Record};
use sqlx::MySql;
use sqlx::Postgres;
use sqlx::pool::PoolConnection;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// A session checked out of a real pool.
pub enum PooledSession {
    Postgres(PoolConnection<Postgres>),
    MySql(PoolConnection<MySql>),
}

impl PooledSession {
    /// Check out a session, or `None` when the engine does not pool sessions.
    pub(crate) async fn acquire(engine: &EngineHandle) -> DbResult<Option<Self>> {
        let session = match engine.pool() {
            EnginePool::Sqlite(_) => return Ok(None),
            EnginePool::Postgres(p) => p.acquire().await.map(Self::Postgres),
            EnginePool::MySql(p) => p.acquire().await.map(Self::MySql),
        };

        session.map(Some).map_err(|e| {
            DbError::connection(
                engine.database(),
                engine.config().masked_location(),
                engine.config().read_only,
                e,
            )
        })
    }
}

fn not_checked_out() -> sqlx::Error {
    sqlx::Error::Protocol("session is no longer checked out".to_string())
}

/// A session bound to one database name.
pub struct ConnectionHandle {
    adapter: Adapter,
    database: String,
    deadline: Duration,
    session: Option<Arc<Mutex<Option<PooledSession>>>>,
}

impl ConnectionHandle {
    pub(crate) fn new(
        adapter: Adapter,
        database: &str,
        deadline: Duration,
        session: Option<PooledSession>,
    ) -> Self {
        Self {
            adapter,
            database: database.to_string(),
            deadline,
            session: session.map(|s| Arc::new(Mutex::new(Some(s)))),
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    /// Whether the handle holds a dedicated pooled session.
    pub fn is_pooled(&self) -> bool {
        self.session.is_some()
    }

    /// Run a row-returning statement on this handle's session.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>> {
        let Some(slot) = self.session.as_ref().map(Arc::clone) else {
            return self.adapter.query(sql, params, Some(&self.database)).await;
        };

        run_with_deadline(self.request(sql, params), move |req| async move {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(PooledSession::Postgres(conn)) => {
                    executor::postgres::fetch_rows(&mut **conn, &req.sql, &req.params).await
                }
                Some(PooledSession::MySql(conn)) => {
                    executor::mysql::fetch_rows(&mut **conn, &req.sql, &req.params).await
                }
                None => Err(not_checked_out()),
            }
        })
        .await
    }

    /// Run a write statement on this handle's session.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<ExecuteResult> {
        let Some(slot) = self.session.as_ref().map(Arc::clone) else {
            return self.adapter.execute(sql, params, Some(&self.database)).await;
        };

        run_with_deadline(self.request(sql, params), move |req| async move {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(PooledSession::Postgres(conn)) => {
                    executor::postgres::execute(&mut **conn, &req.sql, &req.params).await
                }
                Some(PooledSession::MySql(conn)) => {
                    executor::mysql::execute(&mut **conn, &req.sql, &req.params).await
                }
                None => Err(not_checked_out()),
            }
        })
        .await
    }

    /// Give the session back to its engine.
    pub async fn release(self) {
        let adapter = self.adapter.clone();
        adapter.release_connection(self).await;
    }

    /// Return the pooled session, if any. Waits for an in-flight statement
    /// that still holds it.
    pub(crate) async fn return_to_pool(self) {
        if let Some(slot) = self.session {
            drop(slot.lock().await.take());
            debug!(database = %self.database, "Session returned to pool");
        }
    }

    fn request(&self, sql: &str, params: &[QueryParam]) -> QueryRequest {
        QueryRequest::new(sql, &self.database, self.deadline).with_params(params)
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("database", &self.database)
            .field("pooled", &self.is_pooled())
            .finish()
    }
}
