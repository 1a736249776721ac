//! Transaction handles.
//!
//! A `TransactionHandle` owns one engine session for the lifetime of the
//! transaction. Statements issued through the handle run on that session,
//! under the same deadline race as every other statement. `commit` and
//! `rollback` consume the handle; dropping it while still active rolls the
//! transaction back.
//!
//! On SQLite the engine has a single session, so while a transaction is open
//! other work on the same database waits for it to finish (or times out).

use crate::db::engine::EnginePool;
use crate::db::executor::{self, run_with_deadline};
use crate::error::{DbError, DbResult};
use crate::models::{ExecuteResult, QueryParam, QueryRequest, Record};
use chrono::{DateTime, Utc};
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    Sqlite(Transaction<'static, Sqlite>),
    Postgres(Transaction<'static, Postgres>),
    MySql(Transaction<'static, MySql>),
}

impl DbTransaction {
    /// Check out a session from the pool and begin a transaction on it.
    pub async fn begin(pool: &EnginePool) -> Result<Self, sqlx::Error> {
        match pool {
            EnginePool::Sqlite(p) => p.begin().await.map(Self::Sqlite),
            EnginePool::Postgres(p) => p.begin().await.map(Self::Postgres),
            EnginePool::MySql(p) => p.begin().await.map(Self::MySql),
        }
    }

    pub async fn commit(self) -> Result<(), sqlx::Error> {
        match self {
            Self::Sqlite(tx) => tx.commit().await,
            Self::Postgres(tx) => tx.commit().await,
            Self::MySql(tx) => tx.commit().await,
        }
    }

    pub async fn rollback(self) -> Result<(), sqlx::Error> {
        match self {
            Self::Sqlite(tx) => tx.rollback().await,
            Self::Postgres(tx) => tx.rollback().await,
            Self::MySql(tx) => tx.rollback().await,
        }
    }
}

type Slot = Arc<Mutex<Option<DbTransaction>>>;

#[derive(Debug, Clone, Copy)]
enum Ending {
    Commit,
    Rollback,
}

impl Ending {
    fn as_str(self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Rollback => "rollback",
        }
    }
}

fn no_longer_active() -> sqlx::Error {
    sqlx::Error::Protocol("transaction is no longer active".to_string())
}

fn deadline_exceeded(deadline: Duration) -> sqlx::Error {
    sqlx::Error::Io(std::io::Error::new(
        std::io::ErrorKind::TimedOut,
        format!("did not finish within {}ms", deadline.as_millis()),
    ))
}

/// An open transaction on one database.
pub struct TransactionHandle {
    id: String,
    database: String,
    deadline: Duration,
    started_at: DateTime<Utc>,
    started: Instant,
    // Shared with in-flight statement tasks; a timed-out statement keeps the
    // session locked until it finishes.
    slot: Slot,
}

impl TransactionHandle {
    pub(crate) fn new(database: &str, deadline: Duration, transaction: DbTransaction) -> Self {
        Self {
            id: format!("tx_{}", uuid::Uuid::new_v4().simple()),
            database: database.to_string(),
            deadline,
            started_at: Utc::now(),
            started: Instant::now(),
            slot: Arc::new(Mutex::new(Some(transaction))),
        }
    }

    /// Unique identifier, for correlating log lines.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Run a row-returning statement inside the transaction.
    pub async fn query(&self, sql: &str, params: &[QueryParam]) -> DbResult<Vec<Record>> {
        let slot = Arc::clone(&self.slot);
        run_with_deadline(self.request(sql, params), move |req| async move {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(DbTransaction::Sqlite(tx)) => {
                    executor::sqlite::fetch_rows(&mut **tx, &req.sql, &req.params).await
                }
                Some(DbTransaction::Postgres(tx)) => {
                    executor::postgres::fetch_rows(&mut **tx, &req.sql, &req.params).await
                }
                Some(DbTransaction::MySql(tx)) => {
                    executor::mysql::fetch_rows(&mut **tx, &req.sql, &req.params).await
                }
                None => Err(no_longer_active()),
            }
        })
        .await
    }

    /// Run a write statement inside the transaction.
    pub async fn execute(&self, sql: &str, params: &[QueryParam]) -> DbResult<ExecuteResult> {
        let slot = Arc::clone(&self.slot);
        run_with_deadline(self.request(sql, params), move |req| async move {
            let mut guard = slot.lock().await;
            match guard.as_mut() {
                Some(DbTransaction::Sqlite(tx)) => {
                    executor::sqlite::execute(&mut **tx, &req.sql, &req.params).await
                }
                Some(DbTransaction::Postgres(tx)) => {
                    executor::postgres::execute(&mut **tx, &req.sql, &req.params).await
                }
                Some(DbTransaction::MySql(tx)) => {
                    executor::mysql::execute(&mut **tx, &req.sql, &req.params).await
                }
                None => Err(no_longer_active()),
            }
        })
        .await
    }

    /// Make the transaction's effects durable and end it.
    ///
    /// Bounded by the statement deadline. A statement that timed out earlier
    /// may still hold the session; if it does not let go in time this fails
    /// and the transaction is rolled back once that statement finishes.
    pub async fn commit(self) -> DbResult<()> {
        self.finish(Ending::Commit).await
    }

    /// Discard the transaction's effects and end it.
    ///
    /// Bounded by the statement deadline, like [`commit`](Self::commit).
    pub async fn rollback(self) -> DbResult<()> {
        self.finish(Ending::Rollback).await
    }

    async fn finish(&self, ending: Ending) -> DbResult<()> {
        let operation = ending.as_str();
        let outcome = tokio::time::timeout(self.deadline, async {
            let Some(transaction) = self.slot.lock().await.take() else {
                return Err(no_longer_active());
            };
            match ending {
                Ending::Commit => transaction.commit().await,
                Ending::Rollback => transaction.rollback().await,
            }
        })
        .await;

        match outcome {
            Ok(Ok(())) => {
                debug!(
                    transaction_id = %self.id,
                    database = %self.database,
                    operation,
                    elapsed_ms = self.started.elapsed().as_millis() as u64,
                    "Transaction finished"
                );
                Ok(())
            }
            Ok(Err(e)) => Err(DbError::transaction(operation, &self.database, e)),
            Err(_) => {
                warn!(
                    transaction_id = %self.id,
                    database = %self.database,
                    operation,
                    timeout_ms = self.deadline.as_millis() as u64,
                    "Transaction did not finish before the deadline"
                );
                Err(DbError::transaction(
                    operation,
                    &self.database,
                    deadline_exceeded(self.deadline),
                ))
            }
        }
    }

    fn request(&self, sql: &str, params: &[QueryParam]) -> QueryRequest {
        QueryRequest::new(sql, &self.database, self.deadline).with_params(params)
    }
}

impl Drop for TransactionHandle {
    fn drop(&mut self) {
        // Still locked means a statement task owns the session; it rolls back
        // when that task lets go of it.
        let abandoned = self.slot.try_lock().map(|g| g.is_some()).unwrap_or(true);
        if abandoned {
            warn!(
                transaction_id = %self.id,
                database = %self.database,
                "Transaction dropped without commit or rollback, rolling back"
            );
        }
    }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionHandle")
            .field("id", &self.id)
            .field("database", &self.database)
            .field("started_at", &self.started_at)
            .finish()
    }
}
