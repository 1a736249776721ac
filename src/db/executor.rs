//! Statement execution.
//!
//! Every statement runs as its own tokio task raced against the database
//! deadline. When the deadline wins the caller gets `DbError::QueryTimeout`
//! immediately; the task is left to finish on its own and its result is
//! discarded. Engine faults are re-wrapped once, here, into `DbError::Query`.
//!
//! # Architecture
//!
//! The engine-specific work lives in submodules:
//! - `mysql`: MySQL-specific query and write operations
//! - `postgres`: PostgreSQL-specific query and write operations
//! - `sqlite`: SQLite-specific query and write operations
//!
//! The submodule functions are generic over `sqlx::Executor`, so the same code
//! serves pools, checked-out connections and open transactions.

use crate::db::engine::EnginePool;
use crate::db::types::ToRecord;
use crate::error::{DbError, DbResult};
use crate::models::{ExecuteResult, QueryParam, QueryRequest, Record};
use sqlparser::ast::{SetExpr, Statement};
use sqlparser::dialect::Dialect;
use sqlparser::keywords::Keyword;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, warn};

/// Run engine work as a task and race it against the request deadline.
///
/// `work` receives the shared request so the spawned task owns its SQL text
/// and parameters.
pub(crate) async fn run_with_deadline<T, F, Fut>(request: QueryRequest, work: F) -> DbResult<T>
where
    T: Send + 'static,
    F: FnOnce(Arc<QueryRequest>) -> Fut,
    Fut: Future<Output = Result<T, sqlx::Error>> + Send + 'static,
{
    let start = Instant::now();
    let request = Arc::new(request);
    let task = tokio::spawn(work(Arc::clone(&request)));

    debug!(
        database = %request.database,
        sql = %request.sql,
        params = request.params.len(),
        timeout_ms = request.deadline.as_millis() as u64,
        "Executing statement"
    );

    tokio::select! {
        biased;

        joined = task => match joined {
            Ok(Ok(value)) => {
                debug!(
                    database = %request.database,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Statement completed"
                );
                Ok(value)
            }
            Ok(Err(e)) => {
                debug!(database = %request.database, error = %e, "Statement failed");
                Err(DbError::query(&request.sql, &request.params, &request.database, e))
            }
            Err(join_error) => {
                error!(
                    database = %request.database,
                    error = %join_error,
                    "Statement task aborted"
                );
                Err(DbError::query(
                    &request.sql,
                    &request.params,
                    &request.database,
                    sqlx::Error::WorkerCrashed,
                ))
            }
        },
        _ = tokio::time::sleep(request.deadline) => {
            warn!(
                database = %request.database,
                sql = %request.sql,
                timeout_ms = request.deadline.as_millis() as u64,
                "Statement exceeded deadline"
            );
            Err(DbError::query_timeout(&request.sql, &request.database, request.deadline))
        }
    }
}

/// Run a row-returning statement against an engine pool.
pub(crate) async fn fetch_rows(pool: &EnginePool, request: QueryRequest) -> DbResult<Vec<Record>> {
    match pool.clone() {
        EnginePool::Sqlite(p) => {
            run_with_deadline(request, move |req| async move {
                sqlite::fetch_rows(&p, &req.sql, &req.params).await
            })
            .await
        }
        EnginePool::Postgres(p) => {
            run_with_deadline(request, move |req| async move {
                postgres::fetch_rows(&p, &req.sql, &req.params).await
            })
            .await
        }
        EnginePool::MySql(p) => {
            run_with_deadline(request, move |req| async move {
                mysql::fetch_rows(&p, &req.sql, &req.params).await
            })
            .await
        }
    }
}

/// Run a write statement against an engine pool.
pub(crate) async fn execute(pool: &EnginePool, request: QueryRequest) -> DbResult<ExecuteResult> {
    match pool.clone() {
        EnginePool::Sqlite(p) => {
            run_with_deadline(request, move |req| async move {
                sqlite::execute(&p, &req.sql, &req.params).await
            })
            .await
        }
        EnginePool::Postgres(p) => {
            run_with_deadline(request, move |req| async move {
                postgres::execute(&p, &req.sql, &req.params).await
            })
            .await
        }
        EnginePool::MySql(p) => {
            run_with_deadline(request, move |req| async move {
                mysql::execute(&p, &req.sql, &req.params).await
            })
            .await
        }
    }
}

/// Key generated by a write, if it generated one.
///
/// Engines report "no generated key" as 0 and keep the last generated key per
/// session, so only a statement that inserted rows may report one.
fn generated_id(dialect: &dyn Dialect, sql: &str, rows_affected: u64, id: i64) -> Option<i64> {
    (id != 0 && rows_affected > 0 && inserts_rows(dialect, sql)).then_some(id)
}

/// Whether `sql` contains an INSERT or REPLACE, including one behind a WITH clause.
fn inserts_rows(dialect: &dyn Dialect, sql: &str) -> bool {
    match Parser::parse_sql(dialect, sql) {
        Ok(statements) => statements.iter().any(is_insert),
        // Statements the dialect cannot parse (SQLite REPLACE INTO) go by their first keyword
        Err(_) => matches!(
            leading_keyword(dialect, sql),
            Some(Keyword::INSERT | Keyword::REPLACE)
        ),
    }
}

fn is_insert(statement: &Statement) -> bool {
    match statement {
        Statement::Insert(_) => true,
        Statement::Query(query) => matches!(query.body.as_ref(), SetExpr::Insert(_)),
        _ => false,
    }
}

fn leading_keyword(dialect: &dyn Dialect, sql: &str) -> Option<Keyword> {
    let tokens = Tokenizer::new(dialect, sql).tokenize().ok()?;
    tokens.into_iter().find_map(|token| match token {
        Token::Whitespace(_) => None,
        Token::Word(word) => Some(Some(word.keyword)),
        _ => Some(None),
    })?
}

// =============================================================================
// Database-Specific Implementations
// =============================================================================
//
// Each module below provides the same interface adapted to its database type.
// The code structure is intentionally parallel to make differences obvious.
// Statements without parameters are sent unprepared (some SQL, like
// CREATE PROCEDURE or PRAGMA, does not support prepared statements).

pub(crate) mod mysql {
    use super::*;
    use crate::db::params::bind_mysql_param;
    use sqlparser::dialect::MySqlDialect;
    use sqlx::{Executor, MySql};

    pub async fn fetch_rows<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Record>, sqlx::Error>
    where
        E: Executor<'c, Database = MySql>,
    {
        let rows = if params.is_empty() {
            executor.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.fetch_all(executor).await?
        };
        Ok(rows.iter().map(ToRecord::to_record).collect())
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<ExecuteResult, sqlx::Error>
    where
        E: Executor<'c, Database = MySql>,
    {
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(executor).await?
        };
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: i64::try_from(result.last_insert_id())
                .ok()
                .and_then(|id| generated_id(&MySqlDialect {}, sql, result.rows_affected(), id)),
        })
    }
}

pub(crate) mod postgres {
    use super::*;
    use crate::db::params::bind_postgres_param;
    use sqlx::{Executor, Postgres};

    pub async fn fetch_rows<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Record>, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let rows = if params.is_empty() {
            executor.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.fetch_all(executor).await?
        };
        Ok(rows.iter().map(ToRecord::to_record).collect())
    }

    /// PostgreSQL has no implicit generated key; use `RETURNING` with a query.
    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<ExecuteResult, sqlx::Error>
    where
        E: Executor<'c, Database = Postgres>,
    {
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(executor).await?
        };
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: None,
        })
    }
}

pub(crate) mod sqlite {
    use super::*;
    use crate::db::params::bind_sqlite_param;
    use sqlparser::dialect::SQLiteDialect;
    use sqlx::{Executor, Sqlite};

    pub async fn fetch_rows<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<Vec<Record>, sqlx::Error>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let rows = if params.is_empty() {
            executor.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch_all(executor).await?
        };
        Ok(rows.iter().map(ToRecord::to_record).collect())
    }

    pub async fn execute<'c, E>(
        executor: E,
        sql: &str,
        params: &[QueryParam],
    ) -> Result<ExecuteResult, sqlx::Error>
    where
        E: Executor<'c, Database = Sqlite>,
    {
        let result = if params.is_empty() {
            executor.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(executor).await?
        };
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_id: generated_id(
                &SQLiteDialect {},
                sql,
                result.rows_affected(),
                result.last_insert_rowid(),
            ),
        })
    }
}
