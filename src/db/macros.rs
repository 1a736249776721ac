//! Engine dispatch macro.
//!
//! Expands one body per `EnginePool` variant so pool-generic sqlx calls can
//! be written once. Each arm is type-checked against its own pool type.

/// Run the same expression against whichever pool an engine holds.
///
/// # Example
///
/// ```ignore
/// with_engine!(engine.pool(), pool => pool.size())
/// ```
#[macro_export]
macro_rules! with_engine {
    ($pool:expr, $p:ident => $body:expr) => {
        match $pool {
            $crate::db::engine::EnginePool::Sqlite($p) => $body,
            $crate::db::engine::EnginePool::Postgres($p) => $body,
            $crate::db::engine::EnginePool::MySql($p) => $body,
        }
    };
}
