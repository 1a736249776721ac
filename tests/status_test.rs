//! Integration tests for health reporting.

use db_adapter::{Adapter, AdapterConfig, Backend, DatabaseAdapter, DatabaseConfig};
use serde_json::json;
use tempfile::TempDir;

#[tokio::test]
async fn test_all_databases_healthy() {
    let adapter = Adapter::new(
        AdapterConfig::in_memory().with_database("cache", DatabaseConfig::memory()),
    )
    .unwrap();

    let status = adapter.get_status().await;
    assert!(status.healthy);
    assert_eq!(status.backend, "sqlite");
    assert_eq!(status.databases.len(), 2);
    assert!(status.databases.values().all(|db| db.connected));
    assert!(status.failing().is_empty());
    assert!(adapter.is_healthy().await);
}

#[tokio::test]
async fn test_unreachable_database_is_reported() {
    let dir = TempDir::new().unwrap();
    let missing = dir.path().join("no-such-dir").join("x.db");

    let adapter = Adapter::new(
        AdapterConfig::new(Backend::Sqlite)
            .with_database("default", DatabaseConfig::memory())
            .with_database(
                "archive",
                DatabaseConfig::new(missing.to_string_lossy()).read_only(true),
            ),
    )
    .unwrap();

    let status = adapter.get_status().await;
    assert!(!status.healthy);
    assert!(status.databases["default"].connected);
    assert!(status.databases["default"].error.is_none());

    let archive = &status.databases["archive"];
    assert!(!archive.connected);
    assert!(archive.read_only);
    assert!(archive.error.as_deref().is_some_and(|e| !e.is_empty()));
    assert_eq!(status.failing(), vec!["archive"]);

    assert!(!adapter.is_healthy().await);
}

#[tokio::test]
async fn test_status_serializes_for_reporting() {
    let adapter = Adapter::new(AdapterConfig::in_memory()).unwrap();

    let status = adapter.get_status().await;
    let json = serde_json::to_value(&status).unwrap();
    assert_eq!(json["healthy"], true);
    assert_eq!(json["databases"]["default"]["location"], ":memory:");
    assert_eq!(json["databases"]["default"]["connected"], true);
}

#[tokio::test]
async fn test_status_after_close_reopens() {
    let adapter = Adapter::new(AdapterConfig::in_memory()).unwrap();
    assert!(adapter.is_healthy().await);

    adapter.close().await;
    assert_eq!(adapter.open_engines().await, 0);

    assert!(adapter.is_healthy().await);
    assert_eq!(adapter.open_engines().await, 1);
}

#[tokio::test]
async fn test_status_while_transaction_holds_session() {
    let adapter = Adapter::new(AdapterConfig::new(Backend::Sqlite).with_database(
        "default",
        DatabaseConfig::memory().timeout_ms(200),
    ))
    .unwrap();
    adapter
        .execute("CREATE TABLE jobs (id INTEGER)", &[], None)
        .await
        .unwrap();

    let tx = adapter.begin_transaction(None, None).await.unwrap();
    tx.execute("INSERT INTO jobs VALUES (1)", &[]).await.unwrap();

    let status = adapter.get_status().await;
    assert!(status.healthy);
    assert!(status.databases["default"].connected);
    assert!(status.databases["default"].error.is_none());

    tx.commit().await.unwrap();
    let rows = adapter
        .query("SELECT count(*) AS n FROM jobs", &[], None)
        .await
        .unwrap();
    assert_eq!(rows[0]["n"], json!(1));
}
