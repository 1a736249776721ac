//! Health status models returned by `get_status`.

use serde::Serialize;
use std::collections::BTreeMap;

/// Aggregate health of every configured database.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// True only if every database answered the canary read.
    pub healthy: bool,
    /// Backend name: "sqlite", "postgres" or "mysql"
    pub backend: String,
    pub databases: BTreeMap<String, DatabaseStatus>,
}

impl HealthStatus {
    /// Names of the databases that failed their check.
    pub fn failing(&self) -> Vec<&str> {
        self.databases
            .iter()
            .filter(|(_, status)| !status.connected)
            .map(|(name, _)| name.as_str())
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseStatus {
    pub connected: bool,
    /// Credentials masked
    pub location: String,
    pub read_only: bool,
    /// Fault message when the check failed.
    pub error: Option<String>,
}

impl DatabaseStatus {
    pub fn up(location: impl Into<String>, read_only: bool) -> Self {
        Self {
            connected: true,
            location: location.into(),
            read_only,
            error: None,
        }
    }

    pub fn down(location: impl Into<String>, read_only: bool, error: impl Into<String>) -> Self {
        Self {
            connected: false,
            location: location.into(),
            read_only,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_lists_disconnected() {
        let mut databases = BTreeMap::new();
        databases.insert("a".to_string(), DatabaseStatus::up(":memory:", false));
        databases.insert(
            "b".to_string(),
            DatabaseStatus::down("/missing/b.db", true, "unable to open database file"),
        );
        let status = HealthStatus {
            healthy: false,
            backend: "sqlite".to_string(),
            databases,
        };
        assert_eq!(status.failing(), vec!["b"]);
    }

    #[test]
    fn test_status_serializes_null_error() {
        let json = serde_json::to_value(DatabaseStatus::up(":memory:", false)).unwrap();
        assert_eq!(json["connected"], true);
        assert!(json["error"].is_null());
    }
}
