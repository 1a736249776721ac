//! Query-related data models.
//!
//! This module defines statement parameters, row records and write results.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;

/// One result row: column name to value, in column order.
pub type Record = serde_json::Map<String, JsonValue>;

/// A scalar parameter value, bound positionally to a statement placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value (stored as i64 for maximum range)
    Int(i64),
    /// Floating point value
    Float(f64),
    /// Text value
    Text(String),
    /// Binary data, as `{"$bytes": "<base64>"}` in JSON
    #[serde(with = "base64_bytes")]
    Bytes(Vec<u8>),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Text(_) => "text",
            Self::Bytes(_) => "bytes",
        }
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v.into())
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for QueryParam {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl From<Vec<u8>> for QueryParam {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<QueryParam>> From<Option<T>> for QueryParam {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Self::Null)
    }
}

/// Binary data as a base64 string wrapped in a `$bytes` object, so it cannot
/// be mistaken for text.
mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(deny_unknown_fields)]
    struct Tagged {
        #[serde(rename = "$bytes")]
        bytes: String,
    }

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        Tagged {
            bytes: STANDARD.encode(bytes),
        }
        .serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let tagged = Tagged::deserialize(deserializer)?;
        STANDARD
            .decode(&tagged.bytes)
            .map_err(serde::de::Error::custom)
    }
}

/// A single statement bound for execution against one named database.
///
/// Ephemeral: built per call and moved into the engine task, never retained.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub sql: String,
    pub params: Vec<QueryParam>,
    pub database: String,
    pub deadline: Duration,
}

impl QueryRequest {
    /// Create a new request with no parameters.
    pub fn new(sql: impl Into<String>, database: impl Into<String>, deadline: Duration) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
            database: database.into(),
            deadline,
        }
    }

    /// Replace the parameters.
    pub fn with_params(mut self, params: &[QueryParam]) -> Self {
        self.params = params.to_vec();
        self
    }
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    /// Engine-assigned id of the last inserted row, when the engine reports one.
    pub last_insert_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_param_types() {
        assert!(QueryParam::Null.is_null());
        assert!(!QueryParam::Bool(true).is_null());
        assert_eq!(QueryParam::Int(42).type_name(), "int");
        assert_eq!(QueryParam::from("hello").type_name(), "text");
    }

    #[test]
    fn test_query_param_conversions() {
        assert_eq!(QueryParam::from(7), QueryParam::Int(7));
        assert_eq!(QueryParam::from(None::<i64>), QueryParam::Null);
        assert_eq!(
            QueryParam::from(Some("x")),
            QueryParam::Text("x".to_string())
        );
    }

    #[test]
    fn test_query_param_json_untagged() {
        let params: Vec<QueryParam> =
            serde_json::from_str(r#"[null, true, 3, 1.5, "text"]"#).unwrap();
        assert_eq!(
            params,
            vec![
                QueryParam::Null,
                QueryParam::Bool(true),
                QueryParam::Int(3),
                QueryParam::Float(1.5),
                QueryParam::Text("text".to_string()),
            ]
        );
    }

    #[test]
    fn test_bytes_serialize_as_tagged_base64() {
        let json = serde_json::to_string(&QueryParam::Bytes(b"hi".to_vec())).unwrap();
        assert_eq!(json, r#"{"$bytes":"aGk="}"#);

        let back: QueryParam = serde_json::from_str(&json).unwrap();
        assert_eq!(back, QueryParam::Bytes(b"hi".to_vec()));

        // A bare base64-looking string stays text
        let text: QueryParam = serde_json::from_str(r#""aGk=""#).unwrap();
        assert_eq!(text, QueryParam::Text("aGk=".to_string()));
    }

    #[test]
    fn test_unknown_object_is_rejected() {
        assert!(serde_json::from_str::<QueryParam>(r#"{"blob":"aGk="}"#).is_err());
    }

    #[test]
    fn test_execute_result_default() {
        let result = ExecuteResult::default();
        assert_eq!(result.rows_affected, 0);
        assert!(result.last_insert_id.is_none());
    }
}
