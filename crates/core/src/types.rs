//! Domain data model shared across the pipeline
//!
//! Operations are identified by an opaque [`OperationId`] and carry a
//! caller-supplied [`ParameterMap`]. Fetched data is a list of [`ResultRow`]s
//! whose column sets may vary row-to-row; normalization to a single header
//! happens at write time, not here.

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Opaque identifier of a catalog-registered data operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(String);

impl OperationId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OperationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OperationId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for OperationId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A single scalar cell value.
///
/// The untagged representation keeps persisted rows in plain JSON. Date-time
/// is listed before text so RFC 3339 strings round-trip as timestamps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    DateTime(DateTime<Utc>),
    Text(String),
}

impl Scalar {
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Scalar::Null)
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Scalar::Null => Ok(()),
            Scalar::Bool(b) => write!(f, "{b}"),
            Scalar::Int(i) => write!(f, "{i}"),
            Scalar::Float(v) => write!(f, "{v}"),
            Scalar::DateTime(ts) => write!(f, "{}", ts.to_rfc3339()),
            Scalar::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::Text(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::Text(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<serde_json::Value> for Scalar {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Scalar::Null,
            serde_json::Value::Bool(b) => Scalar::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Scalar::Int(i)
                } else {
                    Scalar::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Scalar::Text(s),
            other => Scalar::Text(other.to_string()),
        }
    }
}

/// Caller-supplied operation parameters. Insertion order is preserved for
/// display but is irrelevant for identity: the cache key sorts keys first.
pub type ParameterMap = IndexMap<String, Scalar>;

/// One fetched row: column name to value, in source column order.
pub type ResultRow = IndexMap<String, Scalar>;

/// A catalog entry: a named statement template plus defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationDefinition {
    pub id: OperationId,
    pub name: String,
    /// Statement template with named-parameter placeholders.
    pub statement: String,
    /// Defaults merged under caller parameters (caller wins).
    #[serde(default)]
    pub default_parameters: ParameterMap,
    /// Per-operation result TTL override, milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_ttl_ms: Option<u64>,
}

impl OperationDefinition {
    #[must_use]
    pub fn new(id: impl Into<OperationId>, name: impl Into<String>, statement: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            statement: statement.into(),
            default_parameters: ParameterMap::new(),
            result_ttl_ms: None,
        }
    }

    /// Merge caller parameters over the operation defaults.
    #[must_use]
    pub fn effective_parameters(&self, caller: &ParameterMap) -> ParameterMap {
        let mut merged = self.default_parameters.clone();
        for (key, value) in caller {
            merged.insert(key.clone(), value.clone());
        }
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_json_round_trip_preserves_variants() {
        let row: ResultRow = [
            ("name".to_string(), Scalar::from("widgets")),
            ("count".to_string(), Scalar::Int(42)),
            ("ratio".to_string(), Scalar::Float(0.5)),
            ("active".to_string(), Scalar::Bool(true)),
            ("note".to_string(), Scalar::Null),
        ]
        .into_iter()
        .collect();

        let json = serde_json::to_string(&row).unwrap();
        let back: ResultRow = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }

    #[test]
    fn rfc3339_strings_deserialize_as_timestamps() {
        let scalar: Scalar = serde_json::from_str("\"2024-03-01T12:00:00Z\"").unwrap();
        assert!(matches!(scalar, Scalar::DateTime(_)));

        let scalar: Scalar = serde_json::from_str("\"plain text\"").unwrap();
        assert!(matches!(scalar, Scalar::Text(_)));
    }

    #[test]
    fn effective_parameters_prefer_caller_values() {
        let mut op = OperationDefinition::new("sales", "Sales", "SELECT 1");
        op.default_parameters.insert("region".into(), Scalar::from("emea"));
        op.default_parameters.insert("limit".into(), Scalar::Int(10));

        let caller: ParameterMap = [("region".to_string(), Scalar::from("apac"))]
            .into_iter()
            .collect();

        let merged = op.effective_parameters(&caller);
        assert_eq!(merged.get("region"), Some(&Scalar::from("apac")));
        assert_eq!(merged.get("limit"), Some(&Scalar::Int(10)));
    }
}
