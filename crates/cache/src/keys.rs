//! Deterministic cache key derivation
//!
//! The key is `operationId + ":" + JSON(parameters)` with parameter keys
//! sorted before serialization, so two maps holding the same pairs in any
//! insertion order always derive the same key.

use gridfeed_core::{OperationId, ParameterMap, Result, Scalar};
use std::collections::BTreeMap;

/// Derive the cache key for an operation and its parameters.
pub fn cache_key(operation_id: &OperationId, params: &ParameterMap) -> Result<String> {
    let sorted: BTreeMap<&str, &Scalar> = params.iter().map(|(k, v)| (k.as_str(), v)).collect();
    let serialized = serde_json::to_string(&sorted)?;
    Ok(format!("{operation_id}:{serialized}"))
}
