use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Result type alias for gridfeed operations
pub type Result<T> = std::result::Result<T, Error>;

/// Reasons a token can fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthReason {
    Expired,
    Revoked,
    InvalidSignature,
    NotFound,
    Malformed,
}

impl std::fmt::Display for AuthReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let reason = match self {
            AuthReason::Expired => "expired",
            AuthReason::Revoked => "revoked",
            AuthReason::InvalidSignature => "invalid_signature",
            AuthReason::NotFound => "not_found",
            AuthReason::Malformed => "malformed",
        };
        f.write_str(reason)
    }
}

/// Core error type for gridfeed operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Token validation failed; the pipeline fails fast and never retries.
    #[error("authentication failed (401): token {reason}")]
    Auth { reason: AuthReason },

    /// The requested operation is not registered in the catalog.
    #[error("operation '{operation_id}' not found in catalog")]
    OperationNotFound { operation_id: String },

    /// A fetch exceeded its configured deadline. Distinct from a network
    /// failure so callers can tell a slow source from a broken one.
    #[error("fetch of '{resource}' timed out after {elapsed:?}")]
    FetchTimeout { resource: String, elapsed: Duration },

    /// The remote source failed or returned an error payload.
    #[error("fetch of '{resource}' failed: {message}")]
    FetchNetwork {
        resource: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A remote result set is no longer available and the statement must be
    /// re-executed (server-side cache expiry or cancellation).
    #[error("result set for '{resource}' is gone: {message}")]
    ResourceGone { resource: String, message: String },

    /// The spreadsheet host is not attached. Materialization surfaces this
    /// as a structured outcome rather than propagating it.
    #[error("spreadsheet host unavailable: {reason}")]
    HostUnavailable { reason: String },

    /// A host table operation failed.
    #[error("host table operation '{operation}' on '{table}' failed: {message}")]
    HostOperation {
        operation: String,
        table: String,
        message: String,
    },

    /// Cache store errors
    #[error("cache error: {message}")]
    Cache { message: String },

    /// Configuration errors
    #[error("configuration error: {message}")]
    Configuration { message: String },

    /// File system operations
    #[error("file system {operation} operation failed for '{path}': {source}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Coarse failure classification carried on telemetry events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorType {
    Transient,
    Permanent,
    Resource,
    Unknown,
}

/// Diagnostic summary of an error, attached to telemetry context. Never the
/// only signal: the typed error and its display message always accompany it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub operation: String,
    pub message: String,
    pub error_type: ErrorType,
    pub retriable: bool,
}

// Conversion implementations
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Error::FileSystem {
            path: PathBuf::new(),
            operation: "unknown".to_string(),
            source: error,
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::Json {
            message: error.to_string(),
            source: error,
        }
    }
}

// Helper methods for creating errors with context
impl Error {
    /// Create an authentication error
    #[must_use]
    pub fn auth(reason: AuthReason) -> Self {
        Error::Auth { reason }
    }

    /// Create an operation-not-found error
    #[must_use]
    pub fn operation_not_found(operation_id: impl Into<String>) -> Self {
        Error::OperationNotFound {
            operation_id: operation_id.into(),
        }
    }

    /// Create a fetch timeout error naming the resource and the bound
    #[must_use]
    pub fn fetch_timeout(resource: impl Into<String>, elapsed: Duration) -> Self {
        Error::FetchTimeout {
            resource: resource.into(),
            elapsed,
        }
    }

    /// Create a fetch network error
    #[must_use]
    pub fn fetch_network(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::FetchNetwork {
            resource: resource.into(),
            message: message.into(),
            source: None,
        }
    }

    /// Create a fetch network error with a source error
    #[must_use]
    pub fn fetch_network_with_source(
        resource: impl Into<String>,
        message: impl Into<String>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        Error::FetchNetwork {
            resource: resource.into(),
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// Create a resource-gone error
    #[must_use]
    pub fn resource_gone(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ResourceGone {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// Create a host-unavailable error
    #[must_use]
    pub fn host_unavailable(reason: impl Into<String>) -> Self {
        Error::HostUnavailable {
            reason: reason.into(),
        }
    }

    /// Create a host table operation error
    #[must_use]
    pub fn host_operation(
        operation: impl Into<String>,
        table: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Error::HostOperation {
            operation: operation.into(),
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a cache error
    #[must_use]
    pub fn cache(message: impl Into<String>) -> Self {
        Error::Cache {
            message: message.into(),
        }
    }

    /// Create a configuration error
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    /// Create a file system error with context
    #[must_use]
    pub fn file_system(
        path: impl Into<PathBuf>,
        operation: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Error::FileSystem {
            path: path.into(),
            operation: operation.into(),
            source,
        }
    }

    /// Classify this error for diagnostics: coarse type plus whether a
    /// retry of the same call could plausibly succeed.
    #[must_use]
    pub fn classify(&self) -> (ErrorType, bool) {
        match self {
            Error::Auth { .. } => (ErrorType::Permanent, false),
            Error::OperationNotFound { .. } => (ErrorType::Permanent, false),
            Error::FetchTimeout { .. } => (ErrorType::Transient, true),
            Error::FetchNetwork { .. } => (ErrorType::Transient, true),
            Error::ResourceGone { .. } => (ErrorType::Resource, true),
            Error::HostUnavailable { .. } => (ErrorType::Resource, false),
            Error::HostOperation { .. } => (ErrorType::Transient, true),
            Error::Cache { .. } => (ErrorType::Unknown, false),
            Error::Configuration { .. } => (ErrorType::Permanent, false),
            Error::FileSystem { .. } => (ErrorType::Resource, false),
            Error::Json { .. } => (ErrorType::Permanent, false),
        }
    }

    /// Build the diagnostic summary attached to telemetry for this error.
    #[must_use]
    pub fn info(&self, operation: impl Into<String>) -> ErrorInfo {
        let (error_type, retriable) = self.classify();
        ErrorInfo {
            operation: operation.into(),
            message: self.to_string(),
            error_type,
            retriable,
        }
    }
}
