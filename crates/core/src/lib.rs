//! Core types and contracts for gridfeed
//!
//! This crate holds everything the other gridfeed crates share: the error
//! taxonomy, the scalar/row data model, the telemetry event contract, and the
//! collaborator traits (token validation, operation catalog) that are
//! implemented at the edges of the system.

pub mod auth;
pub mod catalog;
pub mod errors;
pub mod events;
pub mod types;

pub use auth::{StaticValidator, TokenStatus, TokenValidator};
pub use catalog::{OperationCatalog, StaticCatalog};
pub use errors::{AuthReason, Error, ErrorInfo, ErrorType, Result};
pub use events::{
    BufferSink, EventCategory, NullSink, Severity, TelemetryEvent, TelemetrySink, TracingSink,
};
pub use types::{OperationDefinition, OperationId, ParameterMap, ResultRow, Scalar};
