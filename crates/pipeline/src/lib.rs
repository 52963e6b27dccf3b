//! Pipeline facade for gridfeed
//!
//! Glues the collaborators together: auth gate, catalog lookup, cache,
//! orchestrated fetch with the row policy, and, as a separate explicit
//! step, materialization into a host table via the reconciler and the
//! chunked writer.

pub mod facade;

pub use facade::{DataPipeline, MaterializeOutcome, OperationOutcome, PipelineBuilder};
