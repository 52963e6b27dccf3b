//! Remote data retrieval for gridfeed
//!
//! The [`FetchOrchestrator`] is the single gate every remote fetch passes
//! through: it bounds process-wide concurrency with a fair queue and puts a
//! deadline on each logical fetch. Data sources are interchangeable
//! adapters behind the [`DataSource`] trait; the shipped one executes SQL
//! statements against a warehouse REST API. The [`RowPipeline`] applies the
//! configured row-count policy to whatever a source returns.

pub mod orchestrator;
pub mod rows;
pub mod source;
pub mod statement;

pub use orchestrator::FetchOrchestrator;
pub use rows::{RowLimitPolicy, RowLimitWarning, RowPipeline};
pub use source::{DataSource, FetchRequest, FetchResponse, InMemorySource};
pub use statement::StatementSource;
