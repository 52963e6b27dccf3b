//! Spreadsheet materialization for gridfeed
//!
//! Everything that touches the workbook lives here, behind the
//! [`WorkbookHost`] trait: the persisted table-ownership registry, the
//! reconciler that turns an operation id plus a location hint into a
//! concrete write target, and the chunked writer that moves rows into the
//! host without tripping its write-rate limits. A simulated in-memory host
//! backs the tests of this crate and its dependents.

pub mod host;
pub mod ownership;
pub mod reconcile;
pub mod simulated;
pub mod writer;

pub use host::{TableInfo, WorkbookHost};
pub use ownership::{OwnershipRecord, OwnershipStore, REGISTRY_SHEET};
pub use reconcile::{resolve_target, Resolution, ResolvedTarget, TableReconciler, TableTarget};
pub use simulated::SimulatedWorkbook;
pub use writer::{ChunkResult, ChunkedWriter, WriteReport};
