//! Host spreadsheet API boundary
//!
//! No core logic depends on host-object shape beyond this trait. Real
//! bindings (the Office object model) implement it at the edge; tests use
//! [`crate::SimulatedWorkbook`]. A host that is not attached to a workbook
//! fails every call with [`gridfeed_core::Error::HostUnavailable`], which
//! materialization surfaces as a structured outcome rather than an error.

use async_trait::async_trait;
use gridfeed_core::{Result, Scalar};

/// What the pipeline needs to know about an existing host table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableInfo {
    pub sheet_name: String,
    pub table_name: String,
    pub header: Vec<String>,
    pub row_count: usize,
}

/// Abstract host spreadsheet operations.
///
/// Write calls are assumed rate-sensitive; callers sequence them and pace
/// chunked appends. Table names are unique workbook-wide.
#[async_trait]
pub trait WorkbookHost: Send + Sync {
    /// Every table in the workbook, with its containing sheet.
    async fn list_tables(&self) -> Result<Vec<TableInfo>>;

    /// A single table by name, or `None` if absent.
    async fn get_table(&self, name: &str) -> Result<Option<TableInfo>>;

    /// Create a table with header and rows as one range write.
    async fn create_table(
        &self,
        sheet: &str,
        name: &str,
        header: &[String],
        rows: &[Vec<Scalar>],
    ) -> Result<()>;

    /// Refresh the header row values of an existing table.
    async fn replace_header_values(&self, name: &str, header: &[String]) -> Result<()>;

    /// Remove all data-body rows, keeping the header.
    async fn clear_data_rows(&self, name: &str) -> Result<()>;

    /// Append a chunk of rows after the current data body.
    async fn append_rows(&self, name: &str, chunk: &[Vec<Scalar>]) -> Result<()>;

    /// Delete the table object (not the sheet).
    async fn delete_table(&self, name: &str) -> Result<()>;

    /// Bring the written location into view.
    async fn activate_location(&self, sheet: &str, table: &str) -> Result<()>;

    /// Raw string rows of a sheet, or `None` if the sheet does not exist.
    /// Used for the hidden registry sheet.
    async fn read_sheet_rows(&self, sheet: &str) -> Result<Option<Vec<Vec<String>>>>;

    /// Replace a sheet's contents with the given string rows, creating the
    /// sheet (hidden when requested) if needed.
    async fn overwrite_sheet_rows(
        &self,
        sheet: &str,
        rows: &[Vec<String>],
        hidden: bool,
    ) -> Result<()>;
}
