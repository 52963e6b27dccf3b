//! In-memory workbook for tests
//!
//! Models just enough of a host workbook for the pipeline: named tables
//! with a header and data body, raw sheets for the registry, an active
//! location, and switches for detaching the host and injecting append
//! failures.

use crate::host::{TableInfo, WorkbookHost};
use async_trait::async_trait;
use gridfeed_core::{Error, Result, Scalar};
use indexmap::IndexMap;
use parking_lot::Mutex;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct SimTable {
    sheet: String,
    header: Vec<String>,
    rows: Vec<Vec<Scalar>>,
}

#[derive(Debug)]
struct WorkbookState {
    tables: IndexMap<String, SimTable>,
    sheets: HashMap<String, (Vec<Vec<String>>, bool)>,
    active: Option<(String, String)>,
    attached: bool,
    fail_append_at: Option<usize>,
    append_calls: usize,
}

impl Default for WorkbookState {
    fn default() -> Self {
        Self {
            tables: IndexMap::new(),
            sheets: HashMap::new(),
            active: None,
            attached: true,
            fail_append_at: None,
            append_calls: 0,
        }
    }
}

/// Simulated host workbook.
#[derive(Debug, Default)]
pub struct SimulatedWorkbook {
    state: Mutex<WorkbookState>,
}

impl SimulatedWorkbook {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A workbook the host never attached to; every call fails with
    /// `HostUnavailable`.
    #[must_use]
    pub fn detached() -> Self {
        let workbook = Self::new();
        workbook.state.lock().attached = false;
        workbook
    }

    /// Seed a table as if the user had created it by hand.
    pub fn insert_table(
        &self,
        sheet: impl Into<String>,
        name: impl Into<String>,
        header: Vec<String>,
        rows: Vec<Vec<Scalar>>,
    ) {
        let mut state = self.state.lock();
        state.tables.insert(
            name.into(),
            SimTable {
                sheet: sheet.into(),
                header,
                rows,
            },
        );
    }

    /// Make the Nth `append_rows` call (1-based) fail.
    pub fn fail_append_at(&self, call: usize) {
        self.state.lock().fail_append_at = Some(call);
    }

    #[must_use]
    pub fn table_header(&self, name: &str) -> Option<Vec<String>> {
        self.state.lock().tables.get(name).map(|t| t.header.clone())
    }

    #[must_use]
    pub fn table_rows(&self, name: &str) -> Option<Vec<Vec<Scalar>>> {
        self.state.lock().tables.get(name).map(|t| t.rows.clone())
    }

    #[must_use]
    pub fn table_sheet(&self, name: &str) -> Option<String> {
        self.state.lock().tables.get(name).map(|t| t.sheet.clone())
    }

    #[must_use]
    pub fn append_call_count(&self) -> usize {
        self.state.lock().append_calls
    }

    #[must_use]
    pub fn active_location(&self) -> Option<(String, String)> {
        self.state.lock().active.clone()
    }

    #[must_use]
    pub fn is_sheet_hidden(&self, name: &str) -> Option<bool> {
        self.state.lock().sheets.get(name).map(|(_, hidden)| *hidden)
    }

    fn check_attached(state: &WorkbookState) -> Result<()> {
        if state.attached {
            Ok(())
        } else {
            Err(Error::host_unavailable("not running inside a workbook host"))
        }
    }
}

#[async_trait]
impl WorkbookHost for SimulatedWorkbook {
    async fn list_tables(&self) -> Result<Vec<TableInfo>> {
        let state = self.state.lock();
        Self::check_attached(&state)?;
        Ok(state
            .tables
            .iter()
            .map(|(name, table)| TableInfo {
                sheet_name: table.sheet.clone(),
                table_name: name.clone(),
                header: table.header.clone(),
                row_count: table.rows.len(),
            })
            .collect())
    }

    async fn get_table(&self, name: &str) -> Result<Option<TableInfo>> {
        let state = self.state.lock();
        Self::check_attached(&state)?;
        Ok(state.tables.get(name).map(|table| TableInfo {
            sheet_name: table.sheet.clone(),
            table_name: name.to_string(),
            header: table.header.clone(),
            row_count: table.rows.len(),
        }))
    }

    async fn create_table(
        &self,
        sheet: &str,
        name: &str,
        header: &[String],
        rows: &[Vec<Scalar>],
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        if state.tables.contains_key(name) {
            return Err(Error::host_operation(
                "create_table",
                name,
                "a table with this name already exists",
            ));
        }
        state.tables.insert(
            name.to_string(),
            SimTable {
                sheet: sheet.to_string(),
                header: header.to_vec(),
                rows: rows.to_vec(),
            },
        );
        Ok(())
    }

    async fn replace_header_values(&self, name: &str, header: &[String]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        match state.tables.get_mut(name) {
            Some(table) => {
                table.header = header.to_vec();
                Ok(())
            }
            None => Err(Error::host_operation(
                "replace_header_values",
                name,
                "table not found",
            )),
        }
    }

    async fn clear_data_rows(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        match state.tables.get_mut(name) {
            Some(table) => {
                table.rows.clear();
                Ok(())
            }
            None => Err(Error::host_operation("clear_data_rows", name, "table not found")),
        }
    }

    async fn append_rows(&self, name: &str, chunk: &[Vec<Scalar>]) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        state.append_calls += 1;
        if state.fail_append_at == Some(state.append_calls) {
            return Err(Error::host_operation(
                "append_rows",
                name,
                "injected append failure",
            ));
        }
        match state.tables.get_mut(name) {
            Some(table) => {
                table.rows.extend(chunk.iter().cloned());
                Ok(())
            }
            None => Err(Error::host_operation("append_rows", name, "table not found")),
        }
    }

    async fn delete_table(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        if state.tables.shift_remove(name).is_none() {
            return Err(Error::host_operation("delete_table", name, "table not found"));
        }
        Ok(())
    }

    async fn activate_location(&self, sheet: &str, table: &str) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        state.active = Some((sheet.to_string(), table.to_string()));
        Ok(())
    }

    async fn read_sheet_rows(&self, sheet: &str) -> Result<Option<Vec<Vec<String>>>> {
        let state = self.state.lock();
        Self::check_attached(&state)?;
        Ok(state.sheets.get(sheet).map(|(rows, _)| rows.clone()))
    }

    async fn overwrite_sheet_rows(
        &self,
        sheet: &str,
        rows: &[Vec<String>],
        hidden: bool,
    ) -> Result<()> {
        let mut state = self.state.lock();
        Self::check_attached(&state)?;
        state
            .sheets
            .insert(sheet.to_string(), (rows.to_vec(), hidden));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn detached_workbook_fails_every_call() {
        let workbook = SimulatedWorkbook::detached();
        let err = workbook.list_tables().await.unwrap_err();
        assert!(matches!(err, Error::HostUnavailable { .. }));
    }

    #[tokio::test]
    async fn created_tables_are_listed_with_their_sheet() {
        let workbook = SimulatedWorkbook::new();
        workbook
            .create_table(
                "Sheet1",
                "tbl_Sales",
                &["region".to_string()],
                &[vec![Scalar::from("emea")]],
            )
            .await
            .unwrap();

        let tables = workbook.list_tables().await.unwrap();
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].sheet_name, "Sheet1");
        assert_eq!(tables[0].row_count, 1);
    }

    #[tokio::test]
    async fn injected_append_failure_fires_on_the_requested_call() {
        let workbook = SimulatedWorkbook::new();
        workbook
            .create_table("Sheet1", "t", &["a".to_string()], &[])
            .await
            .unwrap();
        workbook.fail_append_at(2);

        assert!(workbook.append_rows("t", &[vec![Scalar::Int(1)]]).await.is_ok());
        assert!(workbook.append_rows("t", &[vec![Scalar::Int(2)]]).await.is_err());
        assert!(workbook.append_rows("t", &[vec![Scalar::Int(3)]]).await.is_ok());
        assert_eq!(workbook.table_rows("t").unwrap().len(), 2);
    }
}
