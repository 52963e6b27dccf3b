//! Persisted table-ownership registry
//!
//! Which (sheet, table) pairs this system manages, per operation id, stored
//! as tabular rows with a header in a dedicated hidden sheet inside the
//! workbook. Records persist independently of whether the table still
//! exists; staleness is the reconciler's problem. Read-then-write here is
//! not transactional; the add-in assumes a single writer per workbook.

use crate::host::WorkbookHost;
use chrono::{DateTime, Utc};
use gridfeed_core::{OperationId, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

/// Name of the hidden registry sheet.
pub const REGISTRY_SHEET: &str = "_gridfeed_registry";

const REGISTRY_HEADER: [&str; 5] = [
    "sheetName",
    "tableName",
    "operationId",
    "isManaged",
    "lastTouchedUtc",
];

/// One registry row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnershipRecord {
    pub sheet_name: String,
    pub table_name: String,
    pub operation_id: OperationId,
    pub is_managed: bool,
    pub last_touched_utc: DateTime<Utc>,
}

impl OwnershipRecord {
    /// A managed record touched now.
    #[must_use]
    pub fn managed(
        sheet_name: impl Into<String>,
        table_name: impl Into<String>,
        operation_id: OperationId,
    ) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            table_name: table_name.into(),
            operation_id,
            is_managed: true,
            last_touched_utc: Utc::now(),
        }
    }

    fn matches(&self, sheet_name: &str, table_name: &str, operation_id: &OperationId) -> bool {
        self.sheet_name == sheet_name
            && self.table_name == table_name
            && &self.operation_id == operation_id
    }

    fn to_row(&self) -> Vec<String> {
        vec![
            self.sheet_name.clone(),
            self.table_name.clone(),
            self.operation_id.to_string(),
            self.is_managed.to_string(),
            self.last_touched_utc.to_rfc3339(),
        ]
    }

    fn from_row(row: &[String]) -> Option<Self> {
        if row.len() != REGISTRY_HEADER.len() {
            return None;
        }
        let is_managed = match row[3].to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => return None,
        };
        let last_touched_utc = DateTime::parse_from_rfc3339(&row[4])
            .ok()?
            .with_timezone(&Utc);
        Some(Self {
            sheet_name: row[0].clone(),
            table_name: row[1].clone(),
            operation_id: OperationId::new(row[2].clone()),
            is_managed,
            last_touched_utc,
        })
    }
}

/// Registry store bound to one workbook.
pub struct OwnershipStore {
    host: Arc<dyn WorkbookHost>,
    sheet_name: String,
}

impl OwnershipStore {
    #[must_use]
    pub fn new(host: Arc<dyn WorkbookHost>) -> Self {
        Self::with_sheet(host, REGISTRY_SHEET)
    }

    #[must_use]
    pub fn with_sheet(host: Arc<dyn WorkbookHost>, sheet_name: impl Into<String>) -> Self {
        Self {
            host,
            sheet_name: sheet_name.into(),
        }
    }

    /// All parseable records. Rows with the wrong arity or an unreadable
    /// timestamp are skipped, not fatal.
    pub async fn list(&self) -> Result<Vec<OwnershipRecord>> {
        let rows = match self.host.read_sheet_rows(&self.sheet_name).await? {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };

        let mut records = Vec::new();
        for (index, row) in rows.iter().enumerate() {
            if index == 0 && row.iter().map(String::as_str).eq(REGISTRY_HEADER) {
                continue;
            }
            match OwnershipRecord::from_row(row) {
                Some(record) => records.push(record),
                None => warn!(
                    "skipping unparseable registry row {index} in '{}'",
                    self.sheet_name
                ),
            }
        }
        Ok(records)
    }

    /// Insert or update by the (sheet, table, operation) triple. An existing
    /// match keeps its position; only `is_managed` and the touch timestamp
    /// change.
    pub async fn upsert(&self, record: OwnershipRecord) -> Result<()> {
        let mut records = self.list().await?;
        match records.iter_mut().find(|existing| {
            existing.matches(&record.sheet_name, &record.table_name, &record.operation_id)
        }) {
            Some(existing) => {
                existing.is_managed = record.is_managed;
                existing.last_touched_utc = record.last_touched_utc;
            }
            None => records.push(record),
        }
        self.write(&records).await
    }

    /// Remove the record matching the triple, if present.
    pub async fn remove(
        &self,
        sheet_name: &str,
        table_name: &str,
        operation_id: &OperationId,
    ) -> Result<()> {
        let mut records = self.list().await?;
        records.retain(|record| !record.matches(sheet_name, table_name, operation_id));
        self.write(&records).await
    }

    /// Drop every record, leaving only the header row.
    pub async fn purge_all(&self) -> Result<()> {
        self.write(&[]).await
    }

    async fn write(&self, records: &[OwnershipRecord]) -> Result<()> {
        let mut rows = Vec::with_capacity(records.len() + 1);
        rows.push(REGISTRY_HEADER.iter().map(ToString::to_string).collect());
        rows.extend(records.iter().map(OwnershipRecord::to_row));
        self.host
            .overwrite_sheet_rows(&self.sheet_name, &rows, true)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedWorkbook;

    fn store() -> (Arc<SimulatedWorkbook>, OwnershipStore) {
        let workbook = Arc::new(SimulatedWorkbook::new());
        let store = OwnershipStore::new(workbook.clone());
        (workbook, store)
    }

    #[tokio::test]
    async fn empty_workbook_lists_no_records() {
        let (_, store) = store();
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn upsert_appends_then_updates_in_place() {
        let (_, store) = store();
        let op = OperationId::from("sales-summary");

        store
            .upsert(OwnershipRecord::managed("Sheet1", "tbl_Sales", op.clone()))
            .await
            .unwrap();
        store
            .upsert(OwnershipRecord::managed("Sheet2", "tbl_Other", OperationId::from("other")))
            .await
            .unwrap();

        let first_touch = store.list().await.unwrap()[0].last_touched_utc;

        // Same triple again: position and count stay, timestamp moves.
        store
            .upsert(OwnershipRecord::managed("Sheet1", "tbl_Sales", op.clone()))
            .await
            .unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].table_name, "tbl_Sales");
        assert!(records[0].last_touched_utc >= first_touch);
    }

    #[tokio::test]
    async fn remove_targets_only_the_exact_triple() {
        let (_, store) = store();
        let op = OperationId::from("sales-summary");

        store
            .upsert(OwnershipRecord::managed("Sheet1", "tbl_Sales", op.clone()))
            .await
            .unwrap();
        store
            .upsert(OwnershipRecord::managed("Sheet1", "tbl_Sales", OperationId::from("other")))
            .await
            .unwrap();

        store.remove("Sheet1", "tbl_Sales", &op).await.unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].operation_id, OperationId::from("other"));
    }

    #[tokio::test]
    async fn purge_leaves_only_the_header() {
        let (workbook, store) = store();
        store
            .upsert(OwnershipRecord::managed("Sheet1", "t", OperationId::from("op")))
            .await
            .unwrap();
        store.purge_all().await.unwrap();

        assert!(store.list().await.unwrap().is_empty());
        let raw = workbook.read_sheet_rows(REGISTRY_SHEET).await.unwrap().unwrap();
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0][0], "sheetName");
    }

    #[tokio::test]
    async fn registry_sheet_is_hidden() {
        let (workbook, store) = store();
        store
            .upsert(OwnershipRecord::managed("Sheet1", "t", OperationId::from("op")))
            .await
            .unwrap();
        assert_eq!(workbook.is_sheet_hidden(REGISTRY_SHEET), Some(true));
    }

    #[tokio::test]
    async fn unparseable_rows_are_skipped() {
        let (workbook, store) = store();
        let rows = vec![
            REGISTRY_HEADER.iter().map(ToString::to_string).collect::<Vec<_>>(),
            vec!["Sheet1".into(), "t".into(), "op".into(), "true".into(), Utc::now().to_rfc3339()],
            vec!["short".into(), "row".into()],
            vec!["Sheet1".into(), "u".into(), "op".into(), "maybe".into(), Utc::now().to_rfc3339()],
        ];
        workbook
            .overwrite_sheet_rows(REGISTRY_SHEET, &rows, true)
            .await
            .unwrap();

        let records = store.list().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].table_name, "t");
    }
}
