//! Write-target reconciliation
//!
//! Given an operation id and a requested (sheet, table) hint, decide where
//! the rows actually go. Ownership wins over hints: a live managed table is
//! reused wherever it is. A name collision with a table this system does
//! not own is resolved by suffixing the operation id; the user's table is
//! never touched. Header mismatches are not resolved here; the writer
//! detects and recovers from them during the write itself.

use crate::host::{TableInfo, WorkbookHost};
use crate::ownership::{OwnershipRecord, OwnershipStore};
use gridfeed_core::{OperationId, Result};
use serde::Serialize;
use std::sync::Arc;

/// Concrete destination for a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableTarget {
    pub sheet_name: String,
    pub table_name: String,
    /// Whether the destination is an existing managed table.
    pub is_existing: bool,
}

/// Which reconciliation state produced the target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// A managed table for this operation still exists; reuse it.
    ExistingManagedMatch,
    /// The hinted name is free; use it verbatim.
    NoConflict,
    /// The hinted name belongs to a table this system does not own.
    UserConflict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedTarget {
    pub target: TableTarget,
    pub resolution: Resolution,
}

/// Pure resolution over a snapshot of host tables and ownership records.
#[must_use]
pub fn resolve_target(
    operation_id: &OperationId,
    hint_sheet: &str,
    hint_table: &str,
    tables: &[TableInfo],
    records: &[OwnershipRecord],
) -> ResolvedTarget {
    // Reuse the most recently touched managed table that still exists.
    // Ownership beats the caller's hint.
    let managed_match = records
        .iter()
        .filter(|record| record.is_managed && &record.operation_id == operation_id)
        .filter(|record| {
            tables
                .iter()
                .any(|table| table.table_name == record.table_name)
        })
        .max_by_key(|record| record.last_touched_utc);

    if let Some(record) = managed_match {
        return ResolvedTarget {
            target: TableTarget {
                sheet_name: record.sheet_name.clone(),
                table_name: record.table_name.clone(),
                is_existing: true,
            },
            resolution: Resolution::ExistingManagedMatch,
        };
    }

    let name_taken = tables.iter().any(|table| table.table_name == hint_table);
    if !name_taken {
        return ResolvedTarget {
            target: TableTarget {
                sheet_name: hint_sheet.to_string(),
                table_name: hint_table.to_string(),
                is_existing: false,
            },
            resolution: Resolution::NoConflict,
        };
    }

    // The hinted name belongs to someone else; step aside.
    ResolvedTarget {
        target: TableTarget {
            sheet_name: hint_sheet.to_string(),
            table_name: format!("{hint_table}_{operation_id}"),
            is_existing: false,
        },
        resolution: Resolution::UserConflict,
    }
}

/// Reconciler bound to a live host and registry.
pub struct TableReconciler {
    host: Arc<dyn WorkbookHost>,
    ownership: Arc<OwnershipStore>,
}

impl TableReconciler {
    #[must_use]
    pub fn new(host: Arc<dyn WorkbookHost>, ownership: Arc<OwnershipStore>) -> Self {
        Self { host, ownership }
    }

    /// Resolve against the current workbook state.
    pub async fn resolve(
        &self,
        operation_id: &OperationId,
        hint_sheet: &str,
        hint_table: &str,
    ) -> Result<ResolvedTarget> {
        let tables = self.host.list_tables().await?;
        let records = self.ownership.list().await?;
        Ok(resolve_target(
            operation_id,
            hint_sheet,
            hint_table,
            &tables,
            &records,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn table(sheet: &str, name: &str) -> TableInfo {
        TableInfo {
            sheet_name: sheet.to_string(),
            table_name: name.to_string(),
            header: vec!["a".to_string()],
            row_count: 0,
        }
    }

    fn managed(sheet: &str, name: &str, op: &str) -> OwnershipRecord {
        OwnershipRecord::managed(sheet, name, OperationId::from(op))
    }

    #[test]
    fn managed_match_ignores_the_hint() {
        let op = OperationId::from("sales-summary");
        let tables = vec![table("Sheet1", "tbl_Sales")];
        let records = vec![managed("Sheet1", "tbl_Sales", "sales-summary")];

        let resolved = resolve_target(&op, "Sheet9", "tbl_Elsewhere", &tables, &records);
        assert_eq!(resolved.resolution, Resolution::ExistingManagedMatch);
        assert_eq!(
            resolved.target,
            TableTarget {
                sheet_name: "Sheet1".to_string(),
                table_name: "tbl_Sales".to_string(),
                is_existing: true,
            }
        );
    }

    #[test]
    fn stale_managed_record_falls_through_to_the_hint() {
        let op = OperationId::from("sales-summary");
        // The managed table no longer exists in the host.
        let records = vec![managed("Sheet1", "tbl_Sales", "sales-summary")];

        let resolved = resolve_target(&op, "Sheet1", "tbl_Fresh", &[], &records);
        assert_eq!(resolved.resolution, Resolution::NoConflict);
        assert_eq!(resolved.target.table_name, "tbl_Fresh");
        assert!(!resolved.target.is_existing);
    }

    #[test]
    fn free_name_is_used_verbatim() {
        let op = OperationId::from("sales-summary");
        let resolved = resolve_target(&op, "Sheet1", "tbl_Sales", &[], &[]);
        assert_eq!(resolved.resolution, Resolution::NoConflict);
        assert_eq!(resolved.target.sheet_name, "Sheet1");
        assert_eq!(resolved.target.table_name, "tbl_Sales");
    }

    #[test]
    fn foreign_table_with_the_hinted_name_forces_a_suffix() {
        let op = OperationId::from("sales-summary");
        let tables = vec![table("Sheet1", "tbl_Sales")];

        let resolved = resolve_target(&op, "Sheet1", "tbl_Sales", &tables, &[]);
        assert_eq!(resolved.resolution, Resolution::UserConflict);
        assert_eq!(resolved.target.table_name, "tbl_Sales_sales-summary");
        assert!(!resolved.target.is_existing);
    }

    #[test]
    fn unmanaged_record_does_not_claim_the_table() {
        let op = OperationId::from("sales-summary");
        let tables = vec![table("Sheet1", "tbl_Sales")];
        let mut record = managed("Sheet1", "tbl_Sales", "sales-summary");
        record.is_managed = false;

        let resolved = resolve_target(&op, "Sheet1", "tbl_Sales", &tables, &[record]);
        assert_eq!(resolved.resolution, Resolution::UserConflict);
    }

    #[test]
    fn newest_of_duplicate_managed_records_wins() {
        let op = OperationId::from("op");
        let tables = vec![table("Sheet1", "tbl_Old"), table("Sheet2", "tbl_New")];
        let mut old = managed("Sheet1", "tbl_Old", "op");
        old.last_touched_utc = Utc::now() - chrono::Duration::hours(1);
        let new = managed("Sheet2", "tbl_New", "op");

        let resolved = resolve_target(&op, "Sheet1", "hint", &tables, &[old, new]);
        assert_eq!(resolved.target.table_name, "tbl_New");
    }

    #[tokio::test]
    async fn reconciler_reads_live_workbook_state() {
        use crate::simulated::SimulatedWorkbook;

        let workbook = Arc::new(SimulatedWorkbook::new());
        workbook.insert_table("Sheet1", "tbl_Sales", vec!["a".to_string()], Vec::new());
        let ownership = Arc::new(OwnershipStore::new(workbook.clone()));
        ownership
            .upsert(managed("Sheet1", "tbl_Sales", "sales-summary"))
            .await
            .unwrap();

        let reconciler = TableReconciler::new(workbook, ownership);
        let resolved = reconciler
            .resolve(&OperationId::from("sales-summary"), "Sheet2", "other")
            .await
            .unwrap();
        assert_eq!(resolved.resolution, Resolution::ExistingManagedMatch);
        assert_eq!(resolved.target.table_name, "tbl_Sales");
    }
}
