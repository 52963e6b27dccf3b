//! Chunked table writer
//!
//! First creation writes header and rows as one range operation. Overwrites
//! clear the data body and append in bounded, sequential chunks; the host
//! write API is rate-sensitive, so a backoff sleep separates consecutive
//! chunks. A header mismatch on an existing managed table is
//! recovered by deleting the table object and recreating it at the same
//! anchor with the new header. A chunk failure stops the sequence; already
//! written chunks stay in place unless cleanup-on-partial-failure is
//! configured, and the report carries the per-chunk detail either way.

use crate::host::WorkbookHost;
use crate::reconcile::TableTarget;
use gridfeed_config::Settings;
use gridfeed_core::{Error, Result, ResultRow, Scalar};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of one appended chunk. Row offsets index the data body,
/// start inclusive, end exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkResult {
    pub chunk_index: usize,
    pub start_row: usize,
    pub end_row: usize,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a full table write. `rows_failed` counts every row that did
/// not make it, including rows in chunks that were never attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteReport {
    pub rows_written: usize,
    pub rows_failed: usize,
    /// The existing table was deleted and recreated for a header mismatch.
    pub recreated: bool,
    /// The data body was cleared after a chunk failure.
    pub cleaned_up: bool,
    pub chunks: Vec<ChunkResult>,
}

pub struct ChunkedWriter {
    host: Arc<dyn WorkbookHost>,
    chunk_size: usize,
    backoff: Duration,
    cleanup_on_partial_failure: bool,
}

impl ChunkedWriter {
    #[must_use]
    pub fn new(host: Arc<dyn WorkbookHost>, settings: &Settings) -> Self {
        Self::with_options(
            host,
            settings.chunk_size,
            settings.chunk_backoff(),
            settings.cleanup_on_partial_failure,
        )
    }

    #[must_use]
    pub fn with_options(
        host: Arc<dyn WorkbookHost>,
        chunk_size: usize,
        backoff: Duration,
        cleanup_on_partial_failure: bool,
    ) -> Self {
        Self {
            host,
            chunk_size: chunk_size.max(1),
            backoff,
            cleanup_on_partial_failure,
        }
    }

    /// Write `rows` under `header` into the resolved target.
    ///
    /// Rows are normalized to the header: missing columns become null,
    /// extra columns are dropped. Mid-sequence chunk failures are reported,
    /// not thrown; whole-write failures (creation, clearing) propagate.
    pub async fn write(
        &self,
        target: &TableTarget,
        header: &[String],
        rows: &[ResultRow],
    ) -> Result<WriteReport> {
        if header.is_empty() {
            return Err(Error::host_operation(
                "write",
                &target.table_name,
                "result has no columns",
            ));
        }
        let grid = normalize_rows(header, rows);

        if !target.is_existing {
            return self.create(target, header, &grid, false).await;
        }

        match self.host.get_table(&target.table_name).await? {
            None => {
                // The managed table vanished between resolution and write.
                debug!(table = %target.table_name, "managed table missing, creating");
                self.create(target, header, &grid, false).await
            }
            Some(info) if info.header != header => {
                // Scoped destructive recovery: same anchor, new header.
                debug!(
                    table = %target.table_name,
                    "header mismatch, deleting and recreating"
                );
                self.host.delete_table(&target.table_name).await?;
                self.create(target, header, &grid, true).await
            }
            Some(_) => self.overwrite(target, header, &grid).await,
        }
    }

    /// Creation path: one atomic range write, no chunking.
    async fn create(
        &self,
        target: &TableTarget,
        header: &[String],
        grid: &[Vec<Scalar>],
        recreated: bool,
    ) -> Result<WriteReport> {
        self.host
            .create_table(&target.sheet_name, &target.table_name, header, grid)
            .await?;
        Ok(WriteReport {
            rows_written: grid.len(),
            rows_failed: 0,
            recreated,
            cleaned_up: false,
            chunks: vec![ChunkResult {
                chunk_index: 0,
                start_row: 0,
                end_row: grid.len(),
                success: true,
                error: None,
            }],
        })
    }

    /// Overwrite path: refresh header values, clear the body, append in
    /// paced chunks.
    async fn overwrite(
        &self,
        target: &TableTarget,
        header: &[String],
        grid: &[Vec<Scalar>],
    ) -> Result<WriteReport> {
        self.host
            .replace_header_values(&target.table_name, header)
            .await?;
        self.host.clear_data_rows(&target.table_name).await?;

        let mut report = WriteReport {
            rows_written: 0,
            rows_failed: 0,
            recreated: false,
            cleaned_up: false,
            chunks: Vec::new(),
        };

        for (chunk_index, chunk) in grid.chunks(self.chunk_size).enumerate() {
            if chunk_index > 0 {
                tokio::time::sleep(self.backoff).await;
            }

            let start_row = chunk_index * self.chunk_size;
            let end_row = start_row + chunk.len();
            match self.host.append_rows(&target.table_name, chunk).await {
                Ok(()) => {
                    report.rows_written += chunk.len();
                    report.chunks.push(ChunkResult {
                        chunk_index,
                        start_row,
                        end_row,
                        success: true,
                        error: None,
                    });
                }
                Err(e) => {
                    warn!(
                        table = %target.table_name,
                        chunk_index, "chunk write failed: {e}"
                    );
                    report.chunks.push(ChunkResult {
                        chunk_index,
                        start_row,
                        end_row,
                        success: false,
                        error: Some(e.to_string()),
                    });
                    report.rows_failed = grid.len() - report.rows_written;

                    if self.cleanup_on_partial_failure {
                        // Leave the table and header, drop the partial body.
                        match self.host.clear_data_rows(&target.table_name).await {
                            Ok(()) => report.cleaned_up = true,
                            Err(cleanup_err) => warn!(
                                table = %target.table_name,
                                "cleanup after partial failure failed: {cleanup_err}"
                            ),
                        }
                    }
                    break;
                }
            }
        }

        Ok(report)
    }
}

/// Normalize rows to the header's column set and order.
fn normalize_rows(header: &[String], rows: &[ResultRow]) -> Vec<Vec<Scalar>> {
    rows.iter()
        .map(|row| {
            header
                .iter()
                .map(|column| row.get(column).cloned().unwrap_or(Scalar::Null))
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulated::SimulatedWorkbook;
    use tokio::time::Instant;

    fn header() -> Vec<String> {
        vec!["region".to_string(), "total".to_string()]
    }

    fn rows(n: usize) -> Vec<ResultRow> {
        (0..n)
            .map(|i| {
                [
                    ("region".to_string(), Scalar::from(format!("r{i}"))),
                    ("total".to_string(), Scalar::Int(i as i64)),
                ]
                .into_iter()
                .collect()
            })
            .collect()
    }

    fn new_target(name: &str) -> TableTarget {
        TableTarget {
            sheet_name: "Sheet1".to_string(),
            table_name: name.to_string(),
            is_existing: false,
        }
    }

    fn existing_target(name: &str) -> TableTarget {
        TableTarget {
            sheet_name: "Sheet1".to_string(),
            table_name: name.to_string(),
            is_existing: true,
        }
    }

    fn writer(workbook: &Arc<SimulatedWorkbook>, chunk_size: usize) -> ChunkedWriter {
        ChunkedWriter::with_options(
            workbook.clone(),
            chunk_size,
            Duration::from_millis(250),
            false,
        )
    }

    #[tokio::test]
    async fn creation_writes_everything_in_one_call() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        let report = writer(&workbook, 10)
            .write(&new_target("tbl"), &header(), &rows(25))
            .await
            .unwrap();

        assert_eq!(report.rows_written, 25);
        assert_eq!(report.chunks.len(), 1);
        // Creation never goes through the chunked append path.
        assert_eq!(workbook.append_call_count(), 0);
        assert_eq!(workbook.table_rows("tbl").unwrap().len(), 25);
    }

    #[tokio::test(start_paused = true)]
    async fn overwrite_chunks_and_backs_off_between_them() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        workbook.insert_table("Sheet1", "tbl", header(), vec![vec![
            Scalar::from("stale"),
            Scalar::Int(0),
        ]]);

        let started = Instant::now();
        let report = writer(&workbook, 1000)
            .write(&existing_target("tbl"), &header(), &rows(2500))
            .await
            .unwrap();

        assert_eq!(report.rows_written, 2500);
        assert_eq!(report.rows_failed, 0);
        assert_eq!(report.chunks.len(), 3);
        assert_eq!(
            report.chunks.iter().map(|c| c.end_row - c.start_row).collect::<Vec<_>>(),
            vec![1000, 1000, 500]
        );
        assert_eq!(workbook.append_call_count(), 3);
        assert_eq!(workbook.table_rows("tbl").unwrap().len(), 2500);
        // Exactly two backoff waits between three chunks.
        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test]
    async fn header_mismatch_recreates_at_the_same_sheet() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        workbook.insert_table(
            "Sheet1",
            "tbl",
            vec!["old_a".to_string(), "old_b".to_string(), "old_c".to_string()],
            vec![vec![Scalar::Int(1), Scalar::Int(2), Scalar::Int(3)]],
        );

        let report = writer(&workbook, 10)
            .write(&existing_target("tbl"), &header(), &rows(4))
            .await
            .unwrap();

        assert!(report.recreated);
        assert_eq!(workbook.table_header("tbl").unwrap(), header());
        assert_eq!(workbook.table_sheet("tbl").unwrap(), "Sheet1");
        assert_eq!(workbook.table_rows("tbl").unwrap().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn chunk_failure_is_reported_not_thrown() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        workbook.insert_table("Sheet1", "tbl", header(), Vec::new());
        workbook.fail_append_at(2);

        let report = writer(&workbook, 100)
            .write(&existing_target("tbl"), &header(), &rows(250))
            .await
            .unwrap();

        assert_eq!(report.rows_written, 100);
        assert_eq!(report.rows_failed, 150);
        assert_eq!(report.chunks.len(), 2);
        assert!(report.chunks[0].success);
        assert!(!report.chunks[1].success);
        assert!(report.chunks[1].error.as_deref().unwrap().contains("injected"));
        // Chunks already written remain in place.
        assert_eq!(workbook.table_rows("tbl").unwrap().len(), 100);
        assert!(!report.cleaned_up);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_on_partial_failure_clears_the_body() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        workbook.insert_table("Sheet1", "tbl", header(), Vec::new());
        workbook.fail_append_at(2);

        let writer = ChunkedWriter::with_options(
            workbook.clone(),
            100,
            Duration::from_millis(10),
            true,
        );
        let report = writer
            .write(&existing_target("tbl"), &header(), &rows(250))
            .await
            .unwrap();

        assert!(report.cleaned_up);
        assert!(workbook.table_rows("tbl").unwrap().is_empty());
        // The table object and header survive the cleanup.
        assert_eq!(workbook.table_header("tbl").unwrap(), header());
    }

    #[tokio::test]
    async fn rows_are_normalized_to_the_header() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        let ragged: Vec<ResultRow> = vec![
            [
                ("region".to_string(), Scalar::from("emea")),
                ("total".to_string(), Scalar::Int(1)),
            ]
            .into_iter()
            .collect(),
            // Missing "total", extra "noise".
            [
                ("region".to_string(), Scalar::from("apac")),
                ("noise".to_string(), Scalar::Bool(true)),
            ]
            .into_iter()
            .collect(),
        ];

        writer(&workbook, 10)
            .write(&new_target("tbl"), &header(), &ragged)
            .await
            .unwrap();

        let rows = workbook.table_rows("tbl").unwrap();
        assert_eq!(rows[1], vec![Scalar::from("apac"), Scalar::Null]);
        assert_eq!(rows[1].len(), 2);
    }

    #[tokio::test]
    async fn empty_header_is_rejected() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        let err = writer(&workbook, 10)
            .write(&new_target("tbl"), &[], &rows(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::HostOperation { .. }));
    }

    #[tokio::test]
    async fn vanished_managed_table_is_recreated() {
        let workbook = Arc::new(SimulatedWorkbook::new());
        // Target says existing, but the table is gone.
        let report = writer(&workbook, 10)
            .write(&existing_target("tbl"), &header(), &rows(3))
            .await
            .unwrap();
        assert_eq!(report.rows_written, 3);
        assert!(!report.recreated);
        assert_eq!(workbook.table_rows("tbl").unwrap().len(), 3);
    }
}
