//! Row-count policy
//!
//! Raw results pass through exactly one policy per call: a hard cap that
//! truncates, or a soft threshold that only warns. Row shape is untouched
//! here; column normalization happens at write time.

use gridfeed_config::Settings;
use gridfeed_core::{
    EventCategory, OperationId, ResultRow, Severity, TelemetryEvent, TelemetrySink,
};
use serde::Serialize;
use std::sync::Arc;

/// Which limit applies to a fetch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLimitPolicy {
    /// Truncate to this many rows and warn.
    HardCap(usize),
    /// Warn above this many rows, keep everything.
    WarnOnly(usize),
    Unlimited,
}

impl RowLimitPolicy {
    /// The configured policy: a positive hard cap wins; otherwise a positive
    /// soft threshold; otherwise unlimited.
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        if settings.max_rows_per_query > 0 {
            RowLimitPolicy::HardCap(settings.max_rows_per_query)
        } else if settings.warn_at_row_count > 0 {
            RowLimitPolicy::WarnOnly(settings.warn_at_row_count)
        } else {
            RowLimitPolicy::Unlimited
        }
    }
}

/// Emitted (once per apply) when a result crosses the configured limit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowLimitWarning {
    pub total_rows: usize,
    pub limit: usize,
    pub truncated: bool,
}

/// Applies the row-count policy and reports crossings to telemetry.
pub struct RowPipeline {
    sink: Arc<dyn TelemetrySink>,
}

impl RowPipeline {
    #[must_use]
    pub fn new(sink: Arc<dyn TelemetrySink>) -> Self {
        Self { sink }
    }

    /// Apply `policy` to `rows`. At most one warning event is emitted.
    pub fn apply(
        &self,
        operation_id: &OperationId,
        mut rows: Vec<ResultRow>,
        policy: RowLimitPolicy,
    ) -> (Vec<ResultRow>, Option<RowLimitWarning>) {
        let total_rows = rows.len();
        let warning = match policy {
            RowLimitPolicy::HardCap(cap) if total_rows > cap => {
                rows.truncate(cap);
                Some(RowLimitWarning {
                    total_rows,
                    limit: cap,
                    truncated: true,
                })
            }
            RowLimitPolicy::WarnOnly(threshold) if total_rows > threshold => {
                Some(RowLimitWarning {
                    total_rows,
                    limit: threshold,
                    truncated: false,
                })
            }
            _ => None,
        };

        if let Some(warning) = &warning {
            let name = if warning.truncated {
                "row_limit_applied"
            } else {
                "row_count_warning"
            };
            self.sink.log_event(
                TelemetryEvent::new(EventCategory::Fetch, name, Severity::Warning)
                    .with_message(format!(
                        "operation '{operation_id}' produced {total_rows} rows (limit {})",
                        warning.limit
                    ))
                    .with_context(warning),
            );
        }

        (rows, warning)
    }
}
