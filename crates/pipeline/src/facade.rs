//! The data pipeline facade
//!
//! Retrieval (`execute`) fails fast with typed errors: the caller owns
//! retry and backoff UX. Materialization (`materialize`) returns a
//! structured outcome instead of an error when the spreadsheet host is not
//! attached, because running outside the host is an expected condition the
//! UI degrades around. Every path reports to telemetry; telemetry never
//! blocks or fails the pipeline.

use gridfeed_cache::{JsonFileBackend, ResultCache};
use gridfeed_config::Settings;
use gridfeed_core::{
    AuthReason, Error, EventCategory, OperationCatalog, OperationId, ParameterMap, Result,
    ResultRow, Severity, TelemetryEvent, TelemetrySink, TokenValidator, TracingSink,
};
use gridfeed_fetch::{
    DataSource, FetchOrchestrator, FetchRequest, RowLimitPolicy, RowLimitWarning, RowPipeline,
};
use gridfeed_sheet::{
    ChunkedWriter, OwnershipRecord, OwnershipStore, Resolution, TableReconciler, TableTarget,
    WorkbookHost, WriteReport,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// Rows produced by `execute`, plus provenance.
#[derive(Debug, Clone)]
pub struct OperationOutcome {
    pub operation_id: OperationId,
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub from_cache: bool,
    pub warning: Option<RowLimitWarning>,
}

impl OperationOutcome {
    /// Header for writing: source columns when known, else the first row's
    /// keys.
    #[must_use]
    pub fn header(&self) -> Vec<String> {
        if !self.columns.is_empty() {
            return self.columns.clone();
        }
        self.rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default()
    }
}

/// Structured result of a materialization attempt.
#[derive(Debug, Clone)]
pub enum MaterializeOutcome {
    Completed {
        target: TableTarget,
        resolution: Resolution,
        report: WriteReport,
    },
    /// Not running inside the spreadsheet host; nothing was written.
    Unavailable { reason: String },
}

impl MaterializeOutcome {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        matches!(self, MaterializeOutcome::Completed { .. })
    }
}

/// Builder for [`DataPipeline`].
pub struct PipelineBuilder {
    settings: Settings,
    validator: Option<Arc<dyn TokenValidator>>,
    catalog: Option<Arc<dyn OperationCatalog>>,
    source: Option<Arc<dyn DataSource>>,
    host: Option<Arc<dyn WorkbookHost>>,
    sink: Arc<dyn TelemetrySink>,
    cache: Option<ResultCache>,
}

impl PipelineBuilder {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            validator: None,
            catalog: None,
            source: None,
            host: None,
            sink: Arc::new(TracingSink),
            cache: None,
        }
    }

    #[must_use]
    pub fn validator(mut self, validator: Arc<dyn TokenValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn catalog(mut self, catalog: Arc<dyn OperationCatalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    #[must_use]
    pub fn source(mut self, source: Arc<dyn DataSource>) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn host(mut self, host: Arc<dyn WorkbookHost>) -> Self {
        self.host = Some(host);
        self
    }

    #[must_use]
    pub fn telemetry(mut self, sink: Arc<dyn TelemetrySink>) -> Self {
        self.sink = sink;
        self
    }

    /// Override the cache built from settings.
    #[must_use]
    pub fn cache(mut self, cache: ResultCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<DataPipeline> {
        self.settings.validate()?;
        let validator = self
            .validator
            .ok_or_else(|| Error::configuration("pipeline requires a token validator"))?;
        let catalog = self
            .catalog
            .ok_or_else(|| Error::configuration("pipeline requires an operation catalog"))?;
        let source = self
            .source
            .ok_or_else(|| Error::configuration("pipeline requires a data source"))?;
        let host = self
            .host
            .ok_or_else(|| Error::configuration("pipeline requires a workbook host"))?;

        let cache = match self.cache {
            Some(cache) => cache,
            None => match &self.settings.cache_directory {
                Some(dir) => {
                    ResultCache::with_backend(Arc::new(JsonFileBackend::new(dir.clone())))
                }
                None => ResultCache::in_memory(),
            },
        };

        let ownership = Arc::new(OwnershipStore::new(host.clone()));
        let reconciler = TableReconciler::new(host.clone(), ownership.clone());
        let writer = ChunkedWriter::new(host.clone(), &self.settings);
        let orchestrator = FetchOrchestrator::new(&self.settings);
        let row_pipeline = RowPipeline::new(self.sink.clone());

        Ok(DataPipeline {
            settings: self.settings,
            validator,
            catalog,
            source,
            host,
            sink: self.sink,
            cache,
            orchestrator,
            row_pipeline,
            ownership,
            reconciler,
            writer,
        })
    }
}

/// Orchestrates retrieval and materialization.
pub struct DataPipeline {
    settings: Settings,
    validator: Arc<dyn TokenValidator>,
    catalog: Arc<dyn OperationCatalog>,
    source: Arc<dyn DataSource>,
    host: Arc<dyn WorkbookHost>,
    sink: Arc<dyn TelemetrySink>,
    cache: ResultCache,
    orchestrator: FetchOrchestrator,
    row_pipeline: RowPipeline,
    ownership: Arc<OwnershipStore>,
    reconciler: TableReconciler,
    writer: ChunkedWriter,
}

impl DataPipeline {
    /// Run an operation: auth gate, catalog lookup, cache lookup,
    /// fetch-on-miss under the row policy, cache populate.
    pub async fn execute(
        &self,
        operation_id: &OperationId,
        parameters: ParameterMap,
    ) -> Result<OperationOutcome> {
        let status = self.validator.validate_current_token().await;
        if !status.valid {
            let err = Error::auth(status.reason.unwrap_or(AuthReason::Malformed));
            self.report_error(EventCategory::Auth, "token_rejected", "execute", &err);
            return Err(err);
        }

        let operation = match self.catalog.operation_by_id(operation_id) {
            Some(operation) => operation,
            None => {
                let err = Error::operation_not_found(operation_id.as_str());
                self.report_error(EventCategory::Pipeline, "operation_missing", "execute", &err);
                return Err(err);
            }
        };

        if let Some(rows) = self.cache.get(operation_id, &parameters).await? {
            self.sink.log_event(
                TelemetryEvent::new(EventCategory::Cache, "cache_hit", Severity::Debug)
                    .with_message(format!("operation '{operation_id}' served from cache")),
            );
            let columns = rows
                .first()
                .map(|row| row.keys().cloned().collect())
                .unwrap_or_default();
            return Ok(OperationOutcome {
                operation_id: operation_id.clone(),
                columns,
                rows,
                from_cache: true,
                warning: None,
            });
        }
        self.sink.log_event(TelemetryEvent::new(
            EventCategory::Cache,
            "cache_miss",
            Severity::Debug,
        ));

        let request = FetchRequest::new(operation.clone(), parameters.clone());
        let response = match self.orchestrator.fetch(self.source.as_ref(), &request).await {
            Ok(response) => response,
            Err(err) => {
                self.report_error(EventCategory::Fetch, "fetch_failed", &operation.name, &err);
                return Err(err);
            }
        };
        let columns = response.header();

        let policy = RowLimitPolicy::from_settings(&self.settings);
        let (rows, warning) = self.row_pipeline.apply(operation_id, response.rows, policy);

        let ttl = operation
            .result_ttl_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.settings.cache_ttl());
        if let Err(err) = self
            .cache
            .put(operation_id, &parameters, rows.clone(), ttl)
            .await
        {
            // A broken cache must not fail a successful fetch.
            warn!("cache populate failed for '{operation_id}': {err}");
            self.sink.log_event(
                TelemetryEvent::new(EventCategory::Cache, "cache_write_failed", Severity::Warning)
                    .with_message(err.to_string()),
            );
        }

        self.sink.log_event(
            TelemetryEvent::new(EventCategory::Fetch, "fetch_completed", Severity::Info)
                .with_message(format!(
                    "operation '{operation_id}' fetched {} rows",
                    rows.len()
                )),
        );

        Ok(OperationOutcome {
            operation_id: operation_id.clone(),
            columns,
            rows,
            from_cache: false,
            warning,
        })
    }

    /// Materialize fetched rows into the workbook: resolve the target via
    /// the ownership registry, write, record ownership, bring the result
    /// into view. An absent host yields `MaterializeOutcome::Unavailable`.
    pub async fn materialize(
        &self,
        outcome: &OperationOutcome,
        hint_sheet: &str,
        hint_table: &str,
    ) -> Result<MaterializeOutcome> {
        let resolved = match self
            .reconciler
            .resolve(&outcome.operation_id, hint_sheet, hint_table)
            .await
        {
            Ok(resolved) => resolved,
            Err(err) => return self.materialize_failure(err, "resolve"),
        };

        let header = outcome.header();
        let report = match self
            .writer
            .write(&resolved.target, &header, &outcome.rows)
            .await
        {
            Ok(report) => report,
            Err(err) => return self.materialize_failure(err, "write"),
        };

        let record = OwnershipRecord::managed(
            resolved.target.sheet_name.clone(),
            resolved.target.table_name.clone(),
            outcome.operation_id.clone(),
        );
        if let Err(err) = self.ownership.upsert(record).await {
            return self.materialize_failure(err, "ownership");
        }

        // Cosmetic; a failure here never fails the write.
        if let Err(err) = self
            .host
            .activate_location(&resolved.target.sheet_name, &resolved.target.table_name)
            .await
        {
            warn!("failed to activate written location: {err}");
        }

        let severity = if report.rows_failed > 0 {
            Severity::Warning
        } else {
            Severity::Info
        };
        self.sink.log_event(
            TelemetryEvent::new(EventCategory::Sheet, "materialize_completed", severity)
                .with_message(format!(
                    "operation '{}' wrote {} rows into '{}' ({} failed)",
                    outcome.operation_id,
                    report.rows_written,
                    resolved.target.table_name,
                    report.rows_failed
                ))
                .with_context(&report),
        );

        Ok(MaterializeOutcome::Completed {
            target: resolved.target,
            resolution: resolved.resolution,
            report,
        })
    }

    /// Delete every managed table and empty the registry. Returns how many
    /// tables were deleted; registry rows whose table is already gone are
    /// purged silently.
    pub async fn purge_managed_content(&self) -> Result<usize> {
        let records = self.ownership.list().await?;
        let mut deleted = 0;
        for record in records.iter().filter(|record| record.is_managed) {
            match self.host.delete_table(&record.table_name).await {
                Ok(()) => deleted += 1,
                Err(Error::HostOperation { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        self.ownership.purge_all().await?;
        self.sink.log_event(
            TelemetryEvent::new(EventCategory::Sheet, "managed_content_purged", Severity::Info)
                .with_message(format!("deleted {deleted} managed tables")),
        );
        Ok(deleted)
    }

    /// Drop expired cache entries.
    pub async fn sweep_cache(&self) -> Result<usize> {
        self.cache.sweep_expired().await
    }

    /// Drop all cached results.
    pub async fn clear_cache(&self) -> Result<()> {
        self.cache.clear_all().await
    }

    /// The ownership registry, for teardown flows owned by the caller.
    #[must_use]
    pub fn ownership(&self) -> &OwnershipStore {
        &self.ownership
    }

    fn materialize_failure(
        &self,
        err: Error,
        stage: &str,
    ) -> Result<MaterializeOutcome> {
        if let Error::HostUnavailable { reason } = &err {
            self.sink.log_event(
                TelemetryEvent::new(EventCategory::Sheet, "host_unavailable", Severity::Warning)
                    .with_message(err.to_string()),
            );
            return Ok(MaterializeOutcome::Unavailable {
                reason: reason.clone(),
            });
        }
        self.report_error(EventCategory::Sheet, "materialize_failed", stage, &err);
        Err(err)
    }

    fn report_error(&self, category: EventCategory, name: &str, operation: &str, err: &Error) {
        self.sink.log_event(
            TelemetryEvent::new(category, name, Severity::Error)
                .with_message(err.to_string())
                .with_context(&err.info(operation)),
        );
    }
}
