//! Data source contract and test adapter

use async_trait::async_trait;
use gridfeed_core::{Error, OperationDefinition, ParameterMap, Result, ResultRow};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// One logical fetch: an operation plus the caller's parameters.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub operation: OperationDefinition,
    pub parameters: ParameterMap,
}

impl FetchRequest {
    #[must_use]
    pub fn new(operation: OperationDefinition, parameters: ParameterMap) -> Self {
        Self {
            operation,
            parameters,
        }
    }
}

/// Rows produced by a source, with the source's column order.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchResponse {
    /// Column names in source order; may be empty when the source has no
    /// schema metadata, in which case the first row's keys stand in.
    pub columns: Vec<String>,
    pub rows: Vec<ResultRow>,
    pub total_rows: Option<u64>,
}

impl FetchResponse {
    /// Header for writing: schema columns when known, else the first row's
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

/// An interchangeable fetch adapter.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Short name of the backing resource, used in errors and telemetry.
    fn resource_name(&self) -> &str;

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse>;
}

/// Fixed-rows source for tests: optional artificial delay, optional
/// failure injection, and concurrency accounting so tests can assert the
/// orchestrator's bound.
#[derive(Debug, Default)]
pub struct InMemorySource {
    rows: Vec<ResultRow>,
    delay: Option<Duration>,
    failure: Option<String>,
    active: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl InMemorySource {
    #[must_use]
    pub fn with_rows(rows: Vec<ResultRow>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every fetch fails with this message.
    #[must_use]
    pub fn failing_with(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Highest number of fetches observed in flight at once.
    #[must_use]
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DataSource for InMemorySource {
    fn resource_name(&self) -> &str {
        "in-memory"
    }

    async fn fetch(&self, _request: &FetchRequest) -> Result<FetchResponse> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let current = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(current, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let result = match &self.failure {
            Some(message) => Err(Error::fetch_network(self.resource_name(), message.clone())),
            None => Ok(FetchResponse {
                columns: self
                    .rows
                    .first()
                    .map(|row| row.keys().cloned().collect())
                    .unwrap_or_default(),
                rows: self.rows.clone(),
                total_rows: Some(self.rows.len() as u64),
            }),
        };

        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }
}
