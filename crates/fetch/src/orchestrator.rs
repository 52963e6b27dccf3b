//! Bounded-concurrency fetch gate
//!
//! All remote fetches pass through one orchestrator. Its semaphore is fair:
//! a call that would exceed the bound suspends and is admitted oldest-first
//! when a slot frees. The permit is a guard, so a slot is released on every
//! exit path, success or failure or timeout. Sibling fetches issued by one
//! logical operation run inside a single admitted slot, so the process-wide
//! bound holds regardless of how many round trips a source makes.

use crate::source::{DataSource, FetchRequest, FetchResponse};
use gridfeed_config::Settings;
use gridfeed_core::{Error, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::debug;

pub struct FetchOrchestrator {
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
    timeout: Duration,
}

impl FetchOrchestrator {
    #[must_use]
    pub fn new(settings: &Settings) -> Self {
        Self::with_limits(settings.max_concurrent_requests, settings.fetch_timeout())
    }

    #[must_use]
    pub fn with_limits(max_concurrent: usize, timeout: Duration) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
            timeout,
        }
    }

    /// Execute one logical fetch under the concurrency bound and deadline.
    ///
    /// Timing out drops the in-flight source future (the only cancellation
    /// point in the pipeline) and reports a [`Error::FetchTimeout`] naming
    /// the resource and the bound that elapsed.
    pub async fn fetch(
        &self,
        source: &dyn DataSource,
        request: &FetchRequest,
    ) -> Result<FetchResponse> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| Error::configuration("fetch gate is closed"))?;
        debug!(
            resource = source.resource_name(),
            operation = %request.operation.id,
            "fetch admitted"
        );

        match tokio::time::timeout(self.timeout, source.fetch(request)).await {
            Ok(result) => result,
            Err(_) => Err(Error::fetch_timeout(source.resource_name(), self.timeout)),
        }
    }

    #[must_use]
    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Slots currently free; diagnostic only.
    #[must_use]
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::InMemorySource;
    use gridfeed_core::{OperationDefinition, ParameterMap, Scalar};
    use std::sync::Arc as StdArc;

    fn request() -> FetchRequest {
        FetchRequest::new(
            OperationDefinition::new("op", "Op", "SELECT 1"),
            ParameterMap::new(),
        )
    }

    fn rows(n: usize) -> Vec<gridfeed_core::ResultRow> {
        (0..n)
            .map(|i| {
                [("value".to_string(), Scalar::Int(i as i64))]
                    .into_iter()
                    .collect()
            })
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn concurrency_never_exceeds_the_bound() {
        let source = StdArc::new(
            InMemorySource::with_rows(rows(1)).with_delay(Duration::from_millis(50)),
        );
        let orchestrator = StdArc::new(FetchOrchestrator::with_limits(3, Duration::from_secs(5)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let source = source.clone();
            let orchestrator = orchestrator.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.fetch(source.as_ref(), &request()).await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(source.call_count(), 8);
        assert!(source.peak_concurrency() <= 3);
        assert!(source.peak_concurrency() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_fetches_are_admitted_in_fifo_order() {
        // Completion order mirrors admission order under a single slot.
        let source = StdArc::new(
            InMemorySource::with_rows(rows(1)).with_delay(Duration::from_millis(10)),
        );
        let orchestrator = StdArc::new(FetchOrchestrator::with_limits(1, Duration::from_secs(5)));
        let finished: StdArc<parking_lot::Mutex<Vec<usize>>> =
            StdArc::new(parking_lot::Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let source = source.clone();
            let orchestrator = orchestrator.clone();
            let finished = finished.clone();
            handles.push(tokio::spawn(async move {
                orchestrator.fetch(source.as_ref(), &request()).await.unwrap();
                finished.lock().push(i);
            }));
            // Establish a deterministic arrival order at the gate.
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*finished.lock(), vec![0, 1, 2, 3]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_fetch_reports_a_named_timeout() {
        let source = InMemorySource::with_rows(rows(1)).with_delay(Duration::from_secs(60));
        let orchestrator = FetchOrchestrator::with_limits(2, Duration::from_millis(100));

        let err = orchestrator.fetch(&source, &request()).await.unwrap_err();
        match err {
            Error::FetchTimeout { resource, elapsed } => {
                assert_eq!(resource, "in-memory");
                assert_eq!(elapsed, Duration::from_millis(100));
            }
            other => panic!("expected timeout, got {other}"),
        }
        // The slot is released even though the fetch failed.
        assert_eq!(orchestrator.available_permits(), 2);
    }

    #[tokio::test]
    async fn failed_fetch_releases_its_permit() {
        let source = InMemorySource::with_rows(Vec::new()).failing_with("connection reset");
        let orchestrator = FetchOrchestrator::with_limits(1, Duration::from_secs(5));

        let err = orchestrator.fetch(&source, &request()).await.unwrap_err();
        assert!(matches!(err, Error::FetchNetwork { .. }));
        assert_eq!(orchestrator.available_permits(), 1);

        // The gate still admits the next call.
        let err = orchestrator.fetch(&source, &request()).await.unwrap_err();
        assert!(matches!(err, Error::FetchNetwork { .. }));
    }
}
