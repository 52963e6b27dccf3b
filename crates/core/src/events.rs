//! Telemetry event contract
//!
//! The pipeline reports what it does through a [`TelemetrySink`]. Sinks are
//! fire-and-forget: they must never block and never propagate a failure back
//! into the pipeline. The default sink forwards to `tracing`; the buffering
//! sink is for assertions in tests.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

/// Event source area, used for filtering downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    Pipeline,
    Fetch,
    Cache,
    Sheet,
    Auth,
}

impl std::fmt::Display for EventCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventCategory::Pipeline => "pipeline",
            EventCategory::Fetch => "fetch",
            EventCategory::Cache => "cache",
            EventCategory::Sheet => "sheet",
            EventCategory::Auth => "auth",
        };
        f.write_str(name)
    }
}

/// Event severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

/// A single telemetry event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub category: EventCategory,
    pub name: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl TelemetryEvent {
    #[must_use]
    pub fn new(category: EventCategory, name: impl Into<String>, severity: Severity) -> Self {
        Self {
            category,
            name: name.into(),
            severity,
            message: None,
            context: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach structured context. Serialization failures are swallowed:
    /// telemetry detail is diagnostic, never load-bearing.
    #[must_use]
    pub fn with_context<C: Serialize>(mut self, context: &C) -> Self {
        self.context = serde_json::to_value(context).ok();
        self
    }
}

/// Fire-and-forget event consumer.
///
/// Implementations must be non-blocking and must swallow their own failures.
pub trait TelemetrySink: Send + Sync {
    fn log_event(&self, event: TelemetryEvent);
}

/// Default sink: forwards events to `tracing` at the matching level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn log_event(&self, event: TelemetryEvent) {
        let context = event
            .context
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let message = event.message.as_deref().unwrap_or("");
        match event.severity {
            Severity::Debug => {
                debug!(category = %event.category, name = %event.name, %context, "{message}");
            }
            Severity::Info => {
                info!(category = %event.category, name = %event.name, %context, "{message}");
            }
            Severity::Warning => {
                warn!(category = %event.category, name = %event.name, %context, "{message}");
            }
            Severity::Error => {
                error!(category = %event.category, name = %event.name, %context, "{message}");
            }
        }
    }
}

/// Sink that drops everything.
#[derive(Debug, Default)]
pub struct NullSink;

impl TelemetrySink for NullSink {
    fn log_event(&self, _event: TelemetryEvent) {}
}

/// Buffering sink for tests: records events for later assertions.
#[derive(Debug, Default)]
pub struct BufferSink {
    events: Mutex<Vec<TelemetryEvent>>,
}

impl BufferSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events logged so far.
    #[must_use]
    pub fn events(&self) -> Vec<TelemetryEvent> {
        self.events.lock().clone()
    }

    /// Number of events with the given name.
    #[must_use]
    pub fn count_named(&self, name: &str) -> usize {
        self.events.lock().iter().filter(|e| e.name == name).count()
    }
}

impl TelemetrySink for BufferSink {
    fn log_event(&self, event: TelemetryEvent) {
        self.events.lock().push(event);
    }
}
