//! SQL statement-execution source
//!
//! Executes a catalog operation's statement against a warehouse REST API
//! (Databricks-style statement execution): submit, poll until terminal,
//! then collect result chunks. One pooled HTTP client per source instance.
//! If the orchestrator's deadline drops the fetch mid-statement, a
//! best-effort cancel is posted for the in-flight statement.

use crate::source::{DataSource, FetchRequest, FetchResponse};
use async_trait::async_trait;
use gridfeed_config::Settings;
use gridfeed_core::{Error, Result, ResultRow, Scalar};
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const STATEMENTS_PATH: &str = "/api/2.0/sql/statements";
const DEFAULT_WAIT_TIMEOUT: &str = "10s";
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(120);
const POOL_MAX_IDLE_PER_HOST: usize = 20;

/// Server-side statement execution states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
enum StatementState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Canceled,
    Closed,
}

impl StatementState {
    fn is_terminal(self) -> bool {
        !matches!(self, StatementState::Pending | StatementState::Running)
    }
}

#[derive(Debug, Serialize)]
struct SubmitBody<'a> {
    warehouse_id: &'a str,
    statement: &'a str,
    wait_timeout: &'a str,
    /// Keep the statement running when the synchronous wait elapses; we
    /// switch to polling instead of cancelling.
    on_wait_timeout: &'a str,
    format: &'a str,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    parameters: Vec<NamedParameter>,
}

#[derive(Debug, Serialize)]
struct NamedParameter {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct StatementResponse {
    #[serde(default)]
    statement_id: String,
    status: StatementStatus,
    #[serde(default)]
    manifest: Option<Manifest>,
    #[serde(default)]
    result: Option<ChunkData>,
}

#[derive(Debug, Deserialize)]
struct StatementStatus {
    state: StatementState,
    #[serde(default)]
    error: Option<StatementError>,
}

#[derive(Debug, Deserialize)]
struct StatementError {
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Manifest {
    #[serde(default)]
    total_chunk_count: Option<u64>,
    #[serde(default)]
    total_row_count: Option<u64>,
    #[serde(default)]
    schema: Option<Schema>,
}

#[derive(Debug, Deserialize)]
struct Schema {
    #[serde(default)]
    columns: Vec<Column>,
}

#[derive(Debug, Deserialize)]
struct Column {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ChunkData {
    #[serde(default)]
    chunk_index: Option<u64>,
    #[serde(default)]
    data_array: Option<Vec<Vec<serde_json::Value>>>,
}

/// Best-effort statement cancellation when the fetch future is dropped
/// before reaching a terminal state (the orchestrator timeout fired).
struct CancelOnDrop {
    client: reqwest::Client,
    cancel_url: String,
    armed: bool,
}

impl CancelOnDrop {
    fn new(client: reqwest::Client, cancel_url: String) -> Self {
        Self {
            client,
            cancel_url,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let client = self.client.clone();
        let url = std::mem::take(&mut self.cancel_url);
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                debug!("cancelling abandoned statement via {url}");
                if let Err(e) = client.post(&url).send().await {
                    warn!("statement cancel failed: {e}");
                }
            });
        }
    }
}

/// DataSource adapter for a SQL warehouse statement-execution API.
pub struct StatementSource {
    client: reqwest::Client,
    base_url: String,
    warehouse_id: String,
    resource: String,
    wait_timeout: String,
    poll_interval: Duration,
}

impl StatementSource {
    /// Build a source with its own pooled client. The token is sent as a
    /// bearer header on every call.
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        warehouse_id: impl Into<String>,
    ) -> Result<Self> {
        let base_url = base_url.into();
        let parsed = Url::parse(&base_url)
            .map_err(|e| Error::configuration(format!("invalid warehouse URL '{base_url}': {e}")))?;
        let resource = parsed.host_str().unwrap_or("warehouse").to_string();

        let mut headers = HeaderMap::new();
        let mut bearer = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|_| Error::configuration("warehouse token contains invalid characters"))?;
        bearer.set_sensitive(true);
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .connect_timeout(CONNECT_TIMEOUT)
            .pool_idle_timeout(POOL_IDLE_TIMEOUT)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .build()
            .map_err(|e| Error::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            warehouse_id: warehouse_id.into(),
            resource,
            wait_timeout: DEFAULT_WAIT_TIMEOUT.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    /// Build a source wired to the configured poll interval.
    pub fn from_settings(
        base_url: impl Into<String>,
        token: &str,
        warehouse_id: impl Into<String>,
        settings: &Settings,
    ) -> Result<Self> {
        Ok(Self::new(base_url, token, warehouse_id)?.with_poll_interval(settings.poll_interval()))
    }

    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn statements_url(&self) -> String {
        format!("{}{STATEMENTS_PATH}", self.base_url)
    }

    async fn submit(&self, body: &SubmitBody<'_>) -> Result<StatementResponse> {
        let response = self
            .client
            .post(self.statements_url())
            .json(body)
            .send()
            .await
            .map_err(|e| {
                Error::fetch_network_with_source(&self.resource, "statement submit failed", e)
            })?;
        self.decode(response).await
    }

    async fn poll_status(&self, statement_id: &str) -> Result<StatementResponse> {
        let url = format!("{}/{statement_id}", self.statements_url());
        let response = self.client.get(&url).send().await.map_err(|e| {
            Error::fetch_network_with_source(&self.resource, "statement status poll failed", e)
        })?;
        self.decode(response).await
    }

    async fn fetch_chunk(&self, statement_id: &str, chunk_index: u64) -> Result<ChunkData> {
        let url = format!(
            "{}/{statement_id}/result/chunks/{chunk_index}",
            self.statements_url()
        );
        let response = self.client.get(&url).send().await.map_err(|e| {
            Error::fetch_network_with_source(&self.resource, "result chunk fetch failed", e)
        })?;
        self.decode(response).await
    }

    async fn decode<R: serde::de::DeserializeOwned>(&self, response: reqwest::Response) -> Result<R> {
        let status = response.status();
        if status == reqwest::StatusCode::GONE || status == reqwest::StatusCode::NOT_FOUND {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::resource_gone(
                &self.resource,
                format!("statement result expired or unknown (HTTP {status}): {body}"),
            ));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::fetch_network(
                &self.resource,
                format!("HTTP {status}: {body}"),
            ));
        }
        response.json().await.map_err(|e| {
            Error::fetch_network_with_source(&self.resource, "malformed response body", e)
        })
    }

    fn convert_rows(columns: &[String], data: Vec<Vec<serde_json::Value>>) -> Vec<ResultRow> {
        data.into_iter()
            .map(|cells| {
                columns
                    .iter()
                    .cloned()
                    .zip(cells.into_iter().map(Scalar::from))
                    .collect()
            })
            .collect()
    }
}

#[async_trait]
impl DataSource for StatementSource {
    fn resource_name(&self) -> &str {
        &self.resource
    }

    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse> {
        let merged = request.operation.effective_parameters(&request.parameters);
        let parameters = merged
            .iter()
            .map(|(name, value)| NamedParameter {
                name: name.clone(),
                value: value.to_string(),
            })
            .collect();

        let body = SubmitBody {
            warehouse_id: &self.warehouse_id,
            statement: &request.operation.statement,
            wait_timeout: &self.wait_timeout,
            on_wait_timeout: "CONTINUE",
            format: "JSON_ARRAY",
            parameters,
        };

        let mut response = self.submit(&body).await?;
        let statement_id = response.statement_id.clone();
        let cancel = CancelOnDrop::new(
            self.client.clone(),
            format!("{}/{statement_id}/cancel", self.statements_url()),
        );

        while !response.status.state.is_terminal() {
            tokio::time::sleep(self.poll_interval).await;
            response = self.poll_status(&statement_id).await?;
        }
        // Terminal: nothing left to cancel.
        cancel.disarm();

        match response.status.state {
            StatementState::Succeeded => {}
            StatementState::Failed => {
                let message = response
                    .status
                    .error
                    .and_then(|e| e.message)
                    .unwrap_or_else(|| "statement failed".to_string());
                return Err(Error::fetch_network(&self.resource, message));
            }
            StatementState::Canceled | StatementState::Closed => {
                return Err(Error::resource_gone(
                    &self.resource,
                    "statement was canceled or its result set closed; re-execute",
                ));
            }
            StatementState::Pending | StatementState::Running => unreachable!("terminal loop"),
        }

        let manifest = response.manifest.unwrap_or(Manifest {
            total_chunk_count: None,
            total_row_count: None,
            schema: None,
        });
        let columns: Vec<String> = manifest
            .schema
            .map(|schema| schema.columns.into_iter().map(|c| c.name).collect())
            .unwrap_or_default();

        let mut rows = Vec::new();
        let mut next_chunk = 0;
        if let Some(chunk) = response.result {
            next_chunk = chunk.chunk_index.unwrap_or(0) + 1;
            if let Some(data) = chunk.data_array {
                rows.extend(Self::convert_rows(&columns, data));
            }
        }

        let total_chunks = manifest.total_chunk_count.unwrap_or(next_chunk);
        for chunk_index in next_chunk..total_chunks {
            let chunk = self.fetch_chunk(&statement_id, chunk_index).await?;
            if let Some(data) = chunk.data_array {
                rows.extend(Self::convert_rows(&columns, data));
            }
        }

        debug!(
            statement_id = %statement_id,
            rows = rows.len(),
            chunks = total_chunks,
            "statement completed"
        );

        Ok(FetchResponse {
            columns,
            rows,
            total_rows: manifest.total_row_count,
        })
    }
}
