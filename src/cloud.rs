use crate::auth::{Credentials, TokenSource};
use crate::client::{ClientError, Entry, LogClient, LogStream, Payload};
use crate::env::{env_or, ConfigError, CLOUD_LOGGING_ENDPOINT_ENV, CLOUD_LOGGING_PROJECT_ENV};
use crate::record::SourceLocation;
use crate::severity::Severity;
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Public Cloud Logging API endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://logging.googleapis.com";

/// Configuration for [`CloudLoggingClient`].
///
/// **Fields**
/// - `project_id`: project that owns the logs.
/// - `credentials`: where bearer tokens come from; defaults to
///   Application Default Credentials.
/// - `resource`: monitored resource the entries belong to; `global` with
///   the project id label when unset.
/// - `endpoint`: API base URL, without the `/v2/...` path.
/// - `channel_buffer`: entries queued before new ones are dropped.
/// - `batch_size`: entries per `entries:write` request.
/// - `flush_interval`: longest time a partial batch waits.
#[derive(Clone, Debug)]
pub struct CloudLoggingConfig {
    pub project_id: String,
    pub credentials: Credentials,
    pub resource: Option<MonitoredResource>,
    pub endpoint: String,
    pub channel_buffer: usize,
    pub batch_size: usize,
    pub flush_interval: Duration,
}

impl Default for CloudLoggingConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            credentials: Credentials::default(),
            resource: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            channel_buffer: 1024,
            batch_size: 128,
            flush_interval: Duration::from_secs(1),
        }
    }
}

impl CloudLoggingConfig {
    /// Config for `project_id`, taking credentials and endpoint from the
    /// environment. See [`Credentials::from_env`].
    pub fn for_project(project_id: impl Into<String>) -> Self {
        Self {
            project_id: project_id.into(),
            credentials: Credentials::from_env(),
            endpoint: env_or(CLOUD_LOGGING_ENDPOINT_ENV, DEFAULT_ENDPOINT),
            ..Self::default()
        }
    }

    /// Config built entirely from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let project_id = std::env::var(CLOUD_LOGGING_PROJECT_ENV)
            .map_err(|_| ConfigError::Missing(CLOUD_LOGGING_PROJECT_ENV))?;
        Ok(Self::for_project(project_id))
    }
}

/// Monitored resource attached to every written entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MonitoredResource {
    #[serde(rename = "type")]
    pub kind: String,
    pub labels: BTreeMap<String, String>,
}

impl MonitoredResource {
    /// The `global` resource, used when no more specific one applies.
    pub fn global(project_id: &str) -> Self {
        let mut labels = BTreeMap::new();
        labels.insert("project_id".to_string(), project_id.to_string());
        Self {
            kind: "global".to_string(),
            labels,
        }
    }
}

/// Full resource name of a log, `projects/{project}/logs/{name}` with the
/// name URL-encoded.
pub fn log_resource_name(project_id: &str, log_name: &str) -> String {
    format!("projects/{}/logs/{}", project_id, urlencoding::encode(log_name))
}

/// Snapshot of the client's counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Entries handed to `submit`.
    pub submitted: u64,
    /// Entries dropped because the queue was full or the client closed.
    pub dropped: u64,
    /// Entries accepted by the API.
    pub written: u64,
    /// Entries lost to failed requests.
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    dropped: AtomicU64,
    written: AtomicU64,
    failed: AtomicU64,
}

enum Message {
    Entry(WireEntry),
    Close(oneshot::Sender<()>),
}

/// [`LogClient`] for the Cloud Logging REST API.
///
/// Entries are queued on a bounded channel and written in batches by a
/// background task, so `submit` never blocks the caller. Failed requests
/// are logged and counted, not retried.
pub struct CloudLoggingClient {
    project_id: String,
    sender: mpsc::Sender<Message>,
    counters: Arc<Counters>,
    writer: Mutex<Option<JoinHandle<()>>>,
}

impl CloudLoggingClient {
    /// Validate `config`, resolve credentials and spawn the background
    /// writer on the current Tokio runtime.
    ///
    /// Minimal thresholds are enforced for `channel_buffer`, `batch_size`
    /// and `flush_interval` to avoid degenerate configurations.
    pub async fn connect(config: CloudLoggingConfig) -> Result<Self, ClientError> {
        if config.project_id.trim().is_empty() {
            return Err(ClientError::MissingProjectId);
        }
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;
        let tokens = config.credentials.clone().resolve().await?;
        let resource = config
            .resource
            .clone()
            .unwrap_or_else(|| MonitoredResource::global(&config.project_id));

        let buffer = config.channel_buffer.max(16);
        let batch_size = config.batch_size.max(1);
        let flush_interval = config.flush_interval.max(Duration::from_millis(10));

        let http = Client::builder().timeout(Duration::from_secs(30)).build()?;
        let writer = Writer {
            http,
            url: format!("{}/v2/entries:write", config.endpoint.trim_end_matches('/')),
            tokens,
            resource,
            counters: Arc::new(Counters::default()),
        };
        let counters = Arc::clone(&writer.counters);

        let (tx, rx) = mpsc::channel(buffer);
        let handle = runtime.spawn(run_writer(writer, rx, batch_size, flush_interval));

        tracing::debug!(
            project = %config.project_id,
            endpoint = %config.endpoint,
            "cloud logging client connected"
        );

        Ok(Self {
            project_id: config.project_id,
            sender: tx,
            counters,
            writer: Mutex::new(Some(handle)),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    pub fn stats(&self) -> ClientStats {
        ClientStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl LogClient for CloudLoggingClient {
    fn stream(&self, name: &str) -> Arc<dyn LogStream> {
        Arc::new(CloudLogStream {
            name: name.to_string(),
            log_name: log_resource_name(&self.project_id, name),
            sender: self.sender.clone(),
            counters: Arc::clone(&self.counters),
        })
    }

    async fn close(&self) -> Result<(), ClientError> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(Message::Close(tx))
            .await
            .map_err(|_| ClientError::Closed)?;
        rx.await
            .map_err(|_| ClientError::Writer("writer stopped before flushing".to_string()))?;

        let handle = match self.writer.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| ClientError::Writer(e.to_string()))?;
        }
        Ok(())
    }
}

struct CloudLogStream {
    name: String,
    log_name: String,
    sender: mpsc::Sender<Message>,
    counters: Arc<Counters>,
}

impl LogStream for CloudLogStream {
    fn name(&self) -> &str {
        &self.name
    }

    fn submit(&self, entry: Entry) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        let wire = WireEntry::new(&self.log_name, entry);
        if self.sender.try_send(Message::Entry(wire)).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }
}

async fn run_writer(
    writer: Writer,
    mut rx: mpsc::Receiver<Message>,
    batch_size: usize,
    flush_interval: Duration,
) {
    let mut batch = Vec::with_capacity(batch_size);
    let mut ticker = interval(flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            msg = rx.recv() => match msg {
                Some(Message::Entry(entry)) => {
                    batch.push(entry);
                    if batch.len() >= batch_size {
                        writer.write(&mut batch).await;
                    }
                }
                Some(Message::Close(reply)) => {
                    writer.write(&mut batch).await;
                    let _ = reply.send(());
                    break;
                }
                None => {
                    writer.write(&mut batch).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                if !batch.is_empty() {
                    writer.write(&mut batch).await;
                }
            }
        }
    }
}

struct Writer {
    http: Client,
    url: String,
    tokens: Arc<dyn TokenSource>,
    resource: MonitoredResource,
    counters: Arc<Counters>,
}

impl Writer {
    /// Send `batch` in one request and clear it, whatever the outcome.
    async fn write(&self, batch: &mut Vec<WireEntry>) {
        if batch.is_empty() {
            return;
        }
        let count = batch.len() as u64;

        // fetched per request so refreshing sources never hand out an
        // expired token
        let token = match self.tokens.token().await {
            Ok(token) => token,
            Err(e) => {
                self.counters.failed.fetch_add(count, Ordering::Relaxed);
                tracing::warn!(error = %e, entries = count, "no token for entries:write");
                batch.clear();
                return;
            }
        };
        let body = WriteRequest {
            entries: batch.as_slice(),
            resource: &self.resource,
            partial_success: true,
        };

        let result = self
            .http
            .post(&self.url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await;

        match result {
            Ok(resp) if resp.status().is_success() => {
                self.counters.written.fetch_add(count, Ordering::Relaxed);
            }
            Ok(resp) => {
                let status = resp.status();
                let text = resp.text().await.unwrap_or_else(|_| "<no body>".to_string());
                self.counters.failed.fetch_add(count, Ordering::Relaxed);
                tracing::warn!(%status, body = %text, entries = count, "entries:write rejected");
            }
            Err(e) => {
                self.counters.failed.fetch_add(count, Ordering::Relaxed);
                tracing::warn!(error = %e, entries = count, "entries:write request failed");
            }
        }
        batch.clear();
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct WriteRequest<'a> {
    entries: &'a [WireEntry],
    resource: &'a MonitoredResource,
    partial_success: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WireEntry {
    log_name: String,
    severity: Severity,
    timestamp: String,
    json_payload: Payload,
    #[serde(skip_serializing_if = "Option::is_none")]
    source_location: Option<WireSourceLocation>,
}

#[derive(Debug, Serialize)]
struct WireSourceLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    file: Option<String>,
    // int64 fields travel as strings in the JSON mapping
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    function: Option<String>,
}

impl From<SourceLocation> for WireSourceLocation {
    fn from(loc: SourceLocation) -> Self {
        Self {
            file: loc.file,
            line: loc.line.map(|l| l.to_string()),
            // tracing records no function name; the module path is the
            // closest it has
            function: loc.module_path,
        }
    }
}

impl WireEntry {
    fn new(log_name: &str, entry: Entry) -> Self {
        Self {
            log_name: log_name.to_string(),
            severity: entry.severity,
            timestamp: entry.timestamp.to_rfc3339(),
            json_payload: entry.payload,
            source_location: entry.source_location.map(Into::into),
        }
    }
}
