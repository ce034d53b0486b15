use crate::client::{ClientError, Entry, LogClient, LogStream, Payload};
use crate::record::Record;
use crate::severity::Severity;
use crate::value::Attr;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::Level;

/// The capability set a log sink exposes to the facade bridge.
///
/// Handlers are immutable: `with_attrs` and `with_group` return derived
/// handlers and leave `self` untouched.
pub trait Handler: Send + Sync {
    /// Whether records at `level` would be submitted.
    fn enabled(&self, level: Level) -> bool;

    /// Translate and submit one record.
    ///
    /// Handling is not cancellable: once called, the record is either
    /// filtered out or submitted.
    fn handle(&self, record: Record) -> Result<(), HandleError>;

    /// Derive a handler that adds `attrs` to every record.
    fn with_attrs(&self, attrs: Vec<Attr>) -> Self
    where
        Self: Sized;

    /// Derive a handler whose later attributes are nested under `name`.
    fn with_group(&self, name: &str) -> Self
    where
        Self: Sized;
}

#[derive(thiserror::Error, Debug)]
pub enum HandleError {
    #[error("log connection is closed")]
    Closed,
}

/// Options for constructing a [`CloudLogHandler`].
#[derive(Clone, Debug)]
pub struct HandlerOptions {
    /// Least severe level that is submitted.
    pub level: Level,
}

impl Default for HandlerOptions {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl From<Level> for HandlerOptions {
    fn from(level: Level) -> Self {
        Self { level }
    }
}

/// Handler that turns records into Cloud Logging entries and submits them
/// to a bound [`LogStream`].
///
/// Cloning is cheap and yields a reference-equal handler. Derived
/// handlers share the connection of the handler they came from.
#[derive(Clone)]
pub struct CloudLogHandler {
    inner: Arc<Inner>,
}

struct Inner {
    conn: Arc<Connection>,
    level: Level,
    group_prefix: String,
    attrs: Vec<Attr>,
}

struct Connection {
    client: Arc<dyn LogClient>,
    stream: Arc<dyn LogStream>,
    closed: AtomicBool,
}

impl CloudLogHandler {
    /// Bind `log_name` on an already opened client.
    pub fn new(
        client: Arc<dyn LogClient>,
        log_name: &str,
        options: impl Into<HandlerOptions>,
    ) -> Self {
        let options = options.into();
        let stream = client.stream(log_name);
        Self {
            inner: Arc::new(Inner {
                conn: Arc::new(Connection {
                    client,
                    stream,
                    closed: AtomicBool::new(false),
                }),
                level: options.level,
                group_prefix: String::new(),
                attrs: Vec::new(),
            }),
        }
    }

    /// Open a Cloud Logging connection for `project_id` and bind
    /// `log_name`. Credentials come from the environment: an explicit
    /// access token if set, Application Default Credentials otherwise.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "cloud")]
    pub async fn connect(
        project_id: &str,
        log_name: &str,
        level: Level,
    ) -> Result<Self, ClientError> {
        Self::connect_with_options(project_id, log_name, HandlerOptions { level }).await
    }

    #[cfg(feature = "cloud")]
    pub async fn connect_with_options(
        project_id: &str,
        log_name: &str,
        options: HandlerOptions,
    ) -> Result<Self, ClientError> {
        let config = crate::cloud::CloudLoggingConfig::for_project(project_id);
        Self::connect_with_config(config, log_name, options).await
    }

    #[cfg(feature = "cloud")]
    pub async fn connect_with_config(
        config: crate::cloud::CloudLoggingConfig,
        log_name: &str,
        options: HandlerOptions,
    ) -> Result<Self, ClientError> {
        let client = crate::cloud::CloudLoggingClient::connect(config).await?;
        Ok(Self::new(Arc::new(client), log_name, options))
    }

    pub fn level(&self) -> Level {
        self.inner.level
    }

    /// Prefix applied to attribute keys, e.g. `"a.b."`.
    pub fn group_prefix(&self) -> &str {
        &self.inner.group_prefix
    }

    /// Attributes inherited by every record, keys already prefixed.
    pub fn attrs(&self) -> &[Attr] {
        &self.inner.attrs
    }

    pub fn stream_name(&self) -> &str {
        self.inner.conn.stream.name()
    }

    /// True if both handlers are the same instance.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn is_closed(&self) -> bool {
        self.inner.conn.closed.load(Ordering::Acquire)
    }

    /// Release the backend connection.
    ///
    /// The connection is shared by every handler derived from the one that
    /// opened it, so this must be called once, by the owner of the
    /// original handler. Later calls, from any handler of the family,
    /// return [`ClientError::Closed`].
    pub async fn close(&self) -> Result<(), ClientError> {
        let conn = &self.inner.conn;
        if conn.closed.swap(true, Ordering::AcqRel) {
            return Err(ClientError::Closed);
        }
        conn.client.close().await
    }

    /// Build the payload for `record`: message and time first, then
    /// inherited attributes, then call-site attributes under the current
    /// group prefix.
    pub fn build_payload(&self, record: &Record) -> Payload {
        let mut payload = Payload::new();
        payload.insert(
            "message".to_string(),
            serde_json::Value::String(record.message.clone()),
        );
        payload.insert(
            "time".to_string(),
            serde_json::Value::String(record.timestamp.to_rfc3339()),
        );

        for attr in &self.inner.attrs {
            payload.insert(attr.key.clone(), attr.value.to_json());
        }
        for attr in &record.attrs {
            let key = format!("{}{}", self.inner.group_prefix, attr.key);
            payload.insert(key, attr.value.to_json());
        }
        payload
    }

    fn derive(&self, group_prefix: String, attrs: Vec<Attr>) -> Self {
        Self {
            inner: Arc::new(Inner {
                conn: Arc::clone(&self.inner.conn),
                level: self.inner.level,
                group_prefix,
                attrs,
            }),
        }
    }
}

impl Handler for CloudLogHandler {
    fn enabled(&self, level: Level) -> bool {
        // tracing orders more verbose levels as greater
        level <= self.inner.level
    }

    fn handle(&self, record: Record) -> Result<(), HandleError> {
        if !self.enabled(record.level) {
            return Ok(());
        }
        if self.is_closed() {
            return Err(HandleError::Closed);
        }

        let entry = Entry {
            severity: Severity::from_level(record.level),
            timestamp: record.timestamp,
            payload: self.build_payload(&record),
            source_location: record.source,
        };
        self.inner.conn.stream.submit(entry);
        Ok(())
    }

    fn with_attrs(&self, attrs: Vec<Attr>) -> Self {
        if attrs.is_empty() {
            return self.clone();
        }
        let prefix = &self.inner.group_prefix;
        let mut merged = Vec::with_capacity(self.inner.attrs.len() + attrs.len());
        merged.extend(self.inner.attrs.iter().cloned());
        merged.extend(attrs.into_iter().map(|attr| attr.prefixed(prefix)));
        self.derive(prefix.clone(), merged)
    }

    fn with_group(&self, name: &str) -> Self {
        if name.is_empty() {
            return self.clone();
        }
        let prefix = format!("{}{}.", self.inner.group_prefix, name);
        self.derive(prefix, self.inner.attrs.clone())
    }
}

impl fmt::Debug for CloudLogHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CloudLogHandler")
            .field("stream", &self.stream_name())
            .field("level", &self.inner.level)
            .field("group_prefix", &self.inner.group_prefix)
            .field("attrs", &self.inner.attrs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryClient;
    use chrono::{TimeZone, Utc};
    use serde_json::json;

    fn handler(level: Level) -> (MemoryClient, CloudLogHandler) {
        let client = MemoryClient::new();
        let handler = CloudLogHandler::new(Arc::new(client.clone()), "test-log", level);
        (client, handler)
    }

    #[test]
    fn default_minimum_is_info() {
        assert_eq!(HandlerOptions::default().level, Level::INFO);
    }

    #[test]
    fn enabled_compares_against_minimum() {
        let (_, h) = handler(Level::WARN);
        assert!(!h.enabled(Level::TRACE));
        assert!(!h.enabled(Level::DEBUG));
        assert!(!h.enabled(Level::INFO));
        assert!(h.enabled(Level::WARN));
        assert!(h.enabled(Level::ERROR));
    }

    #[test]
    fn below_minimum_is_dropped_silently() {
        let (client, h) = handler(Level::INFO);
        h.handle(Record::new(Level::DEBUG, "x")).unwrap();
        h.handle(Record::new(Level::TRACE, "x")).unwrap();
        assert!(client.is_empty());
    }

    #[test]
    fn one_submission_per_enabled_record() {
        let (client, h) = handler(Level::TRACE);
        let levels = [Level::TRACE, Level::DEBUG, Level::INFO, Level::WARN, Level::ERROR];
        for level in levels {
            h.handle(Record::new(level, "m")).unwrap();
        }

        let severities: Vec<_> = client
            .entries_for("test-log")
            .into_iter()
            .map(|e| e.severity)
            .collect();
        assert_eq!(
            severities,
            vec![
                Severity::Default,
                Severity::Debug,
                Severity::Info,
                Severity::Warning,
                Severity::Error
            ]
        );
    }

    #[test]
    fn bare_record_has_only_message_and_time() {
        let (client, h) = handler(Level::INFO);
        let ts = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        h.handle(Record::new(Level::INFO, "m").with_timestamp(ts)).unwrap();

        let entries = client.entries_for("test-log");
        assert_eq!(entries.len(), 1);
        let payload = &entries[0].payload;
        assert_eq!(payload.len(), 2);
        assert_eq!(payload["message"], json!("m"));
        assert_eq!(payload["time"], json!(ts.to_rfc3339()));
        assert_eq!(entries[0].timestamp, ts);
    }

    #[test]
    fn warn_with_attribute() {
        let (client, h) = handler(Level::INFO);
        h.handle(Record::new(Level::DEBUG, "x")).unwrap();
        h.handle(Record::new(Level::WARN, "y").with_attr("k", 123)).unwrap();

        let entries = client.entries();
        assert_eq!(entries.len(), 1);
        let entry = &entries[0].1;
        assert_eq!(entry.severity, Severity::Warning);
        assert_eq!(entry.payload["message"], json!("y"));
        assert_eq!(entry.payload["k"], json!(123));
        assert!(entry.payload.contains_key("time"));
    }

    #[test]
    fn empty_group_is_same_handler() {
        let (_, h) = handler(Level::INFO);
        let same = h.with_group("");
        assert!(same.ptr_eq(&h));
        assert_eq!(same.group_prefix(), "");
    }

    #[test]
    fn nested_groups_prefix_attached_attrs() {
        let (client, h) = handler(Level::INFO);
        let nested = h
            .with_group("a")
            .with_group("b")
            .with_attrs(vec![Attr::new("k", "v")]);
        assert_eq!(nested.group_prefix(), "a.b.");

        nested.handle(Record::new(Level::INFO, "m")).unwrap();
        let payload = &client.entries_for("test-log")[0].payload;
        assert_eq!(payload["a.b.k"], json!("v"));
    }

    #[test]
    fn attrs_keep_prefix_from_attach_time() {
        let (client, h) = handler(Level::INFO);
        let derived = h
            .with_group("req")
            .with_attrs(vec![Attr::new("id", 7)])
            .with_group("db");

        derived
            .handle(Record::new(Level::INFO, "m").with_attr("rows", 3))
            .unwrap();

        let payload = &client.entries_for("test-log")[0].payload;
        assert_eq!(payload["req.id"], json!(7));
        assert_eq!(payload["req.db.rows"], json!(3));
        assert!(!payload.contains_key("req.db.id"));
    }

    #[test]
    fn message_and_time_are_never_prefixed() {
        let (client, h) = handler(Level::INFO);
        h.with_group("g").handle(Record::new(Level::INFO, "m")).unwrap();

        let payload = &client.entries_for("test-log")[0].payload;
        assert!(payload.contains_key("message"));
        assert!(payload.contains_key("time"));
        assert!(!payload.contains_key("g.message"));
    }

    #[test]
    fn with_attrs_does_not_touch_parent() {
        let (client, parent) = handler(Level::INFO);
        let parent = parent.with_attrs(vec![Attr::new("service", "api")]);
        let child = parent.with_attrs(vec![Attr::new("user", 42)]);

        assert_eq!(parent.attrs().len(), 1);
        assert_eq!(child.attrs().len(), 2);

        parent.handle(Record::new(Level::INFO, "p")).unwrap();
        child.handle(Record::new(Level::INFO, "c")).unwrap();

        let entries = client.entries_for("test-log");
        assert!(!entries[0].payload.contains_key("user"));
        assert_eq!(entries[1].payload["user"], json!(42));
        assert_eq!(entries[1].payload["service"], json!("api"));
    }

    #[test]
    fn later_keys_overwrite_earlier_ones() {
        let (client, h) = handler(Level::INFO);
        let h = h.with_attrs(vec![Attr::new("k", 1)]);
        h.handle(Record::new(Level::INFO, "m").with_attr("k", 2)).unwrap();

        let payload = &client.entries_for("test-log")[0].payload;
        assert_eq!(payload["k"], json!(2));
    }

    #[test]
    fn error_attribute_is_its_message() {
        let (client, h) = handler(Level::INFO);
        let err = std::io::Error::new(std::io::ErrorKind::Other, "boom");
        h.handle(Record::new(Level::ERROR, "failed").with_attrs([Attr::error("err", &err)]))
            .unwrap();

        let payload = &client.entries_for("test-log")[0].payload;
        assert_eq!(payload["err"], json!("boom"));
    }

    #[tokio::test]
    async fn close_is_shared_by_derived_handlers() {
        let (client, root) = handler(Level::INFO);
        let child = root.with_group("g");

        root.close().await.unwrap();
        assert!(client.is_closed());
        assert!(child.is_closed());
        assert!(matches!(child.close().await, Err(ClientError::Closed)));
        assert_eq!(client.close_calls(), 1);
    }

    #[tokio::test]
    async fn handle_after_close_fails() {
        let (client, h) = handler(Level::INFO);
        h.close().await.unwrap();
        assert!(matches!(
            h.handle(Record::new(Level::ERROR, "late")),
            Err(HandleError::Closed)
        ));
        assert!(client.is_empty());
    }
}
