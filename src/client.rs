use crate::record::SourceLocation;
use crate::severity::Severity;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key/value body of an entry. Later inserts of the same key win.
pub type Payload = BTreeMap<String, serde_json::Value>;

/// One outbound log entry, as handed to a [`LogStream`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Entry {
    pub severity: Severity,
    pub timestamp: DateTime<Utc>,
    pub payload: Payload,
    pub source_location: Option<SourceLocation>,
}

/// Connection to a logging backend.
///
/// Implementations own connection management, batching, transport and
/// authentication. The handler only ever binds streams and closes the
/// connection once.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Bind a named log stream on this connection.
    fn stream(&self, name: &str) -> Arc<dyn LogStream>;

    /// Release the connection.
    ///
    /// **Returns**
    /// - `Ok(())` once pending entries were handed to the backend and the
    ///   connection is released.
    /// - `Err(ClientError::Closed)` if the connection was already closed.
    /// - `Err(..)` for any other failure while shutting down.
    async fn close(&self) -> Result<(), ClientError>;
}

/// Named destination that accepts entries.
pub trait LogStream: Send + Sync {
    fn name(&self) -> &str;

    /// Hand one entry to the backend without waiting for acknowledgment.
    ///
    /// Failures past this point belong to the client and are never
    /// reported back to the caller.
    fn submit(&self, entry: Entry);
}

/// Errors raised by [`LogClient`] implementations when connecting or
/// closing.
#[derive(thiserror::Error, Debug)]
pub enum ClientError {
    #[error("project id must not be empty")]
    MissingProjectId,

    #[error("access token is empty")]
    MissingCredentials,

    #[cfg(feature = "cloud")]
    #[error("failed to obtain credentials: {0}")]
    Auth(#[from] gcp_auth::Error),

    #[error("a Tokio runtime is required to connect")]
    NoRuntime,

    #[cfg(feature = "cloud")]
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("connection already closed")]
    Closed,

    #[error("background writer failed: {0}")]
    Writer(String),
}
