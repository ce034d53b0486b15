use crate::client::ClientError;
use crate::handler::{CloudLogHandler, Handler};
use crate::layer::CloudLogLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

/// Configuration of the logging layer.
///
/// **Fields**
/// - `enable_stdout`: if `true`, a `tracing_subscriber::fmt::Layer` is
///   installed next to [`CloudLogLayer`] and events are also printed to
///   the console.
/// - `group_spans`: if `true`, each span name becomes a group, so fields
///   are emitted as `span.field`.
/// - `excluded_targets`: target prefixes never forwarded to the backend.
///   The defaults cover the HTTP stack used by the cloud client and this
///   crate itself, which would otherwise log about its own writes.
#[derive(Clone, Debug)]
pub struct LayerConfig {
    pub enable_stdout: bool,
    pub group_spans: bool,
    pub excluded_targets: Vec<String>,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            enable_stdout: true,
            group_spans: false,
            excluded_targets: ["hyper", "h2", "reqwest", "rustls", "tracing_cloud_logging"]
                .iter()
                .map(|t| t.to_string())
                .collect(),
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum InitError {
    #[error("a global tracing subscriber is already installed")]
    AlreadyInstalled,
}

/// Owner of the process-wide handler.
///
/// Returned once by [`init_tracing`] / [`init_tracing_with_config`].
/// Keep it alive for the life of the process and call
/// [`shutdown`](LoggingGuard::shutdown) at exit to flush and release the
/// backend connection. Dropping the guard without shutting down leaves
/// the connection to be torn down with the runtime.
#[must_use = "call `shutdown` at process end to release the connection"]
#[derive(Debug)]
pub struct LoggingGuard {
    handler: CloudLogHandler,
}

impl LoggingGuard {
    /// Root handler installed in the subscriber.
    pub fn handler(&self) -> &CloudLogHandler {
        &self.handler
    }

    /// Close the backend connection. Events logged afterwards are
    /// rejected by the handler.
    pub async fn shutdown(self) -> Result<(), ClientError> {
        self.handler.close().await
    }
}

/// Build the subscriber without installing it, for use with
/// `tracing::subscriber::with_default` or custom composition.
pub fn subscriber<H>(handler: H, config: &LayerConfig) -> Box<dyn tracing::Subscriber + Send + Sync>
where
    H: Handler + Clone + 'static,
{
    let layer = CloudLogLayer::with_config(handler, config);

    // The fmt layer changes the subscriber type, so both variants are
    // boxed.
    if config.enable_stdout {
        let fmt_layer = tracing_subscriber::fmt::layer();
        Box::new(Registry::default().with(layer).with(fmt_layer))
    } else {
        Box::new(Registry::default().with(layer))
    }
}

/// Install the global `tracing` subscriber using `handler` and
/// [`LayerConfig`].
///
/// **Parameters**
/// - `handler`: root [`CloudLogHandler`] that receives every event
///   outside of spans and from which span handlers are derived.
/// - `config`: [`LayerConfig`] controlling console output, span groups
///   and excluded targets.
///
/// **Returns**
/// - `Ok(LoggingGuard)` owning the handler for teardown.
/// - `Err(InitError::AlreadyInstalled)` if a global subscriber is set.
pub fn init_tracing_with_config(
    handler: CloudLogHandler,
    config: LayerConfig,
) -> Result<LoggingGuard, InitError> {
    let subscriber = subscriber(handler.clone(), &config);
    tracing::subscriber::set_global_default(subscriber).map_err(|_| InitError::AlreadyInstalled)?;
    Ok(LoggingGuard { handler })
}

/// Install tracing with sensible defaults.
///
/// Equivalent to calling [`init_tracing_with_config`] with
/// [`LayerConfig::default`]. This is the recommended entrypoint for
/// typical services.
pub fn init_tracing(handler: CloudLogHandler) -> Result<LoggingGuard, InitError> {
    init_tracing_with_config(handler, LayerConfig::default())
}
