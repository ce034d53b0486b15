use std::sync::Arc;
use std::thread;

use serde_json::json;
use tracing::{error, Level};
use tracing_cloud_logging::init::{init_tracing, init_tracing_with_config, InitError, LayerConfig};
use tracing_cloud_logging::memory::MemoryClient;
use tracing_cloud_logging::{Attr, CloudLogHandler, Handler, Record};

// Only this test touches the global subscriber; the binary is its own
// process, so installation state does not leak into other test files.
#[tokio::test]
async fn install_once_then_shutdown() {
    let client = MemoryClient::new();
    let handler = CloudLogHandler::new(Arc::new(client.clone()), "global", Level::INFO);
    let config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };

    let guard = init_tracing_with_config(handler, config).expect("first install");
    assert_eq!(guard.handler().stream_name(), "global");

    let other = CloudLogHandler::new(Arc::new(MemoryClient::new()), "other", Level::INFO);
    assert!(matches!(init_tracing(other), Err(InitError::AlreadyInstalled)));

    error!(code = 7, "through the global subscriber");
    let entries = client.entries_for("global");
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].payload["message"], json!("through the global subscriber"));
    assert_eq!(entries[0].payload["code"], json!(7));

    guard.shutdown().await.expect("shutdown");
    assert!(client.is_closed());
    assert_eq!(client.close_calls(), 1);

    error!("after shutdown");
    assert_eq!(client.entries_for("global").len(), 1);
}

#[test]
fn concurrent_handle_on_derived_handlers() {
    const THREADS: usize = 8;
    const PER_THREAD: usize = 50;

    let client = MemoryClient::new();
    let root = CloudLogHandler::new(Arc::new(client.clone()), "shared", Level::INFO);

    thread::scope(|s| {
        for t in 0..THREADS {
            let handler = if t % 2 == 0 {
                root.clone()
            } else {
                root.with_group("worker").with_attrs(vec![Attr::new("thread", t as u64)])
            };
            s.spawn(move || {
                for i in 0..PER_THREAD {
                    let record = Record::new(Level::INFO, "tick").with_attr("i", i as u64);
                    handler.handle(record).expect("handle");
                }
            });
        }
    });

    let entries = client.entries_for("shared");
    assert_eq!(entries.len(), THREADS * PER_THREAD);

    let grouped = entries
        .iter()
        .filter(|e| e.payload.contains_key("worker.thread"))
        .count();
    assert_eq!(grouped, THREADS / 2 * PER_THREAD);
    assert!(root.attrs().is_empty());
}
