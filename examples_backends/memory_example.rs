use std::sync::Arc;

use tracing_cloud_logging::memory::MemoryClient;
use tracing_cloud_logging::{Attr, CloudLogHandler, Handler, Record};
use tracing::Level;

/// Drives the handler directly, without a subscriber, and prints the
/// entries it produced.
#[tokio::main]
async fn main() {
    let client = MemoryClient::new();
    let root = CloudLogHandler::new(Arc::new(client.clone()), "demo", Level::INFO);

    let request = root
        .with_group("request")
        .with_attrs(vec![Attr::new("id", "r-42"), Attr::new("attempt", 1)]);

    let records = [
        Record::new(Level::DEBUG, "filtered out"),
        Record::new(Level::INFO, "request started"),
        Record::new(Level::WARN, "slow upstream").with_attr("latency_ms", 812.5),
    ];
    for record in records {
        if let Err(e) = request.handle(record) {
            eprintln!("{}", e);
        }
    }

    for (stream, entry) in client.entries() {
        println!("[{}] {} {:?}", stream, entry.severity, entry.payload);
    }

    if let Err(e) = root.close().await {
        eprintln!("close failed: {}", e);
    }
}
