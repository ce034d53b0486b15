use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info_span};

use tracing_cloud_logging::init::{init_tracing_with_config, LayerConfig};
use tracing_cloud_logging::memory::MemoryClient;
use tracing_cloud_logging::{CloudLogHandler, HandlerOptions};

#[tokio::main]
async fn main() {
    let client = MemoryClient::new();
    let handler = CloudLogHandler::new(Arc::new(client.clone()), "load-test", HandlerOptions::default());

    let layer_config = LayerConfig {
        enable_stdout: false,
        ..LayerConfig::default()
    };
    let guard = match init_tracing_with_config(handler, layer_config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let n: u64 = 100_000;
    let start = Instant::now();

    let span = info_span!("worker", id = 1);
    let _entered = span.enter();
    for i in 0..n {
        error!(iteration = i, "load test error");
    }

    let elapsed = start.elapsed();
    println!("memory client: handled {} events in {:?} (~{:.0} ev/s), {} entries kept",
        n,
        elapsed,
        n as f64 / elapsed.as_secs_f64(),
        client.len()
    );

    if let Err(e) = guard.shutdown().await {
        eprintln!("shutdown failed: {}", e);
    }
}
