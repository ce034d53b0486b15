use tracing::{error, info, info_span, warn};
use tracing_cloud_logging::env::{log_name, CLOUD_LOGGING_PROJECT_ENV};
use tracing_cloud_logging::init::{init_tracing_with_config, LayerConfig};
use tracing_cloud_logging::{CloudLogHandler, HandlerOptions};

/// Requires `GOOGLE_CLOUD_PROJECT` and Application Default Credentials
/// (`gcloud auth application-default login`, a service account key in
/// `GOOGLE_APPLICATION_CREDENTIALS`, or the metadata server).
#[tokio::main]
async fn main() {
    let project_id = match std::env::var(CLOUD_LOGGING_PROJECT_ENV) {
        Ok(id) => id,
        Err(_) => {
            eprintln!("{} is not set", CLOUD_LOGGING_PROJECT_ENV);
            return;
        }
    };
    let options = match HandlerOptions::from_env() {
        Ok(options) => options,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    let handler = match CloudLogHandler::connect_with_options(&project_id, &log_name(), options).await {
        Ok(handler) => handler,
        Err(e) => {
            eprintln!("failed to create logging client: {}", e);
            return;
        }
    };

    let config = LayerConfig {
        group_spans: true,
        ..LayerConfig::default()
    };
    let guard = match init_tracing_with_config(handler, config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("{}", e);
            return;
        }
    };

    info!("cloud example started");
    {
        let span = info_span!("auth", user_id = 42);
        let _entered = span.enter();
        warn!(attempts = 3, "too many attempts");
        error!(reason = "invalid password", "authentication failed");
    }

    if let Err(e) = guard.shutdown().await {
        eprintln!("failed to close handler: {}", e);
    }
}
