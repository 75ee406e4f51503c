//! Minimal end-to-end demonstration of the `lumen` facade: configure a
//! logger with a stdout sink, bind request-scoped context, emit a few
//! events at different levels, spawn a background task that inherits the
//! context via a snapshot, and shut down cleanly.
//!
//! This is the kind of thin call-site usage `spec.md` treats as an external
//! collaborator (`configure(...)`, `log.info(...)`); it lives here only to
//! give the crate a runnable example, not as part of the library surface.

use std::sync::Arc;
use std::time::Duration;

use lumen::context::ContextStore;
use lumen::{configure, Settings, Value};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let settings = Settings {
        sinks: vec!["stdout://?mode=auto".to_string()],
        enable_resource_metrics: true,
        ..Settings::default()
    };

    let logger = Arc::new(configure(settings).await.expect("valid configuration"));

    ContextStore::scope(async {
        logger.bind_context([("trace_id".to_string(), Value::from("demo-request-1"))]).ok();

        logger.info("request received", [("path".to_string(), Value::from("/widgets"))]).await;

        let snapshot = logger.context_copy();
        let background_logger = Arc::clone(&logger);
        tokio::spawn(async move {
            ContextStore::run_with(snapshot, async {
                background_logger
                    .info("background work started", [])
                    .await;
            })
            .await;
        });

        logger.warning("slow downstream call", [("latency_ms".to_string(), Value::from(420i64))]).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
    })
    .await;

    let report = logger.shutdown(Duration::from_secs(5)).await;
    eprintln!(
        "shutdown complete: drained={} dropped_on_shutdown={}",
        report.drained, report.dropped_on_shutdown
    );
}
