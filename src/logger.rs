//! The caller-facing facade (§6 "Caller API (minimal)"): `configure`
//! builds the pipeline, queue, worker and sinks and returns a [`Logger`]
//! handle exposing level-named emitters, context helpers, and `shutdown`.

use std::sync::Arc;
use std::time::Duration;

use lumen_buffers::{bounded, QueueConfig, QueueMetricsSnapshot};
use lumen_common::{Event, Level, Value};
use tokio::sync::{oneshot, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::Settings;
use crate::context::{ContextFrame, ContextSnapshot, ContextStore};
use crate::error::{ConfigError, ContextError};
use crate::fanout::{self, FanoutSink, RetryPolicy};
use crate::pipeline::{Pipeline, PipelineConfig};
use crate::registry::{EnricherRegistry, SinkRegistry};
use crate::sinks::register_builtin_sinks;
use crate::worker::{DrainReport, Worker};

enum Delivery {
    Queued {
        sender: lumen_buffers::QueueSender<Event>,
    },
    Inline {
        sinks: Vec<Arc<FanoutSink>>,
        per_dispatch_deadline: Duration,
    },
}

struct ShutdownHandle {
    request: oneshot::Sender<oneshot::Sender<DrainReport>>,
    worker: JoinHandle<()>,
}

pub struct Logger {
    pipeline: Pipeline,
    delivery: Delivery,
    sink_registry: Arc<SinkRegistry>,
    enricher_registry: Arc<EnricherRegistry>,
    trace_id_header: String,
    shutdown: AsyncMutex<Option<ShutdownHandle>>,
}

/// Builds pipeline, queue, worker, and sinks from `settings` (§6). Fatal
/// configuration problems (unknown scheme, bad URI, bad regex) surface
/// synchronously here, never later on the hot path (§7).
pub async fn configure(settings: Settings) -> Result<Logger, ConfigError> {
    let settings = settings.normalized();

    let sink_registry = Arc::new(SinkRegistry::new());
    register_builtin_sinks(&sink_registry)?;

    let enricher_registry = Arc::new(EnricherRegistry::new());

    let pipeline_config = PipelineConfig::build(&settings)?;
    let pipeline = Pipeline::new(pipeline_config, enricher_registry.clone());

    let mut sinks = Vec::with_capacity(settings.sinks.len());
    for uri in &settings.sinks {
        let built = sink_registry.build(uri)?;
        let scheme = crate::sink::SinkUri::parse(uri)?.scheme;
        sinks.push(Arc::new(FanoutSink::new(
            scheme,
            built,
            RetryPolicy {
                max_retries: settings.queue_max_retries,
                base_delay: settings.queue_retry_delay,
            },
        )));
    }

    let per_dispatch_deadline = settings.queue_batch_timeout * 10;

    let (delivery, shutdown) = if settings.queue_enabled {
        let queue_config = QueueConfig::default()
            .with_maxsize(settings.queue_maxsize)
            .with_overflow(settings.queue_overflow)
            .with_sampling_rate(settings.sampling_rate);
        let (sender, receiver) = bounded::<Event>(queue_config);

        let worker = Worker::new(
            receiver,
            sinks,
            settings.queue_batch_size,
            settings.queue_batch_timeout,
            settings.drain_deadline,
        );
        let (request_tx, request_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(request_rx));

        (
            Delivery::Queued { sender },
            Some(ShutdownHandle {
                request: request_tx,
                worker: handle,
            }),
        )
    } else {
        for sink in &sinks {
            let _ = sink.sink.initialize().await;
        }
        (
            Delivery::Inline {
                sinks,
                per_dispatch_deadline,
            },
            None,
        )
    };

    Ok(Logger {
        pipeline,
        delivery,
        sink_registry,
        enricher_registry,
        trace_id_header: settings.trace_id_header,
        shutdown: AsyncMutex::new(shutdown),
    })
}

impl Logger {
    pub fn register_sink(
        &self,
        scheme: impl Into<String>,
        constructor: crate::registry::SinkConstructor,
    ) -> Result<(), ConfigError> {
        self.sink_registry.register(scheme, constructor)
    }

    pub fn register_enricher(&self, enricher: Arc<dyn crate::pipeline::custom::Enricher>) -> Result<(), ConfigError> {
        self.enricher_registry.register(enricher)
    }

    pub fn bind_context(&self, fields: impl IntoIterator<Item = (String, Value)>) -> Result<(), ContextError> {
        ContextStore::bind(fields)
    }

    pub fn get_context(&self) -> ContextFrame {
        ContextStore::get()
    }

    pub fn clear_context(&self) {
        ContextStore::clear();
    }

    pub fn context_copy(&self) -> ContextSnapshot {
        ContextStore::snapshot()
    }

    /// Returns the current `trace_id`, generating and binding a fresh one if
    /// absent (§4.1: "generated on request entry if not supplied by an
    /// upstream header"). An adapter calls this once per request and echoes
    /// the result under [`Logger::trace_id_header`].
    pub fn ensure_trace_id(&self) -> String {
        if let Some(existing) = ContextStore::trace_id() {
            return existing;
        }
        let generated = Uuid::new_v4().to_string();
        let _ = ContextStore::bind([("trace_id".to_string(), Value::from(generated.clone()))]);
        generated
    }

    pub fn trace_id_header(&self) -> &str {
        &self.trace_id_header
    }

    /// Exposes the bounded queue's own counters (§4.3 "Metrics exposed").
    /// `None` when `queue_enabled=false`, since there is no queue to report
    /// on in that mode.
    pub fn queue_metrics(&self) -> Option<QueueMetricsSnapshot> {
        match &self.delivery {
            Delivery::Queued { sender } => Some(sender.metrics().snapshot()),
            Delivery::Inline { .. } => None,
        }
    }

    async fn emit(&self, level: Level, message: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) {
        let mut event = Event::with_message(message);
        event.insert("level", level.as_str());
        for (key, value) in fields {
            event.insert(key, value);
        }

        let context = ContextStore::get();
        let Some(rendered) = self.pipeline.process(event, &context) else {
            return;
        };

        match &self.delivery {
            Delivery::Queued { sender } => {
                let _ = sender.offer(rendered).await;
            }
            Delivery::Inline {
                sinks,
                per_dispatch_deadline,
            } => {
                fanout::dispatch(sinks, Arc::new(vec![rendered]), *per_dispatch_deadline, None).await;
            }
        }
    }

    pub async fn debug(&self, message: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) {
        self.emit(Level::Debug, message, fields).await;
    }

    pub async fn info(&self, message: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) {
        self.emit(Level::Info, message, fields).await;
    }

    pub async fn warning(&self, message: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) {
        self.emit(Level::Warning, message, fields).await;
    }

    pub async fn error(&self, message: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) {
        self.emit(Level::Error, message, fields).await;
    }

    pub async fn critical(&self, message: impl Into<String>, fields: impl IntoIterator<Item = (String, Value)>) {
        self.emit(Level::Critical, message, fields).await;
    }

    /// Drains and closes (§4.4 step 3). Safe to call even if the worker's
    /// execution context is gone (`shutdown` is idempotent and returns a
    /// zeroed report on a second call).
    pub async fn shutdown(&self, deadline: Duration) -> DrainReport {
        let mut guard = self.shutdown.lock().await;
        let Some(handle) = guard.take() else {
            // Inline mode, or already shut down: a synchronous best-effort
            // close is all that's left to do (§4.4: "invoking shutdown from
            // a non-worker context is supported and must not deadlock").
            if let Delivery::Inline { sinks, .. } = &self.delivery {
                for sink in sinks {
                    let _ = sink.sink.close().await;
                }
            }
            return DrainReport::default();
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        if handle.request.send(reply_tx).is_err() {
            return DrainReport::default();
        }

        let report = tokio::time::timeout(deadline, reply_rx)
            .await
            .ok()
            .and_then(Result::ok)
            .unwrap_or_default();
        let _ = handle.worker.await;
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn configure_rejects_unknown_sink_scheme() {
        let settings = Settings {
            sinks: vec!["ftp://example.com".to_string()],
            ..Settings::default()
        };
        let result = configure(settings).await;
        assert!(matches!(result, Err(ConfigError::UnknownSinkScheme { .. })));
    }

    #[tokio::test]
    async fn configure_with_queue_disabled_delivers_inline() {
        let settings = Settings {
            sinks: vec!["stdout://?mode=json".to_string()],
            queue_enabled: false,
            ..Settings::default()
        };
        let logger = configure(settings).await.unwrap();
        logger.info("hello", []).await;
        assert!(logger.queue_metrics().is_none());
        let report = logger.shutdown(Duration::from_secs(1)).await;
        assert_eq!(report.drained, 0);
    }

    #[tokio::test]
    async fn queue_metrics_reports_enqueued_events_when_queue_is_enabled() {
        let settings = Settings {
            sinks: vec!["stdout://?mode=json".to_string()],
            ..Settings::default()
        };
        let logger = configure(settings).await.unwrap();
        logger.info("hello", []).await;
        let snapshot = logger.queue_metrics().unwrap();
        assert_eq!(snapshot.total_enqueued, 1);
        let _ = logger.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_is_idempotent() {
        let settings = Settings {
            sinks: vec!["stdout://?mode=json".to_string()],
            ..Settings::default()
        };
        let logger = configure(settings).await.unwrap();
        logger.info("hello", []).await;
        let _ = logger.shutdown(Duration::from_secs(1)).await;
        let second = logger.shutdown(Duration::from_secs(1)).await;
        assert_eq!(second.drained, 0);
    }

    #[tokio::test]
    async fn ensure_trace_id_generates_once_and_is_stable_within_a_scope() {
        ContextStore::scope(async {
            let settings = Settings::default();
            let logger = configure(settings).await.unwrap();
            let first = logger.ensure_trace_id();
            let second = logger.ensure_trace_id();
            assert_eq!(first, second);
            assert!(!first.is_empty());
        })
        .await;
    }
}
