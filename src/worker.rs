//! The queue worker (§4.4): a single consumer task that drains the queue in
//! batches and dispatches each to the sink set, and the shutdown sequence
//! that drains, closes sinks, and reconciles counts.

use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use lumen_buffers::QueueReceiver;
use lumen_common::Event;
use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::fanout::{dispatch, FanoutSink};
use crate::internal_events::{SinkLifecycleFailed, WorkerShutdownComplete};
use lumen_buffers::internal_events::QueueShutdownDrained;

/// Reconciliation summary returned from `shutdown` (§8 scenario 6:
/// `dropped_on_shutdown + delivered_per_sink_total` reconciles to the
/// number of events submitted, modulo exhausted retries).
#[derive(Debug, Clone, Default)]
pub struct DrainReport {
    pub drained: u64,
    pub dropped_on_shutdown: u64,
    pub delivered_per_sink: HashMap<String, u64>,
    pub permanent_failures_per_sink: HashMap<String, u64>,
}

pub struct Worker {
    receiver: QueueReceiver<Event>,
    sinks: Vec<Arc<FanoutSink>>,
    batch_size: usize,
    batch_timeout: Duration,
    per_dispatch_deadline: Duration,
    drain_deadline: Duration,
}

impl Worker {
    pub fn new(
        receiver: QueueReceiver<Event>,
        sinks: Vec<Arc<FanoutSink>>,
        batch_size: usize,
        batch_timeout: Duration,
        drain_deadline: Duration,
    ) -> Self {
        Worker {
            receiver,
            sinks,
            batch_size,
            batch_timeout,
            per_dispatch_deadline: batch_timeout * 10,
            drain_deadline,
        }
    }

    /// Runs the worker loop until `shutdown` is signaled (§4.4 step 2-3).
    /// Called from a single spawned task; `shutdown_rx` carries the reply
    /// channel the caller expects the [`DrainReport`] on.
    pub async fn run(mut self, mut shutdown_rx: oneshot::Receiver<oneshot::Sender<DrainReport>>) {
        self.initialize_sinks().await;

        loop {
            tokio::select! {
                biased;
                reply = &mut shutdown_rx => {
                    if let Ok(reply_tx) = reply {
                        let report = self.drain_and_close().await;
                        let _ = reply_tx.send(report);
                    }
                    return;
                }
                batch = self.receiver.recv_batch(self.batch_size, self.batch_timeout) => {
                    match batch {
                        None => {
                            // Producer side closed and fully drained; nothing left to serve.
                            return;
                        }
                        Some(events) if events.is_empty() => continue,
                        Some(events) => {
                            dispatch(&self.sinks, Arc::new(events), self.per_dispatch_deadline, None).await;
                        }
                    }
                }
            }
        }
    }

    async fn initialize_sinks(&self) {
        for sink in &self.sinks {
            if let Err(err) = sink.sink.initialize().await {
                lumen_common::internal_event::emit(SinkLifecycleFailed {
                    sink: sink.name.clone(),
                    phase: "initialize",
                    reason: err.message().to_string(),
                });
            }
        }
    }

    /// §4.4 step 3: stop accepting new events (the caller is responsible for
    /// that — see [`crate::logger::Logger::shutdown`]), drain remaining
    /// events within `drain_deadline`, close every sink, and reconcile
    /// counts.
    async fn drain_and_close(mut self) -> DrainReport {
        let deadline = Instant::now() + self.drain_deadline;
        let mut drained = 0u64;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                break;
            }
            let first_wait = remaining.min(Duration::from_millis(50));
            match self.receiver.recv_batch(self.batch_size, first_wait).await {
                None => break,
                Some(events) if events.is_empty() => {
                    if Instant::now() >= deadline {
                        break;
                    }
                    continue;
                }
                Some(events) => {
                    drained += events.len() as u64;
                    let remaining_for_retries = deadline.saturating_duration_since(Instant::now());
                    dispatch(
                        &self.sinks,
                        Arc::new(events),
                        self.per_dispatch_deadline.min(remaining_for_retries.max(Duration::from_millis(1))),
                        Some(remaining_for_retries),
                    )
                    .await;
                }
            }
        }
        self.receiver.close();

        let queue_dropped_on_shutdown = self.receiver.metrics().snapshot().size.max(0) as u64;
        lumen_common::internal_event::emit(QueueShutdownDrained {
            drained,
            dropped_on_shutdown: queue_dropped_on_shutdown,
        });

        for sink in &self.sinks {
            if let Err(err) = sink.sink.close().await {
                lumen_common::internal_event::emit(SinkLifecycleFailed {
                    sink: sink.name.clone(),
                    phase: "close",
                    reason: err.message().to_string(),
                });
            }
        }

        let mut delivered_per_sink = HashMap::new();
        let mut permanent_failures_per_sink = HashMap::new();
        let mut dropped_on_shutdown = 0u64;
        for sink in &self.sinks {
            delivered_per_sink.insert(
                sink.name.clone(),
                sink.counters.delivered_total.load(Ordering::SeqCst),
            );
            permanent_failures_per_sink.insert(
                sink.name.clone(),
                sink.counters.permanent_failures.load(Ordering::SeqCst),
            );
            dropped_on_shutdown += sink.counters.dropped_on_shutdown.load(Ordering::SeqCst);
        }

        let report = DrainReport {
            drained,
            dropped_on_shutdown,
            delivered_per_sink,
            permanent_failures_per_sink,
        };
        lumen_common::internal_event::emit(WorkerShutdownComplete {
            drained: report.drained,
            dropped_on_shutdown: report.dropped_on_shutdown,
        });
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fanout::RetryPolicy;
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use lumen_buffers::{bounded, QueueConfig};
    use std::sync::atomic::AtomicUsize;

    struct CountingSink {
        written: AtomicUsize,
    }

    #[async_trait]
    impl crate::sink::Sink for CountingSink {
        async fn initialize(&self) -> Result<(), SinkError> {
            Ok(())
        }
        async fn write_batch(&self, batch: &[Event]) -> Result<(), SinkError> {
            self.written.fetch_add(batch.len(), Ordering::SeqCst);
            Ok(())
        }
        async fn close(&self) -> Result<(), SinkError> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn worker_drains_queued_events_on_shutdown() {
        let (sender, receiver) = bounded::<Event>(QueueConfig::default());
        for _ in 0..5 {
            sender.offer(Event::new()).await.unwrap();
        }

        let sink = Arc::new(FanoutSink::new(
            "counter",
            Box::new(CountingSink {
                written: AtomicUsize::new(0),
            }),
            RetryPolicy {
                max_retries: 0,
                base_delay: Duration::from_millis(1),
            },
        ));

        let worker = Worker::new(
            receiver,
            vec![sink.clone()],
            10,
            Duration::from_millis(50),
            Duration::from_secs(1),
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (reply_tx, reply_rx) = oneshot::channel();
        let handle = tokio::spawn(worker.run(shutdown_rx));
        shutdown_tx.send(reply_tx).unwrap();
        let report = reply_rx.await.unwrap();
        handle.await.unwrap();

        assert_eq!(report.drained, 5);
        assert_eq!(sink.counters.delivered_total.load(Ordering::SeqCst), 5);
    }
}
