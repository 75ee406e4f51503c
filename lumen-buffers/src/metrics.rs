use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How many of the most recent enqueue-to-dequeue latencies feed the moving
/// average exposed as `enqueue_latency` (§4.3).
const LATENCY_WINDOW: usize = 128;

/// Queue-level counters backing the metrics exposed in §4.3: `size`,
/// `peak_size`, `total_enqueued`, `total_dequeued`, `total_dropped`,
/// `enqueue_latency`.
#[derive(Debug, Default)]
struct Inner {
    size: AtomicI64,
    peak_size: AtomicI64,
    total_enqueued: AtomicU64,
    total_dequeued: AtomicU64,
    total_dropped: AtomicU64,
    latency_window: Mutex<VecDeque<Duration>>,
}

#[derive(Clone, Debug, Default)]
pub struct QueueMetrics {
    inner: Arc<Inner>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct QueueMetricsSnapshot {
    pub size: i64,
    pub peak_size: i64,
    pub total_enqueued: u64,
    pub total_dequeued: u64,
    pub total_dropped: u64,
    /// Moving-window average of the time an item spent queued before being
    /// dequeued, over the last `LATENCY_WINDOW` dequeues.
    pub enqueue_latency: Duration,
}

impl QueueMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_enqueued(&self, count: u64) {
        let new_size = self.inner.size.fetch_add(count as i64, Ordering::SeqCst) + count as i64;
        self.inner.total_enqueued.fetch_add(count, Ordering::Relaxed);
        self.inner
            .peak_size
            .fetch_max(new_size, Ordering::Relaxed);
        metrics::gauge!("queue_size").set(new_size as f64);
        metrics::counter!("queue_enqueued_total").increment(count);
    }

    pub fn record_dequeued(&self, count: u64) {
        let new_size = self.inner.size.fetch_sub(count as i64, Ordering::SeqCst) - count as i64;
        self.inner.total_dequeued.fetch_add(count, Ordering::Relaxed);
        metrics::gauge!("queue_size").set(new_size.max(0) as f64);
        metrics::counter!("queue_dequeued_total").increment(count);
    }

    pub fn record_dropped(&self, count: u64, reason: &'static str) {
        self.inner.total_dropped.fetch_add(count, Ordering::Relaxed);
        lumen_common::internal_event::emit(crate::internal_events::QueueEventsDropped { count, reason });
    }

    /// Records one item's time-in-queue into the moving window used by
    /// `enqueue_latency` (§4.3).
    pub fn record_enqueue_latency(&self, latency: Duration) {
        metrics::histogram!("queue_enqueue_latency_ms").record(latency.as_secs_f64() * 1000.0);
        let mut window = self.inner.latency_window.lock().unwrap_or_else(|poison| poison.into_inner());
        if window.len() >= LATENCY_WINDOW {
            window.pop_front();
        }
        window.push_back(latency);
    }

    pub fn snapshot(&self) -> QueueMetricsSnapshot {
        let window = self.inner.latency_window.lock().unwrap_or_else(|poison| poison.into_inner());
        let enqueue_latency = if window.is_empty() {
            Duration::ZERO
        } else {
            window.iter().sum::<Duration>() / window.len() as u32
        };
        QueueMetricsSnapshot {
            size: self.inner.size.load(Ordering::SeqCst),
            peak_size: self.inner.peak_size.load(Ordering::Relaxed),
            total_enqueued: self.inner.total_enqueued.load(Ordering::Relaxed),
            total_dequeued: self.inner.total_dequeued.load(Ordering::Relaxed),
            total_dropped: self.inner.total_dropped.load(Ordering::Relaxed),
            enqueue_latency,
        }
    }
}
