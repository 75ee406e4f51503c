use std::time::Duration;

use rand::Rng;
use snafu::Snafu;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};

use crate::config::{OverflowPolicy, QueueConfig};
use crate::metrics::QueueMetrics;

/// An item plus the instant it was accepted, so the receiver can report
/// time-in-queue without requiring `T` to carry its own timestamp.
struct Envelope<T> {
    item: T,
    enqueued_at: Instant,
}

/// Result of a single `offer` call (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OfferOutcome {
    Accepted,
    Dropped,
}

#[derive(Debug, Snafu)]
pub enum QueueError {
    /// Only possible under the `block` overflow policy with a finite
    /// `producer_timeout` configured (§7: "QueueBlockedTimeout").
    #[snafu(display("offer timed out waiting for queue capacity after {timeout:?}"))]
    BlockedTimeout { timeout: Duration },
}

/// The producer side of the bounded queue.
#[derive(Clone)]
pub struct QueueSender<T> {
    inner: mpsc::Sender<Envelope<T>>,
    config: QueueConfig,
    metrics: QueueMetrics,
}

/// The single-consumer side of the bounded queue.
pub struct QueueReceiver<T> {
    inner: mpsc::Receiver<Envelope<T>>,
    metrics: QueueMetrics,
}

/// Creates a bounded queue with the given configuration (§4.3).
pub fn bounded<T>(config: QueueConfig) -> (QueueSender<T>, QueueReceiver<T>) {
    let (tx, rx) = mpsc::channel(config.maxsize.max(1));
    let metrics = QueueMetrics::new();
    (
        QueueSender {
            inner: tx,
            config,
            metrics: metrics.clone(),
        },
        QueueReceiver {
            inner: rx,
            metrics,
        },
    )
}

impl<T> QueueSender<T> {
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    /// Offers an event to the queue, applying the configured overflow policy.
    /// Never raises except under `block` with a finite producer timeout
    /// (§7).
    pub async fn offer(&self, item: T) -> Result<OfferOutcome, QueueError> {
        let envelope = Envelope {
            item,
            enqueued_at: Instant::now(),
        };
        match self.config.overflow {
            OverflowPolicy::Drop => match self.inner.try_send(envelope) {
                Ok(()) => {
                    self.metrics.record_enqueued(1);
                    Ok(OfferOutcome::Accepted)
                }
                Err(_) => {
                    self.metrics.record_dropped(1, "full");
                    Ok(OfferOutcome::Dropped)
                }
            },
            OverflowPolicy::Block => self.offer_blocking(envelope).await,
            OverflowPolicy::Sample => self.offer_sampled(envelope).await,
        }
    }

    async fn offer_blocking(&self, envelope: Envelope<T>) -> Result<OfferOutcome, QueueError> {
        match self.config.producer_timeout {
            None => match self.inner.send(envelope).await {
                Ok(()) => {
                    self.metrics.record_enqueued(1);
                    Ok(OfferOutcome::Accepted)
                }
                Err(_) => {
                    self.metrics.record_dropped(1, "closed");
                    Ok(OfferOutcome::Dropped)
                }
            },
            Some(wait) => match timeout(wait, self.inner.send(envelope)).await {
                Ok(Ok(())) => {
                    self.metrics.record_enqueued(1);
                    Ok(OfferOutcome::Accepted)
                }
                Ok(Err(_)) => {
                    self.metrics.record_dropped(1, "closed");
                    Ok(OfferOutcome::Dropped)
                }
                Err(_) => Err(QueueError::BlockedTimeout { timeout: wait }),
            },
        }
    }

    async fn offer_sampled(&self, envelope: Envelope<T>) -> Result<OfferOutcome, QueueError> {
        match self.inner.try_send(envelope) {
            Ok(()) => {
                self.metrics.record_enqueued(1);
                Ok(OfferOutcome::Accepted)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                self.metrics.record_dropped(1, "closed");
                Ok(OfferOutcome::Dropped)
            }
            Err(mpsc::error::TrySendError::Full(envelope)) => {
                let trial: f64 = rand::rng().random();
                if trial >= self.config.sampling_rate {
                    self.metrics.record_dropped(1, "sampled_out");
                    return Ok(OfferOutcome::Dropped);
                }

                match timeout(self.config.sample_wait, self.inner.send(envelope)).await {
                    Ok(Ok(())) => {
                        self.metrics.record_enqueued(1);
                        Ok(OfferOutcome::Accepted)
                    }
                    Ok(Err(_)) => {
                        self.metrics.record_dropped(1, "closed");
                        Ok(OfferOutcome::Dropped)
                    }
                    Err(_) => {
                        self.metrics.record_dropped(1, "still_full");
                        Ok(OfferOutcome::Dropped)
                    }
                }
            }
        }
    }
}

impl<T> QueueReceiver<T> {
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    /// Collects up to `max_batch` events (§4.4 step 2a): waits at most
    /// `first_wait` for the first event, then drains opportunistically
    /// without further waiting. Returns an empty batch if nothing arrived
    /// within `first_wait`, and `None` once the channel is closed and fully
    /// drained.
    pub async fn recv_batch(&mut self, max_batch: usize, first_wait: Duration) -> Option<Vec<T>> {
        let first = match timeout(first_wait, self.inner.recv()).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => return None,
            Err(_) => return Some(Vec::new()),
        };

        let mut envelopes = Vec::with_capacity(max_batch.min(64));
        envelopes.push(first);

        while envelopes.len() < max_batch {
            match self.inner.try_recv() {
                Ok(envelope) => envelopes.push(envelope),
                Err(_) => break,
            }
        }

        self.metrics.record_dequeued(envelopes.len() as u64);
        let now = Instant::now();
        let mut batch = Vec::with_capacity(envelopes.len());
        for envelope in envelopes {
            self.metrics.record_enqueue_latency(now.saturating_duration_since(envelope.enqueued_at));
            batch.push(envelope.item);
        }
        Some(batch)
    }

    pub fn close(&mut self) {
        self.inner.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn drop_policy_rejects_once_full_without_blocking() {
        let (tx, mut rx) = bounded::<u32>(QueueConfig::default().with_maxsize(3));

        for i in 0..3 {
            assert_eq!(tx.offer(i).await.unwrap(), OfferOutcome::Accepted);
        }
        for i in 3..10 {
            assert_eq!(tx.offer(i).await.unwrap(), OfferOutcome::Dropped);
        }

        let snap = tx.metrics().snapshot();
        assert_eq!(snap.size, 3);
        assert_eq!(snap.total_dropped, 7);

        let batch = rx.recv_batch(10, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn block_policy_waits_for_capacity() {
        let (tx, mut rx) = bounded::<u32>(
            QueueConfig::default()
                .with_maxsize(1)
                .with_overflow(OverflowPolicy::Block),
        );

        assert_eq!(tx.offer(1).await.unwrap(), OfferOutcome::Accepted);

        let tx2 = tx.clone();
        let send_task = tokio::spawn(async move { tx2.offer(2).await.unwrap() });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!send_task.is_finished());

        let batch = rx.recv_batch(1, Duration::from_millis(50)).await.unwrap();
        assert_eq!(batch, vec![1]);

        let outcome = send_task.await.unwrap();
        assert_eq!(outcome, OfferOutcome::Accepted);
    }

    #[tokio::test]
    async fn block_policy_with_timeout_surfaces_error() {
        let (tx, _rx) = bounded::<u32>(QueueConfig {
            maxsize: 1,
            overflow: OverflowPolicy::Block,
            producer_timeout: Some(Duration::from_millis(20)),
            ..QueueConfig::default()
        });

        assert_eq!(tx.offer(1).await.unwrap(), OfferOutcome::Accepted);
        let result = tx.offer(2).await;
        assert!(matches!(result, Err(QueueError::BlockedTimeout { .. })));
    }

    #[tokio::test]
    async fn recv_batch_returns_empty_after_first_wait_elapses() {
        let (_tx, mut rx) = bounded::<u32>(QueueConfig::default());
        let batch = rx.recv_batch(10, Duration::from_millis(10)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[tokio::test]
    async fn recv_batch_returns_none_once_closed_and_drained() {
        let (tx, mut rx) = bounded::<u32>(QueueConfig::default());
        drop(tx);
        let batch = rx.recv_batch(10, Duration::from_millis(10)).await;
        assert_eq!(batch, None);
    }

    #[tokio::test(start_paused = true)]
    async fn recv_batch_records_enqueue_latency() {
        let (tx, mut rx) = bounded::<u32>(QueueConfig::default());
        tx.offer(1).await.unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;

        rx.recv_batch(10, Duration::from_millis(50)).await.unwrap();

        let latency = rx.metrics().snapshot().enqueue_latency;
        assert!(latency >= Duration::from_millis(30));
    }

    #[tokio::test]
    async fn sample_policy_never_exceeds_bounded_wait() {
        let (tx, _rx) = bounded::<u32>(
            QueueConfig::default()
                .with_maxsize(1)
                .with_overflow(OverflowPolicy::Sample)
                .with_sampling_rate(1.0),
        );
        assert_eq!(tx.offer(1).await.unwrap(), OfferOutcome::Accepted);

        let start = tokio::time::Instant::now();
        let outcome = tx.offer(2).await.unwrap();
        assert_eq!(outcome, OfferOutcome::Dropped);
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
