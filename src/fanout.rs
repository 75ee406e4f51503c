//! Multi-sink fan-out, retry, and circuit breaking (§4.5). A batch is
//! dispatched to every sink concurrently; each sink retries independently
//! with exponential backoff and jitter, and trips its own circuit breaker on
//! sustained failure. A slow or failing sink never affects another sink's
//! throughput (§8 property 10).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use lumen_common::Event;
use metrics::Histogram;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

use crate::internal_events::{SinkDeliveryFailed, SinkDispatchTimedOut};
use crate::sink::{Sink, SinkError};

const MAX_BACKOFF: Duration = Duration::from_secs(60);

// SinkDeliveryDuration: per-sink delivery-duration histogram with a fixed
// `sink` label, recording the wall-clock time one `deliver` call spends
// reaching a terminal outcome (delivered, or retries exhausted).
lumen_common::registered_event! {
    SinkDeliveryDuration { sink: String } => {
        duration: Histogram = metrics::histogram!("sink_delivery_duration_seconds", "sink" => sink.clone()),
    }

    fn emit(&self, elapsed: Duration) {
        self.duration.record(elapsed.as_secs_f64());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

/// Per-sink failure/recovery state machine (§4.5: "after `N_failure_threshold`
/// ... `open` ... `half_open` ... `M_success` ... closes it").
pub struct CircuitBreaker {
    failure_threshold: u32,
    success_threshold: u32,
    recovery_timeout: Duration,
    state: AsyncMutex<CircuitState>,
    consecutive_failures: AtomicU32,
    consecutive_successes: AtomicU32,
    opened_at: AsyncMutex<Option<tokio::time::Instant>>,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, success_threshold: u32, recovery_timeout: Duration) -> Self {
        CircuitBreaker {
            failure_threshold,
            success_threshold,
            recovery_timeout,
            state: AsyncMutex::new(CircuitState::Closed),
            consecutive_failures: AtomicU32::new(0),
            consecutive_successes: AtomicU32::new(0),
            opened_at: AsyncMutex::new(None),
        }
    }

    pub fn default_policy() -> Self {
        Self::new(5, 3, Duration::from_secs(60))
    }

    pub async fn state(&self) -> CircuitState {
        *self.state.lock().await
    }

    /// Returns `true` if a dispatch should be attempted: always when closed,
    /// never while open (unless the recovery timeout has elapsed, in which
    /// case it transitions to half-open and admits exactly this one probe).
    pub async fn admit(&self) -> bool {
        let mut state = self.state.lock().await;
        match *state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let opened_at = *self.opened_at.lock().await;
                let elapsed = opened_at.map(|at| at.elapsed()).unwrap_or(Duration::MAX);
                if elapsed >= self.recovery_timeout {
                    *state = CircuitState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub async fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::SeqCst);
        let mut state = self.state.lock().await;
        if *state == CircuitState::HalfOpen {
            let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
            if successes >= self.success_threshold {
                *state = CircuitState::Closed;
                self.consecutive_successes.store(0, Ordering::SeqCst);
            }
        }
    }

    pub async fn record_failure(&self) {
        self.consecutive_successes.store(0, Ordering::SeqCst);
        let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
        let mut state = self.state.lock().await;
        if *state == CircuitState::HalfOpen || failures >= self.failure_threshold {
            *state = CircuitState::Open;
            *self.opened_at.lock().await = Some(tokio::time::Instant::now());
        }
    }
}

pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// delay = base_delay * 2^(attempt-1), uniform jitter in [0, delay],
    /// capped at 60s (§4.5).
    fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let scaled = self.base_delay.saturating_mul(1u32.checked_shl(exponent).unwrap_or(u32::MAX));
        let capped = scaled.min(MAX_BACKOFF);
        let jitter_fraction: f64 = rand::rng().random();
        capped.mul_f64(jitter_fraction)
    }
}

#[derive(Default)]
pub struct SinkOutcomeCounters {
    pub delivered_total: AtomicU64,
    pub dropped_on_shutdown: AtomicU64,
    pub permanent_failures: AtomicU64,
}

/// A configured sink plus its retry policy, circuit breaker, and counters.
/// Owns the sink exclusively (§3: "no sink may be shared between logger
/// instances").
pub struct FanoutSink {
    pub name: String,
    pub sink: Box<dyn Sink>,
    pub retry: RetryPolicy,
    pub breaker: CircuitBreaker,
    pub counters: SinkOutcomeCounters,
    delivery_duration: SinkDeliveryDuration,
}

impl FanoutSink {
    pub fn new(name: impl Into<String>, sink: Box<dyn Sink>, retry: RetryPolicy) -> Self {
        let name = name.into();
        FanoutSink {
            delivery_duration: SinkDeliveryDuration::new(name.clone()),
            name,
            sink,
            retry,
            breaker: CircuitBreaker::default_policy(),
            counters: SinkOutcomeCounters::default(),
        }
    }

    /// Writes one batch with up to `max_retries + 1` attempts (§8 property
    /// 9), respecting the circuit breaker and a shared abandon deadline for
    /// outstanding retries during shutdown (§5 "Retries honor the drain
    /// deadline").
    async fn deliver(&self, batch: &[Event], abandon_after: Option<Duration>) {
        if !self.breaker.admit().await {
            self.counters
                .dropped_on_shutdown
                .fetch_add(batch.len() as u64, Ordering::SeqCst);
            return;
        }

        let started = tokio::time::Instant::now();
        let mut attempt = 1;
        loop {
            let result = self.sink.write_batch(batch).await;
            match result {
                Ok(()) => {
                    self.breaker.record_success().await;
                    self.counters
                        .delivered_total
                        .fetch_add(batch.len() as u64, Ordering::SeqCst);
                    self.delivery_duration.emit(started.elapsed());
                    return;
                }
                Err(err) => {
                    if !err.is_transient() || attempt > self.retry.max_retries {
                        self.breaker.record_failure().await;
                        self.counters.permanent_failures.fetch_add(1, Ordering::SeqCst);
                        self.delivery_duration.emit(started.elapsed());
                        lumen_common::internal_event::emit(SinkDeliveryFailed {
                            sink: self.name.clone(),
                            reason: err.message().to_string(),
                            transient: err.is_transient(),
                        });
                        return;
                    }

                    if let Some(deadline) = abandon_after {
                        if started.elapsed() >= deadline {
                            return;
                        }
                    }

                    let delay = self.retry.backoff_for_attempt(attempt);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }
}

/// Dispatches `batch` to every sink concurrently, each bounded by
/// `per_dispatch_deadline` (§4.5: "implementation default:
/// `queue_batch_timeout · 10`"). A sink exceeding the deadline has the batch
/// recorded as dropped for that sink and is not cancelled mid-write; its
/// in-flight write is simply detached (§4.5, §9: "cooperative cancellation
/// only at safe points").
pub async fn dispatch(
    sinks: &[Arc<FanoutSink>],
    batch: Arc<Vec<Event>>,
    per_dispatch_deadline: Duration,
    abandon_after: Option<Duration>,
) {
    let mut handles = Vec::with_capacity(sinks.len());
    for sink in sinks {
        // The delivery itself runs in its own task so that racing it against
        // the per-dispatch deadline never cancels an in-flight write: timing
        // out below only stops *awaiting* `delivery_task`, it does not abort
        // it, so a non-idempotent write already underway runs to completion
        // detached from this dispatch.
        let delivery_sink = Arc::clone(sink);
        let delivery_batch = Arc::clone(&batch);
        let mut delivery_task = tokio::spawn(async move {
            delivery_sink.deliver(&delivery_batch, abandon_after).await;
        });

        let sink = Arc::clone(sink);
        let batch = Arc::clone(&batch);
        handles.push(tokio::spawn(async move {
            if timeout(per_dispatch_deadline, &mut delivery_task).await.is_err() {
                lumen_common::internal_event::emit(SinkDispatchTimedOut {
                    sink: sink.name.clone(),
                });
                sink.counters
                    .dropped_on_shutdown
                    .fetch_add(batch.len() as u64, Ordering::SeqCst);
            }
        }));
    }
    for handle in handles {
        let _ = handle.await;
    }
}
