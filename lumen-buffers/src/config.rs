use std::time::Duration;

use serde::{Deserialize, Serialize};

/// The policy applied when the bounded queue is full and a producer calls
/// `offer` (§4.3).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Return `Dropped` immediately; never blocks the caller.
    Drop,
    /// Wait for space. Bounded by `producer_timeout` if set, otherwise
    /// unbounded (documented as potentially blocking the caller).
    Block,
    /// Apply a secondary Bernoulli trial at `sampling_rate`; on success wait
    /// briefly for space, on failure drop immediately.
    Sample,
}

impl Default for OverflowPolicy {
    fn default() -> Self {
        OverflowPolicy::Drop
    }
}

pub const DEFAULT_SAMPLE_WAIT: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub struct QueueConfig {
    pub maxsize: usize,
    pub overflow: OverflowPolicy,
    /// Used by the `sample` overflow policy's secondary Bernoulli trial.
    pub sampling_rate: f64,
    /// Bounds the `block` policy's wait. `None` means unbounded, which is the
    /// documented default (§4.3).
    pub producer_timeout: Option<Duration>,
    /// How long `sample` waits for space after a successful trial before
    /// giving up and dropping (§4.3: "bounded, e.g., 100 ms").
    pub sample_wait: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            maxsize: 1_000,
            overflow: OverflowPolicy::default(),
            sampling_rate: 1.0,
            producer_timeout: None,
            sample_wait: DEFAULT_SAMPLE_WAIT,
        }
    }
}

impl QueueConfig {
    pub fn with_maxsize(mut self, maxsize: usize) -> Self {
        self.maxsize = maxsize;
        self
    }

    pub fn with_overflow(mut self, overflow: OverflowPolicy) -> Self {
        self.overflow = overflow;
        self
    }

    pub fn with_sampling_rate(mut self, sampling_rate: f64) -> Self {
        self.sampling_rate = sampling_rate.clamp(0.0, 1.0);
        self
    }
}
