//! The bounded event queue that decouples producers from the sink worker
//! (§4.3-§4.4). Disk-backed durability is explicitly out of scope (§1
//! Non-goals: "guaranteed durability of logs beyond best-effort in-memory
//! queuing plus sink retries"), so unlike the buffer crate this is modeled
//! on, there is only one variant: a bounded in-memory channel.

pub mod config;
pub mod internal_events;
pub mod metrics;
pub mod queue;

pub use config::{OverflowPolicy, QueueConfig};
pub use metrics::{QueueMetrics, QueueMetricsSnapshot};
pub use queue::{bounded, OfferOutcome, QueueError, QueueReceiver, QueueSender};
