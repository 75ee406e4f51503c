//! Internal events for the root crate's subsystems, following the same
//! `InternalEvent` pattern as `lumen_buffers::internal_events`: one small
//! struct per observable occurrence, emitting both a `tracing` line and the
//! relevant `metrics` instrument from a single `emit` call.

use lumen_common::internal_event::InternalEvent;

pub struct ContextBindOutsideScope;

impl InternalEvent for ContextBindOutsideScope {
    fn emit(self) {
        tracing::debug!(
            message = "Context bind called with no active context scope; field dropped.",
        );
        metrics::counter!("context_bind_outside_scope_total").increment(1);
    }
}

pub struct CustomEnricherFailed {
    pub enricher: String,
    pub reason: String,
}

impl InternalEvent for CustomEnricherFailed {
    fn emit(self) {
        tracing::warn!(
            message = "Custom enricher failed; event continues unchanged.",
            enricher = %self.enricher,
            reason = %self.reason,
        );
        metrics::counter!("enricher_errors_total", "enricher" => self.enricher).increment(1);
    }
}

pub struct SinkDeliveryFailed {
    pub sink: String,
    pub reason: String,
    pub transient: bool,
}

impl InternalEvent for SinkDeliveryFailed {
    fn emit(self) {
        tracing::error!(
            message = "Sink delivery failed.",
            sink = %self.sink,
            reason = %self.reason,
            transient = self.transient,
        );
        metrics::counter!("sink_delivery_failures_total", "sink" => self.sink).increment(1);
    }
}

pub struct SinkDispatchTimedOut {
    pub sink: String,
}

impl InternalEvent for SinkDispatchTimedOut {
    fn emit(self) {
        tracing::warn!(
            message = "Sink dispatch exceeded its per-dispatch deadline; batch recorded as dropped for this sink.",
            sink = %self.sink,
        );
        metrics::counter!("sink_dispatch_timeouts_total", "sink" => self.sink).increment(1);
    }
}

pub struct EventDroppedAtStage {
    pub stage: &'static str,
}

impl InternalEvent for EventDroppedAtStage {
    fn emit(self) {
        tracing::trace!(message = "Event dropped.", stage = self.stage);
        metrics::counter!("pipeline_events_dropped_total", "stage" => self.stage).increment(1);
    }
}

pub struct SinkLifecycleFailed {
    pub sink: String,
    pub phase: &'static str,
    pub reason: String,
}

impl InternalEvent for SinkLifecycleFailed {
    fn emit(self) {
        tracing::error!(
            message = "Sink lifecycle call failed.",
            sink = %self.sink,
            phase = self.phase,
            reason = %self.reason,
        );
        metrics::counter!("sink_lifecycle_errors_total", "sink" => self.sink, "phase" => self.phase)
            .increment(1);
    }
}

pub struct WorkerShutdownComplete {
    pub drained: u64,
    pub dropped_on_shutdown: u64,
}

impl InternalEvent for WorkerShutdownComplete {
    fn emit(self) {
        tracing::info!(
            message = "Worker shutdown complete.",
            drained = self.drained,
            dropped_on_shutdown = self.dropped_on_shutdown,
        );
        metrics::counter!("worker_dropped_on_shutdown_total").increment(self.dropped_on_shutdown);
    }
}
