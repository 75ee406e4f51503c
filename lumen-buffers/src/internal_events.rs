use lumen_common::internal_event::InternalEvent;

pub struct QueueEventsDropped {
    pub count: u64,
    pub reason: &'static str,
}

impl InternalEvent for QueueEventsDropped {
    fn emit(self) {
        tracing::warn!(
            message = "Queue dropped events.",
            count = self.count,
            reason = self.reason,
        );
        metrics::counter!("queue_dropped_total", "reason" => self.reason).increment(self.count);
    }
}

pub struct QueueShutdownDrained {
    pub drained: u64,
    pub dropped_on_shutdown: u64,
}

impl InternalEvent for QueueShutdownDrained {
    fn emit(self) {
        tracing::info!(
            message = "Queue drained on shutdown.",
            drained = self.drained,
            dropped_on_shutdown = self.dropped_on_shutdown,
        );
        metrics::counter!("queue_dropped_on_shutdown_total").increment(self.dropped_on_shutdown);
    }
}
