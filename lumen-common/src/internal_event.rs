//! The "fallback channel" of §7: every subsystem emits small, named events
//! that bundle a `tracing` log line with the `metrics` counters/gauges it
//! updates, so that call sites read as `emit(ThingHappened { .. })` instead of
//! scattering `counter!`/`debug!` calls inline.

/// An event that, when emitted, records both a diagnostic log line and the
/// metrics associated with it.
pub trait InternalEvent {
    fn emit(self);
}

/// Emits an [`InternalEvent`]. A thin wrapper so call sites read the same way
/// regardless of whether the event type needs `self` by value.
pub fn emit(event: impl InternalEvent) {
    event.emit();
}

/// Stable `error_type` label values, shared across subsystems so dashboards
/// can group on a single label regardless of which component raised it.
pub mod error_type {
    pub const READER_FAILED: &str = "reader_failed";
    pub const WRITER_FAILED: &str = "writer_failed";
    pub const ENCODER_FAILED: &str = "encoder_failed";
    pub const REQUEST_FAILED: &str = "request_failed";
    pub const CONFIGURATION_FAILED: &str = "configuration_failed";
}

/// Declares an internal-event type whose metrics carry a fixed label set
/// computed once at construction, rather than recomputed on every `emit`.
/// Mirrors the pattern used for high-frequency events like per-sink send
/// duration, where re-allocating label strings on every call would be wasteful.
///
/// ```ignore
/// registered_event! {
///     SinkSendDuration { sink_id: String } => {
///         send_duration: Histogram = histogram!("sink_send_duration_seconds", "sink_id" => self.sink_id.clone()),
///     }
///
///     fn emit(&self, duration: Duration) {
///         self.send_duration.record(duration);
///     }
/// }
/// ```
#[macro_export]
macro_rules! registered_event {
    (
        $name:ident { $($field:ident: $field_ty:ty),* $(,)? } => {
            $($metric_field:ident: $metric_ty:ty = $metric_init:expr),* $(,)?
        }

        fn emit(&$self:ident, $($arg:ident: $arg_ty:ty),* $(,)?) $body:block
    ) => {
        pub struct $name {
            $($field: $field_ty,)*
            $($metric_field: $metric_ty,)*
        }

        impl $name {
            #[allow(clippy::too_many_arguments)]
            pub fn new($($field: $field_ty),*) -> Self {
                $(let $metric_field: $metric_ty = $metric_init;)*
                Self { $($field,)* $($metric_field,)* }
            }

            pub fn emit(&$self, $($arg: $arg_ty),*) $body
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counted<'a> {
        counter: &'a AtomicUsize,
    }

    impl InternalEvent for Counted<'_> {
        fn emit(self) {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn emit_invokes_the_event() {
        let counter = AtomicUsize::new(0);
        emit(Counted { counter: &counter });
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
