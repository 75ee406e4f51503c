//! Shared data model and instrumentation primitives for the `lumen` logging core.
//!
//! This crate holds the pieces that are useful to both the queue (`lumen-buffers`)
//! and the pipeline/sink machinery in the root `lumen` crate: the `Value`/`Event`
//! data model (§3 of the design spec), the `Level` enum, dotted-path field access,
//! and the `InternalEvent`/`registered_event!` instrumentation pattern used
//! throughout to keep metric and log emission next to the event that caused it.

pub mod event;
pub mod internal_event;
pub mod level;
pub mod value;

pub use event::Event;
pub use level::Level;
pub use value::Value;
