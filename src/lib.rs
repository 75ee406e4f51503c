//! `lumen`: a structured logging core for asynchronous network services.
//!
//! Event flow, leaf to root: callers bind request-scoped [`context`] fields,
//! emit events through the [`pipeline`], which enriches, redacts, samples and
//! renders them before handing them to the bounded [`queue`]. A single
//! [`worker`] task drains the queue in batches and [`fanout`]s each batch to
//! every configured [`sink`] concurrently, retrying transient failures with
//! backoff and tripping a circuit breaker on sustained failure.
//!
//! The thin call-site API (`configure(...)`, `log.info(...)`), environment
//! loading, and web-framework middleware that binds request state are
//! treated as external collaborators and live outside this crate; see
//! [`logger::Logger`] for the seam at which such an adapter would attach.

pub mod config;
pub mod context;
pub mod error;
pub mod fanout;
pub mod internal_events;
pub mod logger;
pub mod pipeline;
pub mod registry;
pub mod sink;
pub mod sinks;
pub mod worker;

pub use lumen_common::{Event, Level, Value};

pub use config::Settings;
pub use context::ContextStore;
pub use error::{ConfigError, ContextError};
pub use logger::{configure, Logger};
pub use sink::Sink;
pub use worker::DrainReport;
