//! Error taxonomy (§7). Configuration errors are synchronous and fatal to
//! startup; everything else is caught at its boundary and converted into an
//! internal event rather than propagated into the caller's hot path.

use snafu::Snafu;

/// Raised synchronously from [`crate::logger::configure`]. Fatal to startup.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ConfigError {
    #[snafu(display("unknown sink scheme: {scheme}"))]
    UnknownSinkScheme { scheme: String },

    #[snafu(display("sink {scheme} rejected unknown query parameter: {key}"))]
    UnknownSinkParameter { scheme: String, key: String },

    #[snafu(display("enricher {name} is already registered"))]
    DuplicateEnricher { name: String },

    #[snafu(display("sink scheme {scheme} is already registered"))]
    DuplicateSinkScheme { scheme: String },

    #[snafu(display("missing dependency for sink {scheme}: {reason}"))]
    MissingDependency { scheme: String, reason: String },

    #[snafu(display("invalid sink URI `{uri}`: {reason}"))]
    InvalidSinkUri { uri: String, reason: String },

    #[snafu(display("invalid setting `{field}`: {reason}"))]
    InvalidSetting { field: String, reason: String },

    #[snafu(display("failed to build sink `{scheme}`: {reason}"))]
    SinkBuildFailed { scheme: String, reason: String },
}

/// Raised to the caller from `bind_context`; never reaches the pipeline (§7).
#[derive(Debug, Snafu)]
#[snafu(display("invalid context value for field `{field}`: {reason}"))]
pub struct ContextError {
    pub field: String,
    pub reason: String,
}
