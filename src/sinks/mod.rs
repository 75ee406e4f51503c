//! The three illustrative concrete sinks (§4.6-§4.8) and a convenience
//! registrar that wires their URI schemes into a fresh [`SinkRegistry`].

pub mod file;
pub mod loki;
pub mod stdout;

use std::sync::Arc;

use crate::error::ConfigError;
use crate::registry::SinkRegistry;
use crate::sink::Sink;

/// Registers `stdout://`, `file://`, and `loki://` against `registry`.
/// Called once from [`crate::logger::configure`]; user code may still call
/// `register_sink` for additional schemes before or after.
pub fn register_builtin_sinks(registry: &SinkRegistry) -> Result<(), ConfigError> {
    registry.register(
        "stdout",
        Arc::new(|uri| {
            stdout::StdoutSink::from_uri(uri).map(|sink| Box::new(sink) as Box<dyn Sink>)
        }),
    )?;
    registry.register(
        "file",
        Arc::new(|uri| file::FileSink::from_uri(uri).map(|sink| Box::new(sink) as Box<dyn Sink>)),
    )?;
    registry.register(
        "loki",
        Arc::new(|uri| loki::LokiSink::from_uri(uri).map(|sink| Box::new(sink) as Box<dyn Sink>)),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_sinks_are_discoverable_by_scheme() {
        let registry = SinkRegistry::new();
        register_builtin_sinks(&registry).unwrap();
        assert!(registry.build("stdout://?mode=json").is_ok());
        assert!(registry.build("file:///tmp/does-not-need-to-exist-yet.log").is_ok());
        assert!(registry.build("loki://localhost:3100").is_ok());
    }
}
