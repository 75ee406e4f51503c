//! Name-keyed registries for sinks and custom enrichers (§3 "Registries",
//! §5 "enricher registry and sink set are mutated only through configuration
//! operations; after `configure`, they are treated as read-only by hot
//! paths"). Both are idempotent by name and clearable for test isolation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::error::ConfigError;
use crate::pipeline::custom::Enricher;
use crate::sink::{Sink, SinkUri};

/// Builds a boxed [`Sink`] from a parsed URI. Registered per scheme.
pub type SinkConstructor = Arc<dyn Fn(&SinkUri) -> Result<Box<dyn Sink>, ConfigError> + Send + Sync>;

/// `scheme → constructor` table (§3, §6 "Sink URI syntax").
#[derive(Default)]
pub struct SinkRegistry {
    constructors: Mutex<HashMap<String, SinkConstructor>>,
}

impl SinkRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, scheme: impl Into<String>, constructor: SinkConstructor) -> Result<(), ConfigError> {
        let scheme = scheme.into();
        let mut constructors = self.constructors.lock().unwrap_or_else(|poison| poison.into_inner());
        if constructors.contains_key(&scheme) {
            return Err(ConfigError::DuplicateSinkScheme { scheme });
        }
        constructors.insert(scheme, constructor);
        Ok(())
    }

    pub fn build(&self, uri: &str) -> Result<Box<dyn Sink>, ConfigError> {
        let parsed = SinkUri::parse(uri)?;
        let constructors = self.constructors.lock().unwrap_or_else(|poison| poison.into_inner());
        let constructor = constructors
            .get(&parsed.scheme)
            .ok_or_else(|| ConfigError::UnknownSinkScheme {
                scheme: parsed.scheme.clone(),
            })?;
        constructor(&parsed)
    }

    pub fn clear(&self) {
        self.constructors.lock().unwrap_or_else(|poison| poison.into_inner()).clear();
    }
}

/// Ordered list of custom enrichers, stored behind an [`ArcSwap`] so
/// `register_enricher` after `configure` is an atomic copy-on-write swap
/// (§4.2: "adding an enricher after start ... must be thread-safe
/// (copy-on-write list)").
pub struct EnricherRegistry {
    enrichers: ArcSwap<Vec<Arc<dyn Enricher>>>,
}

impl Default for EnricherRegistry {
    fn default() -> Self {
        EnricherRegistry {
            enrichers: ArcSwap::from_pointee(Vec::new()),
        }
    }
}

impl EnricherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, enricher: Arc<dyn Enricher>) -> Result<(), ConfigError> {
        let name = enricher.name().to_string();
        let current = self.enrichers.load();
        if current.iter().any(|existing| existing.name() == name) {
            return Err(ConfigError::DuplicateEnricher { name });
        }
        let mut next = (**current).clone();
        next.push(enricher);
        self.enrichers.store(Arc::new(next));
        Ok(())
    }

    /// An atomically consistent snapshot for one pipeline run.
    pub fn snapshot(&self) -> Arc<Vec<Arc<dyn Enricher>>> {
        self.enrichers.load_full()
    }

    pub fn clear(&self) {
        self.enrichers.store(Arc::new(Vec::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::custom::FnEnricher;
    use lumen_common::Event;

    #[test]
    fn enricher_registry_rejects_duplicates_by_name() {
        let registry = EnricherRegistry::new();
        let first: Arc<dyn Enricher> = Arc::new(FnEnricher::new("dup", |_: &mut Event| Ok(())));
        let second: Arc<dyn Enricher> = Arc::new(FnEnricher::new("dup", |_: &mut Event| Ok(())));
        registry.register(first).unwrap();
        let result = registry.register(second);
        assert!(matches!(result, Err(ConfigError::DuplicateEnricher { .. })));
    }

    #[test]
    fn enricher_registry_snapshot_is_stable_across_later_registrations() {
        let registry = EnricherRegistry::new();
        registry
            .register(Arc::new(FnEnricher::new("a", |_: &mut Event| Ok(()))))
            .unwrap();
        let snapshot = registry.snapshot();
        registry
            .register(Arc::new(FnEnricher::new("b", |_: &mut Event| Ok(()))))
            .unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.snapshot().len(), 2);
    }

    #[test]
    fn sink_registry_rejects_duplicate_scheme() {
        let registry = SinkRegistry::new();
        let ctor: SinkConstructor = Arc::new(|_uri: &SinkUri| Err(ConfigError::SinkBuildFailed {
            scheme: "x".to_string(),
            reason: "unused in this test".to_string(),
        }));
        registry.register("x", ctor.clone()).unwrap();
        let result = registry.register("x", ctor);
        assert!(matches!(result, Err(ConfigError::DuplicateSinkScheme { .. })));
    }

    #[test]
    fn sink_registry_build_reports_unknown_scheme() {
        let registry = SinkRegistry::new();
        let result = registry.build("ftp://example.com");
        assert!(matches!(result, Err(ConfigError::UnknownSinkScheme { .. })));
    }

    #[test]
    fn clear_empties_both_registries() {
        let enrichers = EnricherRegistry::new();
        enrichers
            .register(Arc::new(FnEnricher::new("a", |_: &mut Event| Ok(()))))
            .unwrap();
        enrichers.clear();
        assert!(enrichers.snapshot().is_empty());

        let sinks = SinkRegistry::new();
        let ctor: SinkConstructor = Arc::new(|_uri: &SinkUri| Err(ConfigError::SinkBuildFailed {
            scheme: "x".to_string(),
            reason: "unused in this test".to_string(),
        }));
        sinks.register("x", ctor).unwrap();
        sinks.clear();
        assert!(matches!(
            sinks.build("x://host"),
            Err(ConfigError::UnknownSinkScheme { .. })
        ));
    }
}
