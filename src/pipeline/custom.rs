//! Custom enrichers (§4.2 stage 6, §6 `register_enricher`). A custom
//! enricher is any `Fn(&mut Event) -> Result<(), String>`; a panic or an
//! `Err` is caught by the pipeline and logged to the fallback channel, the
//! event continues unchanged (§7 "Enricher error").

use std::panic::{catch_unwind, AssertUnwindSafe};

use lumen_common::Event;

use crate::internal_events::CustomEnricherFailed;

pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;
    fn enrich(&self, event: &mut Event) -> Result<(), String>;
}

/// Adapts a plain closure to [`Enricher`] so `register_enricher(name, fn)`
/// does not require callers to define a type.
pub struct FnEnricher<F> {
    name: String,
    f: F,
}

impl<F> FnEnricher<F>
where
    F: Fn(&mut Event) -> Result<(), String> + Send + Sync,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        FnEnricher {
            name: name.into(),
            f,
        }
    }
}

impl<F> Enricher for FnEnricher<F>
where
    F: Fn(&mut Event) -> Result<(), String> + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn enrich(&self, event: &mut Event) -> Result<(), String> {
        (self.f)(event)
    }
}

/// Runs every registered enricher in order. Each is isolated: a panic or an
/// `Err` is caught and logged, and the remaining enrichers still run.
pub fn run_custom_enrichers(event: &mut Event, enrichers: &[std::sync::Arc<dyn Enricher>]) {
    for enricher in enrichers {
        let outcome = catch_unwind(AssertUnwindSafe(|| enricher.enrich(event)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                lumen_common::internal_event::emit(CustomEnricherFailed {
                    enricher: enricher.name().to_string(),
                    reason,
                });
            }
            Err(_) => {
                lumen_common::internal_event::emit(CustomEnricherFailed {
                    enricher: enricher.name().to_string(),
                    reason: "enricher panicked".to_string(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn a_panicking_enricher_does_not_stop_the_rest() {
        let mut event = Event::new();
        let enrichers: Vec<Arc<dyn Enricher>> = vec![
            Arc::new(FnEnricher::new("boom", |_: &mut Event| -> Result<(), String> {
                panic!("bad enricher")
            })),
            Arc::new(FnEnricher::new("ok", |event: &mut Event| {
                event.insert("marked".to_string(), true.into());
                Ok(())
            })),
        ];

        run_custom_enrichers(&mut event, &enrichers);
        assert_eq!(event.get("marked"), Some(&lumen_common::Value::Bool(true)));
    }

    #[test]
    fn an_erroring_enricher_is_isolated() {
        let mut event = Event::new();
        let enrichers: Vec<Arc<dyn Enricher>> = vec![Arc::new(FnEnricher::new(
            "failing",
            |_: &mut Event| Err("nope".to_string()),
        ))];
        run_custom_enrichers(&mut event, &enrichers);
        assert!(event.is_empty());
    }
}
