//! The processor pipeline (§4.2): an ordered, total transformation of each
//! event, ending either in a rendered [`Event`] ready for enqueue or in a
//! drop. Every built-in stage lives in its own submodule; this file only
//! sequences them and owns per-pipeline state (cached regexes, host
//! identity, the resource sampler).

pub mod custom;
pub mod enrich;
pub mod redact;
pub mod render;
pub mod sample;

use std::sync::Arc;

use lumen_common::{Event, Level};
use regex::Regex;

use crate::config::Settings;
use crate::context::ContextFrame;
use crate::error::ConfigError;
use crate::internal_events::EventDroppedAtStage;
use crate::registry::EnricherRegistry;

use enrich::{HostInfo, ResourceSampler};

/// The subset of [`crate::config::Settings`] the pipeline needs, already
/// validated and with its regexes precompiled (§4.2: patterns are compiled
/// once, not per event).
pub struct PipelineConfig {
    pub level: Level,
    pub enable_resource_metrics: bool,
    pub redact_fields: Vec<String>,
    pub redact_patterns: Vec<Regex>,
    pub redact_replacement: String,
    pub redact_level: Level,
    pub enable_auto_redact_pii: bool,
    pub pii_patterns: Vec<Regex>,
    pub sampling_rate: f64,
}

impl PipelineConfig {
    pub fn build(settings: &Settings) -> Result<Self, ConfigError> {
        let redact_patterns = settings
            .redact_patterns
            .iter()
            .map(|source| redact::compile_pattern(source))
            .collect::<Result<Vec<_>, _>>()?;

        let mut pii_patterns = Vec::new();
        if settings.enable_auto_redact_pii {
            pii_patterns.extend(redact::builtin_pii_patterns());
            for source in &settings.custom_pii_patterns {
                pii_patterns.push(redact::compile_pattern(source)?);
            }
        }

        Ok(PipelineConfig {
            level: settings.level,
            enable_resource_metrics: settings.enable_resource_metrics,
            redact_fields: settings.redact_fields.clone(),
            redact_patterns,
            redact_replacement: settings.redact_replacement.clone(),
            redact_level: settings.redact_level,
            enable_auto_redact_pii: settings.enable_auto_redact_pii,
            pii_patterns,
            sampling_rate: settings.sampling_rate,
        })
    }
}

/// Holds one immutable config snapshot plus the mutable (but atomically
/// swapped) enricher registry and the small amount of per-pipeline runtime
/// state (§4.2: "The pipeline is immutable after `configure`").
pub struct Pipeline {
    config: PipelineConfig,
    enrichers: Arc<EnricherRegistry>,
    host: HostInfo,
    resource_sampler: Option<ResourceSampler>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, enrichers: Arc<EnricherRegistry>) -> Self {
        let resource_sampler = config.enable_resource_metrics.then(ResourceSampler::new);
        Pipeline {
            config,
            enrichers,
            host: HostInfo::resolve(),
            resource_sampler,
        }
    }

    /// Runs `event` through every stage (§4.2 stages 1-11). Returns `None`
    /// if the event was dropped at any stage; otherwise the event is fully
    /// enriched, redacted, sampled and rendered, ready for the caller to
    /// enqueue (stage 12 is the caller's responsibility — see
    /// [`crate::logger::Logger`]).
    pub fn process(&self, mut event: Event, context: &ContextFrame) -> Option<Event> {
        let level = event.level().unwrap_or(Level::Info);

        // Stage 1: level filter.
        if level < self.config.level {
            lumen_common::internal_event::emit(EventDroppedAtStage { stage: "level_filter" });
            return None;
        }

        // Stage 2: context.
        enrich::enrich_context(&mut event, context);

        // Stage 3: host/process.
        enrich::enrich_host_process(&mut event, &self.host);

        // Stage 4: resource usage.
        if let Some(sampler) = &self.resource_sampler {
            sampler.enrich(&mut event);
        }

        // Stage 5: request/response.
        enrich::enrich_request_response(&mut event, context);

        // Stage 6: custom enrichers, isolated.
        let snapshot = self.enrichers.snapshot();
        custom::run_custom_enrichers(&mut event, &snapshot);

        // Stage 7: field redaction.
        redact::redact_fields(&mut event, &self.config.redact_fields, &self.config.redact_replacement);

        // Stage 8: pattern redaction, gated by level.
        if level >= self.config.redact_level && !self.config.redact_patterns.is_empty() {
            redact::redact_patterns(&mut event, &self.config.redact_patterns, &self.config.redact_replacement);
        }

        // Stage 9: PII auto-redaction.
        if self.config.enable_auto_redact_pii && !self.config.pii_patterns.is_empty() {
            redact::redact_patterns(&mut event, &self.config.pii_patterns, &self.config.redact_replacement);
        }

        // Stage 10: sampler. Runs after enrichment so dropped events still
        // contributed to the metrics above but carry no further cost.
        if !sample::should_keep(level, self.config.sampling_rate) {
            lumen_common::internal_event::emit(EventDroppedAtStage { stage: "sampler" });
            return None;
        }

        // Stage 11: render.
        render::render(&mut event);

        Some(event)
    }
}
