//! The opaque `Settings` value object (§3, §6). Loading it from environment
//! or a config file is explicitly an external collaborator (§1); this module
//! only defines the shape and its defaults, via `serde::Deserialize` so a
//! caller can still load one from TOML/JSON/YAML with whatever crate they
//! like.

use std::time::Duration;

use lumen_buffers::OverflowPolicy;
use lumen_common::Level;
use serde::Deserialize;

fn default_level() -> Level {
    Level::Info
}

fn default_true() -> bool {
    true
}

fn default_queue_maxsize() -> usize {
    10_000
}

fn default_queue_batch_size() -> usize {
    100
}

fn default_queue_batch_timeout() -> Duration {
    Duration::from_secs(1)
}

fn default_queue_max_retries() -> u32 {
    3
}

fn default_queue_retry_delay() -> Duration {
    Duration::from_millis(500)
}

fn default_sampling_rate() -> f64 {
    1.0
}

fn default_redact_replacement() -> String {
    "REDACTED".to_string()
}

fn default_redact_level() -> Level {
    Level::Debug
}

fn default_trace_id_header() -> String {
    "X-Request-ID".to_string()
}

fn default_drain_deadline() -> Duration {
    Duration::from_secs(5)
}

/// Mirrors the configuration surface table in §6. Every field has a
/// documented default so `Settings::default()` is a usable (if minimal)
/// configuration — a single `stdout://` sink at `info` level.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Minimum level accepted by the pipeline.
    #[serde(default = "default_level")]
    pub level: Level,

    /// Ordered list of sink URIs, e.g. `stdout://?mode=auto`.
    pub sinks: Vec<String>,

    /// When `false`, the worker is inlined: `offer` synchronously invokes
    /// fan-out and there is no queue or background worker task.
    #[serde(default = "default_true")]
    pub queue_enabled: bool,

    #[serde(default = "default_queue_maxsize")]
    pub queue_maxsize: usize,

    #[serde(default)]
    pub queue_overflow: OverflowPolicy,

    #[serde(default = "default_queue_batch_size")]
    pub queue_batch_size: usize,

    #[serde(with = "humantime_serde", default = "default_queue_batch_timeout")]
    pub queue_batch_timeout: Duration,

    #[serde(default = "default_queue_max_retries")]
    pub queue_max_retries: u32,

    #[serde(with = "humantime_serde", default = "default_queue_retry_delay")]
    pub queue_retry_delay: Duration,

    /// Used both by the pipeline sampler (stage 10) and by the `sample`
    /// overflow policy's secondary Bernoulli trial.
    #[serde(default = "default_sampling_rate")]
    pub sampling_rate: f64,

    /// Dotted paths redacted verbatim by the field redactor (pipeline stage
    /// 7), e.g. `"user.password"`.
    #[serde(default)]
    pub redact_fields: Vec<String>,

    /// Regex source strings compiled once at `configure` time (pipeline
    /// stage 8).
    #[serde(default)]
    pub redact_patterns: Vec<String>,

    #[serde(default = "default_redact_replacement")]
    pub redact_replacement: String,

    /// Minimum level at which pattern redaction (stage 8) runs.
    #[serde(default = "default_redact_level")]
    pub redact_level: Level,

    #[serde(default)]
    pub enable_auto_redact_pii: bool,

    /// Additional regex sources merged with the built-in PII set (stage 9).
    #[serde(default)]
    pub custom_pii_patterns: Vec<String>,

    #[serde(default)]
    pub enable_resource_metrics: bool,

    #[serde(default = "default_trace_id_header")]
    pub trace_id_header: String,

    /// Total deadline for `shutdown`'s drain phase (§4.4 step 3b).
    #[serde(with = "humantime_serde", default = "default_drain_deadline")]
    pub drain_deadline: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            level: default_level(),
            sinks: vec!["stdout://?mode=auto".to_string()],
            queue_enabled: true,
            queue_maxsize: default_queue_maxsize(),
            queue_overflow: OverflowPolicy::default(),
            queue_batch_size: default_queue_batch_size(),
            queue_batch_timeout: default_queue_batch_timeout(),
            queue_max_retries: default_queue_max_retries(),
            queue_retry_delay: default_queue_retry_delay(),
            sampling_rate: default_sampling_rate(),
            redact_fields: Vec::new(),
            redact_patterns: Vec::new(),
            redact_replacement: default_redact_replacement(),
            redact_level: default_redact_level(),
            enable_auto_redact_pii: false,
            custom_pii_patterns: Vec::new(),
            enable_resource_metrics: false,
            trace_id_header: default_trace_id_header(),
            drain_deadline: default_drain_deadline(),
        }
    }
}

impl Settings {
    /// Clamps `sampling_rate` into `[0, 1]`; called from `configure` so a
    /// malformed config file cannot produce nonsensical sampling behavior.
    pub fn normalized(mut self) -> Self {
        self.sampling_rate = self.sampling_rate.clamp(0.0, 1.0);
        self
    }
}
