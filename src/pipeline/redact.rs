//! Redaction stages (§4.2 stages 7-9) and the built-in PII pattern set
//! (§4.2 stage 9, scenario 4).

use lumen_common::Event;
use regex::Regex;

use crate::error::ConfigError;

/// Stage 7: replace every leaf reached by a dotted path (array elements
/// fanned out) with `replacement`. Returns the number of leaves replaced.
pub fn redact_fields(event: &mut Event, fields: &[String], replacement: &str) -> usize {
    fields
        .iter()
        .map(|path| event.redact_path(path, replacement))
        .sum()
}

/// Stage 8: a compiled regex matches either the field name or the string
/// value; either is replaced wholesale with `replacement`. Case-insensitive
/// per §4.2 ("apply each compiled regex (case-insensitive)").
pub fn redact_patterns(event: &mut Event, patterns: &[Regex], replacement: &str) {
    event.visit_strings_mut(&mut |field, value| {
        for pattern in patterns {
            if pattern.is_match(field) || pattern.is_match(value) {
                return Some(replacement.to_string());
            }
        }
        None
    });
}

/// Compiles a user-supplied pattern source into a case-insensitive [`Regex`],
/// surfacing compile failures as a configuration error (checked once at
/// `configure` time, never at event-processing time).
pub fn compile_pattern(source: &str) -> Result<Regex, ConfigError> {
    Regex::new(&format!("(?i){source}")).map_err(|err| ConfigError::InvalidSetting {
        field: "redact_patterns".to_string(),
        reason: err.to_string(),
    })
}

/// Stage 9: the built-in PII set (email, phone, credit card, SSN, IPv4),
/// compiled once at configure time and reused across events.
pub fn builtin_pii_patterns() -> Vec<Regex> {
    const SOURCES: &[&str] = &[
        r"[\w.+-]+@[\w-]+\.[a-z]{2,}",
        r"\+?\d{1,3}?[-.\s]?\(?\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}",
        r"\b(?:\d[ -]*?){13,16}\b",
        r"\b\d{3}-\d{2}-\d{4}\b",
        r"\b(?:\d{1,3}\.){3}\d{1,3}\b",
    ];
    SOURCES
        .iter()
        .map(|source| Regex::new(&format!("(?i){source}")).expect("builtin PII pattern is valid"))
        .collect()
}
