use indexmap::IndexMap;

use crate::level::Level;
use crate::value::Value;

/// A single log event: a mutable mapping from string keys to JSON-compatible
/// values (§3). Required keys after the pipeline completes are `timestamp`,
/// `level`, and `event`; everything else is optional or user-supplied.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Event {
    fields: IndexMap<String, Value>,
}

impl Event {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    pub fn with_message(message: impl Into<String>) -> Self {
        let mut event = Self::new();
        event.insert("event", Value::String(message.into()));
        event
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(key.into(), value.into());
    }

    /// Inserts only if the key is absent. Enrichers must never overwrite
    /// caller-supplied keys (§4.2: "Enrichers never overwrite caller-supplied
    /// keys"). Returns whether the insert happened.
    pub fn insert_if_absent(&mut self, key: &str, value: impl Into<Value>) -> bool {
        if self.fields.contains_key(key) {
            false
        } else {
            self.fields.insert(key.to_string(), value.into());
            true
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.fields.shift_remove(key)
    }

    pub fn iter(&self) -> indexmap::map::Iter<'_, String, Value> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn level(&self) -> Option<Level> {
        match self.get("level") {
            Some(Value::String(s)) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn message(&self) -> Option<&str> {
        self.get("event").and_then(Value::as_str)
    }

    /// Replaces the leaf(s) addressed by a dotted path (e.g. `"user.password"`)
    /// with `replacement`. A path segment landing on an array applies the rest
    /// of the path to every element of the array (§4.2 stage 7). Returns the
    /// number of leaves replaced.
    pub fn redact_path(&mut self, path: &str, replacement: &str) -> usize {
        let segments: Vec<&str> = path.split('.').collect();
        if segments.is_empty() {
            return 0;
        }
        redact_segments(&mut self.fields, &segments, replacement)
    }

    /// Visits every string-valued leaf in the event depth-first, passing the
    /// immediate field name and the current string value. If the visitor
    /// returns `Some(replacement)`, the leaf is replaced in place.
    ///
    /// Used by the pattern redactor and the PII auto-redactor, both of which
    /// must inspect field names as well as string values (§4.2 stages 8-9).
    pub fn visit_strings_mut(&mut self, visit: &mut dyn FnMut(&str, &str) -> Option<String>) {
        visit_object_mut(&mut self.fields, visit);
    }

    /// Produces the canonical JSON rendering of the event (§4.2 stage 11,
    /// §6 "Rendered event").
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.fields
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }

    pub fn to_json_string(&self) -> String {
        self.to_json().to_string()
    }
}

fn redact_segments(map: &mut IndexMap<String, Value>, segments: &[&str], replacement: &str) -> usize {
    let (head, rest) = match segments.split_first() {
        Some(split) => split,
        None => return 0,
    };

    let Some(value) = map.get_mut(*head) else {
        return 0;
    };

    if rest.is_empty() {
        *value = Value::String(replacement.to_string());
        return 1;
    }

    redact_value(value, rest, replacement)
}

fn redact_value(value: &mut Value, segments: &[&str], replacement: &str) -> usize {
    match value {
        Value::Object(map) => redact_segments(map, segments, replacement),
        Value::Array(items) => items
            .iter_mut()
            .map(|item| redact_value(item, segments, replacement))
            .sum(),
        _ => 0,
    }
}

fn visit_object_mut(
    map: &mut IndexMap<String, Value>,
    visit: &mut dyn FnMut(&str, &str) -> Option<String>,
) {
    for (key, value) in map.iter_mut() {
        visit_value_mut(key, value, visit);
    }
}

fn visit_value_mut(key: &str, value: &mut Value, visit: &mut dyn FnMut(&str, &str) -> Option<String>) {
    match value {
        Value::String(s) => {
            if let Some(replacement) = visit(key, s) {
                *s = replacement;
            }
        }
        Value::Object(map) => visit_object_mut(map, visit),
        Value::Array(items) => {
            for item in items.iter_mut() {
                visit_value_mut(key, item, visit);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> Event {
        let mut event = Event::with_message("x");
        event.insert("level", "INFO");

        let mut user = IndexMap::new();
        user.insert("password".to_string(), Value::from("p"));
        user.insert("name".to_string(), Value::from("n"));
        event.insert("user", Value::Object(user));

        let mut auth = IndexMap::new();
        auth.insert("token".to_string(), Value::from("t"));
        event.insert("auth", Value::Object(auth));

        event.insert("note", "has secret in it");
        event
    }

    #[test]
    fn field_redaction_matches_spec_scenario() {
        let mut event = sample_event();

        assert_eq!(event.redact_path("user.password", "REDACTED"), 1);
        assert_eq!(event.redact_path("auth.token", "REDACTED"), 1);

        assert_eq!(
            event.get("user").unwrap().as_object().unwrap().get("password"),
            Some(&Value::from("REDACTED"))
        );
        assert_eq!(
            event.get("user").unwrap().as_object().unwrap().get("name"),
            Some(&Value::from("n"))
        );
        assert_eq!(
            event.get("auth").unwrap().as_object().unwrap().get("token"),
            Some(&Value::from("REDACTED"))
        );
    }

    #[test]
    fn field_redaction_applies_to_each_array_element() {
        let mut event = Event::new();
        let mut a = IndexMap::new();
        a.insert("secret".to_string(), Value::from("s1"));
        let mut b = IndexMap::new();
        b.insert("secret".to_string(), Value::from("s2"));
        event.insert("items", Value::Array(vec![Value::Object(a), Value::Object(b)]));

        let replaced = event.redact_path("items.secret", "REDACTED");
        assert_eq!(replaced, 2);

        if let Value::Array(items) = event.get("items").unwrap() {
            for item in items {
                assert_eq!(
                    item.as_object().unwrap().get("secret"),
                    Some(&Value::from("REDACTED"))
                );
            }
        } else {
            panic!("expected array");
        }
    }

    #[test]
    fn redaction_is_idempotent() {
        let mut event = sample_event();
        event.redact_path("user.password", "REDACTED");
        let after_first = event.clone();
        event.redact_path("user.password", "REDACTED");
        assert_eq!(event, after_first);
    }

    #[test]
    fn pattern_redaction_matches_value_not_just_name() {
        let mut event = sample_event();
        let pattern = regex::Regex::new("(?i)secret").unwrap();

        event.visit_strings_mut(&mut |key, value| {
            if pattern.is_match(key) || pattern.is_match(value) {
                Some("REDACTED".to_string())
            } else {
                None
            }
        });

        assert_eq!(event.get("note"), Some(&Value::from("REDACTED")));
        assert_eq!(
            event.get("user").unwrap().as_object().unwrap().get("name"),
            Some(&Value::from("n"))
        );
    }

    #[test]
    fn enrichers_never_overwrite_caller_supplied_keys() {
        let mut event = Event::new();
        event.insert("hostname", "caller-supplied");
        assert!(!event.insert_if_absent("hostname", "enricher-supplied"));
        assert_eq!(event.get("hostname"), Some(&Value::from("caller-supplied")));
    }

    #[test]
    fn rendering_is_deterministic() {
        let event = sample_event();
        assert_eq!(event.to_json_string(), event.clone().to_json_string());
    }
}
