//! Built-in enrichers: context, host/process identity, resource usage, and
//! request/response metadata (§4.2 stages 2-5). All of them respect the
//! "enrichers never overwrite caller-supplied keys" contract by using
//! [`Event::insert_if_absent`].

use std::sync::{Mutex, OnceLock};

use lumen_common::Event;
use sysinfo::{Pid, System};

use crate::context::ContextFrame;

/// Stage 2: merge the current context frame into the event.
pub fn enrich_context(event: &mut Event, frame: &ContextFrame) {
    for (key, value) in frame {
        event.insert_if_absent(key, value.clone());
    }
}

/// Process-wide identity, resolved once and cached (§4.2 stage 3: "values
/// cached").
pub struct HostInfo {
    hostname: String,
    pid: i64,
}

impl HostInfo {
    pub fn resolve() -> Self {
        static HOSTNAME: OnceLock<String> = OnceLock::new();
        let hostname = HOSTNAME
            .get_or_init(|| {
                hostname::get()
                    .ok()
                    .and_then(|h| h.into_string().ok())
                    .unwrap_or_else(|| "unknown".to_string())
            })
            .clone();
        HostInfo {
            hostname,
            pid: std::process::id() as i64,
        }
    }
}

/// Stage 3.
pub fn enrich_host_process(event: &mut Event, host: &HostInfo) {
    event.insert_if_absent("hostname", host.hostname.clone());
    event.insert_if_absent("pid", host.pid);
}

/// Stage 4, gated by `enable_resource_metrics`. Holds its own `System`
/// handle so repeated refreshes are cheap relative to constructing one per
/// event.
pub struct ResourceSampler {
    system: Mutex<System>,
    pid: Pid,
}

impl ResourceSampler {
    pub fn new() -> Self {
        ResourceSampler {
            system: Mutex::new(System::new_all()),
            pid: Pid::from_u32(std::process::id()),
        }
    }

    pub fn enrich(&self, event: &mut Event) {
        let mut system = self.system.lock().unwrap_or_else(|poison| poison.into_inner());
        system.refresh_all();
        if let Some(process) = system.process(self.pid) {
            let memory_mb = process.memory() as f64 / (1024.0 * 1024.0);
            event.insert_if_absent("memory_mb", memory_mb);
            event.insert_if_absent("cpu_percent", process.cpu_usage() as f64);
        }
    }
}

impl Default for ResourceSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// Stage 5: request/response metadata, sourced from whatever the context
/// frame carries (an adapter outside this crate is expected to `bind` these
/// fields per request).
const REQUEST_RESPONSE_FIELDS: &[&str] = &[
    "status_code",
    "latency_ms",
    "req_bytes",
    "res_bytes",
    "user_agent",
];

pub fn enrich_request_response(event: &mut Event, frame: &ContextFrame) {
    for field in REQUEST_RESPONSE_FIELDS {
        if let Some(value) = frame.get(*field) {
            event.insert_if_absent(field, value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lumen_common::Value;

    #[test]
    fn context_enricher_never_overwrites_caller_fields() {
        let mut event = Event::new();
        event.insert("trace_id".to_string(), Value::from("caller-supplied"));

        let mut frame = ContextFrame::new();
        frame.insert("trace_id".to_string(), Value::from("from-context"));
        frame.insert("span_id".to_string(), Value::from("span-1"));

        enrich_context(&mut event, &frame);

        assert_eq!(event.get("trace_id"), Some(&Value::from("caller-supplied")));
        assert_eq!(event.get("span_id"), Some(&Value::from("span-1")));
    }

    #[test]
    fn host_process_enricher_adds_hostname_and_pid_once() {
        let mut event = Event::new();
        let host = HostInfo::resolve();
        enrich_host_process(&mut event, &host);
        assert!(event.contains_key("hostname"));
        assert!(event.contains_key("pid"));
    }

    #[test]
    fn request_response_enricher_only_copies_known_fields() {
        let mut event = Event::new();
        let mut frame = ContextFrame::new();
        frame.insert("status_code".to_string(), Value::from(200i64));
        frame.insert("unrelated".to_string(), Value::from("ignored"));

        enrich_request_response(&mut event, &frame);

        assert_eq!(event.get("status_code"), Some(&Value::from(200i64)));
        assert!(!event.contains_key("unrelated"));
    }
}
