//! The Loki-style HTTP batch-push sink (§4.6). Buffers events and flushes
//! when `batch_size` is reached or `batch_interval` elapses; wire format is
//! the standard Loki push API shape.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use lumen_common::Event;
use serde::Serialize;

use crate::error::ConfigError;
use crate::sink::{Sink, SinkError, SinkUri};

const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_BATCH_INTERVAL: Duration = Duration::from_secs(5);

/// Parses `labels=job:api,env:prod` into a sorted label map (sorted so the
/// rendered `stream` object is deterministic across runs).
fn parse_labels(raw: &str) -> BTreeMap<String, String> {
    raw.split(',')
        .filter_map(|pair| pair.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect()
}

#[derive(Serialize)]
struct PushRequest {
    streams: Vec<Stream>,
}

#[derive(Serialize)]
struct Stream {
    stream: BTreeMap<String, String>,
    values: Vec<[String; 2]>,
}

/// `write_batch` here means "buffer"; the sink flushes on its own schedule
/// (batch_size/batch_interval), so every call appends and then checks
/// whether a flush is due. The worker's own batch size governs how many
/// events arrive per `write_batch` call, independent of this sink's Loki
/// batch; the two are different knobs on purpose (§4.6 vs §4.4).
pub struct LokiSink {
    endpoint: String,
    labels: BTreeMap<String, String>,
    batch_size: usize,
    batch_interval: Duration,
    client: reqwest::Client,
    buffer: Mutex<Vec<Event>>,
    last_flush: Mutex<std::time::Instant>,
}

impl LokiSink {
    pub fn from_uri(uri: &SinkUri) -> Result<Self, ConfigError> {
        uri.reject_unknown_params(&["batch_size", "batch_interval", "labels"])?;

        let batch_size = match uri.param("batch_size") {
            Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidSetting {
                field: "batch_size".to_string(),
                reason: format!("`{raw}` is not a valid batch size"),
            })?,
            None => DEFAULT_BATCH_SIZE,
        };
        let batch_interval = match uri.param("batch_interval") {
            Some(raw) => humantime::parse_duration(raw).map_err(|err| ConfigError::InvalidSetting {
                field: "batch_interval".to_string(),
                reason: err.to_string(),
            })?,
            None => DEFAULT_BATCH_INTERVAL,
        };
        let labels = uri.param("labels").map(parse_labels).unwrap_or_default();

        let host = uri.host.as_deref().unwrap_or("localhost");
        let port = uri.port.map(|p| format!(":{p}")).unwrap_or_default();
        let path = if uri.path.is_empty() || uri.path == "/" {
            "/loki/api/v1/push".to_string()
        } else {
            uri.path.clone()
        };
        let endpoint = format!("http://{host}{port}{path}");

        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| ConfigError::MissingDependency {
                scheme: "loki".to_string(),
                reason: err.to_string(),
            })?;

        Ok(LokiSink {
            endpoint,
            labels,
            batch_size,
            batch_interval,
            client,
            buffer: Mutex::new(Vec::new()),
            last_flush: Mutex::new(std::time::Instant::now()),
        })
    }

    fn build_request(&self, events: Vec<Event>) -> PushRequest {
        let values = events
            .iter()
            .map(|event| {
                let nanos = event
                    .get("timestamp")
                    .and_then(|v| v.as_str())
                    .and_then(|ts| chrono::DateTime::parse_from_rfc3339(ts).ok())
                    .map(|dt| dt.timestamp_nanos_opt().unwrap_or_default())
                    .unwrap_or_else(|| chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default());
                [nanos.to_string(), event.to_json_string()]
            })
            .collect();

        PushRequest {
            streams: vec![Stream {
                stream: self.labels.clone(),
                values,
            }],
        }
    }

    async fn flush(&self, events: Vec<Event>) -> Result<(), SinkError> {
        if events.is_empty() {
            return Ok(());
        }
        let body = self.build_request(events);
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| SinkError::transient(err.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(SinkError::from_http_status(
                response.status().as_u16(),
                format!("Loki responded with status {}", response.status()),
            ))
        }
    }
}

#[async_trait]
impl Sink for LokiSink {
    async fn initialize(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write_batch(&self, batch: &[Event]) -> Result<(), SinkError> {
        let to_flush = {
            let mut buffer = self.buffer.lock().unwrap_or_else(|poison| poison.into_inner());
            buffer.extend_from_slice(batch);

            let elapsed = self
                .last_flush
                .lock()
                .unwrap_or_else(|poison| poison.into_inner())
                .elapsed();
            if buffer.len() >= self.batch_size || elapsed >= self.batch_interval {
                Some(std::mem::take(&mut *buffer))
            } else {
                None
            }
        };

        if let Some(events) = to_flush {
            *self.last_flush.lock().unwrap_or_else(|poison| poison.into_inner()) = std::time::Instant::now();
            if let Err(err) = self.flush(events.clone()).await {
                let mut buffer = self.buffer.lock().unwrap_or_else(|poison| poison.into_inner());
                buffer.splice(0..0, events);
                return Err(err);
            }
        }
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        let remaining = std::mem::take(&mut *self.buffer.lock().unwrap_or_else(|poison| poison.into_inner()));
        if let Err(err) = self.flush(remaining.clone()).await {
            let mut buffer = self.buffer.lock().unwrap_or_else(|poison| poison.into_inner());
            buffer.splice(0..0, remaining);
            return Err(err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_label_query_parameter() {
        let labels = parse_labels("job:api,env:prod");
        assert_eq!(labels.get("job").map(String::as_str), Some("api"));
        assert_eq!(labels.get("env").map(String::as_str), Some("prod"));
    }

    #[test]
    fn builds_wire_payload_with_two_element_values_in_order() {
        let uri = SinkUri::parse("loki://localhost:3100/loki/api/v1/push?labels=job:api,env:prod").unwrap();
        let sink = LokiSink::from_uri(&uri).unwrap();

        let mut first = Event::new();
        first.insert("timestamp", "2020-01-01T00:00:00.000Z");
        first.insert("level", "INFO");
        first.insert("event", "one");

        let mut second = Event::new();
        second.insert("timestamp", "2020-01-01T00:00:00.010Z");
        second.insert("level", "INFO");
        second.insert("event", "two");

        let request = sink.build_request(vec![first, second]);
        assert_eq!(request.streams.len(), 1);
        assert_eq!(request.streams[0].stream.get("job").map(String::as_str), Some("api"));
        assert_eq!(request.streams[0].values.len(), 2);
        assert!(request.streams[0].values[0][1].contains("\"one\""));
        assert!(request.streams[0].values[1][1].contains("\"two\""));
    }

    #[test]
    fn default_endpoint_is_the_standard_loki_push_path() {
        let uri = SinkUri::parse("loki://localhost:3100").unwrap();
        let sink = LokiSink::from_uri(&uri).unwrap();
        assert_eq!(sink.endpoint, "http://localhost:3100/loki/api/v1/push");
    }
}
