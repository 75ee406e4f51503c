//! The sink abstraction (§3 "Sink", §4.5, §4.6-§4.8) and the URI syntax used
//! to construct one from configuration (§6 "Sink URI syntax").

use std::collections::HashMap;

use async_trait::async_trait;
use lumen_common::Event;
use snafu::Snafu;
use url::Url;

use crate::error::ConfigError;

/// A sink's own classification of a delivery failure, used by fan-out
/// (§4.5) to decide whether to retry. The §9 Open Questions resolution
/// ("408/429/5xx transient, all other 4xx permanent") is implemented in
/// [`SinkError::from_http_status`] so every HTTP-backed sink gets it for
/// free.
#[derive(Debug, Snafu)]
pub enum SinkError {
    #[snafu(display("transient sink error: {message}"))]
    Transient { message: String },

    #[snafu(display("permanent sink error: {message}"))]
    Permanent { message: String },
}

impl SinkError {
    pub fn transient(message: impl Into<String>) -> Self {
        SinkError::Transient {
            message: message.into(),
        }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        SinkError::Permanent {
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SinkError::Transient { .. })
    }

    /// HTTP status code classification per the §9 resolution: connection
    /// errors and 408/429/5xx are transient; every other 4xx is permanent.
    pub fn from_http_status(status: u16, message: impl Into<String>) -> Self {
        if status == 408 || status == 429 || (500..600).contains(&status) {
            SinkError::transient(message)
        } else {
            SinkError::permanent(message)
        }
    }

    pub fn message(&self) -> &str {
        match self {
            SinkError::Transient { message } | SinkError::Permanent { message } => message,
        }
    }
}

/// An output destination. Created at configuration time, `initialize`d
/// before the worker starts, `close`d once on drain completion. A sink's
/// `write_batch` is called only from the single worker task (§3).
#[async_trait]
pub trait Sink: Send + Sync {
    async fn initialize(&self) -> Result<(), SinkError>;
    async fn write_batch(&self, batch: &[Event]) -> Result<(), SinkError>;
    async fn close(&self) -> Result<(), SinkError>;
}

/// A parsed `scheme://host[:port][/path][?k=v&k=v]` sink URI (§6).
#[derive(Debug, Clone)]
pub struct SinkUri {
    pub scheme: String,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub path: String,
    params: HashMap<String, String>,
    raw: String,
}

impl SinkUri {
    pub fn parse(uri: &str) -> Result<Self, ConfigError> {
        let url = Url::parse(uri).map_err(|err| ConfigError::InvalidSinkUri {
            uri: uri.to_string(),
            reason: err.to_string(),
        })?;

        let params = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        Ok(SinkUri {
            scheme: url.scheme().to_string(),
            host: url.host_str().map(str::to_string),
            port: url.port(),
            path: url.path().to_string(),
            params,
            raw: uri.to_string(),
        })
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    /// Rejects any query key not in `allowed`; unknown keys are a
    /// configuration error (§6).
    pub fn reject_unknown_params(&self, allowed: &[&str]) -> Result<(), ConfigError> {
        for key in self.params.keys() {
            if !allowed.contains(&key.as_str()) {
                return Err(ConfigError::UnknownSinkParameter {
                    scheme: self.scheme.clone(),
                    key: key.clone(),
                });
            }
        }
        Ok(())
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scheme_host_and_query_params() {
        let uri = SinkUri::parse("loki://localhost:3100/loki/api/v1/push?batch_size=2&labels=job:api,env:prod")
            .unwrap();
        assert_eq!(uri.scheme, "loki");
        assert_eq!(uri.host.as_deref(), Some("localhost"));
        assert_eq!(uri.port, Some(3100));
        assert_eq!(uri.param("batch_size"), Some("2"));
    }

    #[test]
    fn rejects_unknown_query_parameter() {
        let uri = SinkUri::parse("stdout://?mode=json&bogus=1").unwrap();
        let result = uri.reject_unknown_params(&["mode"]);
        assert!(matches!(result, Err(ConfigError::UnknownSinkParameter { .. })));
    }

    #[test]
    fn rejects_malformed_uri() {
        let result = SinkUri::parse("not a uri");
        assert!(matches!(result, Err(ConfigError::InvalidSinkUri { .. })));
    }

    #[test]
    fn http_status_classification_matches_the_open_question_resolution() {
        assert!(SinkError::from_http_status(503, "x").is_transient());
        assert!(SinkError::from_http_status(429, "x").is_transient());
        assert!(SinkError::from_http_status(408, "x").is_transient());
        assert!(!SinkError::from_http_status(400, "x").is_transient());
        assert!(!SinkError::from_http_status(404, "x").is_transient());
    }
}
