//! The stdout sink (§4.8): `json` (compact JSON per line), `pretty` (human
//! renderer with ANSI coloring), `auto` (pretty if attached to a terminal,
//! else json).

use std::io::{self, IsTerminal, Write};
use std::sync::Mutex;

use async_trait::async_trait;
use colored::{Color, Colorize};
use lumen_common::{Event, Level};

use crate::error::ConfigError;
use crate::sink::{Sink, SinkError, SinkUri};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdoutMode {
    Json,
    Pretty,
    Auto,
}

impl StdoutMode {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw {
            "json" => Ok(StdoutMode::Json),
            "pretty" => Ok(StdoutMode::Pretty),
            "auto" => Ok(StdoutMode::Auto),
            other => Err(ConfigError::InvalidSetting {
                field: "mode".to_string(),
                reason: format!("unknown stdout mode `{other}`, expected json/pretty/auto"),
            }),
        }
    }

    fn resolve(self) -> bool {
        match self {
            StdoutMode::Json => false,
            StdoutMode::Pretty => true,
            StdoutMode::Auto => io::stdout().is_terminal(),
        }
    }
}

fn level_color(level: Level) -> Color {
    match level {
        Level::Debug => Color::BrightBlack,
        Level::Info => Color::Cyan,
        Level::Warning => Color::Yellow,
        Level::Error => Color::Red,
        Level::Critical => Color::BrightRed,
    }
}

pub struct StdoutSink {
    pretty: bool,
    out: Mutex<io::Stdout>,
}

impl StdoutSink {
    pub fn from_uri(uri: &SinkUri) -> Result<Self, ConfigError> {
        uri.reject_unknown_params(&["mode"])?;
        let mode = match uri.param("mode") {
            Some(raw) => StdoutMode::parse(raw)?,
            None => StdoutMode::Auto,
        };
        Ok(StdoutSink {
            pretty: mode.resolve(),
            out: Mutex::new(io::stdout()),
        })
    }

    fn render_pretty(event: &Event) -> String {
        let level = event.level().unwrap_or_default();
        let timestamp = event.get("timestamp").and_then(|v| v.as_str()).unwrap_or("-");
        let message = event.message().unwrap_or("");
        let mut extra = String::new();
        for (key, value) in event.iter() {
            if matches!(key.as_str(), "timestamp" | "level" | "event") {
                continue;
            }
            extra.push_str(&format!(" {}={}", key, value.to_json()));
        }
        format!(
            "{} {} {}{}",
            timestamp.dimmed(),
            format!("{level:<8}").color(level_color(level)).bold(),
            message,
            extra.dimmed()
        )
    }
}

#[async_trait]
impl Sink for StdoutSink {
    async fn initialize(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn write_batch(&self, batch: &[Event]) -> Result<(), SinkError> {
        let mut out = self.out.lock().unwrap_or_else(|poison| poison.into_inner());
        for event in batch {
            let line = if self.pretty {
                Self::render_pretty(event)
            } else {
                event.to_json_string()
            };
            writeln!(out, "{line}").map_err(|err| SinkError::transient(err.to_string()))?;
        }
        out.flush().map_err(|err| SinkError::transient(err.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> Result<(), SinkError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mode_parsing_rejects_unknown_values() {
        assert!(StdoutMode::parse("xml").is_err());
        assert!(StdoutMode::parse("json").is_ok());
    }

    #[test]
    fn from_uri_rejects_unknown_query_parameter() {
        let uri = SinkUri::parse("stdout://?mode=json&bogus=1").unwrap();
        assert!(matches!(
            StdoutSink::from_uri(&uri),
            Err(ConfigError::UnknownSinkParameter { .. })
        ));
    }

    #[tokio::test]
    async fn writes_one_line_per_event_in_json_mode() {
        let uri = SinkUri::parse("stdout://?mode=json").unwrap();
        let sink = StdoutSink::from_uri(&uri).unwrap();
        let mut event = Event::new();
        event.insert("level", "INFO");
        event.insert("event", "hello");
        sink.write_batch(&[event]).await.unwrap();
    }
}
