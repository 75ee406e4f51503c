//! Stage 11: assigns the timestamp if the caller did not set one, and
//! leaves the event ready for canonical-JSON rendering at the sink layer
//! (§3: "Timestamp is assigned here if not set"; §6 "Rendered event").

use chrono::{SecondsFormat, Utc};
use lumen_common::Event;

pub fn render(event: &mut Event) {
    if !event.contains_key("timestamp") {
        let timestamp = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        event.insert("timestamp".to_string(), timestamp.into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_a_millisecond_precision_utc_timestamp_when_absent() {
        let mut event = Event::new();
        render(&mut event);
        let timestamp = event.get("timestamp").unwrap().as_str().unwrap().to_string();
        assert!(timestamp.ends_with('Z'));
        assert!(chrono::DateTime::parse_from_rfc3339(&timestamp).is_ok());
    }

    #[test]
    fn does_not_overwrite_a_caller_supplied_timestamp() {
        let mut event = Event::new();
        event.insert("timestamp".to_string(), "2020-01-01T00:00:00.000Z".into());
        render(&mut event);
        assert_eq!(
            event.get("timestamp").unwrap().as_str(),
            Some("2020-01-01T00:00:00.000Z")
        );
    }
}
