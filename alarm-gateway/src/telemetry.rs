//! Telemetry events forwarded from the panel to the cloud.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TelemetryError {
    #[error("payload is not valid UTF-8")]
    NotText,
    #[error("expected 3 pipe-delimited fields, got {0}")]
    FieldCount(usize),
    #[error("motion flag {0:?} is not an integer")]
    BadMotionFlag(String),
    #[error("alarm state is empty")]
    EmptyState,
}

/// One device-originated event: an alarm state transition, optionally
/// caused by a motion warning.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// 1 when raised by the motion sensor, 0 for command-originated events
    pub from_motion: u8,
    /// Alarm state after the transition (e.g. `DISARMED`, `WARN`, `ARMED`)
    pub alarm_state: String,
    /// Warning tag for motion events (e.g. `HIGH`); null for command events
    pub warn_type: Option<String>,
    /// When the gateway received the event, UTC
    pub timestamp: DateTime<Utc>,
}

impl TelemetryEvent {
    /// Decodes the panel's `FROM_MOTION|WARN_TYPE|ALARM_STATE` wire payload,
    /// stamping it with the current UTC time.
    pub fn from_wire(payload: &[u8]) -> Result<Self, TelemetryError> {
        let text = std::str::from_utf8(payload).map_err(|_| TelemetryError::NotText)?;
        let parts: Vec<&str> = text.split('|').collect();
        if parts.len() != 3 {
            return Err(TelemetryError::FieldCount(parts.len()));
        }
        let from_motion = parts[0]
            .parse::<u8>()
            .map_err(|_| TelemetryError::BadMotionFlag(parts[0].to_string()))?;
        // An empty warn type marks a command-originated event
        let warn_type = (!parts[1].is_empty()).then(|| parts[1].to_string());
        if parts[2].is_empty() {
            return Err(TelemetryError::EmptyState);
        }
        Ok(Self {
            from_motion,
            alarm_state: parts[2].to_string(),
            warn_type,
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_a_motion_event() {
        let event = TelemetryEvent::from_wire(b"1|HIGH|WARN").unwrap();
        assert_eq!(event.from_motion, 1);
        assert_eq!(event.warn_type.as_deref(), Some("HIGH"));
        assert_eq!(event.alarm_state, "WARN");
    }

    #[test]
    fn decodes_a_command_event_with_null_warn_type() {
        let event = TelemetryEvent::from_wire(b"0||DISARMED").unwrap();
        assert_eq!(event.from_motion, 0);
        assert_eq!(event.warn_type, None);
        assert_eq!(event.alarm_state, "DISARMED");
    }

    #[test]
    fn serializes_the_shape_the_cloud_expects() {
        let event = TelemetryEvent::from_wire(b"0||DISARMED").unwrap();
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["from_motion"], 0);
        assert_eq!(json["alarm_state"], "DISARMED");
        assert!(json["warn_type"].is_null());
        // RFC 3339 timestamps end in Z or an offset
        let timestamp = json["timestamp"].as_str().unwrap();
        assert!(timestamp.contains('T'));
    }

    #[test]
    fn rejects_wrong_field_count() {
        assert_eq!(
            TelemetryEvent::from_wire(b"1|WARN"),
            Err(TelemetryError::FieldCount(2))
        );
        assert_eq!(
            TelemetryEvent::from_wire(b"1|HIGH|WARN|extra"),
            Err(TelemetryError::FieldCount(4))
        );
    }

    #[test]
    fn rejects_non_integer_motion_flag() {
        assert_eq!(
            TelemetryEvent::from_wire(b"yes|HIGH|WARN"),
            Err(TelemetryError::BadMotionFlag("yes".to_string()))
        );
    }

    #[test]
    fn rejects_empty_alarm_state() {
        assert_eq!(
            TelemetryEvent::from_wire(b"1|HIGH|"),
            Err(TelemetryError::EmptyState)
        );
    }

    #[test]
    fn rejects_non_utf8_payload() {
        assert_eq!(
            TelemetryEvent::from_wire(&[0xFF, 0xFE, 0x7C]),
            Err(TelemetryError::NotText)
        );
    }
}
