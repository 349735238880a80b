//! The closed command vocabulary and command-topic payload decoding.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

/// One of the fixed operations the panel accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Arm,
    Disarm,
    Resolve,
}

impl Command {
    pub fn as_str(self) -> &'static str {
        match self {
            Command::Arm => "ARM",
            Command::Disarm => "DISARM",
            Command::Resolve => "RESOLVE",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Command {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ARM" => Ok(Command::Arm),
            "DISARM" => Ok(Command::Disarm),
            "RESOLVE" => Ok(Command::Resolve),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("payload is not a JSON object: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("payload has no string field {0:?}")]
    MissingField(String),
    #[error("unknown command {0:?}")]
    Unknown(String),
    #[error("command {0} is disabled by configuration")]
    Disabled(Command),
}

/// Decoded command-topic payload: a JSON object whose configured key names
/// the command. All other fields are ignored.
#[derive(Debug, Deserialize)]
pub struct CommandEnvelope(serde_json::Map<String, Value>);

impl CommandEnvelope {
    pub fn decode(payload: &str) -> Result<Self, CommandError> {
        Ok(Self(serde_json::from_str(payload)?))
    }

    /// The command under `key`, checked against the configured valid set.
    ///
    /// The vocabulary is closed; the configured set can only narrow it
    /// further (e.g. a deployment that never resolves remotely).
    pub fn command(&self, key: &str, valid: &[String]) -> Result<Command, CommandError> {
        let raw = self
            .0
            .get(key)
            .and_then(Value::as_str)
            .ok_or_else(|| CommandError::MissingField(key.to_string()))?;
        let command = raw
            .parse::<Command>()
            .map_err(|()| CommandError::Unknown(raw.to_string()))?;
        if !valid.iter().any(|entry| entry == command.as_str()) {
            return Err(CommandError::Disabled(command));
        }
        Ok(command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_valid() -> Vec<String> {
        vec!["ARM".into(), "DISARM".into(), "RESOLVE".into()]
    }

    fn decode_with(payload: &str) -> Result<Command, CommandError> {
        CommandEnvelope::decode(payload)?.command("command", &all_valid())
    }

    #[test]
    fn accepts_every_command_in_the_vocabulary() {
        for (text, expected) in [
            ("ARM", Command::Arm),
            ("DISARM", Command::Disarm),
            ("RESOLVE", Command::Resolve),
        ] {
            let payload = format!(r#"{{"command":"{text}"}}"#);
            assert_eq!(decode_with(&payload).unwrap(), expected);
        }
    }

    #[test]
    fn ignores_extra_fields() {
        let payload = r#"{"origin":"app","command":"ARM","request_id":17}"#;
        assert_eq!(decode_with(payload).unwrap(), Command::Arm);
    }

    #[test]
    fn rejects_unknown_command() {
        assert!(matches!(
            decode_with(r#"{"command":"EXPLODE"}"#),
            Err(CommandError::Unknown(_))
        ));
        // The vocabulary is case-sensitive
        assert!(matches!(
            decode_with(r#"{"command":"arm"}"#),
            Err(CommandError::Unknown(_))
        ));
    }

    #[test]
    fn rejects_missing_or_non_string_field() {
        assert!(matches!(
            decode_with(r#"{"other":"ARM"}"#),
            Err(CommandError::MissingField(_))
        ));
        assert!(matches!(
            decode_with(r#"{"command":17}"#),
            Err(CommandError::MissingField(_))
        ));
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(matches!(decode_with("not json"), Err(CommandError::InvalidJson(_))));
        assert!(matches!(decode_with(r#"["ARM"]"#), Err(CommandError::InvalidJson(_))));
    }

    #[test]
    fn configured_set_narrows_the_vocabulary() {
        let envelope = CommandEnvelope::decode(r#"{"command":"RESOLVE"}"#).unwrap();
        let narrowed = vec!["ARM".to_string(), "DISARM".to_string()];
        assert!(matches!(
            envelope.command("command", &narrowed),
            Err(CommandError::Disabled(Command::Resolve))
        ));
    }

    #[test]
    fn honors_a_custom_payload_key() {
        let envelope = CommandEnvelope::decode(r#"{"action":"DISARM"}"#).unwrap();
        assert_eq!(
            envelope.command("action", &all_valid()).unwrap(),
            Command::Disarm
        );
    }
}
