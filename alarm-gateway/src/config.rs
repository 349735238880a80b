//! Gateway configuration.
//!
//! Loaded once at startup from a JSON file and passed explicitly to the
//! components that need it. The only environment override is the broker
//! password (`MQTT_PASSWORD`), so credentials can stay out of the file.

use std::env;
use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use crate::protocol::FrameConfig;

/// Environment variable overriding `mqtt.password`.
const PASSWORD_ENV: &str = "MQTT_PASSWORD";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found: {0}")]
    Missing(String),
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("unsupported payload encoding {0:?} (only utf-8 is supported)")]
    UnsupportedEncoding(String),
    #[error("invalid protocol constants: {0}")]
    InvalidProtocol(&'static str),
}

/// Broker connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    /// Keep-alive interval in seconds
    pub keep_alive: u64,
    pub username: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Serial link settings. VID/PID default to the panel's DAPLink interface.
#[derive(Debug, Clone, Deserialize)]
pub struct SerialConfig {
    pub baudrate: u32,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_usb_vid")]
    pub usb_vid: u16,
    #[serde(default = "default_usb_pid")]
    pub usb_pid: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopicsConfig {
    pub command: String,
    pub telemetry: String,
}

/// Which commands the gateway will forward, and where to find them in the
/// command-topic payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    pub valid_commands: Vec<String>,
    pub payload_key: String,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            valid_commands: vec!["ARM".into(), "DISARM".into(), "RESOLVE".into()],
            payload_key: "command".into(),
        }
    }
}

/// Framing constants shared with the panel firmware.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub stx: u8,
    pub etx: u8,
    pub ack: u8,
    pub max_data_length: u8,
    pub encoding: String,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            stx: 0x02,
            etx: 0x03,
            ack: 0x06,
            max_data_length: 64,
            encoding: "utf-8".into(),
        }
    }
}

impl ProtocolConfig {
    pub fn frame(&self) -> FrameConfig {
        FrameConfig {
            stx: self.stx,
            etx: self.etx,
            ack: self.ack,
            max_data_len: self.max_data_length,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    pub mqtt: MqttConfig,
    pub serial: SerialConfig,
    pub topics: TopicsConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub protocol: ProtocolConfig,
}

impl GatewayConfig {
    /// Loads and validates the configuration file. Any failure here is
    /// fatal: the process has nothing useful to do without a valid config.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.display().to_string()));
        }
        let raw = fs::read_to_string(path)?;
        let mut config: GatewayConfig = serde_json::from_str(&raw)?;
        if let Ok(password) = env::var(PASSWORD_ENV) {
            config.mqtt.password = Some(password);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let protocol = &self.protocol;
        let encoding = protocol.encoding.to_ascii_lowercase();
        if encoding != "utf-8" && encoding != "utf8" {
            return Err(ConfigError::UnsupportedEncoding(protocol.encoding.clone()));
        }
        if protocol.max_data_length == 0 {
            return Err(ConfigError::InvalidProtocol("max_data_length must be at least 1"));
        }
        if protocol.stx == protocol.etx || protocol.stx == protocol.ack || protocol.etx == protocol.ack {
            return Err(ConfigError::InvalidProtocol("stx, etx and ack must be distinct"));
        }
        Ok(())
    }
}

fn default_read_timeout_ms() -> u64 {
    1000
}

// ARM DAPLink VID / CMSIS-DAP PID, what the MAX32655 dev board enumerates as
fn default_usb_vid() -> u16 {
    0x0D28
}

fn default_usb_pid() -> u16 {
    0x0204
}
