//! MQTT ⇄ serial gateway for an embedded alarm panel.
//!
//! The gateway:
//! - Subscribes to a command topic and forwards validated commands to the
//!   panel over a framed serial protocol (STX/ETX delimiters, CRC-16)
//! - Reads framed telemetry off the serial port and publishes it as JSON
//! - Survives device unplug/replug with exponential-backoff reconnection
//!
//! Architecture: MQTT subscriber → serial TX | serial RX → frame parser → MQTT publisher

/// Typed configuration loaded from a JSON file
pub mod config;

/// Wire framing: CRC, frame builder and the streaming parser
pub mod protocol;

/// USB port detection and the supervised serial link
pub mod serial;

/// Cloud side: publisher and subscriber
pub mod mqtt;

/// The closed command vocabulary and envelope decoding
pub mod command;

/// Telemetry events published to the cloud
pub mod telemetry;

/// Supervisor wiring the cloud and serial sides together
pub mod bridge;
