//! Alarm gateway binary.
//!
//! Bridges an MQTT broker and a serial-attached alarm panel:
//! - Forwards validated cloud commands to the panel over a framed protocol
//! - Publishes panel telemetry (alarm states, motion warnings) as JSON
//!
//! Configuration comes from a JSON file (path in `ALARM_GATEWAY_CONFIG`,
//! default `config.json`); only the broker password may come from the
//! environment. The process runs until ctrl-c and exits non-zero only when
//! startup itself fails.

use std::env;
use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::info;

use alarm_gateway::bridge::Gateway;
use alarm_gateway::config::GatewayConfig;

const CONFIG_ENV: &str = "ALARM_GATEWAY_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing subscriber for structured logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .init();

    let config_path = env::var(CONFIG_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.json"));

    let config = GatewayConfig::load(&config_path)
        .with_context(|| format!("failed to load configuration from {}", config_path.display()))?;

    info!(
        broker = %config.mqtt.broker,
        port = config.mqtt.port,
        command_topic = %config.topics.command,
        telemetry_topic = %config.topics.telemetry,
        baud = config.serial.baudrate,
        "alarm gateway starting"
    );

    Gateway::new(config).run().await
}
