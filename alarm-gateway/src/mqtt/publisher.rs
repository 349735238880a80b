//! Telemetry publisher.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use serde::Serialize;
use tracing::{info, warn};

use crate::config::MqttConfig;

use super::{mqtt_options, CLIENT_QUEUE, RECONNECT_PAUSE};

/// Publishes telemetry to the broker without ever blocking the caller.
///
/// The serial RX thread calls [`MqttPublisher::publish_json`] from outside
/// the async runtime, so publishes are enqueued with `try_publish`; the
/// driver task owns the network I/O and reconnects by continuing to poll.
/// QoS 1 messages enqueued while the broker is away are delivered once the
/// session resumes.
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<AtomicBool>,
}

impl MqttPublisher {
    /// Creates the client and spawns its event-loop driver task.
    pub fn spawn(config: &MqttConfig) -> Self {
        let (client, event_loop) =
            AsyncClient::new(mqtt_options(config, "alarm-gateway-telemetry"), CLIENT_QUEUE);
        let connected = Arc::new(AtomicBool::new(false));
        tokio::spawn(drive(event_loop, Arc::clone(&connected)));
        Self { client, connected }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// JSON-encodes `payload` and enqueues it at QoS 1. Returns whether the
    /// message was accepted for delivery.
    pub fn publish_json(&self, topic: &str, payload: &impl Serialize) -> bool {
        match serde_json::to_string(payload) {
            Ok(message) => self.publish_text(topic, &message),
            Err(e) => {
                warn!(error = %e, "failed to encode telemetry payload");
                false
            }
        }
    }

    /// Enqueues a pre-encoded payload verbatim at QoS 1.
    pub fn publish_text(&self, topic: &str, message: &str) -> bool {
        if !self.is_connected() {
            warn!(topic = %topic, "broker link down, message queued for redelivery");
        }
        match self
            .client
            .try_publish(topic, QoS::AtLeastOnce, false, message.as_bytes())
        {
            Ok(()) => {
                info!(topic = %topic, payload = %message, "telemetry published");
                true
            }
            Err(e) => {
                warn!(topic = %topic, error = %e, "publish failed");
                false
            }
        }
    }

    /// Clean disconnect, used at shutdown only.
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!(error = %e, "MQTT disconnect failed");
        }
    }
}

async fn drive(mut event_loop: EventLoop, connected: Arc<AtomicBool>) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                connected.store(true, Ordering::Relaxed);
                info!("telemetry publisher connected to MQTT broker");
            }
            Ok(_) => {}
            Err(e) => {
                connected.store(false, Ordering::Relaxed);
                warn!(error = %e, "telemetry publisher connection error, retrying");
                tokio::time::sleep(RECONNECT_PAUSE).await;
            }
        }
    }
}
