//! Command-topic subscriber.

use rumqttc::{AsyncClient, Event, EventLoop, Packet, QoS};
use tracing::{error, info, warn};

use crate::config::MqttConfig;

use super::{mqtt_options, CLIENT_QUEUE, RECONNECT_PAUSE};

/// Receives command payloads from the broker.
///
/// Holds one topic subscription at a time and renews it on every successful
/// (re)connect, so a broker restart cannot silently sever the command path.
pub struct MqttSubscriber {
    client: AsyncClient,
    event_loop: EventLoop,
    topic: String,
}

impl MqttSubscriber {
    pub fn new(config: &MqttConfig, topic: &str) -> Self {
        let (client, event_loop) =
            AsyncClient::new(mqtt_options(config, "alarm-gateway-cmd"), CLIENT_QUEUE);
        Self {
            client,
            event_loop,
            topic: topic.to_string(),
        }
    }

    /// Event loop: dispatches each message on the command topic to
    /// `on_message` as raw text. Runs until the surrounding task is
    /// cancelled.
    pub async fn run(mut self, mut on_message: impl FnMut(&str)) {
        info!(topic = %self.topic, "command subscriber started");
        loop {
            match self.event_loop.poll().await {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    info!("connected to MQTT broker");
                    match self.client.subscribe(&self.topic, QoS::AtLeastOnce).await {
                        Ok(()) => info!(topic = %self.topic, "subscribed to command topic"),
                        Err(e) => error!(topic = %self.topic, error = %e, "subscribe failed"),
                    }
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    let payload = String::from_utf8_lossy(&publish.payload);
                    info!(topic = %publish.topic, payload = %payload, "message received");
                    on_message(&payload);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!(error = %e, "MQTT connection error, retrying");
                    tokio::time::sleep(RECONNECT_PAUSE).await;
                }
            }
        }
    }
}
