//! Cloud side: thin publisher/subscriber wrappers over rumqttc.
//!
//! The gateway keeps two independent broker connections, one per direction,
//! each driven by its own event-loop task. rumqttc reconnects by simply
//! being polled again, so neither wrapper carries explicit retry plumbing.

pub mod publisher;
pub mod subscriber;

pub use publisher::MqttPublisher;
pub use subscriber::MqttSubscriber;

use std::time::Duration;

use rumqttc::MqttOptions;

use crate::config::MqttConfig;

/// Pause after an event-loop error before polling (and thereby
/// reconnecting) again.
pub(crate) const RECONNECT_PAUSE: Duration = Duration::from_secs(1);

/// Request-queue depth for each client.
pub(crate) const CLIENT_QUEUE: usize = 16;

pub(crate) fn mqtt_options(config: &MqttConfig, client_id: &str) -> MqttOptions {
    let mut options = MqttOptions::new(client_id, &config.broker, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive));
    if !config.username.is_empty() {
        options.set_credentials(
            config.username.clone(),
            config.password.clone().unwrap_or_default(),
        );
    }
    options
}
