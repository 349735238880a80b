//! Bridge supervisor: owns the serial link, both broker clients and the RX
//! worker, and moves messages between the two sides.
//!
//! Command path: MQTT subscriber → [`handle_command`] → serial TX.
//! Telemetry path: RX thread → frame parser → `TelemetryEvent` → MQTT.
//!
//! The two paths share only the mutex-guarded serial link; there is no
//! ordering between a command written to the panel and telemetry read back,
//! since the panel may emit events that predate the command.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{error, info, warn};

use crate::command::CommandEnvelope;
use crate::config::{CommandsConfig, GatewayConfig};
use crate::mqtt::{MqttPublisher, MqttSubscriber};
use crate::protocol::{FrameConfig, FrameParser};
use crate::serial::{LinkError, SerialLink, SystemPorts, UsbId};
use crate::telemetry::TelemetryEvent;

/// Idle sleep when the port has nothing to read.
const IDLE_POLL: Duration = Duration::from_millis(1);
/// Pause after an error that does not look like a disconnect.
const UNEXPECTED_ERROR_PAUSE: Duration = Duration::from_millis(100);
/// How long shutdown waits for the RX worker before abandoning it.
const RX_JOIN_TIMEOUT: Duration = Duration::from_secs(1);

/// Exponential backoff for serial reconnection attempts.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    delay: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            delay: initial,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Doubles the delay, saturating at the cap.
    pub fn bump(&mut self) {
        self.delay = (self.delay * 2).min(self.max);
    }

    /// Back to the initial delay after any success.
    pub fn reset(&mut self) {
        self.delay = self.initial;
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), Duration::from_secs(5))
    }
}

/// Gateway bridging MQTT (cloud) and the serial link (panel) for commands
/// and telemetry.
pub struct Gateway {
    config: GatewayConfig,
    link: Arc<Mutex<SerialLink>>,
    running: Arc<AtomicBool>,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        let provider = Box::new(SystemPorts::new(UsbId {
            vid: config.serial.usb_vid,
            pid: config.serial.usb_pid,
        }));
        let link = SerialLink::new(&config.serial, config.protocol.frame(), provider);
        Self {
            config,
            link: Arc::new(Mutex::new(link)),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Runs the bridge until ctrl-c, or until the subscriber loop dies.
    /// Cleanup runs unconditionally on the way out.
    pub async fn run(self) -> Result<()> {
        let publisher = Arc::new(MqttPublisher::spawn(&self.config.mqtt));
        let subscriber = MqttSubscriber::new(&self.config.mqtt, &self.config.topics.command);

        self.running.store(true, Ordering::Relaxed);

        // RX worker: blocking serial reads stay off the async runtime
        let rx_handle = {
            let link = Arc::clone(&self.link);
            let running = Arc::clone(&self.running);
            let publisher = Arc::clone(&publisher);
            let topic = self.config.topics.telemetry.clone();
            let frame = self.config.protocol.frame();
            thread::Builder::new()
                .name("serial-rx".into())
                .spawn(move || {
                    rx_loop(&link, &running, frame, Backoff::default(), |payload| {
                        publish_telemetry(&publisher, &topic, &payload);
                    });
                })
                .context("failed to spawn serial RX worker")?
        };

        // CMD worker: broker event loop dispatching into the serial link
        let commands = self.config.commands.clone();
        let link = Arc::clone(&self.link);
        let mut cmd_task = tokio::spawn(subscriber.run(move |payload| {
            handle_command(&commands, &link, payload);
        }));

        info!("gateway running");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("ctrl-c received, shutting down");
            }
            _ = &mut cmd_task => {
                warn!("command subscriber ended unexpectedly");
            }
        }

        // Cooperative shutdown: flag first, then a bounded join
        self.running.store(false, Ordering::Relaxed);
        cmd_task.abort();
        join_with_timeout(rx_handle, RX_JOIN_TIMEOUT);
        self.link.lock().unwrap().close();
        publisher.disconnect().await;
        info!("gateway stopped");
        Ok(())
    }
}

/// Decodes a command-topic payload and forwards it to the panel.
///
/// Anything malformed, unknown or disabled is logged and dropped without
/// touching the serial link.
pub fn handle_command(config: &CommandsConfig, link: &Mutex<SerialLink>, payload: &str) {
    let decoded = CommandEnvelope::decode(payload)
        .and_then(|envelope| envelope.command(&config.payload_key, &config.valid_commands));
    let command = match decoded {
        Ok(command) => command,
        Err(e) => {
            warn!(error = %e, payload = %payload, "rejected command payload");
            return;
        }
    };
    info!(command = %command, "command received");
    if let Err(e) = link.lock().unwrap().send(command) {
        warn!(command = %command, error = %e, "failed to forward command to panel");
    }
}

/// Serial RX loop: drains the port one byte at a time and reconnects with
/// exponential backoff whenever the link drops.
///
/// The parser lives on this thread only and is rebuilt on every reconnect,
/// so no half-frame survives across device sessions.
pub fn rx_loop(
    link: &Mutex<SerialLink>,
    running: &AtomicBool,
    frame: FrameConfig,
    mut backoff: Backoff,
    mut on_frame: impl FnMut(Vec<u8>),
) {
    info!("serial RX worker started");
    let mut parser = FrameParser::new(frame);

    while running.load(Ordering::Relaxed) {
        if !link.lock().unwrap().is_connected() {
            info!(
                delay_ms = backoff.delay().as_millis() as u64,
                "serial link down, reconnecting after backoff"
            );
            thread::sleep(backoff.delay());
            if !running.load(Ordering::Relaxed) {
                break;
            }
            let mut guard = link.lock().unwrap();
            if guard.reconnect() {
                backoff.reset();
                // Fresh parser for the new session, then drop whatever the
                // rebooting device left in the buffers
                parser = FrameParser::new(frame);
                guard.flush_io();
            } else {
                backoff.bump();
            }
            continue;
        }

        let step = {
            let mut guard = link.lock().unwrap();
            match guard.in_waiting() {
                Ok(0) => Ok(None),
                Ok(_) => guard.read_byte(),
                Err(e) => Err(e),
            }
        };

        match step {
            Ok(Some(byte)) => {
                backoff.reset();
                if let Some(payload) = parser.process_byte(byte) {
                    // ACK failures are swallowed; a broken port surfaces on
                    // the next read
                    let _ = link.lock().unwrap().write_raw(frame.ack);
                    on_frame(payload);
                }
            }
            Ok(None) => thread::sleep(IDLE_POLL),
            Err(LinkError::Transport(e)) => {
                warn!(error = %e, "serial transport error, link marked down");
            }
            Err(LinkError::NotConnected) => {
                // Handle vanished between the connect check and the read;
                // the reconnect branch takes over next iteration
            }
            Err(e) => {
                error!(error = %e, "unexpected error in RX loop");
                thread::sleep(UNEXPECTED_ERROR_PAUSE);
            }
        }
    }
    info!("serial RX worker stopped");
}

/// Decodes one validated frame payload and publishes it as JSON.
fn publish_telemetry(publisher: &MqttPublisher, topic: &str, payload: &[u8]) {
    match TelemetryEvent::from_wire(payload) {
        Ok(event) => {
            publisher.publish_json(topic, &event);
        }
        Err(e) => {
            warn!(error = %e, payload = ?payload, "dropping malformed telemetry frame");
        }
    }
}

fn join_with_timeout(handle: thread::JoinHandle<()>, timeout: Duration) {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            warn!("RX worker did not stop in time, abandoning it");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    let _ = handle.join();
}
