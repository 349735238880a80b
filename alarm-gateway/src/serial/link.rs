//! The supervised serial link.
//!
//! Owns the port handle and a `connected` flag that any transport error
//! flips to false, so the RX loop can notice and re-enter its reconnect
//! backoff. Nothing here panics on a vanished device.

use std::io::{self, Read, Write};
use std::time::Duration;

use serialport::ClearBuffer;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::Command;
use crate::config::SerialConfig;
use crate::protocol::{self, FrameConfig, FrameError};

use super::detect::{PortDetector, UsbId};

#[derive(Debug, Error)]
pub enum LinkError {
    /// No open handle, or a previous operation already failed
    #[error("serial link not connected")]
    NotConnected,
    /// The handle raised an I/O error; the link is now marked disconnected
    #[error("serial transport error: {0}")]
    Transport(#[from] io::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// The host serial handle as the gateway needs it: single-byte reads bounded
/// by the port timeout, whole-buffer writes, a readable-bytes probe and a
/// buffer flush.
pub trait DevicePort: Send {
    /// Bytes currently readable without blocking.
    fn in_waiting(&mut self) -> io::Result<u32>;
    /// One byte, or `None` when the read timeout expires first.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    fn write_all_bytes(&mut self, buf: &[u8]) -> io::Result<()>;
    /// Discards both transmit and receive buffers.
    fn discard_buffers(&mut self) -> io::Result<()>;
}

/// Detection-and-open collaborator, so tests can supply fake ports.
pub trait PortProvider: Send {
    fn detect(&self) -> Option<String>;
    fn open(&self, name: &str, baud: u32, timeout: Duration) -> io::Result<Box<dyn DevicePort>>;
}

impl DevicePort for Box<dyn serialport::SerialPort> {
    fn in_waiting(&mut self) -> io::Result<u32> {
        self.bytes_to_read().map_err(io::Error::from)
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        match self.read(&mut buf) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buf[0])),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn write_all_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
        self.write_all(buf)
    }

    fn discard_buffers(&mut self) -> io::Result<()> {
        self.clear(ClearBuffer::All).map_err(io::Error::from)
    }
}

/// Production provider backed by the host's serial stack.
pub struct SystemPorts {
    detector: PortDetector,
}

impl SystemPorts {
    pub fn new(id: UsbId) -> Self {
        Self {
            detector: PortDetector::new(id),
        }
    }
}

impl PortProvider for SystemPorts {
    fn detect(&self) -> Option<String> {
        self.detector.detect()
    }

    fn open(&self, name: &str, baud: u32, timeout: Duration) -> io::Result<Box<dyn DevicePort>> {
        let port = serialport::new(name, baud).timeout(timeout).open()?;
        Ok(Box::new(port))
    }
}

/// Serial connection to the alarm panel.
///
/// Shared between the command path (send) and the RX loop (read/reconnect)
/// behind a mutex; every operation is a single I/O call so critical
/// sections stay short.
pub struct SerialLink {
    provider: Box<dyn PortProvider>,
    frame: FrameConfig,
    baud: u32,
    read_timeout: Duration,
    port_name: Option<String>,
    handle: Option<Box<dyn DevicePort>>,
    connected: bool,
}

impl SerialLink {
    /// Detects the panel and makes a first connection attempt. A missing
    /// device is not an error here: the RX loop retries until it appears.
    pub fn new(config: &SerialConfig, frame: FrameConfig, provider: Box<dyn PortProvider>) -> Self {
        let mut link = Self {
            provider,
            frame,
            baud: config.baudrate,
            read_timeout: Duration::from_millis(config.read_timeout_ms),
            port_name: None,
            handle: None,
            connected: false,
        };
        link.port_name = link.provider.detect();
        if link.port_name.is_some() {
            link.connect();
        } else {
            warn!("no alarm panel detected at startup");
        }
        link
    }

    /// Opens the detected port, dropping any stale handle first. Returns
    /// whether the link is now connected.
    pub fn connect(&mut self) -> bool {
        self.handle = None;
        self.connected = false;

        let Some(name) = self.port_name.clone() else {
            return false;
        };

        match self.provider.open(&name, self.baud, self.read_timeout) {
            Ok(handle) => {
                self.handle = Some(handle);
                self.connected = true;
                info!(port = %name, baud = self.baud, "serial link connected");
                true
            }
            Err(e) => {
                warn!(port = %name, error = %e, "serial connect failed");
                false
            }
        }
    }

    /// Re-detects the device and connects. Detection runs again because the
    /// panel may enumerate under a different name after a replug.
    pub fn reconnect(&mut self) -> bool {
        if let Some(name) = self.provider.detect() {
            self.port_name = Some(name);
        }
        self.connect()
    }

    pub fn is_connected(&self) -> bool {
        self.connected && self.handle.is_some()
    }

    /// Non-blocking count of readable bytes.
    pub fn in_waiting(&mut self) -> Result<u32, LinkError> {
        let handle = self.handle.as_mut().ok_or(LinkError::NotConnected)?;
        match handle.in_waiting() {
            Ok(count) => Ok(count),
            Err(e) => Err(self.transport_error(e)),
        }
    }

    /// One byte, or `None` on read timeout.
    pub fn read_byte(&mut self) -> Result<Option<u8>, LinkError> {
        let handle = self.handle.as_mut().ok_or(LinkError::NotConnected)?;
        match handle.read_byte() {
            Ok(byte) => Ok(byte),
            Err(e) => Err(self.transport_error(e)),
        }
    }

    /// Frames `command` and writes it in one call.
    pub fn send(&mut self, command: Command) -> Result<(), LinkError> {
        if !self.is_connected() {
            warn!(command = %command, "cannot send, serial link not connected");
            return Err(LinkError::NotConnected);
        }
        let frame = protocol::build_frame(&self.frame, command.as_str())?;
        let handle = self.handle.as_mut().ok_or(LinkError::NotConnected)?;
        match handle.write_all_bytes(&frame) {
            Ok(()) => {
                info!(command = %command, frame = %hex(&frame), "command sent to panel");
                Ok(())
            }
            Err(e) => {
                warn!(command = %command, error = %e, "serial send failed");
                Err(self.transport_error(e))
            }
        }
    }

    /// Single-byte write, used for the protocol ACK.
    pub fn write_raw(&mut self, byte: u8) -> Result<(), LinkError> {
        let handle = self.handle.as_mut().ok_or(LinkError::NotConnected)?;
        match handle.write_all_bytes(&[byte]) {
            Ok(()) => Ok(()),
            Err(e) => Err(self.transport_error(e)),
        }
    }

    /// Discards anything buffered in either direction, e.g. junk emitted by
    /// a rebooting device.
    pub fn flush_io(&mut self) {
        if let Some(handle) = self.handle.as_mut() {
            if let Err(e) = handle.discard_buffers() {
                debug!(error = %e, "buffer flush failed");
            }
        }
    }

    /// Marks the link down and drops the handle; the RX loop reconnects.
    pub fn disconnect(&mut self) {
        self.connected = false;
        self.handle = None;
    }

    /// Releases the handle for good.
    pub fn close(&mut self) {
        if self.handle.take().is_some() {
            info!("serial link closed");
        }
        self.connected = false;
    }

    fn transport_error(&mut self, e: io::Error) -> LinkError {
        self.connected = false;
        self.handle = None;
        LinkError::Transport(e)
    }
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
pub(crate) mod testing {
    //! Fakes for the serial collaborators, shared with the bridge tests.

    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::{DevicePort, PortProvider};

    /// What the fake port yields on the read side, in order.
    pub enum Step {
        Byte(u8),
        TransportError,
    }

    #[derive(Default)]
    pub struct FakePortState {
        pub incoming: VecDeque<Step>,
        pub written: Vec<u8>,
        pub fail_writes: bool,
        pub flushes: usize,
    }

    pub struct FakePort {
        state: Arc<Mutex<FakePortState>>,
    }

    impl DevicePort for FakePort {
        fn in_waiting(&mut self) -> io::Result<u32> {
            let state = self.state.lock().unwrap();
            Ok(if state.incoming.is_empty() { 0 } else { 1 })
        }

        fn read_byte(&mut self) -> io::Result<Option<u8>> {
            let mut state = self.state.lock().unwrap();
            match state.incoming.pop_front() {
                Some(Step::Byte(byte)) => Ok(Some(byte)),
                Some(Step::TransportError) => {
                    Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"))
                }
                None => Ok(None),
            }
        }

        fn write_all_bytes(&mut self, buf: &[u8]) -> io::Result<()> {
            let mut state = self.state.lock().unwrap();
            if state.fail_writes {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "device unplugged"));
            }
            state.written.extend_from_slice(buf);
            Ok(())
        }

        fn discard_buffers(&mut self) -> io::Result<()> {
            self.state.lock().unwrap().flushes += 1;
            Ok(())
        }
    }

    #[derive(Clone)]
    pub struct FakeProvider {
        pub detected: Option<String>,
        /// Open attempts that fail before one succeeds
        pub open_failures: Arc<Mutex<usize>>,
        pub opens: Arc<Mutex<usize>>,
        pub state: Arc<Mutex<FakePortState>>,
    }

    impl FakeProvider {
        pub fn new() -> Self {
            Self {
                detected: Some("/dev/ttyACM0".to_string()),
                open_failures: Arc::new(Mutex::new(0)),
                opens: Arc::new(Mutex::new(0)),
                state: Arc::new(Mutex::new(FakePortState::default())),
            }
        }

        pub fn absent() -> Self {
            Self {
                detected: None,
                ..Self::new()
            }
        }

        pub fn push_bytes(&self, bytes: &[u8]) {
            let mut state = self.state.lock().unwrap();
            state.incoming.extend(bytes.iter().copied().map(Step::Byte));
        }

        pub fn push_transport_error(&self) {
            self.state.lock().unwrap().incoming.push_back(Step::TransportError);
        }

        pub fn written(&self) -> Vec<u8> {
            self.state.lock().unwrap().written.clone()
        }
    }

    impl PortProvider for FakeProvider {
        fn detect(&self) -> Option<String> {
            self.detected.clone()
        }

        fn open(&self, _name: &str, _baud: u32, _timeout: Duration) -> io::Result<Box<dyn DevicePort>> {
            let mut failures = self.open_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(io::Error::new(io::ErrorKind::NotFound, "port vanished"));
            }
            *self.opens.lock().unwrap() += 1;
            Ok(Box::new(FakePort {
                state: self.state.clone(),
            }))
        }
    }
}
