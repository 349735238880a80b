//! Automatic detection of the alarm panel's serial port via USB VID/PID.

use serialport::{SerialPortInfo, SerialPortType};
use tracing::{debug, info};

/// USB vendor/product id pair identifying the panel's debug interface.
///
/// Defaults to the ARM DAPLink vendor id with the CMSIS-DAP product id,
/// which is what the MAX32655 dev board enumerates as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsbId {
    pub vid: u16,
    pub pid: u16,
}

impl Default for UsbId {
    fn default() -> Self {
        Self {
            vid: 0x0D28,
            pid: 0x0204,
        }
    }
}

/// Finds the panel's serial port among the host's USB serial devices.
#[derive(Debug, Clone, Copy)]
pub struct PortDetector {
    id: UsbId,
}

impl PortDetector {
    pub fn new(id: UsbId) -> Self {
        Self { id }
    }

    /// Device name of the first matching port (e.g. `/dev/ttyACM0`, `COM12`),
    /// or `None` when the board is not plugged in. Never fails fatally: an
    /// enumeration error counts as "absent".
    pub fn detect(&self) -> Option<String> {
        let ports = match serialport::available_ports() {
            Ok(ports) => ports,
            Err(e) => {
                debug!(error = %e, "serial port enumeration failed");
                return None;
            }
        };
        match find_matching(&ports, self.id) {
            Some(name) => {
                info!(port = %name, vid = self.id.vid, pid = self.id.pid, "alarm panel found");
                Some(name)
            }
            None => {
                debug!(vid = self.id.vid, pid = self.id.pid, "no matching serial device");
                None
            }
        }
    }
}

/// First port in `ports` whose USB descriptor matches `id`.
pub fn find_matching(ports: &[SerialPortInfo], id: UsbId) -> Option<String> {
    ports.iter().find_map(|port| match &port.port_type {
        SerialPortType::UsbPort(info) if info.vid == id.vid && info.pid == id.pid => {
            Some(port.port_name.clone())
        }
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use serialport::UsbPortInfo;

    use super::*;

    fn usb_port(name: &str, vid: u16, pid: u16) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::UsbPort(UsbPortInfo {
                vid,
                pid,
                serial_number: None,
                manufacturer: None,
                product: None,
            }),
        }
    }

    fn other_port(name: &str) -> SerialPortInfo {
        SerialPortInfo {
            port_name: name.to_string(),
            port_type: SerialPortType::Unknown,
        }
    }

    #[test]
    fn picks_the_first_matching_usb_port() {
        let ports = vec![
            other_port("/dev/ttyS0"),
            usb_port("/dev/ttyUSB3", 0x1234, 0x5678),
            usb_port("/dev/ttyACM0", 0x0D28, 0x0204),
            usb_port("/dev/ttyACM1", 0x0D28, 0x0204),
        ];
        assert_eq!(
            find_matching(&ports, UsbId::default()),
            Some("/dev/ttyACM0".to_string())
        );
    }

    #[test]
    fn returns_none_when_nothing_matches() {
        let ports = vec![
            other_port("/dev/ttyS0"),
            usb_port("/dev/ttyUSB0", 0x1234, 0x5678),
        ];
        assert_eq!(find_matching(&ports, UsbId::default()), None);
        assert_eq!(find_matching(&[], UsbId::default()), None);
    }

    #[test]
    fn both_ids_must_match() {
        let ports = vec![
            usb_port("/dev/ttyACM0", 0x0D28, 0x9999),
            usb_port("/dev/ttyACM1", 0x9999, 0x0204),
        ];
        assert_eq!(find_matching(&ports, UsbId::default()), None);
    }
}
