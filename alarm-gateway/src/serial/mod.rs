//! Serial side: USB device discovery and the supervised link.

pub mod detect;
pub mod link;

pub use detect::{PortDetector, UsbId};
pub use link::{DevicePort, LinkError, PortProvider, SerialLink, SystemPorts};
