//! Serial port discovery

use serde::{Deserialize, Serialize};
use serialport::SerialPortType;

use super::TransportError;

/// Identifier markers that usually belong to a microcontroller's USB bridge
const PREFERRED_MARKERS: [&str; 3] = ["USB", "ACM", "COM"];

/// A serial port available on this host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    /// OS identifier passed to `TransportOpener::open`
    pub id: String,
    /// Human-readable description
    pub description: String,
}

impl PortInfo {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
        }
    }

    /// Label for selectors, e.g. `/dev/ttyUSB0: CP2102 USB to UART`
    pub fn label(&self) -> String {
        format!("{}: {}", self.id, self.description)
    }
}

/// Enumerate serial ports. An empty list is a normal result.
pub fn available_ports() -> Result<Vec<PortInfo>, TransportError> {
    let ports = serialport::available_ports()?;
    tracing::debug!("Found {} serial port(s)", ports.len());

    Ok(ports
        .into_iter()
        .map(|p| {
            let description = describe(&p.port_type);
            PortInfo::new(p.port_name, description)
        })
        .collect())
}

fn describe(port_type: &SerialPortType) -> String {
    match port_type {
        SerialPortType::UsbPort(usb) => {
            match (usb.manufacturer.as_deref(), usb.product.as_deref()) {
                (_, Some(product)) => product.to_string(),
                (Some(manufacturer), None) => {
                    format!("{} ({:04x}:{:04x})", manufacturer, usb.vid, usb.pid)
                }
                (None, None) => format!("USB device {:04x}:{:04x}", usb.vid, usb.pid),
            }
        }
        SerialPortType::PciPort => "PCI serial port".to_string(),
        SerialPortType::BluetoothPort => "Bluetooth serial port".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Pick the port a user most likely wants: the first whose identifier
/// contains `USB`, `ACM` or `COM`, otherwise the first one listed.
pub fn preferred_port(ports: &[PortInfo]) -> Option<&PortInfo> {
    ports
        .iter()
        .find(|p| {
            let id = p.id.to_uppercase();
            PREFERRED_MARKERS.iter().any(|m| id.contains(m))
        })
        .or_else(|| ports.first())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preferred_port_picks_usb_bridge() {
        let ports = vec![
            PortInfo::new("/dev/ttyS0", "n/a"),
            PortInfo::new("/dev/ttyACM0", "Arduino Uno"),
            PortInfo::new("/dev/ttyUSB0", "CP2102"),
        ];
        assert_eq!(preferred_port(&ports).unwrap().id, "/dev/ttyACM0");
    }

    #[test]
    fn test_preferred_port_is_case_insensitive() {
        let ports = vec![
            PortInfo::new("/dev/ttyS1", "n/a"),
            PortInfo::new("/dev/cu.usbserial-0001", "CP2102"),
        ];
        assert_eq!(preferred_port(&ports).unwrap().id, "/dev/cu.usbserial-0001");
    }

    #[test]
    fn test_preferred_port_falls_back_to_first() {
        let ports = vec![
            PortInfo::new("/dev/ttyS0", "n/a"),
            PortInfo::new("/dev/ttyS1", "n/a"),
        ];
        assert_eq!(preferred_port(&ports).unwrap().id, "/dev/ttyS0");
    }

    #[test]
    fn test_preferred_port_empty() {
        assert!(preferred_port(&[]).is_none());
    }

    #[test]
    fn test_port_label() {
        let port = PortInfo::new("COM3", "USB-SERIAL CH340");
        assert_eq!(port.label(), "COM3: USB-SERIAL CH340");
    }
}
