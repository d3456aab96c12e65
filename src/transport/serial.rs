use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serialport::SerialPortType;
use tokio_serial::SerialPortBuilderExt;

use super::{Connection, Connector, Result, TransportError};

pub const BAUD_RATE: u32 = 115200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerialDeviceInfo {
    pub port_name: String,
    pub vid: u16,
    pub pid: u16,
    pub serial_number: Option<String>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// List USB serial ports, optionally restricted to one VID/PID pair.
pub fn available_ports(filter: Option<(u16, u16)>) -> Result<Vec<SerialDeviceInfo>> {
    let ports = serialport::available_ports()?;
    let mut devices = Vec::new();

    for port in ports {
        if let SerialPortType::UsbPort(usb_info) = port.port_type {
            if let Some((vid, pid)) = filter {
                if usb_info.vid != vid || usb_info.pid != pid {
                    continue;
                }
            }
            devices.push(SerialDeviceInfo {
                port_name: port.port_name.clone(),
                vid: usb_info.vid,
                pid: usb_info.pid,
                serial_number: usb_info.serial_number.clone(),
                manufacturer: usb_info.manufacturer.clone(),
                product: usb_info.product.clone(),
            });
        }
    }

    Ok(devices)
}

/// Serial or USB-CDC connection to a board.
#[derive(Debug, Clone)]
pub struct SerialConnector {
    port_name: String,
    baud_rate: u32,
}

impl SerialConnector {
    pub fn new(port_name: impl Into<String>) -> Self {
        Self::with_baud_rate(port_name, BAUD_RATE)
    }

    pub fn with_baud_rate(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
        }
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

#[async_trait]
impl Connector for SerialConnector {
    async fn connect(&self) -> Result<Connection> {
        let port = tokio_serial::new(&self.port_name, self.baud_rate)
            .open_native_async()
            .map_err(|e| match e.kind {
                tokio_serial::ErrorKind::NoDevice => TransportError::PortNotFound(self.port_name.clone()),
                _ => TransportError::ConnectionFailed(format!("{}: {}", self.port_name, e)),
            })?;

        log::info!("Connected to board on {} at {} baud", self.port_name, self.baud_rate);
        Ok(Connection::from_stream(port))
    }

    fn describe(&self) -> String {
        self.port_name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_port_fails() {
        let connector = SerialConnector::new("/dev/daqlink-does-not-exist");
        let result = connector.connect().await;
        assert!(matches!(
            result,
            Err(TransportError::PortNotFound(_)) | Err(TransportError::ConnectionFailed(_))
        ));
    }

    #[test]
    fn test_describe_is_port_name() {
        let connector = SerialConnector::with_baud_rate("/dev/ttyACM0", 9600);
        assert_eq!(connector.describe(), "/dev/ttyACM0");
        assert_eq!(connector.port_name(), "/dev/ttyACM0");
    }
}
