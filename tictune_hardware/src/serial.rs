//! Compact-protocol transport over the controller's USB virtual COM port.

use std::io::{Read, Write};
use std::time::Duration;

use serialport::{SerialPort, SerialPortType};
use tictune_traits::{BoxError, DeviceDescriptor, DeviceEnumerator, DeviceSession};

use crate::error::LinkError;

/// USB vendor id shared by every controller in the family.
pub const VENDOR_ID: u16 = 0x1FFB;

/// Largest block the compact protocol returns for one read request.
const MAX_READ_CHUNK: usize = 15;

const DEFAULT_BAUD: u32 = 9600;

/// A controller on its USB virtual COM port.
///
/// The serial command set has no settings writes: set setting and
/// reinitialize are rejected with `LinkError::Rejected`, so applying settings
/// edits needs a USB transport.
pub struct SerialTic {
    port: Box<dyn SerialPort>,
}

impl SerialTic {
    pub fn open(path: &str, timeout: Duration) -> Result<Self, LinkError> {
        let port = serialport::new(path, DEFAULT_BAUD)
            .timeout(timeout)
            .open()
            .map_err(|e| LinkError::Serial(e.to_string()))?;
        tracing::info!(path, timeout_ms = timeout.as_millis() as u64, "serial link open");
        Ok(Self { port })
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.port.read_exact(buf).map_err(|e| match e.kind() {
            std::io::ErrorKind::TimedOut => LinkError::Timeout,
            std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected => {
                LinkError::Disconnected
            }
            _ => LinkError::Io(e),
        })
    }
}

impl DeviceSession for SerialTic {
    fn send(&mut self, command: &[u8]) -> Result<(), BoxError> {
        crate::check_serial_frame(command)?;
        self.port.write_all(command).map_err(LinkError::Io)?;
        Ok(())
    }

    fn query(&mut self, opcode: u8, size: usize) -> Result<Vec<u8>, BoxError> {
        let mut out = vec![0u8; size];
        let mut offset = 0usize;
        while offset < size {
            let len = (size - offset).min(MAX_READ_CHUNK);
            let request = [opcode, (offset & 0x7F) as u8, len as u8];
            self.port.write_all(&request).map_err(LinkError::Io)?;
            self.read_exact(&mut out[offset..offset + len])?;
            offset += len;
        }
        Ok(out)
    }
}

/// Lists controllers attached as USB serial ports.
#[derive(Debug, Clone)]
pub struct SerialEnumerator {
    timeout: Duration,
}

impl SerialEnumerator {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn port_for(&self, device: &DeviceDescriptor) -> Result<String, LinkError> {
        let ports = serialport::available_ports().map_err(|e| LinkError::Serial(e.to_string()))?;
        for p in ports {
            if let SerialPortType::UsbPort(info) = &p.port_type
                && info.vid == VENDOR_ID
                && info.pid == device.product_id
                && info.serial_number.as_deref() == Some(device.serial_number.as_str())
            {
                return Ok(p.port_name);
            }
        }
        Err(LinkError::Disconnected)
    }
}

impl DeviceEnumerator for SerialEnumerator {
    type Session = SerialTic;

    fn list(&self) -> Result<Vec<DeviceDescriptor>, BoxError> {
        let ports = serialport::available_ports().map_err(|e| LinkError::Serial(e.to_string()))?;
        let mut out = Vec::new();
        for p in ports {
            if let SerialPortType::UsbPort(info) = p.port_type
                && info.vid == VENDOR_ID
            {
                out.push(DeviceDescriptor {
                    serial_number: info.serial_number.unwrap_or_default(),
                    short_name: info.product.unwrap_or_else(|| "Tic".to_string()),
                    product_id: info.pid,
                });
            }
        }
        Ok(out)
    }

    fn open(&self, device: &DeviceDescriptor) -> Result<SerialTic, BoxError> {
        let path = self.port_for(device)?;
        Ok(SerialTic::open(&path, self.timeout)?)
    }
}
