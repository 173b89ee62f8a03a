//! `serialport`-backed transport and device discovery.

use super::SerialTransport;
use crate::config::InstrumentConfig;
use crate::error::{AppResult, DaqError};

#[cfg(feature = "instrument_serial")]
use super::{select_port, PortCandidate};
#[cfg(feature = "instrument_serial")]
use serialport::{ClearBuffer, SerialPort, SerialPortInfo, SerialPortType};
#[cfg(feature = "instrument_serial")]
use std::io::{Read, Write};
#[cfg(feature = "instrument_serial")]
use std::time::Duration;
#[cfg(feature = "instrument_serial")]
use tracing::{debug, info};

/// Serial port opened in non-blocking mode.
#[cfg(feature = "instrument_serial")]
pub struct SerialPortTransport {
    name: String,
    port: Box<dyn SerialPort>,
}

#[cfg(feature = "instrument_serial")]
impl SerialPortTransport {
    /// Opens `port_name` at `baud_rate` with a zero read timeout.
    pub fn open(port_name: &str, baud_rate: u32) -> AppResult<Self> {
        let port = serialport::new(port_name, baud_rate)
            .timeout(Duration::ZERO)
            .open()?;
        debug!("Serial port '{}' opened at {} baud", port_name, baud_rate);
        Ok(Self {
            name: port_name.to_string(),
            port,
        })
    }
}

#[cfg(feature = "instrument_serial")]
impl SerialTransport for SerialPortTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> AppResult<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }

    fn bytes_available(&mut self) -> AppResult<usize> {
        Ok(self.port.bytes_to_read()? as usize)
    }

    fn read_available(&mut self) -> AppResult<Vec<u8>> {
        let available = self.bytes_available()?;
        if available == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; available];
        let read = match self.port.read(&mut buffer) {
            Ok(read) => read,
            Err(e)
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
                ) =>
            {
                0
            }
            Err(e) => return Err(e.into()),
        };
        buffer.truncate(read);
        Ok(buffer)
    }

    fn clear_input(&mut self) -> AppResult<()> {
        self.port.clear(ClearBuffer::Input)?;
        Ok(())
    }
}

/// Hardware identifier in the `USB VID:PID=xxxx:xxxx SER=...` form.
#[cfg(feature = "instrument_serial")]
pub fn hardware_id(info: &SerialPortInfo) -> String {
    match &info.port_type {
        SerialPortType::UsbPort(usb) => {
            let mut id = format!("USB VID:PID={:04X}:{:04X}", usb.vid, usb.pid);
            if let Some(serial) = &usb.serial_number {
                id.push_str(&format!(" SER={}", serial));
            }
            id
        }
        SerialPortType::PciPort => "PCI".to_string(),
        SerialPortType::BluetoothPort => "BLUETOOTH".to_string(),
        SerialPortType::Unknown => "n/a".to_string(),
    }
}

/// Enumerated ports as candidates for [`select_port`].
#[cfg(feature = "instrument_serial")]
pub fn enumerate_ports() -> AppResult<Vec<PortCandidate>> {
    Ok(serialport::available_ports()?
        .iter()
        .map(|info| PortCandidate {
            name: info.port_name.clone(),
            hardware_id: hardware_id(info),
        })
        .collect())
}

/// Finds the first port matching the configured hardware identifier and opens it.
///
/// Never retries; the caller decides whether to ask the operator and try again.
#[cfg(feature = "instrument_serial")]
pub fn discover(config: &InstrumentConfig) -> AppResult<Box<dyn SerialTransport>> {
    let candidates = enumerate_ports()?;
    let port = select_port(&candidates, &config.hardware_id).ok_or_else(|| DaqError::Discovery {
        hardware_id: config.hardware_id.clone(),
        ports_scanned: candidates.len(),
    })?;
    info!("Found a DATAQ Instruments device on {}", port.name);
    Ok(Box::new(SerialPortTransport::open(&port.name, config.baud_rate)?))
}

/// Discovery is unavailable without serial support.
#[cfg(not(feature = "instrument_serial"))]
pub fn discover(_config: &InstrumentConfig) -> AppResult<Box<dyn SerialTransport>> {
    Err(DaqError::SerialFeatureDisabled)
}
