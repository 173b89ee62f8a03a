//! DATAQ instrument access.
//!
//! [`InstrumentSession`] drives the protocol over any [`SerialTransport`]. The real
//! transport wraps a `serialport` handle (feature `instrument_serial`); the mock
//! transport is used by tests and by simulation mode.

pub mod mock;
pub mod serial;
pub mod session;

pub use session::InstrumentSession;

use crate::error::AppResult;

/// Byte-level access to the instrument's serial link.
///
/// Reads never block: they return whatever is buffered, possibly nothing.
pub trait SerialTransport: Send {
    /// Port name for diagnostics.
    fn name(&self) -> &str;

    /// Writes all bytes and flushes.
    fn write_all(&mut self, bytes: &[u8]) -> AppResult<()>;

    /// Number of bytes waiting in the input buffer.
    fn bytes_available(&mut self) -> AppResult<usize>;

    /// Returns everything currently buffered.
    fn read_available(&mut self) -> AppResult<Vec<u8>>;

    /// Discards pending input.
    fn clear_input(&mut self) -> AppResult<()>;
}

impl<T: SerialTransport + ?Sized> SerialTransport for Box<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn write_all(&mut self, bytes: &[u8]) -> AppResult<()> {
        (**self).write_all(bytes)
    }

    fn bytes_available(&mut self) -> AppResult<usize> {
        (**self).bytes_available()
    }

    fn read_available(&mut self) -> AppResult<Vec<u8>> {
        (**self).read_available()
    }

    fn clear_input(&mut self) -> AppResult<()> {
        (**self).clear_input()
    }
}

/// An enumerated serial port and its hardware identifier.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PortCandidate {
    /// OS port name, e.g. `/dev/ttyACM0` or `COM3`
    pub name: String,
    /// Hardware identifier, e.g. `USB VID:PID=0683:2108 SER=5A1B`
    pub hardware_id: String,
}

/// First candidate whose hardware identifier contains `needle`.
///
/// With several matching devices only the first one is used.
pub fn select_port<'a>(candidates: &'a [PortCandidate], needle: &str) -> Option<&'a PortCandidate> {
    candidates
        .iter()
        .find(|candidate| candidate.hardware_id.contains(needle))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(name: &str, hardware_id: &str) -> PortCandidate {
        PortCandidate {
            name: name.to_string(),
            hardware_id: hardware_id.to_string(),
        }
    }

    #[test]
    fn test_select_first_matching_port() {
        let candidates = vec![
            candidate("/dev/ttyS0", "PNP0501"),
            candidate("/dev/ttyUSB0", "USB VID:PID=0403:6001 SER=A50285BI"),
            candidate("/dev/ttyACM0", "USB VID:PID=0683:2108 SER=5A1B"),
            candidate("/dev/ttyACM1", "USB VID:PID=0683:2108 SER=77C0"),
        ];
        let selected = select_port(&candidates, "VID:PID=0683").unwrap();
        assert_eq!(selected.name, "/dev/ttyACM0");
    }

    #[test]
    fn test_no_matching_port() {
        let candidates = vec![candidate("COM1", "ACPI\\PNP0501")];
        assert!(select_port(&candidates, "VID:PID=0683").is_none());
        assert!(select_port(&[], "VID:PID=0683").is_none());
    }
}
