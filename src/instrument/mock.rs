//! Mock serial instrument.
//!
//! Behaves like a DATAQ unit on the wire: configuration commands are echoed back
//! followed by a carriage return, `start` switches to the binary stream without an
//! echo, and `stop` ends it. Tests inject stream bytes through a [`MockPortHandle`];
//! simulation mode attaches a [`SimulatedScanStream`] that synthesizes scan cycles.

use super::SerialTransport;
use crate::error::{AppResult, DaqError};
use crate::protocol::{ScanList, WindCalibration, BYTES_PER_UNIT};
use parking_lot::Mutex;
use rand::Rng;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;

#[derive(Default)]
struct MockState {
    rx: VecDeque<u8>,
    pending_line: Vec<u8>,
    commands: Vec<String>,
    streaming: bool,
    echo: bool,
    disconnected: bool,
    stream: Option<SimulatedScanStream>,
}

impl MockState {
    fn handle_command(&mut self, command: String) {
        match command.as_str() {
            "start" => self.streaming = true,
            "stop" => {
                self.streaming = false;
                self.echo_line(&command);
            }
            _ => self.echo_line(&command),
        }
        self.commands.push(command);
    }

    fn echo_line(&mut self, line: &str) {
        if self.echo {
            self.rx.extend(line.as_bytes());
            self.rx.push_back(b'\r');
        }
    }

    fn pump_stream(&mut self) {
        if !self.streaming {
            return;
        }
        if let Some(stream) = self.stream.as_mut() {
            let bytes = stream.generate(Instant::now());
            self.rx.extend(bytes);
        }
    }
}

/// In-memory serial port.
pub struct MockSerialPort {
    name: String,
    state: Arc<Mutex<MockState>>,
}

/// Test-side view of a [`MockSerialPort`].
#[derive(Clone)]
pub struct MockPortHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockSerialPort {
    /// Creates a port that echoes configuration commands.
    pub fn new(name: &str) -> (Self, MockPortHandle) {
        let state = Arc::new(Mutex::new(MockState {
            echo: true,
            ..MockState::default()
        }));
        (
            Self {
                name: name.to_string(),
                state: Arc::clone(&state),
            },
            MockPortHandle { state },
        )
    }

    /// Creates a port that streams synthetic scan cycles after `start`.
    pub fn simulated(name: &str, stream: SimulatedScanStream) -> (Self, MockPortHandle) {
        let (port, handle) = Self::new(name);
        port.state.lock().stream = Some(stream);
        (port, handle)
    }
}

impl SerialTransport for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_all(&mut self, bytes: &[u8]) -> AppResult<()> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(DaqError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock port disconnected",
            )));
        }
        for &byte in bytes {
            if byte == b'\r' {
                let line = String::from_utf8_lossy(&state.pending_line).into_owned();
                state.pending_line.clear();
                state.handle_command(line);
            } else {
                state.pending_line.push(byte);
            }
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> AppResult<usize> {
        let mut state = self.state.lock();
        state.pump_stream();
        Ok(state.rx.len())
    }

    fn read_available(&mut self) -> AppResult<Vec<u8>> {
        let mut state = self.state.lock();
        if state.disconnected {
            return Err(DaqError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock port disconnected",
            )));
        }
        state.pump_stream();
        Ok(state.rx.drain(..).collect())
    }

    fn clear_input(&mut self) -> AppResult<()> {
        self.state.lock().rx.clear();
        Ok(())
    }
}

impl MockPortHandle {
    /// Queues bytes as if the instrument had sent them.
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.state.lock().rx.extend(bytes);
    }

    /// Commands received so far, without terminators.
    pub fn commands(&self) -> Vec<String> {
        self.state.lock().commands.clone()
    }

    /// Whether the instrument is between `start` and `stop`.
    pub fn is_streaming(&self) -> bool {
        self.state.lock().streaming
    }

    /// Bytes waiting to be read.
    pub fn pending_input(&self) -> usize {
        self.state.lock().rx.len()
    }

    /// Enables or disables command echo.
    pub fn set_echo(&self, echo: bool) {
        self.state.lock().echo = echo;
    }

    /// Makes every subsequent read and write fail.
    pub fn disconnect(&self) {
        self.state.lock().disconnected = true;
    }
}

/// Synthesizes scan cycles at a fixed rate for simulation mode.
///
/// Position 0 carries a gusting wind speed, position 1 a slowly veering direction,
/// any further positions carry noise.
pub struct SimulatedScanStream {
    positions: usize,
    full_scale: f64,
    calibration: WindCalibration,
    cycles_per_second: f64,
    started: Instant,
    emitted: u64,
}

impl SimulatedScanStream {
    /// Creates a stream for `scan_list` on an instrument with `full_scale` volts.
    pub fn new(
        scan_list: &ScanList,
        full_scale: f64,
        calibration: WindCalibration,
        cycles_per_second: f64,
    ) -> Self {
        Self {
            positions: scan_list.len(),
            full_scale,
            calibration,
            cycles_per_second,
            started: Instant::now(),
            emitted: 0,
        }
    }

    fn counts_for(&self, volts: f64) -> i16 {
        (volts / self.full_scale * 32768.0).clamp(f64::from(i16::MIN), f64::from(i16::MAX)) as i16
    }

    /// Bytes for every cycle due by `now`.
    pub fn generate(&mut self, now: Instant) -> Vec<u8> {
        let elapsed = now.saturating_duration_since(self.started).as_secs_f64();
        let due = (elapsed * self.cycles_per_second) as u64;
        let mut rng = rand::thread_rng();
        let span = self.calibration.max_voltage - self.calibration.min_voltage;
        let mut bytes = Vec::new();

        while self.emitted < due {
            let t = self.emitted as f64 / self.cycles_per_second;
            let speed_fraction = (0.35 + 0.15 * (t * 0.7).sin() + rng.gen_range(-0.02..0.02)).clamp(0.0, 1.0);
            let direction_fraction = (0.5 + 0.1 * (t * 0.05).sin()).rem_euclid(1.0);
            for position in 0..self.positions {
                let volts = match position {
                    0 => self.calibration.min_voltage + speed_fraction * span,
                    1 => self.calibration.min_voltage + direction_fraction * span,
                    _ => rng.gen_range(-0.01..0.01),
                };
                bytes.extend_from_slice(&self.counts_for(volts).to_le_bytes());
            }
            self.emitted += 1;
        }

        debug_assert_eq!(bytes.len() % (BYTES_PER_UNIT * self.positions.max(1)), 0);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_echoes_configuration_commands() {
        let (mut port, handle) = MockSerialPort::new("mock0");
        port.write_all(b"encode 0\r").unwrap();
        assert_eq!(port.read_available().unwrap(), b"encode 0\r".to_vec());
        assert_eq!(handle.commands(), ["encode 0"]);
    }

    #[test]
    fn test_start_is_not_echoed() {
        let (mut port, handle) = MockSerialPort::new("mock0");
        port.write_all(b"start\r").unwrap();
        assert_eq!(port.bytes_available().unwrap(), 0);
        assert!(handle.is_streaming());
        port.write_all(b"stop\r").unwrap();
        assert!(!handle.is_streaming());
    }

    #[test]
    fn test_split_writes_form_one_command() {
        let (mut port, handle) = MockSerialPort::new("mock0");
        port.write_all(b"sra").unwrap();
        port.write_all(b"te 11718\r").unwrap();
        assert_eq!(handle.commands(), ["srate 11718"]);
    }

    #[test]
    fn test_clear_input_discards_bytes() {
        let (mut port, handle) = MockSerialPort::new("mock0");
        handle.push_bytes(&[1, 2, 3]);
        port.clear_input().unwrap();
        assert_eq!(port.bytes_available().unwrap(), 0);
    }

    #[test]
    fn test_simulated_stream_produces_whole_cycles() {
        let scan_list = ScanList::from_entries(&[0x0000, 0x0001, 0x0002]);
        let mut stream = SimulatedScanStream::new(&scan_list, 10.0, WindCalibration::default(), 100.0);
        let start = stream.started;
        let bytes = stream.generate(start + Duration::from_millis(105));
        assert_eq!(bytes.len(), 10 * 3 * BYTES_PER_UNIT);
        assert!(stream.generate(start + Duration::from_millis(105)).is_empty());
    }
}
