//! DATAQ ASCII/binary protocol codec.
//!
//! Configuration commands are ASCII lines terminated by a carriage return and the
//! instrument echoes each one back. Once `start` is sent the instrument switches to
//! a binary stream: one signed little-endian 16-bit word per scan-list position, in
//! scan-list order, repeated for every scan cycle.
//!
//! ```text
//! stop → encode 0 → ps 0 → slist 0 <v> … slist N-1 <v> → dec 512 → srate 11718 → start
//! ```

mod decode;
mod scan_list;

pub use decode::{decode_scan_cycle, DecodedReading, WindCalibration, BYTES_PER_UNIT};
pub use scan_list::{
    configure_scan_list, ChannelFunction, RangeTable, RangeTables, ScanList,
    ScanListConfiguration, ScanListEntry, ScanSlot,
};

use std::fmt;

/// Line terminator appended to every command.
pub const COMMAND_TERMINATOR: char = '\r';

/// Commands understood by the instrument.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum InstrumentCommand {
    /// Stop scanning.
    Stop,
    /// Start scanning; the binary stream follows.
    Start,
    /// Output encoding (0 = binary).
    Encode(u8),
    /// USB packet size code.
    PacketSize(u8),
    /// Assign a scan-list position.
    ScanList { position: usize, entry: ScanListEntry },
    /// Decimation factor.
    Decimation(u32),
    /// Sample rate divisor.
    SampleRate(u32),
}

impl fmt::Display for InstrumentCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Start => write!(f, "start"),
            Self::Encode(code) => write!(f, "encode {}", code),
            Self::PacketSize(code) => write!(f, "ps {}", code),
            Self::ScanList { position, entry } => write!(f, "slist {} {}", position, entry.raw()),
            Self::Decimation(factor) => write!(f, "dec {}", factor),
            Self::SampleRate(rate) => write!(f, "srate {}", rate),
        }
    }
}

/// Appends the instrument's line terminator. No validation is performed.
pub fn encode(command: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(command.len() + 1);
    bytes.extend_from_slice(command.as_bytes());
    bytes.push(COMMAND_TERMINATOR as u8);
    bytes
}

/// Decodes an echoed response line, stripping trailing CR, LF and NUL.
pub fn decode_line(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes)
        .trim_end_matches(['\r', '\n', '\0'])
        .to_string()
}
