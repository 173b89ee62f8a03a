//! Custom error types for the application.
//!
//! This module defines the primary error type, `DaqError`, for the whole acquisition
//! pipeline. Using the `thiserror` crate, it provides a centralized and consistent way
//! to handle the failures that can occur between the serial instrument, the load-cell
//! bridge and the record sinks.
//!
//! ## Error Hierarchy
//!
//! - **`Discovery`**: No serial port matched the instrument's hardware identifier. The
//!   operator can plug the device in and retry.
//! - **`ScanListOrder`** / **`Configuration`**: The instrument configuration is invalid.
//!   These are fatal; acquisition must not start.
//! - **`FramingDesync`**: Fewer bytes are buffered than one scan cycle needs. The
//!   acquisition loop recovers by waiting for more input.
//! - **`CalibrationIncomplete`**: A bridge channel was asked for a weight before its tare
//!   finished.
//! - **`Io`** / **`Serial`**: Unrecoverable transport failures.
//!
//! By using `#[from]`, `DaqError` can be created from the underlying error types,
//! so `?` works throughout the library.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, DaqError>;

#[derive(Error, Debug)]
pub enum DaqError {
    #[error("Configuration error: {0}")]
    Config(#[from] Box<figment::Error>),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("Scan list position {found} is out of order (expected {expected})")]
    ScanListOrder { expected: usize, found: usize },

    #[error("No instrument matching '{hardware_id}' found among {ports_scanned} serial port(s)")]
    Discovery {
        hardware_id: String,
        ports_scanned: usize,
    },

    #[error("Framing desync: scan cycle needs {expected} bytes, {available} available")]
    FramingDesync { expected: usize, available: usize },

    #[error("Bridge channel {channel} has not finished taring")]
    CalibrationIncomplete { channel: usize },

    #[error("Unknown bridge channel {0}")]
    UnknownChannel(usize),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "instrument_serial")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    #[error("Serial support not enabled. Rebuild with --features instrument_serial")]
    SerialFeatureDisabled,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Instrument error: {0}")]
    Instrument(String),
}

impl From<figment::Error> for DaqError {
    fn from(err: figment::Error) -> Self {
        DaqError::Config(Box::new(err))
    }
}

impl DaqError {
    /// Whether the error must abort the run instead of being retried or skipped.
    pub fn is_fatal(&self) -> bool {
        match self {
            DaqError::Config(_)
            | DaqError::Configuration(_)
            | DaqError::ScanListOrder { .. }
            | DaqError::Io(_)
            | DaqError::SerialFeatureDisabled => true,
            #[cfg(feature = "instrument_serial")]
            DaqError::Serial(_) => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaqError::ScanListOrder {
            expected: 1,
            found: 2,
        };
        assert_eq!(
            err.to_string(),
            "Scan list position 2 is out of order (expected 1)"
        );
    }

    #[test]
    fn test_fatal_classification() {
        assert!(DaqError::Configuration("bad".into()).is_fatal());
        assert!(DaqError::ScanListOrder {
            expected: 0,
            found: 1
        }
        .is_fatal());
        assert!(!DaqError::FramingDesync {
            expected: 4,
            available: 2
        }
        .is_fatal());
        assert!(!DaqError::Discovery {
            hardware_id: "VID:PID=0683".into(),
            ports_scanned: 0
        }
        .is_fatal());
        assert!(!DaqError::CalibrationIncomplete { channel: 3 }.is_fatal());
    }
}
