//! Configuration system using Figment
//!
//! Configuration is layered, highest precedence last:
//! 1. Built-in defaults (the field rig's calibration)
//! 2. A TOML file, usually `config/default.toml`
//! 3. Environment variables prefixed with `PARACHUTE_DAQ_`
//!
//! Nested keys use a double underscore:
//!
//! ```text
//! PARACHUTE_DAQ_APPLICATION__LOG_LEVEL=debug
//! PARACHUTE_DAQ_INSTRUMENT__SAMPLE_RATE=5859
//! PARACHUTE_DAQ_STORAGE__OUTPUT_DIR=/data/drop-42
//! ```
//!
//! # Example
//!
//! ```no_run
//! use parachute_daq::config::Settings;
//!
//! let settings = Settings::load(Some("config/default.toml".as_ref()))?;
//! println!("Sample rate divisor: {}", settings.instrument.sample_rate);
//! # Ok::<(), parachute_daq::error::DaqError>(())
//! ```

use crate::bridge::ChannelCalibration;
use crate::error::{AppResult, DaqError};
use crate::protocol::{configure_scan_list, RangeTables, ScanList, WindCalibration};
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable prefix for overrides.
pub const ENV_PREFIX: &str = "PARACHUTE_DAQ_";

/// Number of load-cell channels on the bridge.
pub const BRIDGE_CHANNELS: usize = 4;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Application settings
    pub application: ApplicationConfig,
    /// Serial instrument settings
    pub instrument: InstrumentConfig,
    /// Anemometer calibration
    pub wind: WindCalibration,
    /// Load-cell bridge settings
    pub bridge: BridgeConfig,
    /// Output settings
    pub storage: StorageConfig,
}

/// Application-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApplicationConfig {
    /// Application name
    pub name: String,
    /// Logging level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Sleep between acquisition loop iterations that found nothing to do
    pub poll_interval_ms: u64,
}

impl Default for ApplicationConfig {
    fn default() -> Self {
        Self {
            name: "Parachute Test Rig".to_string(),
            log_level: "info".to_string(),
            poll_interval_ms: 5,
        }
    }
}

/// DATAQ instrument configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentConfig {
    /// Substring matched against each serial port's hardware identifier
    pub hardware_id: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Scan-list words in position order
    pub scan_list: Vec<u16>,
    /// Analog full-scale values (V) indexed by sub-index
    pub analog_ranges: Vec<f64>,
    /// Rate full-scale values (Hz) indexed by `sub_index - 1`
    pub rate_ranges: Vec<f64>,
    /// `encode` argument (0 = binary)
    pub encoding: u8,
    /// `ps` argument
    pub packet_size: u8,
    /// `dec` argument
    pub decimation: u32,
    /// `srate` argument
    pub sample_rate: u32,
    /// Pause after each command before reading its echo
    pub command_settle_ms: u64,
    /// Upper bound on waiting for a command echo
    pub handshake_timeout_ms: u64,
}

impl Default for InstrumentConfig {
    fn default() -> Self {
        Self {
            hardware_id: "VID:PID=0683".to_string(),
            baud_rate: 115_200,
            scan_list: vec![0x0000, 0x0001],
            analog_ranges: RangeTables::default().analog,
            rate_ranges: RangeTables::default().rate,
            encoding: 0,
            packet_size: 0,
            decimation: 512,
            sample_rate: 11718,
            command_settle_ms: 100,
            handshake_timeout_ms: 1000,
        }
    }
}

impl InstrumentConfig {
    /// Scan list built from `scan_list`.
    pub fn scan_list(&self) -> ScanList {
        ScanList::from_entries(&self.scan_list)
    }

    /// Range tables for the instrument model.
    pub fn ranges(&self) -> RangeTables {
        RangeTables {
            analog: self.analog_ranges.clone(),
            rate: self.rate_ranges.clone(),
        }
    }

    /// Pause after each command.
    pub fn command_settle(&self) -> Duration {
        Duration::from_millis(self.command_settle_ms)
    }

    /// Echo wait bound.
    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Load-cell bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Readings averaged per channel when taring
    pub tare_samples: usize,
    /// Bridge data interval in milliseconds
    pub data_interval_ms: u64,
    /// Tare every channel before acquisition; otherwise use the configured offsets
    pub tare_on_start: bool,
    /// Per-channel gain and offset
    pub channels: Vec<ChannelCalibration>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        let gains = [38835.0, 39000.0, 39500.0, 39500.0];
        let offsets = [-0.000050448, -0.000051, -0.000053, -0.000053];
        Self {
            tare_samples: 16,
            data_interval_ms: 750,
            tare_on_start: true,
            channels: gains
                .into_iter()
                .zip(offsets)
                .map(|(gain, offset)| ChannelCalibration { gain, offset })
                .collect(),
        }
    }
}

impl BridgeConfig {
    /// Bridge data interval.
    pub fn data_interval(&self) -> Duration {
        Duration::from_millis(self.data_interval_ms)
    }
}

/// Output configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for all output files
    pub output_dir: PathBuf,
    /// Fused wind + load record file
    pub combined_file: String,
    /// Wind-only record file
    pub anemometer_file: String,
    /// Minimum spacing between emitted records in milliseconds
    pub record_interval_ms: u64,
    /// Write a JSON sidecar describing the run
    pub write_metadata: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            combined_file: "combined_data.csv".to_string(),
            anemometer_file: "anemometer.csv".to_string(),
            record_interval_ms: 500,
            write_metadata: true,
        }
    }
}

impl StorageConfig {
    /// Minimum spacing between emitted records.
    pub fn record_interval(&self) -> Duration {
        Duration::from_millis(self.record_interval_ms)
    }

    /// Full path of the fused record file.
    pub fn combined_path(&self) -> PathBuf {
        self.output_dir.join(&self.combined_file)
    }

    /// Full path of the wind-only record file.
    pub fn anemometer_path(&self) -> PathBuf {
        self.output_dir.join(&self.anemometer_file)
    }

    /// Full path of the run metadata sidecar.
    pub fn metadata_path(&self) -> PathBuf {
        self.output_dir.join(format!("{}.json", self.combined_file))
    }
}

impl Settings {
    /// Loads defaults, then `path` if given, then environment overrides, and validates.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if let Some(path) = path {
            if !path.exists() {
                return Err(DaqError::Configuration(format!(
                    "config file {} does not exist",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        }
        let settings: Settings = figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks values that deserialize fine but cannot drive an acquisition.
    pub fn validate(&self) -> AppResult<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.application.log_level.as_str()) {
            return Err(DaqError::Configuration(format!(
                "Invalid log_level '{}'. Must be one of: {}",
                self.application.log_level,
                valid_levels.join(", ")
            )));
        }

        configure_scan_list(self.instrument.scan_list().slots(), &self.instrument.ranges())?;

        if self.wind.max_voltage <= self.wind.min_voltage {
            return Err(DaqError::Configuration(format!(
                "wind voltage window [{}, {}] is empty",
                self.wind.min_voltage, self.wind.max_voltage
            )));
        }

        if self.bridge.channels.len() != BRIDGE_CHANNELS {
            return Err(DaqError::Configuration(format!(
                "bridge needs {} channel calibrations, got {}",
                BRIDGE_CHANNELS,
                self.bridge.channels.len()
            )));
        }

        if self.bridge.tare_samples == 0 {
            return Err(DaqError::Configuration(
                "bridge.tare_samples must be at least 1".to_string(),
            ));
        }

        if self.storage.record_interval_ms == 0 {
            return Err(DaqError::Configuration(
                "storage.record_interval_ms must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
