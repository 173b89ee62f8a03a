//! Run metadata written next to the fused log.
//!
//! The CSV files only hold numbers. Everything needed to reinterpret them later (the
//! scan list the instrument was configured with, the resolved range table, the wind
//! calibration and the bridge gains/offsets actually in use after taring) is captured
//! once per run and saved as a JSON sidecar.

use crate::bridge::ChannelCalibration;
use crate::error::AppResult;
use crate::protocol::{RangeTable, ScanList, WindCalibration};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

/// Description of one acquisition run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    /// Application name from the configuration.
    pub application: String,
    /// Version of this software.
    pub software_version: String,
    /// When the run was set up.
    pub started_at: DateTime<Utc>,
    /// Serial port the instrument was found on.
    pub port: String,
    /// Raw scan-list words in position order.
    pub scan_list: Vec<u16>,
    /// Full-scale value per scan-list position.
    pub range_table: Vec<f64>,
    /// Instrument sample rate divisor.
    pub sample_rate: u32,
    /// Instrument decimation factor.
    pub decimation: u32,
    /// Anemometer voltage-to-wind mapping.
    pub wind: WindCalibration,
    /// Gain/offset per bridge channel.
    pub bridge: Vec<ChannelCalibration>,
    /// Whether the bridge offsets came from a tare in this run.
    pub tared: bool,
    /// Record interval in seconds.
    pub record_interval_s: f64,
}

impl Default for RunMetadata {
    fn default() -> Self {
        Self {
            application: env!("CARGO_PKG_NAME").to_string(),
            software_version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: Utc::now(),
            port: String::new(),
            scan_list: Vec::new(),
            range_table: Vec::new(),
            sample_rate: 0,
            decimation: 0,
            wind: WindCalibration::default(),
            bridge: Vec::new(),
            tared: false,
            record_interval_s: 0.0,
        }
    }
}

/// A builder for constructing `RunMetadata` instances.
#[derive(Default)]
pub struct RunMetadataBuilder {
    inner: RunMetadata,
}

impl RunMetadataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application(mut self, name: &str) -> Self {
        self.inner.application = name.to_string();
        self
    }

    pub fn port(mut self, port: &str) -> Self {
        self.inner.port = port.to_string();
        self
    }

    pub fn scan(mut self, scan_list: &ScanList, range_table: &RangeTable) -> Self {
        self.inner.scan_list = scan_list.entries().iter().map(|entry| entry.raw()).collect();
        self.inner.range_table = range_table.as_slice().to_vec();
        self
    }

    pub fn timing(mut self, sample_rate: u32, decimation: u32) -> Self {
        self.inner.sample_rate = sample_rate;
        self.inner.decimation = decimation;
        self
    }

    pub fn wind(mut self, calibration: WindCalibration) -> Self {
        self.inner.wind = calibration;
        self
    }

    pub fn bridge(mut self, calibrations: Vec<ChannelCalibration>, tared: bool) -> Self {
        self.inner.bridge = calibrations;
        self.inner.tared = tared;
        self
    }

    pub fn record_interval_s(mut self, seconds: f64) -> Self {
        self.inner.record_interval_s = seconds;
        self
    }

    pub fn build(self) -> RunMetadata {
        self.inner
    }
}

impl RunMetadata {
    /// Writes the metadata as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> AppResult<()> {
        if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("Run metadata saved to '{}'.", path.display());
        Ok(())
    }

    /// Reads metadata written by [`save`](Self::save).
    pub fn load(path: &Path) -> AppResult<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
