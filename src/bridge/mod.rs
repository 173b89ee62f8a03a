//! Load-cell bridge weight source.
//!
//! The bridge driver owns its own callback thread and reports a raw voltage ratio per
//! channel whenever one changes. This module turns those ratios into calibrated
//! weights and keeps the latest value of each channel available to the acquisition
//! loop.
//!
//! # Data Flow
//!
//! ```text
//! bridge callback --ratio--> WeightUpdater --watch::send_modify--> WeightSource::latest()
//! ```
//!
//! Each channel is written independently, so a snapshot can combine weights sampled at
//! slightly different instants. A snapshot is never torn: `send_modify` holds the watch
//! lock for the whole update.
//!
//! # Calibration
//!
//! `weight = (ratio - offset) * gain`, rounded to 4 decimals. The gain comes from the
//! configuration; the offset either comes from the configuration or from [`WeightSource::tare`],
//! which averages a number of readings taken with the platform unloaded.

pub mod simulated;

use crate::config::BRIDGE_CHANNELS;
use crate::error::{AppResult, DaqError};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Gain and zero offset of one load cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChannelCalibration {
    /// Newtons per unit of voltage ratio
    pub gain: f64,
    /// Voltage ratio with no load applied
    pub offset: f64,
}

/// A bridge channel that can be read on demand.
///
/// This is the subset of the vendor channel API needed for taring.
pub trait VoltageRatioInput: Send + Sync {
    /// Channel index on the bridge.
    fn channel(&self) -> usize;

    /// Current voltage ratio.
    fn voltage_ratio(&self) -> AppResult<f64>;

    /// Interval at which the channel produces new data.
    fn data_interval(&self) -> Duration;
}

/// Latest weight of every channel, in newtons.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct WeightVector {
    /// Channel weights, index = bridge channel
    pub weights: [f64; BRIDGE_CHANNELS],
}

impl WeightVector {
    /// Vertical load: the two main cells share it, so they are averaged.
    pub fn z_avg(&self) -> f64 {
        (self.weights[0] + self.weights[1]) / 2.0
    }

    /// Horizontal load along x (channel 2).
    pub fn x(&self) -> f64 {
        self.weights[2]
    }

    /// Horizontal load along y (channel 3).
    pub fn y(&self) -> f64 {
        self.weights[3]
    }
}

/// Outcome of a single bridge callback.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum WeightUpdate {
    /// The channel is calibrated and its weight was published.
    Weight { channel: usize, weight: f64 },
    /// The channel has not been tared yet; nothing was published.
    Uncalibrated { channel: usize },
}

#[derive(Clone, Copy, Debug)]
struct ChannelState {
    calibration: ChannelCalibration,
    calibrated: bool,
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Producer handle given to the bridge callback context.
#[derive(Clone)]
pub struct WeightUpdater {
    channels: Arc<RwLock<Vec<ChannelState>>>,
    latest: Arc<watch::Sender<WeightVector>>,
}

impl WeightUpdater {
    /// Handles one voltage-ratio change notification.
    pub fn on_voltage_ratio_change(&self, channel: usize, ratio: f64) -> AppResult<WeightUpdate> {
        let state = *self
            .channels
            .read()
            .get(channel)
            .ok_or(DaqError::UnknownChannel(channel))?;

        if !state.calibrated {
            debug!("Channel {}: Uncalibrated", channel);
            return Ok(WeightUpdate::Uncalibrated { channel });
        }

        let weight = round4((ratio - state.calibration.offset) * state.calibration.gain);
        self.latest.send_modify(|vector| vector.weights[channel] = weight);
        debug!("Channel {}: Weight: {}", channel, weight);
        Ok(WeightUpdate::Weight { channel, weight })
    }
}

/// Consumer side: calibration state plus the latest weight snapshot.
pub struct WeightSource {
    channels: Arc<RwLock<Vec<ChannelState>>>,
    latest: Arc<watch::Sender<WeightVector>>,
    snapshot: watch::Receiver<WeightVector>,
    tare_samples: usize,
}

impl WeightSource {
    /// Creates a source for the given channels.
    ///
    /// With `precalibrated` the configured offsets are used as-is and every channel
    /// reports weights immediately; otherwise each channel stays uncalibrated until
    /// [`WeightSource::tare`] completes for it. Calibrations past [`BRIDGE_CHANNELS`]
    /// have no slot in the weight vector and are ignored.
    pub fn new(calibrations: &[ChannelCalibration], tare_samples: usize, precalibrated: bool) -> Self {
        if calibrations.len() > BRIDGE_CHANNELS {
            warn!(
                "{} bridge calibrations given, only the first {} are used",
                calibrations.len(),
                BRIDGE_CHANNELS
            );
        }
        let channels = calibrations
            .iter()
            .take(BRIDGE_CHANNELS)
            .map(|&calibration| ChannelState {
                calibration,
                calibrated: precalibrated,
            })
            .collect();
        let (sender, snapshot) = watch::channel(WeightVector::default());
        Self {
            channels: Arc::new(RwLock::new(channels)),
            latest: Arc::new(sender),
            snapshot,
            tare_samples: tare_samples.max(1),
        }
    }

    /// Handle for the bridge callback context.
    pub fn updater(&self) -> WeightUpdater {
        WeightUpdater {
            channels: Arc::clone(&self.channels),
            latest: Arc::clone(&self.latest),
        }
    }

    /// Most recent weight of every channel (0.0 until a channel's first update).
    pub fn latest(&self) -> WeightVector {
        *self.snapshot.borrow()
    }

    /// Whether `channel` has a usable offset.
    pub fn is_calibrated(&self, channel: usize) -> bool {
        self.channels
            .read()
            .get(channel)
            .is_some_and(|state| state.calibrated)
    }

    /// Current calibration of `channel`.
    pub fn calibration(&self, channel: usize) -> AppResult<ChannelCalibration> {
        self.channels
            .read()
            .get(channel)
            .map(|state| state.calibration)
            .ok_or(DaqError::UnknownChannel(channel))
    }

    /// Calibrated weight for `ratio` on `channel`, without publishing it.
    pub fn weight_for(&self, channel: usize, ratio: f64) -> AppResult<f64> {
        let state = *self
            .channels
            .read()
            .get(channel)
            .ok_or(DaqError::UnknownChannel(channel))?;
        if !state.calibrated {
            return Err(DaqError::CalibrationIncomplete { channel });
        }
        Ok(round4((ratio - state.calibration.offset) * state.calibration.gain))
    }

    /// Zeroes a channel: averages `tare_samples` readings, one per data interval,
    /// and stores the mean as the channel's offset.
    pub async fn tare(&self, input: &dyn VoltageRatioInput) -> AppResult<f64> {
        let channel = input.channel();
        {
            let mut channels = self.channels.write();
            let state = channels
                .get_mut(channel)
                .ok_or(DaqError::UnknownChannel(channel))?;
            state.calibrated = false;
        }

        info!("Taring channel {}", channel);
        let mut sum = 0.0;
        for _ in 0..self.tare_samples {
            sum += input.voltage_ratio()?;
            tokio::time::sleep(input.data_interval()).await;
        }
        let offset = sum / self.tare_samples as f64;

        if let Some(state) = self.channels.write().get_mut(channel) {
            state.calibration.offset = offset;
            state.calibrated = true;
        }
        info!("Channel {} taring complete (offset {:e})", channel, offset);
        Ok(offset)
    }

    /// Tares every input in turn.
    pub async fn tare_all(&self, inputs: &[Arc<dyn VoltageRatioInput>]) -> AppResult<()> {
        for input in inputs {
            self.tare(input.as_ref()).await?;
        }
        info!("Taring complete for all channels.");
        Ok(())
    }
}
