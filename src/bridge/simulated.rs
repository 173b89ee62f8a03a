//! Simulated load-cell bridge for running without hardware.
//!
//! Each channel produces a noisy voltage ratio around a base value. A background task
//! plays the role of the vendor callback thread and pushes every channel's ratio into a
//! [`WeightUpdater`] once per data interval.

use super::{VoltageRatioInput, WeightUpdater};
use crate::error::AppResult;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::warn;

/// One simulated bridge channel.
#[derive(Clone, Debug)]
pub struct SimulatedBridgeChannel {
    channel: usize,
    base_ratio: f64,
    noise: f64,
    data_interval: Duration,
}

impl SimulatedBridgeChannel {
    /// Creates a channel with the given unloaded ratio and peak-to-peak noise.
    pub fn new(channel: usize, base_ratio: f64, noise: f64, data_interval: Duration) -> Self {
        Self {
            channel,
            base_ratio,
            noise,
            data_interval,
        }
    }
}

impl VoltageRatioInput for SimulatedBridgeChannel {
    fn channel(&self) -> usize {
        self.channel
    }

    fn voltage_ratio(&self) -> AppResult<f64> {
        let jitter = if self.noise > 0.0 {
            rand::thread_rng().gen_range(-self.noise / 2.0..=self.noise / 2.0)
        } else {
            0.0
        };
        Ok(self.base_ratio + jitter)
    }

    fn data_interval(&self) -> Duration {
        self.data_interval
    }
}

/// Four channels resembling an unloaded rig.
pub fn default_channels(data_interval: Duration) -> Vec<Arc<SimulatedBridgeChannel>> {
    [-0.000050, -0.000051, -0.000053, -0.000053]
        .into_iter()
        .enumerate()
        .map(|(channel, base)| Arc::new(SimulatedBridgeChannel::new(channel, base, 2e-7, data_interval)))
        .collect()
}

/// Spawns the callback task. It runs until aborted.
pub fn spawn_callbacks(
    channels: Vec<Arc<SimulatedBridgeChannel>>,
    updater: WeightUpdater,
) -> JoinHandle<()> {
    let period = channels
        .iter()
        .map(|channel| channel.data_interval)
        .min()
        .unwrap_or(Duration::from_millis(250))
        .max(Duration::from_millis(1));

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            for channel in &channels {
                let result = channel
                    .voltage_ratio()
                    .and_then(|ratio| updater.on_voltage_ratio_change(channel.channel, ratio));
                match result {
                    Ok(_) => {}
                    Err(e) => warn!("Simulated bridge channel {}: {}", channel.channel, e),
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::{ChannelCalibration, WeightSource};

    #[test]
    fn test_ratio_stays_within_noise_band() {
        let channel = SimulatedBridgeChannel::new(0, 0.001, 1e-6, Duration::from_millis(10));
        for _ in 0..100 {
            let ratio = channel.voltage_ratio().unwrap();
            assert!((ratio - 0.001).abs() <= 0.5e-6 + 1e-15);
        }
    }

    #[tokio::test]
    async fn test_callbacks_publish_weights() {
        let calibration = ChannelCalibration {
            gain: 1000.0,
            offset: 0.0,
        };
        let source = WeightSource::new(&[calibration; 4], 1, true);
        let channels = (0..4)
            .map(|channel| {
                Arc::new(SimulatedBridgeChannel::new(
                    channel,
                    0.001 * (channel + 1) as f64,
                    0.0,
                    Duration::from_millis(1),
                ))
            })
            .collect();
        let handle = spawn_callbacks(channels, source.updater());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert_eq!(source.latest().weights, [1.0, 2.0, 3.0, 4.0]);
    }
}
