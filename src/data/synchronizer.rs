//! Fixed-cadence fusion of wind readings and weights.
//!
//! Scan cycles are decoded as fast as the instrument streams them; the synchronizer
//! keeps the most recent wind values and emits at most one [`FusedRecord`] per record
//! interval. Time is passed in explicitly so the cadence can be driven from tests.

use super::FusedRecord;
use crate::bridge::WeightVector;
use crate::protocol::DecodedReading;
use std::time::{Duration, Instant};

/// Emits fused records at most once per interval.
#[derive(Debug)]
pub struct Synchronizer {
    interval: Duration,
    anchor: Option<Instant>,
    last_emitted: Option<Instant>,
    latest_wind: DecodedReading,
    cycles: u64,
    emitted: u64,
}

impl Synchronizer {
    /// Creates a synchronizer emitting every `interval`.
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            anchor: None,
            last_emitted: None,
            latest_wind: DecodedReading::default(),
            cycles: 0,
            emitted: 0,
        }
    }

    /// Resets the elapsed-time anchor to `now`. Called on every "go".
    pub fn begin(&mut self, now: Instant) {
        self.anchor = Some(now);
        self.last_emitted = Some(now);
    }

    /// Seconds since the last [`begin`](Self::begin), 0 before the first one.
    pub fn elapsed(&self, now: Instant) -> f64 {
        self.anchor
            .map(|anchor| now.saturating_duration_since(anchor).as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Feeds one decoded scan cycle.
    ///
    /// Returns a record when at least one interval has passed since the last one.
    /// `weights` is only called when a record is due.
    pub fn on_cycle<F>(&mut self, reading: DecodedReading, weights: F, now: Instant) -> Option<FusedRecord>
    where
        F: FnOnce() -> WeightVector,
    {
        self.cycles += 1;
        if let Some(speed) = reading.wind_speed {
            self.latest_wind.wind_speed = Some(speed);
        }
        if let Some(direction) = reading.wind_direction {
            self.latest_wind.wind_direction = Some(direction);
        }

        let last = *self.last_emitted.get_or_insert(now);
        if now.saturating_duration_since(last) < self.interval {
            return None;
        }

        self.last_emitted = Some(now);
        self.emitted += 1;
        Some(FusedRecord::fuse(self.elapsed(now), self.latest_wind, weights()))
    }

    /// Scan cycles seen so far.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Records emitted so far.
    pub fn emitted(&self) -> u64 {
        self.emitted
    }
}
