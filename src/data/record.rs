//! Fused output record.

use crate::bridge::WeightVector;
use crate::protocol::DecodedReading;
use serde::Serialize;

/// One synchronized row: the latest wind reading plus the latest weights.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
pub struct FusedRecord {
    /// Seconds since the most recent "go".
    pub elapsed_seconds: f64,
    /// Wind speed in m/s.
    pub wind_speed: f64,
    /// Wind direction in degrees, `[0, 360)`.
    pub wind_direction: f64,
    /// Mean of the two vertical load cells, in newtons.
    pub z_avg_weight: f64,
    /// Horizontal load along x, in newtons.
    pub x_weight: f64,
    /// Horizontal load along y, in newtons.
    pub y_weight: f64,
}

impl FusedRecord {
    /// The synthetic origin row written before the first "go".
    pub fn zero() -> Self {
        Self::default()
    }

    /// Combines a wind reading with a weight snapshot.
    ///
    /// Missing wind values are reported as 0.0.
    pub fn fuse(elapsed_seconds: f64, wind: DecodedReading, weights: WeightVector) -> Self {
        Self {
            elapsed_seconds,
            wind_speed: wind.wind_speed.unwrap_or(0.0),
            wind_direction: wind.wind_direction.unwrap_or(0.0),
            z_avg_weight: weights.z_avg(),
            x_weight: weights.x(),
            y_weight: weights.y(),
        }
    }
}

/// Rounds to 5 decimals, the precision of the written logs.
pub fn round5(value: f64) -> f64 {
    (value * 100_000.0).round() / 100_000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fuse_maps_weights() {
        let weights = WeightVector {
            weights: [2.0, 4.0, -1.5, 0.25],
        };
        let wind = DecodedReading {
            wind_speed: Some(12.5),
            wind_direction: None,
        };
        let record = FusedRecord::fuse(1.5, wind, weights);
        assert_eq!(record.elapsed_seconds, 1.5);
        assert_eq!(record.wind_speed, 12.5);
        assert_eq!(record.wind_direction, 0.0);
        assert_eq!(record.z_avg_weight, 3.0);
        assert_eq!(record.x_weight, -1.5);
        assert_eq!(record.y_weight, 0.25);
    }

    #[test]
    fn test_round5() {
        assert_eq!(round5(27.878787878), 27.87879);
        assert_eq!(round5(0.0), 0.0);
        assert_eq!(round5(-1.000004), -1.0);
    }
}
