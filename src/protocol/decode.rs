//! Binary scan-cycle decoding and the anemometer voltage mapping.

use crate::error::{AppResult, DaqError};
use serde::{Deserialize, Serialize};

use super::{ChannelFunction, RangeTable, ScanList};

/// Bytes per scan-list position in the binary stream.
pub const BYTES_PER_UNIT: usize = 2;

/// Full-scale divisor for a signed 16-bit sample.
const FULL_SCALE_COUNTS: f64 = 32768.0;

const FULL_CIRCLE_DEG: f64 = 360.0;

/// Scan-list position carrying the anemometer speed output.
pub const WIND_SPEED_POSITION: usize = 0;
/// Scan-list position carrying the wind vane output.
pub const WIND_DIRECTION_POSITION: usize = 1;

/// Linear mapping from the anemometer's output voltage window to physical units.
///
/// The window and offset are physical calibration of the sensor head and must not be
/// tuned.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WindCalibration {
    /// Sensor output at zero speed / zero angle (V).
    pub min_voltage: f64,
    /// Sensor output at full scale (V).
    pub max_voltage: f64,
    /// Wind speed at `max_voltage` (m/s).
    pub max_speed: f64,
    /// Vane mounting offset added to every direction (degrees).
    pub direction_offset: f64,
}

impl Default for WindCalibration {
    fn default() -> Self {
        Self {
            min_voltage: 1.32,
            max_voltage: 6.6,
            max_speed: 40.0,
            direction_offset: 8.2,
        }
    }
}

impl WindCalibration {
    fn fraction(&self, volts: f64) -> f64 {
        (volts - self.min_voltage) / (self.max_voltage - self.min_voltage)
    }

    /// Speed in m/s, clamped to `[0, max_speed]`.
    pub fn wind_speed(&self, volts: f64) -> f64 {
        (self.fraction(volts) * self.max_speed).clamp(0.0, self.max_speed)
    }

    /// Direction in degrees, wrapped into `[0, 360)`.
    pub fn wind_direction(&self, volts: f64) -> f64 {
        let degrees =
            (self.fraction(volts) * FULL_CIRCLE_DEG + self.direction_offset).rem_euclid(FULL_CIRCLE_DEG);
        // rem_euclid can round up to exactly 360 for tiny negative inputs
        if degrees >= FULL_CIRCLE_DEG {
            0.0
        } else {
            degrees
        }
    }
}

/// Wind values decoded from one scan cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DecodedReading {
    /// Wind speed in m/s, if position 0 is an analog channel.
    pub wind_speed: Option<f64>,
    /// Wind direction in degrees, if position 1 is an analog channel.
    pub wind_direction: Option<f64>,
}

/// Decodes exactly one scan cycle (`2 * scan_list.len()` bytes).
///
/// Every position is scaled by its range entry so the byte stream stays aligned, but
/// only analog positions 0 and 1 are mapped to wind speed and direction.
pub fn decode_scan_cycle(
    raw: &[u8],
    scan_list: &ScanList,
    range_table: &RangeTable,
    calibration: &WindCalibration,
) -> AppResult<DecodedReading> {
    if range_table.len() != scan_list.len() {
        return Err(DaqError::Configuration(format!(
            "range table has {} entries for a scan list of {}",
            range_table.len(),
            scan_list.len()
        )));
    }

    let expected = BYTES_PER_UNIT * scan_list.len();
    if raw.len() != expected {
        return Err(DaqError::FramingDesync {
            expected,
            available: raw.len(),
        });
    }

    let mut reading = DecodedReading::default();
    for ((position, unit), (entry, &full_scale)) in raw
        .chunks_exact(BYTES_PER_UNIT)
        .enumerate()
        .zip(scan_list.entries().iter().zip(range_table.as_slice()))
    {
        if !matches!(entry.function(), ChannelFunction::Analog(_)) {
            continue;
        }
        let counts = i16::from_le_bytes([unit[0], unit[1]]);
        let volts = full_scale * f64::from(counts) / FULL_SCALE_COUNTS;

        match position {
            WIND_SPEED_POSITION => reading.wind_speed = Some(calibration.wind_speed(volts)),
            WIND_DIRECTION_POSITION => {
                reading.wind_direction = Some(calibration.wind_direction(volts))
            }
            _ => {}
        }
    }

    Ok(reading)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{configure_scan_list, RangeTables};

    fn two_analog() -> (ScanList, RangeTable) {
        let config = configure_scan_list(
            ScanList::from_entries(&[0x0000, 0x0001]).slots(),
            &RangeTables::default(),
        )
        .unwrap();
        (config.scan_list, config.range_table)
    }

    fn counts_for(volts: f64) -> [u8; 2] {
        ((volts / 10.0 * 32768.0).round() as i16).to_le_bytes()
    }

    #[test]
    fn test_half_scale_cycle() {
        let (scan_list, range_table) = two_analog();
        let reading = decode_scan_cycle(
            b"\x00\x40\x00\x40",
            &scan_list,
            &range_table,
            &WindCalibration::default(),
        )
        .unwrap();

        // 16384 counts on a 10 V range is 5.0 V
        let fraction = (5.0 - 1.32) / (6.6 - 1.32);
        let speed = reading.wind_speed.unwrap();
        let direction = reading.wind_direction.unwrap();
        assert!((speed - fraction * 40.0).abs() < 1e-9);
        assert!((speed - 27.8788).abs() < 1e-3);
        assert!((direction - (fraction * 360.0 + 8.2)).abs() < 1e-9);
    }

    #[test]
    fn test_decode_is_deterministic() {
        let (scan_list, range_table) = two_analog();
        let calibration = WindCalibration::default();
        for raw in [[0x12, 0x34, 0x56, 0x78], [0xff, 0xff, 0x00, 0x80], [0, 0, 0, 0]] {
            let first = decode_scan_cycle(&raw, &scan_list, &range_table, &calibration).unwrap();
            let second = decode_scan_cycle(&raw, &scan_list, &range_table, &calibration).unwrap();
            assert_eq!(first, second);
        }
    }

    #[test]
    fn test_speed_clamps_to_window() {
        let calibration = WindCalibration::default();
        assert_eq!(calibration.wind_speed(0.5), 0.0);
        assert_eq!(calibration.wind_speed(-10.0), 0.0);
        assert_eq!(calibration.wind_speed(9.9), 40.0);
        assert_eq!(calibration.wind_speed(1.32), 0.0);
        assert!((calibration.wind_speed(6.6) - 40.0).abs() < 1e-9);
    }

    #[test]
    fn test_speed_clamped_through_decoder() {
        let (scan_list, range_table) = two_analog();
        let calibration = WindCalibration::default();
        let mut raw = Vec::new();
        raw.extend_from_slice(&counts_for(-3.0));
        raw.extend_from_slice(&counts_for(3.0));
        let low = decode_scan_cycle(&raw, &scan_list, &range_table, &calibration).unwrap();
        assert_eq!(low.wind_speed, Some(0.0));

        raw[..2].copy_from_slice(&i16::MAX.to_le_bytes());
        let high = decode_scan_cycle(&raw, &scan_list, &range_table, &calibration).unwrap();
        assert_eq!(high.wind_speed, Some(40.0));
    }

    #[test]
    fn test_direction_wraps_negative() {
        let calibration = WindCalibration::default();
        // volts giving -13.2° before the +8.2° offset, i.e. -5° after it
        let volts = 1.32 - 13.2 / 360.0 * (6.6 - 1.32);
        let direction = calibration.wind_direction(volts);
        assert!((direction - 355.0).abs() < 1e-9, "got {}", direction);
    }

    #[test]
    fn test_direction_always_in_range() {
        let (scan_list, range_table) = two_analog();
        let calibration = WindCalibration::default();
        for counts in (i16::MIN..=i16::MAX).step_by(97) {
            let mut raw = [0u8; 4];
            raw[2..].copy_from_slice(&counts.to_le_bytes());
            let reading = decode_scan_cycle(&raw, &scan_list, &range_table, &calibration).unwrap();
            let direction = reading.wind_direction.unwrap();
            assert!((0.0..360.0).contains(&direction), "{} -> {}", counts, direction);
            let speed = reading.wind_speed.unwrap();
            assert!((0.0..=40.0).contains(&speed));
        }
    }

    #[test]
    fn test_extra_positions_are_discarded() {
        let config = configure_scan_list(
            ScanList::from_entries(&[0x0000, 0x0001, 0x0002, 0x0008]).slots(),
            &RangeTables::default(),
        )
        .unwrap();
        let raw = [0x00, 0x40, 0x00, 0x40, 0xff, 0x7f, 0x01, 0x00];
        let reading = decode_scan_cycle(
            &raw,
            &config.scan_list,
            &config.range_table,
            &WindCalibration::default(),
        )
        .unwrap();
        let (scan_list, range_table) = two_analog();
        let reference = decode_scan_cycle(
            &raw[..4],
            &scan_list,
            &range_table,
            &WindCalibration::default(),
        )
        .unwrap();
        assert_eq!(reading, reference);
    }

    #[test]
    fn test_non_analog_wind_positions_stay_empty() {
        let config = configure_scan_list(
            ScanList::from_entries(&[0x0008, 0x0000]).slots(),
            &RangeTables::default(),
        )
        .unwrap();
        let reading = decode_scan_cycle(
            &[0x01, 0x00, 0x00, 0x40],
            &config.scan_list,
            &config.range_table,
            &WindCalibration::default(),
        )
        .unwrap();
        assert_eq!(reading.wind_speed, None);
        assert!(reading.wind_direction.is_some());
    }

    #[test]
    fn test_short_buffer_is_framing_desync() {
        let (scan_list, range_table) = two_analog();
        let err = decode_scan_cycle(&[0x00, 0x40, 0x00], &scan_list, &range_table, &WindCalibration::default())
            .unwrap_err();
        assert!(matches!(
            err,
            DaqError::FramingDesync {
                expected: 4,
                available: 3
            }
        ));
    }
}
