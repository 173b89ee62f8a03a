//! Core library for the parachute_daq application.
//!
//! Acquires wind speed/direction from a DATAQ serial instrument and load-cell weights
//! from a four-channel bridge, and fuses both into one time-stamped record stream
//! during a parachute drop/load test.
//!
//! ```text
//! InstrumentSession --bytes--> decode_scan_cycle --DecodedReading--+
//!                                                                  v
//! bridge callbacks --> WeightUpdater --> WeightSource::latest() --> Synchronizer --> RecordSink
//!                                                                  ^
//! operator keys ---------> AcquisitionController (idle/running/terminated)
//! ```

pub mod acquisition;
pub mod bridge;
pub mod config;
pub mod data;
pub mod error;
pub mod instrument;
pub mod logging;
pub mod protocol;
