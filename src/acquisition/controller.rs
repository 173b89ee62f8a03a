//! The acquisition loop.
//!
//! One task, no blocking: every iteration applies pending operator commands, drains
//! the serial input while running, decodes whole scan cycles and hands them to the
//! [`Synchronizer`]. Weight updates arrive on the bridge's own context and are only
//! read here, as a snapshot, when a record is due.

use super::operator::OperatorInput;
use super::{AcquisitionState, OperatorCommand, TransitionAction};
use crate::bridge::WeightSource;
use crate::config::Settings;
use crate::data::{FusedRecord, RecordSink, Synchronizer};
use crate::error::{AppResult, DaqError};
use crate::instrument::{InstrumentSession, SerialTransport};
use crate::protocol::{decode_scan_cycle, RangeTable, ScanList, WindCalibration, BYTES_PER_UNIT};
use bytes::BytesMut;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

/// Counters reported when the run ends.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Scan cycles decoded.
    pub cycles: u64,
    /// Records written, the origin record included.
    pub records: u64,
    /// Completed go/stop sessions.
    pub sessions: u32,
    /// Bytes discarded by stop/quit flushes.
    pub discarded_bytes: u64,
}

/// Drives one instrument and one weight source into a record sink.
pub struct AcquisitionController<T: SerialTransport, S: RecordSink> {
    session: InstrumentSession<T>,
    weights: WeightSource,
    synchronizer: Synchronizer,
    sink: S,
    calibration: WindCalibration,
    scan_list: ScanList,
    range_table: RangeTable,
    state: AcquisitionState,
    pending: BytesMut,
    poll_interval: Duration,
    origin_emitted: bool,
    summary: RunSummary,
}

impl<T: SerialTransport, S: RecordSink> AcquisitionController<T, S> {
    /// Builds a controller around a configured session.
    pub fn new(
        session: InstrumentSession<T>,
        weights: WeightSource,
        sink: S,
        settings: &Settings,
    ) -> AppResult<Self> {
        let (Some(scan_list), Some(range_table)) = (session.scan_list(), session.range_table()) else {
            return Err(DaqError::Instrument(
                "controller needs a configured instrument session".to_string(),
            ));
        };
        let scan_list = scan_list.clone();
        let range_table = range_table.clone();
        let cycle_bytes = BYTES_PER_UNIT * scan_list.len();

        Ok(Self {
            session,
            weights,
            synchronizer: Synchronizer::new(settings.storage.record_interval()),
            sink,
            calibration: settings.wind.clone(),
            scan_list,
            range_table,
            state: AcquisitionState::Idle,
            pending: BytesMut::with_capacity(cycle_bytes * 64),
            poll_interval: Duration::from_millis(settings.application.poll_interval_ms),
            origin_emitted: false,
            summary: RunSummary::default(),
        })
    }

    /// Current state.
    pub fn state(&self) -> AcquisitionState {
        self.state
    }

    /// Counters so far.
    pub fn summary(&self) -> RunSummary {
        self.summary
    }

    /// Weight source the controller reads from.
    pub fn weights(&self) -> &WeightSource {
        &self.weights
    }

    /// Writes the synthetic zero record that anchors the output at t = 0.
    ///
    /// Only the first call writes; it is also issued implicitly before the first "go".
    pub async fn emit_origin(&mut self) -> AppResult<()> {
        if self.origin_emitted {
            return Ok(());
        }
        self.origin_emitted = true;
        self.write_record(FusedRecord::zero()).await
    }

    async fn write_record(&mut self, record: FusedRecord) -> AppResult<()> {
        self.sink.write(&record).await?;
        self.summary.records += 1;
        info!(
            "Logged: {:.2}s, {:.5} m/s, {:.5}°",
            record.elapsed_seconds, record.wind_speed, record.wind_direction
        );
        Ok(())
    }

    /// Applies one operator command at `now`.
    pub async fn handle_command(&mut self, command: OperatorCommand, now: Instant) -> AppResult<AcquisitionState> {
        let (next, action) = self.state.on_command(command);
        match action {
            TransitionAction::StartInstrument => {
                self.emit_origin().await?;
                self.pending.clear();
                self.session.clear_input()?;
                self.synchronizer.begin(now);
                self.session.start_acquisition().await?;
                info!("Acquisition started");
            }
            TransitionAction::StopInstrument => {
                self.session.stop_acquisition().await?;
                self.summary.discarded_bytes += self.pending.len() as u64;
                self.pending.clear();
                if self.state == AcquisitionState::Running {
                    self.summary.sessions += 1;
                }
                if next == AcquisitionState::Idle {
                    info!("Stopped");
                }
            }
            TransitionAction::Ignore => {
                debug!("Ignoring '{:?}' while {}", command, self.state);
            }
        }
        if next != self.state {
            debug!("Acquisition state: {} -> {}", self.state, next);
        }
        self.state = next;
        Ok(next)
    }

    /// Drains the serial input and decodes every whole scan cycle.
    ///
    /// A trailing partial cycle stays buffered for the next call. Returns the number
    /// of cycles decoded.
    pub async fn poll_instrument(&mut self, now: Instant) -> AppResult<usize> {
        if self.state != AcquisitionState::Running {
            return Ok(0);
        }
        let bytes = self.session.read_available()?;
        self.pending.extend_from_slice(&bytes);

        let cycle_bytes = BYTES_PER_UNIT * self.scan_list.len();
        let mut decoded = 0;
        while self.pending.len() >= cycle_bytes {
            let cycle = self.pending.split_to(cycle_bytes);
            let reading = decode_scan_cycle(&cycle, &self.scan_list, &self.range_table, &self.calibration)?;
            decoded += 1;
            self.summary.cycles += 1;

            let weights = &self.weights;
            if let Some(record) = self.synchronizer.on_cycle(reading, || weights.latest(), now) {
                self.write_record(record).await?;
            }
        }

        if !self.pending.is_empty() {
            let desync = DaqError::FramingDesync {
                expected: cycle_bytes,
                available: self.pending.len(),
            };
            trace!("{}", desync);
        }
        Ok(decoded)
    }

    /// Runs until the operator quits, then shuts the sink down.
    pub async fn run<I: OperatorInput>(&mut self, input: &mut I) -> AppResult<RunSummary> {
        self.emit_origin().await?;
        info!("Ready to acquire. Press <g> to go, <s> to stop, <r> to reset counter, and <q> to quit.");

        while !self.state.is_terminal() {
            while let Some(command) = input.poll_command() {
                self.handle_command(command, Instant::now()).await?;
                if self.state.is_terminal() {
                    break;
                }
            }
            if self.state.is_terminal() {
                break;
            }

            let decoded = self.poll_instrument(Instant::now()).await?;
            if decoded == 0 {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        self.sink.shutdown().await?;
        info!(
            "Run finished: {} record(s), {} scan cycle(s), {} session(s)",
            self.summary.records, self.summary.cycles, self.summary.sessions
        );
        Ok(self.summary)
    }
}
