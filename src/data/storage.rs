//! Record sinks: the fused CSV log, the wind-only anemometer log and an in-memory sink.
use super::record::round5;
use super::FusedRecord;
use crate::error::AppResult;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Column header of the fused log.
pub const COMBINED_HEADER: [&str; 6] = [
    "elapsed_seconds",
    "wind_speed_m_s",
    "wind_direction_deg",
    "weight_z_N",
    "weight_x_N",
    "weight_y_N",
];

/// Column header of the anemometer log.
pub const ANEMOMETER_HEADER: [&str; 4] = ["days", "seconds", "wind_speed_m_s", "wind_direction_deg"];

/// Destination of fused records.
#[async_trait]
pub trait RecordSink: Send {
    /// Appends one record.
    async fn write(&mut self, record: &FusedRecord) -> AppResult<()>;

    /// Flushes and closes the sink. Later writes are dropped.
    async fn shutdown(&mut self) -> AppResult<()>;
}

fn create_csv(path: &Path, header: &[&str]) -> AppResult<csv::Writer<File>> {
    if let Some(dir) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(header)?;
    writer.flush()?;
    Ok(writer)
}

/// Fused log: one row per record, flushed after every row so a crash loses nothing.
pub struct CsvRecordWriter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl CsvRecordWriter {
    /// Creates (truncates) the file and writes the header.
    pub fn create(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let writer = create_csv(&path, &COMBINED_HEADER)?;
        info!("CSV writer initialized at '{}'.", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }
}

#[async_trait]
impl RecordSink for CsvRecordWriter {
    async fn write(&mut self, record: &FusedRecord) -> AppResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(&[
                round5(record.elapsed_seconds).to_string(),
                round5(record.wind_speed).to_string(),
                round5(record.wind_direction).to_string(),
                record.z_avg_weight.to_string(),
                record.x_weight.to_string(),
                record.y_weight.to_string(),
            ])?;
            writer.flush()?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("CSV writer '{}' shut down.", self.path.display());
        }
        Ok(())
    }
}

/// Wind-only log in the `days, seconds` layout of the field anemometer files.
pub struct AnemometerCsvWriter {
    path: PathBuf,
    writer: Option<csv::Writer<File>>,
}

impl AnemometerCsvWriter {
    /// Creates (truncates) the file and writes the header.
    pub fn create(path: impl Into<PathBuf>) -> AppResult<Self> {
        let path = path.into();
        let writer = create_csv(&path, &ANEMOMETER_HEADER)?;
        info!("Anemometer log initialized at '{}'.", path.display());
        Ok(Self {
            path,
            writer: Some(writer),
        })
    }
}

#[async_trait]
impl RecordSink for AnemometerCsvWriter {
    async fn write(&mut self, record: &FusedRecord) -> AppResult<()> {
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(&[
                "0".to_string(),
                round5(record.elapsed_seconds).to_string(),
                round5(record.wind_speed).to_string(),
                round5(record.wind_direction).to_string(),
            ])?;
            writer.flush()?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            debug!("Anemometer log '{}' shut down.", self.path.display());
        }
        Ok(())
    }
}

/// Keeps records in memory; clones share the same buffer.
#[derive(Clone, Default)]
pub struct MemorySink {
    records: Arc<Mutex<Vec<FusedRecord>>>,
    closed: Arc<Mutex<bool>>,
}

impl MemorySink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records written so far.
    pub fn records(&self) -> Vec<FusedRecord> {
        self.records.lock().clone()
    }

    /// Whether [`RecordSink::shutdown`] was called.
    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn write(&mut self, record: &FusedRecord) -> AppResult<()> {
        if !self.is_closed() {
            self.records.lock().push(*record);
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        *self.closed.lock() = true;
        Ok(())
    }
}

/// Fans every record out to several sinks.
#[async_trait]
impl RecordSink for Vec<Box<dyn RecordSink>> {
    async fn write(&mut self, record: &FusedRecord) -> AppResult<()> {
        for sink in self.iter_mut() {
            sink.write(record).await?;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> AppResult<()> {
        for sink in self.iter_mut() {
            sink.shutdown().await?;
        }
        Ok(())
    }
}
