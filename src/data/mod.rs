//! Synchronized record stream: fusion, sinks and run metadata.

pub mod metadata;
mod record;
pub mod storage;
mod synchronizer;

pub use metadata::{RunMetadata, RunMetadataBuilder};
pub use record::{round5, FusedRecord};
pub use storage::{AnemometerCsvWriter, CsvRecordWriter, MemorySink, RecordSink};
pub use synchronizer::Synchronizer;
