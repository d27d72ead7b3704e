//! Run log persistence.
//!
//! One record per processed reading, written and flushed as it arrives so a
//! failure mid-run keeps everything logged up to that point.

use crate::sensors::{PhysicalReading, QuantityKind, Unit};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

const CSV_HEADER: &str = "elapsed_s,channel,quantity,value,unit";

#[derive(Debug, Error)]
pub enum LogError {
    #[error("run log I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode run log record: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Time since Valve1 opened.
    pub elapsed: Duration,
    pub channel_id: u8,
    pub kind: QuantityKind,
    pub value: f64,
    pub unit: Unit,
}

impl LogRecord {
    pub fn from_reading(reading: &PhysicalReading, elapsed: Duration) -> Self {
        Self {
            elapsed,
            channel_id: reading.channel_id,
            kind: reading.kind,
            value: reading.value,
            unit: reading.unit,
        }
    }
}

pub trait RunLogger {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogError>;

    fn flush(&mut self) -> Result<(), LogError> {
        Ok(())
    }
}

impl<L: RunLogger + ?Sized> RunLogger for Box<L> {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        (**self).append(record)
    }

    fn flush(&mut self) -> Result<(), LogError> {
        (**self).flush()
    }
}

/// Comma-separated log, one line per reading after a header line.
pub struct CsvRunLogger<W: Write> {
    writer: W,
    header_written: bool,
}

impl CsvRunLogger<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> CsvRunLogger<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            header_written: false,
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RunLogger for CsvRunLogger<W> {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        if !self.header_written {
            writeln!(self.writer, "{CSV_HEADER}")?;
            self.header_written = true;
        }
        writeln!(
            self.writer,
            "{:.6},{},{},{},{}",
            record.elapsed.as_secs_f64(),
            record.channel_id,
            record.kind,
            record.value,
            record.unit
        )?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// One JSON object per line.
pub struct JsonLinesLogger<W: Write> {
    writer: W,
}

impl JsonLinesLogger<BufWriter<File>> {
    pub fn create(path: impl AsRef<Path>) -> Result<Self, LogError> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write> JsonLinesLogger<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> RunLogger for JsonLinesLogger<W> {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), LogError> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Keeps records in memory. Can be told to start failing after a number of
/// appends to exercise degraded logging.
#[derive(Debug, Default)]
pub struct MemoryRunLogger {
    records: Vec<LogRecord>,
    fail_after: Option<usize>,
}

impl MemoryRunLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_after(appends: usize) -> Self {
        Self {
            records: Vec::new(),
            fail_after: Some(appends),
        }
    }

    pub fn records(&self) -> &[LogRecord] {
        &self.records
    }
}

impl RunLogger for MemoryRunLogger {
    fn append(&mut self, record: &LogRecord) -> Result<(), LogError> {
        if self.fail_after.is_some_and(|limit| self.records.len() >= limit) {
            return Err(LogError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "log storage unavailable",
            )));
        }
        self.records.push(*record);
        Ok(())
    }
}
