use std::{
    fs::{self, File, OpenOptions},
    io::Write,
    path::PathBuf,
};

use pi_thermostat_common::LogRecord;
use tracing::{info, warn};

use crate::ports::{LogError, LogSink};

const CSV_HEADER: &str = "timestamp,mode,temp_f,set_point\n";

/// Emits each record as a structured `tracing` event.
#[derive(Debug, Default)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn record(&mut self, record: &LogRecord) -> Result<(), LogError> {
        info!(
            target: "telemetry",
            mode = %record.mode,
            temp_f = record.temp_f,
            set_point = record.set_point,
            timestamp = %record.timestamp,
            "reading"
        );
        Ok(())
    }
}

/// Appends one CSV row per record.
#[derive(Debug)]
pub struct CsvLogSink {
    path: PathBuf,
    file: Option<File>,
}

impl CsvLogSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    fn file(&mut self) -> Result<&mut File, LogError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => self.open()?,
        };
        Ok(self.file.insert(file))
    }

    fn open(&self) -> Result<File, LogError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        if file.metadata()?.len() == 0 {
            file.write_all(CSV_HEADER.as_bytes())?;
        }
        Ok(file)
    }
}

impl LogSink for CsvLogSink {
    fn record(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let row = record.csv_row();
        let result = self.file()?.write_all(row.as_bytes());
        if result.is_err() {
            // Reopen on the next record.
            self.file = None;
        }
        Ok(result?)
    }

    fn release(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(err) = file.flush() {
                warn!("failed to flush {}: {err}", self.path.display());
            }
        }
    }
}

/// Sends every record to each inner sink; reports the first failure.
#[derive(Default)]
pub struct FanoutLogSink {
    sinks: Vec<Box<dyn LogSink>>,
}

impl FanoutLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, sink: impl LogSink + 'static) -> Self {
        self.sinks.push(Box::new(sink));
        self
    }
}

impl LogSink for FanoutLogSink {
    fn record(&mut self, record: &LogRecord) -> Result<(), LogError> {
        let mut first_error = None;
        for sink in &mut self.sinks {
            if let Err(err) = sink.record(record) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    fn release(&mut self) {
        for sink in &mut self.sinks {
            sink.release();
        }
    }
}
