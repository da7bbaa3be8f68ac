//! Narrow interfaces between the thermostat and its hardware.
//!
//! Every port is constructed once at startup and handed to the
//! [`ThermostatController`](crate::controller::ThermostatController), which
//! calls `release` on each of them exactly once on the way out.

use std::io;

use pi_thermostat_common::{IndicatorId, IndicatorState, LogRecord};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum SensorError {
    #[error("sensor read failed: {0}")]
    Io(#[from] io::Error),
    #[error("sensor returned unparsable value `{0}`")]
    Parse(String),
    #[error("sensor not responding")]
    Unavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum DisplayError {
    #[error("display write failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum IndicatorError {
    #[error("indicator {id} write failed: {source}")]
    Io {
        id: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("indicator {0} is not available")]
    Missing(&'static str),
}

#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("telemetry write failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum SerialError {
    #[error("serial port open failed: {0}")]
    Open(#[from] serialport::Error),
    #[error("serial write failed: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("no persisted set point")]
    Missing,
    #[error("set point storage I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("persisted set point is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("failed to encode set point: {0}")]
    Encode(#[source] serde_json::Error),
}

pub trait SensorPort: Send {
    /// One temperature sample in degrees Celsius.
    fn read_celsius(&mut self) -> Result<f32, SensorError>;

    fn release(&mut self) {}
}

/// Two independent indicators, heat and cool.
pub trait IndicatorPort: Send {
    fn set(&mut self, id: IndicatorId, state: IndicatorState) -> Result<(), IndicatorError>;

    /// Leaves both indicators dark.
    fn release(&mut self) {
        for id in [IndicatorId::Heat, IndicatorId::Cool] {
            if let Err(err) = self.set(id, IndicatorState::Off) {
                warn!("failed to switch off {} indicator: {err}", id.as_str());
            }
        }
    }
}

/// A two-line status surface.
pub trait DisplayPort: Send {
    fn render(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError>;

    fn clear(&mut self) -> Result<(), DisplayError>;

    fn release(&mut self) {
        if let Err(err) = self.clear() {
            warn!("failed to clear display: {err}");
        }
    }
}

/// Primary structured telemetry.
pub trait LogSink: Send {
    fn record(&mut self, record: &LogRecord) -> Result<(), LogError>;

    fn release(&mut self) {}
}

/// Secondary byte channel; failures here are never fatal.
pub trait SerialSink: Send {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SerialError>;

    fn release(&mut self) {}
}

/// Persistence of the single set point across restarts.
pub trait SetpointStore: Send + Sync {
    fn load(&self) -> Result<i32, PersistenceError>;

    fn save(&self, set_point: i32) -> Result<(), PersistenceError>;
}
