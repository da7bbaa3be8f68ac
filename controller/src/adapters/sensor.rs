use std::{fs, path::PathBuf};

use crate::ports::{SensorError, SensorPort};

/// Deterministic slow drift around 21 °C for host runs.
#[derive(Debug, Default)]
pub struct SimulatedSensor {
    tick: u64,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SensorPort for SimulatedSensor {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        self.tick = self.tick.saturating_add(1);
        // Triangle wave: 20.0 → 22.0 → 20.0 °C over 40 samples.
        let phase = (self.tick % 40) as f32;
        let offset = if phase < 20.0 { phase } else { 40.0 - phase };
        Ok(20.0 + offset * 0.1)
    }
}

/// Reads a kernel millidegree Celsius attribute (hwmon `temp*_input`,
/// thermal zone `temp`).
#[derive(Debug)]
pub struct SysfsSensor {
    path: PathBuf,
}

impl SysfsSensor {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl SensorPort for SysfsSensor {
    fn read_celsius(&mut self) -> Result<f32, SensorError> {
        let raw = fs::read_to_string(&self.path)?;
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SensorError::Unavailable);
        }
        let millidegrees: i64 = trimmed
            .parse()
            .map_err(|_| SensorError::Parse(trimmed.to_string()))?;
        Ok(millidegrees as f32 / 1_000.0)
    }
}
