use std::{fmt, str::FromStr};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Off,
    Heat,
    Cool,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::Heat => "heat",
            Self::Cool => "cool",
        }
    }

    /// Next mode in the fixed Off → Heat → Cool → Off cycle.
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Heat,
            Self::Heat => Self::Cool,
            Self::Cool => Self::Off,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorId {
    Heat,
    Cool,
}

impl IndicatorId {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Heat => "heat",
            Self::Cool => "cool",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorState {
    #[default]
    Off,
    On,
    Pulsing,
}

impl IndicatorState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Off => "off",
            Self::On => "on",
            Self::Pulsing => "pulsing",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndicatorCommand {
    pub id: IndicatorId,
    pub state: IndicatorState,
}

impl IndicatorCommand {
    pub fn new(id: IndicatorId, state: IndicatorState) -> Self {
        Self { id, state }
    }
}

/// A temperature sample after conversion, or the marker left by a failed read.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum Reading {
    Fahrenheit(f32),
    #[default]
    Invalid,
}

impl Reading {
    pub fn from_celsius(celsius: f32) -> Self {
        Self::Fahrenheit(celsius_to_fahrenheit(celsius))
    }

    pub fn fahrenheit(self) -> Option<f32> {
        match self {
            Self::Fahrenheit(value) => Some(value),
            Self::Invalid => None,
        }
    }

    pub fn is_valid(self) -> bool {
        matches!(self, Self::Fahrenheit(_))
    }
}

pub fn celsius_to_fahrenheit(celsius: f32) -> f32 {
    celsius * 9.0 / 5.0 + 32.0
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayFrame {
    pub line1: String,
    pub line2: String,
}

impl DisplayFrame {
    pub fn new(line1: impl Into<String>, line2: impl Into<String>) -> Self {
        Self {
            line1: line1.into(),
            line2: line2.into(),
        }
    }

    /// Truncates both lines to `columns` characters.
    pub fn fit(mut self, columns: usize) -> Self {
        truncate_chars(&mut self.line1, columns);
        truncate_chars(&mut self.line2, columns);
        self
    }
}

fn truncate_chars(line: &mut String, columns: usize) {
    if let Some((index, _)) = line.char_indices().nth(columns) {
        line.truncate(index);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub timestamp: NaiveDateTime,
    pub mode: Mode,
    pub temp_f: f32,
    pub set_point: i32,
}

impl LogRecord {
    /// Line written to the serial channel: `mode,temp,setpoint`.
    pub fn serial_line(&self) -> String {
        format!("{},{:.1},{}\n", self.mode, self.temp_f, self.set_point)
    }

    pub fn csv_row(&self) -> String {
        format!(
            "{},{},{:.1},{}\n",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.mode,
            self.temp_f,
            self.set_point
        )
    }
}

/// Everything one control step produced.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutput {
    pub reading: Reading,
    pub frame: DisplayFrame,
    pub record: Option<LogRecord>,
    /// The record is also due on the secondary (serial) channel this tick.
    pub serial_due: bool,
    pub indicators: [IndicatorCommand; 2],
}

impl TickOutput {
    pub fn indicator(&self, id: IndicatorId) -> IndicatorState {
        self.indicators
            .iter()
            .find(|command| command.id == id)
            .map(|command| command.state)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    Cycle,
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown button `{0}`")]
pub struct UnknownButton(pub String);

impl FromStr for ButtonEvent {
    type Err = UnknownButton;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "c" | "cycle" | "mode" | "state" => Ok(Self::Cycle),
            "+" | "u" | "up" | "inc" => Ok(Self::Increment),
            "-" | "d" | "down" | "dec" => Ok(Self::Decrement),
            other => Err(UnknownButton(other.to_string())),
        }
    }
}
