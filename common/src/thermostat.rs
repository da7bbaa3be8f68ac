use chrono::NaiveDateTime;

use crate::{
    config::ThermostatConfig,
    types::{
        DisplayFrame, IndicatorCommand, IndicatorId, IndicatorState, LogRecord, Mode, Reading,
        TickOutput,
    },
};

pub const SENSOR_ERROR_LINE1: &str = "Sensor Error";
pub const SENSOR_ERROR_LINE2: &str = "Check Wiring";

const TIMESTAMP_FORMAT: &str = "%b %d %H:%M:%S";

/// Mode, set point and cadence counters of the thermostat.
///
/// Pure state: the controller feeds it one sensor sample per tick and applies
/// the returned [`TickOutput`] to the hardware.
#[derive(Debug, Clone)]
pub struct ControllerState {
    config: ThermostatConfig,
    mode: Mode,
    set_point: i32,
    last_reading: Reading,

    display_position: u32,
    ticks: u64,
    consecutive_sensor_failures: u32,

    shutdown_requested: bool,
}

impl ControllerState {
    pub fn new(mut config: ThermostatConfig, set_point: i32) -> Self {
        config.sanitize();
        let set_point = config.clamp_set_point(set_point);
        Self {
            config,
            mode: Mode::Off,
            set_point,
            last_reading: Reading::Invalid,
            display_position: 0,
            ticks: 0,
            consecutive_sensor_failures: 0,
            shutdown_requested: false,
        }
    }

    pub fn config(&self) -> &ThermostatConfig {
        &self.config
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn set_point(&self) -> i32 {
        self.set_point
    }

    pub fn last_reading(&self) -> Reading {
        self.last_reading
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn consecutive_sensor_failures(&self) -> u32 {
        self.consecutive_sensor_failures
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested
    }

    pub fn request_shutdown(&mut self) {
        self.shutdown_requested = true;
    }

    pub fn cycle_mode(&mut self) -> Mode {
        self.mode = self.mode.next();
        self.mode
    }

    pub fn increment_set_point(&mut self) -> i32 {
        self.set_point = self
            .config
            .clamp_set_point(self.set_point.saturating_add(1));
        self.set_point
    }

    pub fn decrement_set_point(&mut self) -> i32 {
        self.set_point = self
            .config
            .clamp_set_point(self.set_point.saturating_sub(1));
        self.set_point
    }

    /// Advances one tick. `celsius` is `None` when the sensor read failed.
    pub fn step(&mut self, celsius: Option<f32>, now: NaiveDateTime) -> TickOutput {
        let reading = celsius
            .map(Reading::from_celsius)
            .filter(|reading| {
                reading
                    .fahrenheit()
                    .is_some_and(|temp_f| self.config.is_plausible_temp_f(temp_f))
            })
            .unwrap_or(Reading::Invalid);

        self.last_reading = reading;
        self.ticks = self.ticks.saturating_add(1);
        if reading.is_valid() {
            self.consecutive_sensor_failures = 0;
        } else {
            self.consecutive_sensor_failures = self.consecutive_sensor_failures.saturating_add(1);
        }

        let frame = self.render(reading, now).fit(self.config.display_columns);
        self.display_position = (self.display_position + 1) % self.config.display_cycle_ticks;

        let record = reading.fahrenheit().map(|temp_f| LogRecord {
            timestamp: now,
            mode: self.mode,
            temp_f,
            set_point: self.set_point,
        });
        let serial_due =
            record.is_some() && self.ticks % u64::from(self.config.serial_log_interval_ticks) == 0;

        TickOutput {
            reading,
            frame,
            record,
            serial_due,
            indicators: indicator_policy(self.mode, reading, self.set_point),
        }
    }

    /// True exactly once per failure streak, when it reaches the alert length.
    pub fn sensor_alert_due(&self) -> bool {
        self.consecutive_sensor_failures == self.config.sensor_failure_alert_ticks
    }

    fn render(&self, reading: Reading, now: NaiveDateTime) -> DisplayFrame {
        let Some(temp_f) = reading.fahrenheit() else {
            return DisplayFrame::new(SENSOR_ERROR_LINE1, SENSOR_ERROR_LINE2);
        };

        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        if self.display_position < self.config.temperature_display_ticks {
            DisplayFrame::new(timestamp, format!("Temp: {temp_f:.1}°F"))
        } else {
            DisplayFrame::new(
                timestamp,
                format!("State:{} SP:{}", self.mode, self.set_point),
            )
        }
    }
}

/// Heat pulses while below the set point, cool pulses while above it; the
/// active side is steady on once satisfied. Off mode or a bad reading turns
/// both off.
pub fn indicator_policy(mode: Mode, reading: Reading, set_point: i32) -> [IndicatorCommand; 2] {
    let mut heat = IndicatorState::Off;
    let mut cool = IndicatorState::Off;

    if let Some(temp_f) = reading.fahrenheit() {
        let target = set_point as f32;
        match mode {
            Mode::Heat => {
                heat = if temp_f < target {
                    IndicatorState::Pulsing
                } else {
                    IndicatorState::On
                };
            }
            Mode::Cool => {
                cool = if temp_f > target {
                    IndicatorState::Pulsing
                } else {
                    IndicatorState::On
                };
            }
            Mode::Off => {}
        }
    }

    [
        IndicatorCommand::new(IndicatorId::Heat, heat),
        IndicatorCommand::new(IndicatorId::Cool, cool),
    ]
}
