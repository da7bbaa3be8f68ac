use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermostatConfig {
    pub tick_interval_ms: u64,
    /// Length of the repeating display cycle, in ticks.
    pub display_cycle_ticks: u32,
    /// Leading ticks of each display cycle that show the temperature.
    pub temperature_display_ticks: u32,
    pub serial_log_interval_ticks: u32,
    /// Optional plausibility window; readings outside it count as failures.
    pub min_valid_temp_f: Option<f32>,
    pub max_valid_temp_f: Option<f32>,
    pub sensor_failure_alert_ticks: u32,
    pub set_point_min: Option<i32>,
    pub set_point_max: Option<i32>,
    pub display_columns: usize,
}

impl Default for ThermostatConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1_000,
            display_cycle_ticks: 10,
            temperature_display_ticks: 5,
            serial_log_interval_ticks: 30,
            min_valid_temp_f: None,
            max_valid_temp_f: None,
            sensor_failure_alert_ticks: 10,
            set_point_min: None,
            set_point_max: None,
            display_columns: 16,
        }
    }
}

impl ThermostatConfig {
    pub fn sanitize(&mut self) {
        if self.tick_interval_ms == 0 {
            self.tick_interval_ms = 1_000;
        }
        self.display_cycle_ticks = self.display_cycle_ticks.max(1);
        self.temperature_display_ticks = self.temperature_display_ticks.min(self.display_cycle_ticks);
        self.serial_log_interval_ticks = self.serial_log_interval_ticks.max(1);
        self.sensor_failure_alert_ticks = self.sensor_failure_alert_ticks.max(1);
        self.display_columns = self.display_columns.max(1);

        if let (Some(min), Some(max)) = (self.min_valid_temp_f, self.max_valid_temp_f) {
            if min > max {
                self.min_valid_temp_f = Some(max);
                self.max_valid_temp_f = Some(min);
            }
        }
        if let (Some(min), Some(max)) = (self.set_point_min, self.set_point_max) {
            if min > max {
                self.set_point_min = Some(max);
                self.set_point_max = Some(min);
            }
        }
    }

    /// Applies the optional set point bounds. Unbounded when neither is set.
    pub fn clamp_set_point(&self, set_point: i32) -> i32 {
        let raised = self.set_point_min.map_or(set_point, |min| set_point.max(min));
        self.set_point_max.map_or(raised, |max| raised.min(max))
    }

    /// Non-finite values are never plausible; the window applies only when set.
    pub fn is_plausible_temp_f(&self, temp_f: f32) -> bool {
        temp_f.is_finite()
            && self.min_valid_temp_f.map_or(true, |min| temp_f >= min)
            && self.max_valid_temp_f.map_or(true, |max| temp_f <= max)
    }
}

/// On-disk shape of the persisted set point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedSetpoint {
    pub set_point: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SensorSource {
    #[default]
    Simulated,
    /// A millidegree Celsius file, e.g. a hwmon `temp1_input`.
    Sysfs { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HardwareConfig {
    pub sensor: SensorSource,
    /// sysfs LED directories, e.g. `/sys/class/leds/heat`.
    pub heat_led: Option<PathBuf>,
    pub cool_led: Option<PathBuf>,
    pub serial_port: Option<PathBuf>,
    pub serial_baud_rate: u32,
    pub csv_log: Option<PathBuf>,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            sensor: SensorSource::default(),
            heat_led: None,
            cool_led: None,
            serial_port: None,
            serial_baud_rate: 115_200,
            csv_log: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub thermostat: ThermostatConfig,
    pub default_set_point: i32,
    pub hardware: HardwareConfig,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            thermostat: ThermostatConfig::default(),
            default_set_point: 72,
            hardware: HardwareConfig::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn sanitize(&mut self) {
        self.thermostat.sanitize();
        if self.hardware.serial_baud_rate == 0 {
            self.hardware.serial_baud_rate = HardwareConfig::default().serial_baud_rate;
        }
        self.default_set_point = self.thermostat.clamp_set_point(self.default_set_point);
    }
}
