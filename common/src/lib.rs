pub mod config;
pub mod thermostat;
pub mod types;

pub use config::{HardwareConfig, PersistedSetpoint, RuntimeConfig, SensorSource, ThermostatConfig};
pub use thermostat::{indicator_policy, ControllerState};
pub use types::{
    ButtonEvent, DisplayFrame, IndicatorCommand, IndicatorId, IndicatorState, LogRecord, Mode,
    Reading, TickOutput,
};
