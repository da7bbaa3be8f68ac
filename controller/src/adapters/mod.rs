//! Host-side implementations of the port traits.

pub mod display;
pub mod indicators;
pub mod sensor;
pub mod serial;
pub mod telemetry;

pub use display::ConsoleDisplay;
pub use indicators::{LoggingIndicators, SysfsLeds};
pub use sensor::{SimulatedSensor, SysfsSensor};
pub use serial::SerialDevice;
pub use telemetry::{CsvLogSink, FanoutLogSink, TracingLogSink};
