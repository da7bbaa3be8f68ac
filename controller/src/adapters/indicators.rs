use std::{
    fs,
    io,
    path::{Path, PathBuf},
};

use pi_thermostat_common::{IndicatorId, IndicatorState};
use tracing::info;

use crate::ports::{IndicatorError, IndicatorPort};

/// On and off time of the kernel `timer` trigger while pulsing, in ms.
const PULSE_HALF_PERIOD_MS: u32 = 500;

/// Indicators that only exist as log lines; reports transitions.
#[derive(Debug, Default)]
pub struct LoggingIndicators {
    heat: IndicatorState,
    cool: IndicatorState,
}

impl LoggingIndicators {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn state(&self, id: IndicatorId) -> IndicatorState {
        match id {
            IndicatorId::Heat => self.heat,
            IndicatorId::Cool => self.cool,
        }
    }
}

impl IndicatorPort for LoggingIndicators {
    fn set(&mut self, id: IndicatorId, state: IndicatorState) -> Result<(), IndicatorError> {
        let slot = match id {
            IndicatorId::Heat => &mut self.heat,
            IndicatorId::Cool => &mut self.cool,
        };
        if *slot != state {
            info!(indicator = id.as_str(), state = state.as_str(), "indicator changed");
            *slot = state;
        }
        Ok(())
    }
}

/// Heat/cool LEDs exposed through the Linux LED class (`/sys/class/leds/*`).
///
/// Pulsing uses the `timer` trigger; steady states use `none` plus
/// `brightness`.
#[derive(Debug)]
pub struct SysfsLeds {
    heat: SysfsLed,
    cool: SysfsLed,
}

impl SysfsLeds {
    /// Opens both LED directories; a missing LED is a startup error.
    pub fn open(heat: &Path, cool: &Path) -> Result<Self, IndicatorError> {
        let mut leds = Self {
            heat: SysfsLed::open(IndicatorId::Heat, heat)?,
            cool: SysfsLed::open(IndicatorId::Cool, cool)?,
        };
        leds.heat.apply(IndicatorState::Off)?;
        leds.cool.apply(IndicatorState::Off)?;
        Ok(leds)
    }
}

impl IndicatorPort for SysfsLeds {
    fn set(&mut self, id: IndicatorId, state: IndicatorState) -> Result<(), IndicatorError> {
        match id {
            IndicatorId::Heat => self.heat.apply(state),
            IndicatorId::Cool => self.cool.apply(state),
        }
    }
}

#[derive(Debug)]
struct SysfsLed {
    id: IndicatorId,
    dir: PathBuf,
    max_brightness: u32,
    current: Option<IndicatorState>,
}

impl SysfsLed {
    fn open(id: IndicatorId, dir: &Path) -> Result<Self, IndicatorError> {
        if !dir.join("brightness").exists() {
            return Err(IndicatorError::Missing(id.as_str()));
        }
        let max_brightness = fs::read_to_string(dir.join("max_brightness"))
            .ok()
            .and_then(|raw| raw.trim().parse().ok())
            .unwrap_or(1);
        Ok(Self {
            id,
            dir: dir.to_path_buf(),
            max_brightness,
            current: None,
        })
    }

    fn apply(&mut self, state: IndicatorState) -> Result<(), IndicatorError> {
        if self.current == Some(state) {
            return Ok(());
        }
        let result = match state {
            IndicatorState::Off => self
                .write("trigger", "none")
                .and_then(|()| self.write("brightness", "0")),
            IndicatorState::On => self
                .write("trigger", "none")
                .and_then(|()| self.write("brightness", &self.max_brightness.to_string())),
            IndicatorState::Pulsing => self
                .write("trigger", "timer")
                .and_then(|()| self.write("delay_on", &PULSE_HALF_PERIOD_MS.to_string()))
                .and_then(|()| self.write("delay_off", &PULSE_HALF_PERIOD_MS.to_string())),
        };
        result.map_err(|source| IndicatorError::Io {
            id: self.id.as_str(),
            source,
        })?;
        self.current = Some(state);
        Ok(())
    }

    fn write(&self, attribute: &str, value: &str) -> io::Result<()> {
        fs::write(self.dir.join(attribute), value)
    }
}
