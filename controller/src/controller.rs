use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::NaiveDateTime;
use pi_thermostat_common::{ButtonEvent, ControllerState, Mode, TickOutput};
use tokio::sync::Notify;
use tracing::{debug, error, info, warn};

use crate::{
    persist::SetpointSender,
    ports::{DisplayPort, IndicatorPort, LogSink, SensorPort, SerialSink, SetpointStore},
};

/// The hardware a controller drives, opened once at startup.
pub struct Ports {
    pub sensor: Box<dyn SensorPort>,
    pub display: Box<dyn DisplayPort>,
    pub indicators: Box<dyn IndicatorPort>,
    pub log: Box<dyn LogSink>,
    pub serial: Option<Box<dyn SerialSink>>,
}

impl Ports {
    fn release(&mut self) {
        self.indicators.release();
        self.display.release();
        if let Some(serial) = self.serial.as_mut() {
            serial.release();
        }
        self.log.release();
        self.sensor.release();
    }
}

/// Cloneable input surface shared with button sources and signal handlers.
///
/// Every handler takes the state lock for the duration of a single field
/// update, so none of them can interleave with a tick's step.
#[derive(Clone)]
pub struct ControllerHandle {
    state: Arc<Mutex<ControllerState>>,
    persist: SetpointSender,
    wake: Arc<Notify>,
}

impl ControllerHandle {
    pub fn new(state: ControllerState, persist: SetpointSender) -> Self {
        Self {
            state: Arc::new(Mutex::new(state)),
            persist,
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn cycle_state(&self) -> Mode {
        let mode = self.lock().cycle_mode();
        info!(%mode, "mode changed");
        mode
    }

    pub fn increment_setpoint(&self) -> i32 {
        let set_point = {
            let mut state = self.lock();
            let set_point = state.increment_set_point();
            // Submitted under the lock so the newest value is always queued last.
            self.persist.submit(set_point);
            set_point
        };
        info!(set_point, "set point raised");
        set_point
    }

    pub fn decrement_setpoint(&self) -> i32 {
        let set_point = {
            let mut state = self.lock();
            let set_point = state.decrement_set_point();
            // Submitted under the lock so the newest value is always queued last.
            self.persist.submit(set_point);
            set_point
        };
        info!(set_point, "set point lowered");
        set_point
    }

    pub fn dispatch(&self, event: ButtonEvent) {
        match event {
            ButtonEvent::Cycle => {
                self.cycle_state();
            }
            ButtonEvent::Increment => {
                self.increment_setpoint();
            }
            ButtonEvent::Decrement => {
                self.decrement_setpoint();
            }
        }
    }

    pub fn request_shutdown(&self) {
        self.lock().request_shutdown();
        self.wake.notify_one();
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.lock().is_shutdown_requested()
    }

    pub fn mode(&self) -> Mode {
        self.lock().mode()
    }

    pub fn set_point(&self) -> i32 {
        self.lock().set_point()
    }

    /// Resolves once shutdown has been requested (or was already pending).
    pub async fn shutdown_requested(&self) {
        loop {
            let notified = self.wake.notified();
            if self.is_shutdown_requested() {
                return;
            }
            notified.await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives the ports from [`ControllerState`] one tick at a time.
pub struct ThermostatController {
    handle: ControllerHandle,
    ports: Ports,
    released: bool,
}

impl ThermostatController {
    pub fn new(handle: ControllerHandle, ports: Ports) -> Self {
        Self {
            handle,
            ports,
            released: false,
        }
    }

    pub fn handle(&self) -> &ControllerHandle {
        &self.handle
    }

    /// Reads the sensor once, steps the state and writes the results out.
    ///
    /// Port failures are logged and skipped; nothing here ends the loop.
    pub fn tick(&mut self, now: NaiveDateTime) -> TickOutput {
        let sample = match self.ports.sensor.read_celsius() {
            Ok(celsius) => Some(celsius),
            Err(err) => {
                warn!("sensor read failed: {err}");
                None
            }
        };

        let (output, alert_due, failures) = {
            let mut state = self.handle.lock();
            let output = state.step(sample, now);
            (
                output,
                state.sensor_alert_due(),
                state.consecutive_sensor_failures(),
            )
        };

        if alert_due {
            error!(failures, "temperature sensor has failed repeatedly, check wiring");
        }

        if let Err(err) = self
            .ports
            .display
            .render(&output.frame.line1, &output.frame.line2)
        {
            warn!("display render failed, skipping frame: {err}");
        }

        if let Some(record) = &output.record {
            if let Err(err) = self.ports.log.record(record) {
                warn!("telemetry record failed: {err}");
            }
            if output.serial_due {
                if let Some(serial) = self.ports.serial.as_mut() {
                    if let Err(err) = serial.write(record.serial_line().as_bytes()) {
                        debug!("serial log write failed: {err}");
                    }
                }
            }
        }

        for command in output.indicators {
            if let Err(err) = self.ports.indicators.set(command.id, command.state) {
                warn!("indicator update failed: {err}");
            }
        }

        output
    }

    /// Final step of a shutdown: darkens the hardware and writes the set
    /// point synchronously.
    pub fn finish(&mut self, store: &dyn SetpointStore) {
        self.handle.lock().request_shutdown();
        self.release_ports();

        let set_point = self.handle.set_point();
        match store.save(set_point) {
            Ok(()) => info!(set_point, "set point flushed"),
            Err(err) => warn!("failed to flush set point {set_point}: {err}"),
        }
    }

    fn release_ports(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.ports.release();
        debug!("ports released");
    }
}

impl Drop for ThermostatController {
    fn drop(&mut self) {
        self.release_ports();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::{
        persist::{self, tests::MemoryStore},
        ports::{DisplayError, IndicatorError, LogError, SensorError, SerialError},
    };
    use chrono::NaiveDate;
    use pi_thermostat_common::{IndicatorId, IndicatorState, LogRecord, ThermostatConfig};
    use pretty_assertions::assert_eq;
    use std::collections::VecDeque;
    use tokio::sync::watch;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum Call {
        Render(String, String),
        Clear,
        Indicator(IndicatorId, IndicatorState),
        Record(LogRecord),
        Serial(String),
        Release(&'static str),
    }

    /// Shared call journal for every mock port.
    #[derive(Clone, Default)]
    pub(crate) struct Journal(Arc<Mutex<Vec<Call>>>);

    impl Journal {
        fn push(&self, call: Call) {
            self.0.lock().unwrap().push(call);
        }

        pub(crate) fn calls(&self) -> Vec<Call> {
            self.0.lock().unwrap().clone()
        }

        pub(crate) fn releases(&self) -> Vec<&'static str> {
            self.calls()
                .into_iter()
                .filter_map(|call| match call {
                    Call::Release(name) => Some(name),
                    _ => None,
                })
                .collect()
        }

        pub(crate) fn clear(&self) {
            self.0.lock().unwrap().clear();
        }
    }

    /// Plays back queued samples; an empty queue repeats the last one.
    pub(crate) struct ScriptedSensor {
        pub samples: VecDeque<Option<f32>>,
        pub last: Option<f32>,
        pub journal: Journal,
    }

    impl SensorPort for ScriptedSensor {
        fn read_celsius(&mut self) -> Result<f32, SensorError> {
            if let Some(next) = self.samples.pop_front() {
                self.last = next;
            }
            self.last.ok_or(SensorError::Unavailable)
        }

        fn release(&mut self) {
            self.journal.push(Call::Release("sensor"));
        }
    }

    pub(crate) struct MockDisplay {
        pub journal: Journal,
        pub fail: bool,
    }

    impl DisplayPort for MockDisplay {
        fn render(&mut self, line1: &str, line2: &str) -> Result<(), DisplayError> {
            if self.fail {
                return Err(std::io::Error::other("lcd unplugged").into());
            }
            self.journal
                .push(Call::Render(line1.to_string(), line2.to_string()));
            Ok(())
        }

        fn clear(&mut self) -> Result<(), DisplayError> {
            self.journal.push(Call::Clear);
            Ok(())
        }

        fn release(&mut self) {
            let _ = self.clear();
            self.journal.push(Call::Release("display"));
        }
    }

    pub(crate) struct MockIndicators {
        pub journal: Journal,
        pub fail: bool,
    }

    impl IndicatorPort for MockIndicators {
        fn set(&mut self, id: IndicatorId, state: IndicatorState) -> Result<(), IndicatorError> {
            if self.fail {
                return Err(IndicatorError::Missing(id.as_str()));
            }
            self.journal.push(Call::Indicator(id, state));
            Ok(())
        }

        fn release(&mut self) {
            self.journal
                .push(Call::Indicator(IndicatorId::Heat, IndicatorState::Off));
            self.journal
                .push(Call::Indicator(IndicatorId::Cool, IndicatorState::Off));
            self.journal.push(Call::Release("indicators"));
        }
    }

    pub(crate) struct MockLog {
        pub journal: Journal,
    }

    impl LogSink for MockLog {
        fn record(&mut self, record: &LogRecord) -> Result<(), LogError> {
            self.journal.push(Call::Record(record.clone()));
            Ok(())
        }

        fn release(&mut self) {
            self.journal.push(Call::Release("log"));
        }
    }

    pub(crate) struct MockSerial {
        pub journal: Journal,
        pub fail: bool,
    }

    impl SerialSink for MockSerial {
        fn write(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
            if self.fail {
                return Err(std::io::Error::other("tty gone").into());
            }
            self.journal
                .push(Call::Serial(String::from_utf8_lossy(bytes).into_owned()));
            Ok(())
        }

        fn release(&mut self) {
            self.journal.push(Call::Release("serial"));
        }
    }

    #[derive(Default)]
    pub(crate) struct Rig {
        pub samples: Vec<Option<f32>>,
        pub display_fails: bool,
        pub indicators_fail: bool,
        pub serial_fails: bool,
        pub set_point: Option<i32>,
        pub config: Option<ThermostatConfig>,
    }

    impl Rig {
        pub(crate) fn build(self) -> (ThermostatController, Journal) {
            let (controller, journal, _rx) = self.build_with_persistence();
            (controller, journal)
        }

        /// Also hands back the receiving end of the controller's set point
        /// channel, for wiring up a [`SetpointWriter`](crate::persist::SetpointWriter).
        pub(crate) fn build_with_persistence(
            self,
        ) -> (ThermostatController, Journal, watch::Receiver<i32>) {
            let journal = Journal::default();
            let set_point = self.set_point.unwrap_or(72);
            let state = ControllerState::new(self.config.unwrap_or_default(), set_point);
            let (sender, rx) = persist::channel(set_point);
            let ports = Ports {
                sensor: Box::new(ScriptedSensor {
                    samples: self.samples.into(),
                    last: Some(20.0),
                    journal: journal.clone(),
                }),
                display: Box::new(MockDisplay {
                    journal: journal.clone(),
                    fail: self.display_fails,
                }),
                indicators: Box::new(MockIndicators {
                    journal: journal.clone(),
                    fail: self.indicators_fail,
                }),
                log: Box::new(MockLog {
                    journal: journal.clone(),
                }),
                serial: Some(Box::new(MockSerial {
                    journal: journal.clone(),
                    fail: self.serial_fails,
                })),
            };
            let controller = ThermostatController::new(ControllerHandle::new(state, sender), ports);
            (controller, journal, rx)
        }
    }

    pub(crate) fn at(second: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 15)
            .and_then(|date| date.and_hms_opt(8, 30, second % 60))
            .unwrap()
    }

    #[test]
    fn tick_writes_display_log_and_indicators() {
        let (mut controller, journal) = Rig {
            samples: vec![Some(22.5)],
            ..Rig::default()
        }
        .build();
        controller.handle().cycle_state();

        let output = controller.tick(at(0));

        assert_eq!(output.indicator(IndicatorId::Heat), IndicatorState::On);
        assert_eq!(
            journal.calls(),
            vec![
                Call::Render("Jan 15 08:30:00".into(), "Temp: 72.5°F".into()),
                Call::Record(LogRecord {
                    timestamp: at(0),
                    mode: Mode::Heat,
                    temp_f: 72.5,
                    set_point: 72,
                }),
                Call::Indicator(IndicatorId::Heat, IndicatorState::On),
                Call::Indicator(IndicatorId::Cool, IndicatorState::Off),
            ]
        );
    }

    #[test]
    fn sensor_failure_renders_error_and_skips_telemetry() {
        let (mut controller, journal) = Rig {
            samples: vec![None],
            ..Rig::default()
        }
        .build();
        controller.handle().cycle_state();

        controller.tick(at(0));

        assert_eq!(
            journal.calls(),
            vec![
                Call::Render("Sensor Error".into(), "Check Wiring".into()),
                Call::Indicator(IndicatorId::Heat, IndicatorState::Off),
                Call::Indicator(IndicatorId::Cool, IndicatorState::Off),
            ]
        );
    }

    #[test]
    fn serial_record_every_thirtieth_tick() {
        let (mut controller, journal) = Rig::default().build();
        for second in 0..30 {
            controller.tick(at(second));
        }

        let serial: Vec<Call> = journal
            .calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Serial(_)))
            .collect();
        assert_eq!(serial, vec![Call::Serial("off,68.0,72\n".into())]);
    }

    #[test]
    fn serial_failure_is_swallowed() {
        let (mut controller, journal) = Rig {
            serial_fails: true,
            ..Rig::default()
        }
        .build();
        for second in 0..30 {
            controller.tick(at(second));
        }

        let records = journal
            .calls()
            .iter()
            .filter(|call| matches!(call, Call::Record(_)))
            .count();
        assert_eq!(records, 30);
    }

    #[test]
    fn render_failure_does_not_stop_the_tick() {
        let (mut controller, journal) = Rig {
            display_fails: true,
            ..Rig::default()
        }
        .build();
        controller.tick(at(0));

        let calls = journal.calls();
        assert!(calls.iter().any(|call| matches!(call, Call::Record(_))));
        assert!(calls
            .iter()
            .any(|call| matches!(call, Call::Indicator(IndicatorId::Heat, _))));
    }

    #[test]
    fn indicator_failure_does_not_stop_the_tick() {
        let (mut controller, journal) = Rig {
            indicators_fail: true,
            ..Rig::default()
        }
        .build();
        let output = controller.tick(at(0));

        assert!(output.record.is_some());
        assert!(journal
            .calls()
            .iter()
            .any(|call| matches!(call, Call::Render(_, _))));
    }

    #[test]
    fn handlers_feed_the_next_tick() {
        let (mut controller, journal) = Rig {
            samples: vec![Some(20.0)],
            ..Rig::default()
        }
        .build();
        let handle = controller.handle().clone();
        handle.cycle_state();
        handle.cycle_state();
        handle.decrement_setpoint();
        handle.decrement_setpoint();

        let output = controller.tick(at(0));

        assert_eq!(handle.mode(), Mode::Cool);
        assert_eq!(output.indicator(IndicatorId::Cool), IndicatorState::On);
        assert_eq!(output.record.as_ref().map(|record| record.set_point), Some(70));
        assert!(journal
            .calls()
            .contains(&Call::Indicator(IndicatorId::Cool, IndicatorState::On)));
    }

    #[test]
    fn setpoint_changes_are_submitted_for_persistence() {
        let state = ControllerState::new(ThermostatConfig::default(), 72);
        let (sender, rx) = persist::channel(72);
        let handle = ControllerHandle::new(state, sender);

        handle.increment_setpoint();
        handle.increment_setpoint();
        handle.dispatch(ButtonEvent::Decrement);

        assert_eq!(handle.set_point(), 73);
        assert_eq!(*rx.borrow(), 73);
    }

    #[test]
    fn concurrent_presses_are_all_counted() {
        let state = ControllerState::new(ThermostatConfig::default(), 0);
        let (sender, rx) = persist::channel(0);
        let handle = ControllerHandle::new(state, sender);

        let workers: Vec<_> = (0..4)
            .map(|worker| {
                let handle = handle.clone();
                std::thread::spawn(move || {
                    for _ in 0..250 {
                        if worker % 2 == 0 {
                            handle.increment_setpoint();
                        } else {
                            handle.decrement_setpoint();
                        }
                        handle.increment_setpoint();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(handle.set_point(), 1_000);
        assert_eq!(*rx.borrow(), 1_000, "persistence must see the final value last");
    }

    #[test]
    fn finish_releases_once_and_flushes() {
        let (mut controller, journal) = Rig::default().build();
        controller.handle().increment_setpoint();
        let store = MemoryStore::default();

        controller.finish(&store);
        assert!(controller.handle().is_shutdown_requested());
        drop(controller);

        assert_eq!(
            journal.releases(),
            vec!["indicators", "display", "serial", "log", "sensor"]
        );
        assert_eq!(*store.saved.lock().unwrap(), vec![73]);
    }

    #[test]
    fn release_leaves_indicators_dark_and_display_clear() {
        let (mut controller, journal) = Rig::default().build();
        controller.handle().cycle_state();
        controller.tick(at(0));
        journal.clear();

        controller.finish(&MemoryStore::default());

        let calls = journal.calls();
        assert_eq!(
            &calls[..3],
            &[
                Call::Indicator(IndicatorId::Heat, IndicatorState::Off),
                Call::Indicator(IndicatorId::Cool, IndicatorState::Off),
                Call::Release("indicators"),
            ]
        );
        assert!(calls.contains(&Call::Clear));
    }

    #[test]
    fn ports_are_released_when_a_tick_panics() {
        let (controller, journal) = Rig::default().build();

        let result = std::thread::spawn(move || {
            let _controller = controller;
            panic!("fault inside the control thread");
        })
        .join();

        assert!(result.is_err());
        assert_eq!(journal.releases().len(), 5);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let (controller, _journal) = Rig::default().build();
        let handle = controller.handle().clone();

        let poisoner = handle.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock();
            panic!("poison the state lock");
        })
        .join();

        assert_eq!(handle.increment_setpoint(), 73);
    }

    #[tokio::test]
    async fn shutdown_future_resolves_after_request() {
        let (controller, _journal) = Rig::default().build();
        let handle = controller.handle().clone();

        let waiter = tokio::spawn({
            let handle = handle.clone();
            async move { handle.shutdown_requested().await }
        });
        handle.request_shutdown();

        waiter.await.unwrap();
        handle.shutdown_requested().await;
    }
}
