use std::{sync::Arc, time::Duration};

use chrono::{Local, NaiveDateTime};
use tokio::time::MissedTickBehavior;
use tracing::{info, warn};

use crate::{
    controller::{ControllerHandle, ThermostatController},
    persist::SetpointWriter,
    ports::SetpointStore,
};

/// Source of wall-clock timestamps for display and telemetry.
pub type Clock = fn() -> NaiveDateTime;

pub fn local_now() -> NaiveDateTime {
    Local::now().naive_local()
}

/// Ticks the controller at a fixed period until shutdown is requested.
pub struct ControlLoop {
    controller: ThermostatController,
    writer: SetpointWriter,
    store: Arc<dyn SetpointStore>,
    period: Duration,
    clock: Clock,
}

impl ControlLoop {
    pub fn new(
        controller: ThermostatController,
        writer: SetpointWriter,
        store: Arc<dyn SetpointStore>,
        period: Duration,
    ) -> Self {
        Self {
            controller,
            writer,
            store,
            period,
            clock: local_now,
        }
    }

    #[cfg(test)]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn handle(&self) -> ControllerHandle {
        self.controller.handle().clone()
    }

    /// Runs until shutdown, then tears down in order: stop ticking, stop the
    /// background writer, release every port, flush the set point.
    ///
    /// Returns the number of ticks performed.
    pub async fn run(self) -> u64 {
        let handle = self.handle();
        let Self {
            mut controller,
            writer,
            store,
            period,
            clock,
        } = self;

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0_u64;

        info!(period_ms = period.as_millis() as u64, "control loop started");
        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = handle.shutdown_requested() => {}
            }
            if handle.is_shutdown_requested() {
                break;
            }

            controller.tick(clock());
            ticks += 1;
        }

        info!(ticks, "control loop stopping");
        writer.shutdown().await;

        // Releasing ports and the final save are blocking file writes.
        let teardown = tokio::task::spawn_blocking(move || controller.finish(store.as_ref()));
        if let Err(err) = teardown.await {
            warn!("teardown ended abnormally: {err}");
        }
        ticks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        controller::tests::{at, Call, Journal, Rig},
        persist::tests::MemoryStore,
    };
    use pi_thermostat_common::{IndicatorId, IndicatorState};

    fn fixed_clock() -> NaiveDateTime {
        at(0)
    }

    fn build(rig: Rig, period_ms: u64) -> (ControlLoop, Arc<MemoryStore>, Journal) {
        let (controller, journal, rx) = rig.build_with_persistence();
        let store = Arc::new(MemoryStore::default());
        let writer = SetpointWriter::spawn(store.clone(), rx);
        let control = ControlLoop::new(
            controller,
            writer,
            store.clone(),
            Duration::from_millis(period_ms),
        )
        .with_clock(fixed_clock);
        (control, store, journal)
    }

    #[tokio::test]
    async fn stops_on_request_and_tears_down() {
        let (control, store, journal) = build(Rig::default(), 5);
        let handle = control.handle();
        handle.cycle_state();

        let running = tokio::spawn(control.run());
        tokio::time::sleep(Duration::from_millis(40)).await;
        handle.increment_setpoint();
        handle.request_shutdown();
        let ticks = running.await.unwrap();

        assert!(ticks >= 1);
        let calls = journal.calls();
        let renders = calls
            .iter()
            .filter(|call| matches!(call, Call::Render(_, _)))
            .count() as u64;
        assert_eq!(renders, ticks);
        assert_eq!(journal.releases().len(), 5);
        assert_eq!(
            calls.last(),
            Some(&Call::Release("sensor")),
            "teardown must be the last thing the ports see"
        );
        assert!(calls.contains(&Call::Indicator(IndicatorId::Heat, IndicatorState::Off)));
        assert_eq!(store.saved.lock().unwrap().last(), Some(&73));
    }

    #[tokio::test]
    async fn set_point_changes_persist_while_running() {
        let (control, store, _journal) = build(Rig::default(), 5);
        let handle = control.handle();
        let running = tokio::spawn(control.run());

        handle.increment_setpoint();
        handle.increment_setpoint();
        for _ in 0..100 {
            if store.saved.lock().unwrap().last() == Some(&74) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(store.saved.lock().unwrap().last(), Some(&74));
        assert!(!running.is_finished());

        handle.request_shutdown();
        running.await.unwrap();
        assert_eq!(store.saved.lock().unwrap().last(), Some(&74));
    }

    #[tokio::test]
    async fn final_flush_runs_off_the_runtime_thread() {
        let (control, store, _journal) = build(Rig::default(), 5);
        control.handle().request_shutdown();

        control.run().await;

        let threads = store.save_threads.lock().unwrap();
        assert_eq!(threads.len(), 1);
        assert_ne!(threads[0], std::thread::current().id());
    }

    #[tokio::test]
    async fn shutdown_before_start_skips_ticking() {
        let (control, store, journal) = build(Rig::default(), 5);
        control.handle().request_shutdown();

        let ticks = control.run().await;

        assert_eq!(ticks, 0);
        assert_eq!(journal.releases().len(), 5);
        assert_eq!(*store.saved.lock().unwrap(), vec![72]);
    }

    #[tokio::test]
    async fn sensor_errors_never_end_the_loop() {
        let rig = Rig {
            samples: vec![None; 8],
            ..Rig::default()
        };
        let (control, _store, journal) = build(rig, 2);
        let handle = control.handle();

        let running = tokio::spawn(control.run());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(!running.is_finished());
        handle.request_shutdown();
        let ticks = running.await.unwrap();

        assert!(ticks >= 2);
        assert!(journal
            .calls()
            .contains(&Call::Render("Sensor Error".into(), "Check Wiring".into())));
    }
}
