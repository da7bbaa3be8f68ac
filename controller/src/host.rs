use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use pi_thermostat_common::{ControllerState, HardwareConfig, RuntimeConfig, SensorSource};
use tracing::{info, warn};

use crate::{
    adapters::{
        ConsoleDisplay, CsvLogSink, FanoutLogSink, LoggingIndicators, SerialDevice,
        SimulatedSensor, SysfsLeds, SysfsSensor, TracingLogSink,
    },
    control_loop::ControlLoop,
    controller::{ControllerHandle, Ports, ThermostatController},
    input::spawn_stdin_buttons,
    persist::{self, load_set_point, FileSetpointStore, SetpointWriter},
    ports::{IndicatorPort, SensorPort, SerialSink, SetpointStore},
};

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var("THERMOSTAT_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./config.json"));
    let mut runtime = load_runtime_config(&config_path).await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from {}: {err:#}", config_path.display());
        RuntimeConfig::default()
    });
    if let Ok(serial_port) = std::env::var("THERMOSTAT_SERIAL_PORT") {
        runtime.hardware.serial_port = Some(PathBuf::from(serial_port));
    }
    runtime.sanitize();

    let data_dir = std::env::var("THERMOSTAT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("./.thermostat"));
    let file_store = FileSetpointStore::in_dir(&data_dir);
    info!("set point persisted at {}", file_store.path().display());
    let store: Arc<dyn SetpointStore> = Arc::new(file_store);
    let set_point = load_set_point(store.as_ref(), runtime.default_set_point);

    let ports = open_ports(&runtime.hardware)?;

    let (sender, rx) = persist::channel(set_point);
    let writer = SetpointWriter::spawn(store.clone(), rx);
    let state = ControllerState::new(runtime.thermostat.clone(), set_point);
    let handle = ControllerHandle::new(state, sender);
    let controller = ThermostatController::new(handle.clone(), ports);

    info!(
        mode = %handle.mode(),
        set_point = handle.set_point(),
        tick_ms = runtime.thermostat.tick_interval_ms,
        "thermostat started; press c / + / - then Enter"
    );
    spawn_stdin_buttons(handle.clone()).context("failed to start button input")?;
    spawn_signal_listener(handle);
    let period = Duration::from_millis(runtime.thermostat.tick_interval_ms);
    let ticks = ControlLoop::new(controller, writer, store, period)
        .run()
        .await;

    info!(ticks, "thermostat shut down gracefully");
    Ok(())
}

async fn load_runtime_config(path: &Path) -> anyhow::Result<RuntimeConfig> {
    match tokio::fs::read(path).await {
        Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
        Err(err) => Err(err.into()),
    }
}

/// Opens every port up front. Display and indicator failures are fatal here.
fn open_ports(hardware: &HardwareConfig) -> anyhow::Result<Ports> {
    let sensor: Box<dyn SensorPort> = match &hardware.sensor {
        SensorSource::Simulated => {
            info!("using simulated temperature sensor");
            Box::new(SimulatedSensor::new())
        }
        SensorSource::Sysfs { path } => {
            info!("reading temperature from {}", path.display());
            Box::new(SysfsSensor::new(path))
        }
    };

    let indicators: Box<dyn IndicatorPort> = match (&hardware.heat_led, &hardware.cool_led) {
        (Some(heat), Some(cool)) => Box::new(
            SysfsLeds::open(heat, cool).context("failed to open heat/cool LEDs")?,
        ),
        (None, None) => Box::new(LoggingIndicators::new()),
        _ => anyhow::bail!("heat_led and cool_led must be configured together"),
    };

    let mut log = FanoutLogSink::new().with(TracingLogSink);
    if let Some(path) = &hardware.csv_log {
        info!("appending readings to {}", path.display());
        log = log.with(CsvLogSink::new(path));
    }

    let serial = hardware.serial_port.as_ref().map(|path| {
        info!(
            baud = hardware.serial_baud_rate,
            "serial telemetry on {}",
            path.display()
        );
        Box::new(SerialDevice::new(path, hardware.serial_baud_rate)) as Box<dyn SerialSink>
    });

    Ok(Ports {
        sensor,
        display: Box::new(ConsoleDisplay::stdout()),
        indicators,
        log: Box::new(log),
        serial,
    })
}

fn spawn_signal_listener(handle: ControllerHandle) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("interrupt received, shutting down");
                handle.request_shutdown();
            }
            Err(err) => warn!("failed to listen for interrupt: {err}"),
        }
    });
}
