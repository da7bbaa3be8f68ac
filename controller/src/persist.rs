use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use pi_thermostat_common::PersistedSetpoint;
use serde::Serialize;
use tokio::{
    sync::{watch, Notify},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

use crate::ports::{PersistenceError, SetpointStore};

/// Set point kept as a small JSON document.
#[derive(Debug, Clone)]
pub struct FileSetpointStore {
    path: PathBuf,
}

impl FileSetpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn in_dir(data_dir: &Path) -> Self {
        Self::new(data_dir.join("setpoint.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SetpointStore for FileSetpointStore {
    fn load(&self) -> Result<i32, PersistenceError> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Err(PersistenceError::Missing),
            Err(err) => return Err(err.into()),
        };
        let persisted: PersistedSetpoint = serde_json::from_slice(&raw)?;
        Ok(persisted.set_point)
    }

    fn save(&self, set_point: i32) -> Result<(), PersistenceError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let payload = encode(&PersistedSetpoint { set_point })?;

        // Write-then-rename so a crash never leaves a truncated file behind.
        let staging = self.path.with_extension("json.tmp");
        fs::write(&staging, payload)?;
        fs::rename(&staging, &self.path)?;
        Ok(())
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, PersistenceError> {
    serde_json::to_vec_pretty(value).map_err(PersistenceError::Encode)
}

/// Loads the persisted set point, falling back to `default` on any failure.
pub fn load_set_point(store: &dyn SetpointStore, default: i32) -> i32 {
    match store.load() {
        Ok(set_point) => {
            info!(set_point, "restored persisted set point");
            set_point
        }
        Err(PersistenceError::Missing) => {
            debug!(default, "no persisted set point, using default");
            default
        }
        Err(err) => {
            warn!("failed to load persisted set point, using default {default}: {err}");
            default
        }
    }
}

/// Non-blocking handle used by input handlers to request a save.
#[derive(Debug, Clone)]
pub struct SetpointSender {
    tx: Arc<watch::Sender<i32>>,
}

impl SetpointSender {
    /// Publishes the latest set point. Never blocks; only the newest value
    /// is guaranteed to be written.
    pub fn submit(&self, set_point: i32) {
        self.tx.send_replace(set_point);
    }

    #[cfg(test)]
    pub fn latest(&self) -> i32 {
        *self.tx.borrow()
    }
}

pub fn channel(initial: i32) -> (SetpointSender, watch::Receiver<i32>) {
    let (tx, rx) = watch::channel(initial);
    (SetpointSender { tx: Arc::new(tx) }, rx)
}

/// Background task that drains [`SetpointSender`] submissions to a store.
pub struct SetpointWriter {
    stop: Arc<Notify>,
    task: JoinHandle<()>,
}

impl SetpointWriter {
    pub fn spawn(store: Arc<dyn SetpointStore>, mut rx: watch::Receiver<i32>) -> Self {
        let stop = Arc::new(Notify::new());
        let stop_signal = stop.clone();
        let mut last_saved = *rx.borrow();

        let task = tokio::spawn(async move {
            loop {
                tokio::select! {
                    changed = rx.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                    _ = stop_signal.notified() => break,
                }

                let set_point = *rx.borrow_and_update();
                if set_point == last_saved {
                    continue;
                }

                let store = store.clone();
                match tokio::task::spawn_blocking(move || store.save(set_point)).await {
                    Ok(Ok(())) => {
                        debug!(set_point, "persisted set point");
                        last_saved = set_point;
                    }
                    Ok(Err(err)) => warn!("failed to persist set point {set_point}: {err}"),
                    Err(err) => warn!("set point save task failed: {err}"),
                }
            }
        });

        Self { stop, task }
    }

    /// Stops the writer after any in-flight save completes.
    pub async fn shutdown(self) {
        self.stop.notify_one();
        if let Err(err) = self.task.await {
            warn!("set point writer ended abnormally: {err}");
        }
    }
}
