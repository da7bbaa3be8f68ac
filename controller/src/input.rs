use std::{
    io::{self, BufRead},
    thread,
};

use pi_thermostat_common::ButtonEvent;
use tracing::{info, warn};

use crate::controller::ControllerHandle;

/// Feeds button presses typed on stdin (`c`, `+`, `-`) to the controller.
///
/// Runs on its own thread, like a GPIO callback would; it is detached so a
/// pending read never holds up process exit.
pub fn spawn_stdin_buttons(handle: ControllerHandle) -> io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("button-input".into())
        .spawn(move || {
            let presses = pump_buttons(io::stdin().lock(), &handle);
            info!(presses, "button input closed");
        })
}

/// Dispatches one event per recognised line until EOF or shutdown.
/// Returns the number of presses handled.
pub fn pump_buttons<R: BufRead>(reader: R, handle: &ControllerHandle) -> usize {
    let mut presses = 0;

    for line in reader.lines() {
        if handle.is_shutdown_requested() {
            break;
        }
        let line = match line {
            Ok(line) => line,
            Err(err) => {
                warn!("button input failed: {err}");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match line.parse::<ButtonEvent>() {
            Ok(event) => {
                handle.dispatch(event);
                presses += 1;
            }
            Err(err) => warn!("ignoring input: {err}"),
        }
    }

    presses
}
