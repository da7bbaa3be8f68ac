use std::{
    io::Write,
    path::{Path, PathBuf},
    time::Duration,
};

use serialport::{FlowControl, SerialPort};

use crate::ports::{SerialError, SerialSink};

const WRITE_TIMEOUT: Duration = Duration::from_secs(1);

type Opener<P> = fn(&Path, u32) -> Result<P, SerialError>;

/// Telemetry UART such as `/dev/ttyS0`, opened at a fixed baud rate with no
/// flow control.
///
/// The port is opened on first use and reopened after a failed write.
pub struct SerialDevice<P = Box<dyn SerialPort>> {
    path: PathBuf,
    baud_rate: u32,
    open: Opener<P>,
    port: Option<P>,
}

impl SerialDevice {
    pub fn new(path: impl Into<PathBuf>, baud_rate: u32) -> Self {
        Self::with_opener(path, baud_rate, open_uart)
    }
}

impl<P: Write + Send> SerialDevice<P> {
    fn with_opener(path: impl Into<PathBuf>, baud_rate: u32, open: Opener<P>) -> Self {
        Self {
            path: path.into(),
            baud_rate,
            open,
            port: None,
        }
    }
}

fn open_uart(path: &Path, baud_rate: u32) -> Result<Box<dyn SerialPort>, SerialError> {
    let port = serialport::new(path.to_string_lossy(), baud_rate)
        .timeout(WRITE_TIMEOUT)
        .flow_control(FlowControl::None)
        .open()?;
    Ok(port)
}

impl<P: Write + Send> SerialSink for SerialDevice<P> {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SerialError> {
        let mut port = match self.port.take() {
            Some(port) => port,
            None => (self.open)(&self.path, self.baud_rate)?,
        };
        port.write_all(bytes)?;
        port.flush()?;
        self.port = Some(port);
        Ok(())
    }

    fn release(&mut self) {
        self.port = None;
    }
}
